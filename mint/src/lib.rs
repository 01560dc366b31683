//! Sequential task-queue runner for a command-line coding agent.
//!
//! Mint walks an ordered queue of task rows, starts the agent for new rows,
//! resumes its session for ongoing ones and archives approved ones. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (summaries, outcome classification,
//!   invocation building, the in-memory queue model). No I/O.
//! - **[`io`]**: Side-effecting operations (agent processes, session logs,
//!   queue files, config). Behind traits where the driver needs fakes in tests.
//!
//! Orchestration modules ([`pipeline`], [`doctor`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod core;
pub mod doctor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
