//! Deterministic, pure logic shared by the mint core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod invocation;
pub mod queue;
pub mod summary;
pub mod types;
