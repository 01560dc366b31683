//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples the queue driver from the actual agent
//! backend. [`AgentExecutor`] spawns the configured command; tests use scripted
//! executors that return predetermined results without spawning processes.

use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::{decide, extract_session_id};
use crate::core::invocation::{ExecutionMode, Invocation, build_invocation};
use crate::core::types::{ExecutionResult, TaskStatus};
use crate::io::process::{ProcessOutcome, deadline_after, run_interactive, run_invocation};
use crate::io::session_log::SessionLog;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_THOUGHTS_LIMIT: usize = 49_000;
pub const TIMEOUT_RETURN_CODE: i32 = 124;
pub const CAPTURE_TIMEOUT_MESSAGE: &str = "Command timed out. Marked as Blocked.";
pub const TERMINAL_TIMEOUT_MESSAGE: &str = "Command timed out in TTY mode. Marked as Blocked.";
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";
const NO_OUTPUT: &str = "(No output)";

/// Output phrases meaning the agent refused to run without a terminal.
const TTY_REQUIRED_PATTERNS: [&str; 6] = [
    "stdin is not a terminal",
    "stdin is not a tty",
    "stdout is not a terminal",
    "stdout is not a tty",
    "not a terminal",
    "not a tty",
];

/// Parameters for one agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Command template (see [`build_invocation`]).
    pub command: String,
    /// Prompt text, already joined with the configured prefix.
    pub prompt: String,
    /// Session to resume; empty for a fresh run.
    pub session_id: String,
    /// Append a non-interactive subcommand so the agent exits when done.
    pub auto_close: bool,
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run the agent once. Timeouts are reported in the result, not as errors.
    fn exec(&self, request: &ExecRequest) -> Result<ExecutionResult>;
}

/// Executor that spawns the configured agent command.
pub struct AgentExecutor<L> {
    session_log: L,
    timeout: Duration,
    thoughts_limit: usize,
    echo: bool,
}

impl<L: SessionLog> AgentExecutor<L> {
    pub fn new(session_log: L) -> Self {
        Self {
            session_log,
            timeout: DEFAULT_TIMEOUT,
            thoughts_limit: DEFAULT_THOUGHTS_LIMIT,
            echo: true,
        }
    }

    /// Wall-clock budget for a whole run, including the terminal fallback.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_thoughts_limit(mut self, limit: usize) -> Self {
        self.thoughts_limit = limit;
        self
    }

    /// Forward captured output to stdout while the agent runs.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn run_once(
        &self,
        mode: ExecutionMode,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<ProcessOutcome> {
        if self.echo {
            run_invocation(mode, invocation, timeout, &mut io::stdout().lock())
        } else {
            run_invocation(mode, invocation, timeout, &mut io::sink())
        }
    }

    /// Turn a finished run into a result: classify, correlate the session and
    /// prefer the session's own final message over raw output.
    fn finish(
        &self,
        return_code: i32,
        raw_output: String,
        input_session: &str,
        pre_session: &str,
        post_session: &str,
    ) -> ExecutionResult {
        let status = decide(return_code, &raw_output);

        let mut resolved = extract_session_id(&raw_output);
        if resolved.is_empty() && !post_session.is_empty() && post_session != pre_session {
            debug!(session_id = post_session, "session resolved from session log");
            resolved = post_session.to_string();
        }
        let session_id = if resolved.is_empty() {
            input_session.to_string()
        } else {
            resolved
        };

        let thoughts = if session_id.is_empty() {
            raw_output
        } else {
            self.session_log
                .latest_assistant_message(&session_id)
                .unwrap_or(raw_output)
        };

        ExecutionResult {
            status,
            thoughts: truncate_thoughts(&thoughts, self.thoughts_limit),
            session_id,
            return_code,
        }
    }
}

impl<L: SessionLog> Executor for AgentExecutor<L> {
    #[instrument(skip_all, fields(resume = !request.session_id.is_empty(), auto_close = request.auto_close))]
    fn exec(&self, request: &ExecRequest) -> Result<ExecutionResult> {
        let invocation = build_invocation(
            &request.command,
            &request.prompt,
            &request.session_id,
            request.auto_close,
        )?;
        let deadline = deadline_after(self.timeout);
        let pre_session = self.session_log.latest_session_id();
        let mut mode = ExecutionMode::select(&invocation);
        info!(%invocation, ?mode, "starting agent");

        let mut outcome = self.run_once(mode, &invocation, self.timeout)?;
        if let ProcessOutcome::Completed {
            return_code,
            output,
        } = &outcome
            && mode == ExecutionMode::Capture
            && requires_terminal(*return_code, output)
        {
            warn!(return_code, "agent needs a terminal, retrying interactively");
            mode = ExecutionMode::Interactive;
            let remaining = deadline.saturating_duration_since(Instant::now());
            outcome = run_interactive(&invocation, remaining)?;
        }

        let (return_code, output) = match outcome {
            ProcessOutcome::TimedOut => {
                warn!(timeout_secs = self.timeout.as_secs(), ?mode, "agent timed out");
                return Ok(timed_out(mode, &request.session_id));
            }
            ProcessOutcome::Completed {
                return_code,
                output,
            } => (return_code, output),
        };

        let post_session = self.session_log.latest_session_id();
        let raw_output = match mode {
            ExecutionMode::Capture => captured_text(&output),
            ExecutionMode::Interactive => {
                let picked = pick_session(&pre_session, &post_session, &request.session_id);
                terminal_summary(return_code, picked)
            }
        };

        let result = self.finish(
            return_code,
            raw_output,
            &request.session_id,
            &pre_session,
            &post_session,
        );
        info!(status = %result.status, return_code, session_id = %result.session_id, "agent finished");
        Ok(result)
    }
}

fn timed_out(mode: ExecutionMode, input_session: &str) -> ExecutionResult {
    let message = match mode {
        ExecutionMode::Capture => CAPTURE_TIMEOUT_MESSAGE,
        ExecutionMode::Interactive => TERMINAL_TIMEOUT_MESSAGE,
    };
    ExecutionResult {
        status: TaskStatus::Blocked,
        thoughts: message.to_string(),
        session_id: input_session.to_string(),
        return_code: TIMEOUT_RETURN_CODE,
    }
}

/// True when a failed capture run complained about missing terminal stdio.
pub fn requires_terminal(return_code: i32, output: &str) -> bool {
    if return_code == 0 {
        return false;
    }
    let normalized = output.to_lowercase();
    TTY_REQUIRED_PATTERNS
        .iter()
        .any(|pattern| normalized.contains(pattern))
}

fn captured_text(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Session to report after an interactive run: a newly created one first,
/// then the one we resumed, then whatever is latest.
fn pick_session<'a>(pre: &str, post: &'a str, fallback: &'a str) -> &'a str {
    if !post.is_empty() && post != pre {
        post
    } else if !fallback.is_empty() {
        fallback
    } else {
        post
    }
}

fn terminal_summary(return_code: i32, session_id: &str) -> String {
    let mut text = if return_code == 0 {
        "Command completed in terminal mode.".to_string()
    } else {
        format!("Command exited with code {return_code} in terminal mode.")
    };
    if !session_id.is_empty() {
        text.push_str("\nSession ID: ");
        text.push_str(session_id);
    }
    text
}

/// Bound `text` to `limit` characters, ending with [`TRUNCATION_MARKER`] when cut.
///
/// Limits too short to hold the marker get a plain cut.
pub fn truncate_thoughts(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if limit <= marker_len {
        return text.chars().take(limit).collect();
    }
    let keep = limit - marker_len;
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_limit_and_marks_cut() {
        assert_eq!(truncate_thoughts("short", 100), "short");

        let long = "x".repeat(200);
        let cut = truncate_thoughts(&long, 100);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert!(cut.starts_with(&"x".repeat(85)));
    }

    #[test]
    fn truncation_below_marker_length_stays_within_limit() {
        let long = "x".repeat(50);
        assert_eq!(truncate_thoughts(&long, 5), "xxxxx");
        assert_eq!(truncate_thoughts(&long, 15).chars().count(), 15);
        assert_eq!(truncate_thoughts(&long, 0), "");
    }

    #[test]
    fn terminal_fallback_needs_failure_and_phrase() {
        assert!(requires_terminal(1, "Error: stdin is NOT a terminal"));
        assert!(requires_terminal(1, "stdout is not a tty"));
        assert!(!requires_terminal(0, "stdin is not a terminal"));
        assert!(!requires_terminal(2, "permission denied"));
    }

    #[test]
    fn pick_session_prefers_new_then_resumed() {
        assert_eq!(pick_session("a", "b", "c"), "b");
        assert_eq!(pick_session("a", "a", "c"), "c");
        assert_eq!(pick_session("a", "a", ""), "a");
        assert_eq!(pick_session("", "", ""), "");
    }

    #[test]
    fn terminal_summary_mentions_session() {
        assert_eq!(
            terminal_summary(0, ""),
            "Command completed in terminal mode."
        );
        assert_eq!(
            terminal_summary(3, "s1"),
            "Command exited with code 3 in terminal mode.\nSession ID: s1"
        );
    }

    #[cfg(unix)]
    mod process_runs {
        use super::super::*;
        use crate::test_support::{ScriptedSessionLog, TestWorkspace};

        fn executor(log: ScriptedSessionLog) -> AgentExecutor<ScriptedSessionLog> {
            AgentExecutor::new(log)
                .with_echo(false)
                .with_timeout(Duration::from_secs(20))
        }

        fn request(command: &str, session_id: &str) -> ExecRequest {
            ExecRequest {
                command: command.to_string(),
                prompt: "do the thing".to_string(),
                session_id: session_id.to_string(),
                auto_close: false,
            }
        }

        #[test]
        fn markers_and_session_come_from_output() {
            let exec = executor(ScriptedSessionLog::default());
            let result = exec
                .exec(&request(
                    r#"sh -c 'echo "status: testing"; echo "session_id=abc12345"'"#,
                    "",
                ))
                .expect("exec");

            assert_eq!(result.status, TaskStatus::Testing);
            assert_eq!(result.session_id, "abc12345");
            assert_eq!(result.thoughts, "status: testing\nsession_id=abc12345");
            assert_eq!(result.return_code, 0);
        }

        #[test]
        fn nonzero_exit_is_blocked_and_keeps_output() {
            let exec = executor(ScriptedSessionLog::default());
            let result = exec
                .exec(&request("sh -c 'echo status: completed; exit 2'", ""))
                .expect("exec");

            assert_eq!(result.status, TaskStatus::Blocked);
            assert_eq!(result.return_code, 2);
            assert!(result.thoughts.contains("status: completed"));
        }

        #[test]
        fn empty_output_is_reported_as_such() {
            let exec = executor(ScriptedSessionLog::default());
            let result = exec.exec(&request("sh -c 'exit 0'", "")).expect("exec");
            assert_eq!(result.thoughts, "(No output)");
            assert_eq!(result.status, TaskStatus::Completed);
        }

        #[test]
        fn timeout_blocks_and_keeps_input_session() {
            let exec = executor(ScriptedSessionLog::default())
                .with_timeout(Duration::from_millis(200));
            let req = request("sh -c 'sleep 5' {session_id} {prompt}", "prev-session");

            let result = exec.exec(&req).expect("exec");

            assert_eq!(
                result,
                ExecutionResult {
                    status: TaskStatus::Blocked,
                    thoughts: CAPTURE_TIMEOUT_MESSAGE.to_string(),
                    session_id: "prev-session".to_string(),
                    return_code: TIMEOUT_RETURN_CODE,
                }
            );
        }

        #[test]
        fn one_budget_covers_capture_and_terminal_retry() {
            let ws = TestWorkspace::new().expect("workspace");
            let mark = ws.root().join("first-run-done");
            // First run complains about stdin and exits; the retry hangs.
            let command = format!(
                "sh -c 'if [ -e {mark} ]; then sleep 5; else touch {mark}; echo \"stdin is not a terminal\"; exit 1; fi' {{session_id}} {{prompt}}",
                mark = mark.display()
            );
            let exec = executor(ScriptedSessionLog::default()).with_timeout(Duration::from_secs(1));

            let started = Instant::now();
            let result = exec.exec(&request(&command, "prev-session")).expect("exec");

            assert!(mark.exists());
            assert!(started.elapsed() < Duration::from_secs(4));
            assert_eq!(
                result,
                ExecutionResult {
                    status: TaskStatus::Blocked,
                    thoughts: TERMINAL_TIMEOUT_MESSAGE.to_string(),
                    session_id: "prev-session".to_string(),
                    return_code: TIMEOUT_RETURN_CODE,
                }
            );
        }

        #[test]
        fn huge_timeout_does_not_overflow() {
            let exec = executor(ScriptedSessionLog::default())
                .with_timeout(Duration::from_secs(u64::MAX));

            let result = exec.exec(&request("sh -c 'echo ok'", "")).expect("exec");

            assert_eq!(result.status, TaskStatus::Completed);
            assert_eq!(result.thoughts, "ok");
        }

        #[test]
        fn new_session_in_log_is_adopted_with_its_message() {
            let log = ScriptedSessionLog::with_latest(["before", "created"])
                .with_message("created", "final answer from the agent");
            let exec = executor(log);

            let result = exec
                .exec(&request("sh -c 'echo status: testing; echo noise'", ""))
                .expect("exec");

            // Status comes from raw output, thoughts from the session log.
            assert_eq!(result.status, TaskStatus::Testing);
            assert_eq!(result.session_id, "created");
            assert_eq!(result.thoughts, "final answer from the agent");
        }

        #[test]
        fn unchanged_session_log_is_not_adopted() {
            let log = ScriptedSessionLog::with_latest(["same", "same"])
                .with_message("same", "someone else's answer");
            let exec = executor(log);

            let result = exec.exec(&request("sh -c 'echo hi'", "")).expect("exec");

            assert_eq!(result.session_id, "");
            assert_eq!(result.thoughts, "hi");
        }

        #[test]
        fn resumed_session_is_threaded_through() {
            let log = ScriptedSessionLog::default().with_message("abc", "resumed reply");
            let exec = executor(log);

            let result = exec.exec(&request("sh -c 'echo ok'", "abc")).expect("exec");

            assert_eq!(result.session_id, "abc");
            assert_eq!(result.thoughts, "resumed reply");
        }

        #[test]
        fn terminal_complaint_triggers_one_interactive_retry() {
            let exec = executor(ScriptedSessionLog::default());
            let result = exec
                .exec(&request(
                    "sh -c 'echo \"Error: stdin is not a terminal\" >&2; exit 1'",
                    "",
                ))
                .expect("exec");

            assert_eq!(result.status, TaskStatus::Blocked);
            assert_eq!(result.return_code, 1);
            assert_eq!(
                result.thoughts,
                "Command exited with code 1 in terminal mode."
            );
        }

        #[test]
        fn single_word_invocation_runs_interactively() {
            let exec = executor(ScriptedSessionLog::default());
            let mut req = request("{prompt}", "");
            req.prompt = "true".to_string();

            let result = exec.exec(&req).expect("exec");

            assert_eq!(result.status, TaskStatus::Completed);
            assert_eq!(result.thoughts, "Command completed in terminal mode.");
        }

        #[test]
        fn spawn_failure_propagates() {
            let exec = executor(ScriptedSessionLog::default());
            let err = exec
                .exec(&request("mint-missing-agent-binary --flag", ""))
                .unwrap_err();
            assert!(format!("{err:#}").contains("spawn"));
        }
    }
}
