//! Helpers for running agent processes with a wall-clock timeout.
//!
//! Two strategies share one contract ([`ProcessOutcome`]): capture mode pipes
//! the child's output, forwards each line to a caller-supplied writer and
//! buffers it; interactive mode hands the child the caller's terminal.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::invocation::{ExecutionMode, Invocation};

/// Stand-in deadline distance when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// How a process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own.
    ///
    /// `output` holds the buffered lines joined with `\n` in capture mode and
    /// is empty in interactive mode.
    Completed { return_code: i32, output: String },
    /// The deadline passed and the process was killed.
    TimedOut,
}

/// Run `invocation` with the given strategy.
///
/// `echo` receives every captured line as it arrives; interactive runs write
/// straight to the terminal and never touch it.
pub fn run_invocation(
    mode: ExecutionMode,
    invocation: &Invocation,
    timeout: Duration,
    echo: &mut dyn Write,
) -> Result<ProcessOutcome> {
    match mode {
        ExecutionMode::Capture => run_captured(invocation, timeout, echo),
        ExecutionMode::Interactive => run_interactive(invocation, timeout),
    }
}

/// Run with stdin inherited and combined stdout/stderr captured line by line.
///
/// Both output streams share one OS pipe, so lines keep the order the child
/// wrote them in. A helper thread drains the pipe; forwarding and buffering
/// happen in a single loop on the calling thread, which also enforces the
/// deadline.
#[instrument(skip_all, fields(program = %invocation.program, timeout_secs = timeout.as_secs()))]
pub fn run_captured(
    invocation: &Invocation,
    timeout: Duration,
    echo: &mut dyn Write,
) -> Result<ProcessOutcome> {
    let deadline = deadline_after(timeout);
    let (reader, writer) = std::io::pipe().context("create output pipe")?;
    let mut cmd = command_for(invocation);
    cmd.stdin(Stdio::inherit())
        .stdout(writer.try_clone().context("clone output pipe")?)
        .stderr(writer);

    debug!("spawning captured child process");
    // `spawn` consumes `cmd`, closing our copies of the write end.
    let mut child = spawn(cmd, invocation)?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    pump_lines(reader, tx);

    let mut collected: Vec<String> = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return kill_after_timeout(&mut child, timeout);
        }
        match rx.recv_timeout(remaining) {
            Ok(line) => {
                forward_line(echo, &line);
                let text = String::from_utf8_lossy(&line);
                collected.push(text.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(RecvTimeoutError::Timeout) => return kill_after_timeout(&mut child, timeout),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    let status = match child.wait_timeout(remaining).context("wait for command")? {
        Some(status) => status,
        None => return kill_after_timeout(&mut child, timeout),
    };

    let return_code = exit_code(status);
    debug!(return_code, lines = collected.len(), "captured command finished");
    Ok(ProcessOutcome::Completed {
        return_code,
        output: collected.join("\n"),
    })
}

/// Run with the caller's stdin/stdout/stderr inherited.
#[instrument(skip_all, fields(program = %invocation.program, timeout_secs = timeout.as_secs()))]
pub fn run_interactive(invocation: &Invocation, timeout: Duration) -> Result<ProcessOutcome> {
    let mut cmd = command_for(invocation);
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    debug!("spawning interactive child process");
    let mut child = spawn(cmd, invocation)?;

    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => return kill_after_timeout(&mut child, timeout),
    };
    let return_code = exit_code(status);
    debug!(return_code, "interactive command finished");
    Ok(ProcessOutcome::Completed {
        return_code,
        output: String::new(),
    })
}

/// `now + timeout`, saturating far in the future for huge budgets.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn command_for(invocation: &Invocation) -> Command {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args);
    cmd
}

fn spawn(mut cmd: Command, invocation: &Invocation) -> Result<Child> {
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(e) => {
            error!(err = %e, program = %invocation.program, "failed to spawn command");
            Err(e).with_context(|| format!("spawn {}", invocation.program))
        }
    }
}

fn kill_after_timeout(child: &mut Child, timeout: Duration) -> Result<ProcessOutcome> {
    warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
    if let Err(e) = child.kill() {
        // Already exited between the deadline check and the kill.
        debug!(err = %e, "kill after timeout failed");
    }
    child.wait().context("wait command after kill")?;
    Ok(ProcessOutcome::TimedOut)
}

/// Send every line (including its newline) read from `reader` to `tx`.
fn pump_lines<R: Read + Send + 'static>(reader: R, tx: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(err = %e, "failed to read command output");
                    break;
                }
            }
        }
    });
}

fn forward_line(echo: &mut dyn Write, line: &[u8]) {
    if let Err(e) = write_line(echo, line) {
        warn!(err = %e, "failed to forward command output");
    }
}

fn write_line(echo: &mut dyn Write, line: &[u8]) -> std::io::Result<()> {
    echo.write_all(line)?;
    if !line.ends_with(b"\n") {
        echo.write_all(b"\n")?;
    }
    echo.flush()
}

/// POSIX-style exit code; signals map to `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::invocation::build_invocation;

    fn sh(script: &str) -> Invocation {
        Invocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn captures_stdout_and_stderr_and_forwards_lines() {
        let mut echo = Vec::new();
        let outcome = run_captured(
            &sh("echo one; echo two >&2; printf three"),
            Duration::from_secs(10),
            &mut echo,
        )
        .expect("run");

        let ProcessOutcome::Completed {
            return_code,
            output,
        } = outcome
        else {
            panic!("unexpected timeout");
        };
        assert_eq!(return_code, 0);
        assert_eq!(output, "one\ntwo\nthree");
        let echoed = String::from_utf8(echo).expect("utf8");
        assert_eq!(echoed, "one\ntwo\nthree\n");
    }

    #[test]
    fn stdout_and_stderr_keep_emission_order() {
        let script = "for i in 1 2 3 4 5; do echo out$i; echo err$i >&2; done";
        let outcome =
            run_captured(&sh(script), Duration::from_secs(10), &mut std::io::sink()).expect("run");

        let ProcessOutcome::Completed { output, .. } = outcome else {
            panic!("unexpected timeout");
        };
        let expected: Vec<String> = (1..=5)
            .flat_map(|i| [format!("out{i}"), format!("err{i}")])
            .collect();
        assert_eq!(output.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn deadline_saturates_for_huge_timeouts() {
        let before = Instant::now();
        assert!(deadline_after(Duration::MAX) > before + Duration::from_secs(3600));
        assert!(deadline_after(Duration::from_secs(u64::MAX)) > before);
    }

    #[test]
    fn reports_nonzero_exit_code() {
        let outcome =
            run_captured(&sh("exit 3"), Duration::from_secs(10), &mut std::io::sink()).expect("run");
        assert_eq!(
            outcome,
            ProcessOutcome::Completed {
                return_code: 3,
                output: String::new(),
            }
        );
    }

    #[test]
    fn kills_on_timeout() {
        let inv = build_invocation("sleep {prompt}", "5", "", false).expect("build");
        let started = Instant::now();
        let outcome =
            run_captured(&inv, Duration::from_millis(200), &mut std::io::sink()).expect("run");
        assert_eq!(outcome, ProcessOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_an_error() {
        let inv = Invocation {
            program: "mint-definitely-missing-binary".to_string(),
            args: vec!["x".to_string()],
        };
        let err = run_captured(&inv, Duration::from_secs(1), &mut std::io::sink()).unwrap_err();
        assert!(err.to_string().contains("spawn"));
    }

    #[test]
    fn interactive_mode_returns_exit_code_without_output() {
        let outcome = run_interactive(&sh("exit 0"), Duration::from_secs(10)).expect("run");
        assert_eq!(
            outcome,
            ProcessOutcome::Completed {
                return_code: 0,
                output: String::new(),
            }
        );
    }
}
