//! Deterministic classification of agent output.
//!
//! Two independent readings of the same text: the lifecycle status a run
//! ended in, and the session id the agent reported (if any).

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::TaskStatus;

/// Status markers in priority order. The first one present wins.
const STATUS_MARKERS: [(&str, TaskStatus); 3] = [
    ("status: testing", TaskStatus::Testing),
    ("status: blocked", TaskStatus::Blocked),
    ("status: completed", TaskStatus::Completed),
];

/// Map an exit code and captured output to a task status.
///
/// A non-zero exit is always `Blocked`, whatever the text says. A clean exit
/// uses the first marker found and defaults to `Completed`.
pub fn decide(return_code: i32, output: &str) -> TaskStatus {
    if return_code != 0 {
        return TaskStatus::Blocked;
    }
    let normalized = output.to_lowercase();
    STATUS_MARKERS
        .iter()
        .find(|(marker, _)| normalized.contains(marker))
        .map_or(TaskStatus::Completed, |(_, status)| *status)
}

/// One entry of the session-id rule table.
pub struct SessionIdRule {
    pub name: &'static str,
    pub pattern: &'static str,
}

/// Session-id patterns, most explicit first. Each captures the id in group 1.
pub const SESSION_ID_RULES: &[SessionIdRule] = &[
    SessionIdRule {
        name: "json-double-quoted",
        pattern: r#""session_id"\s*:\s*"([A-Za-z0-9._:-]+)""#,
    },
    SessionIdRule {
        name: "json-single-quoted",
        pattern: r"'session_id'\s*:\s*'([A-Za-z0-9._:-]+)'",
    },
    SessionIdRule {
        name: "sessions-path",
        pattern: r"/sessions/([A-Za-z0-9._:-]+)",
    },
    SessionIdRule {
        name: "codex-resume",
        pattern: r"\bcodex\s+resume\s+([A-Za-z0-9._:-]+)",
    },
    SessionIdRule {
        name: "resume-uuid",
        pattern: r"\bresume\s+([0-9a-f]{8}-[0-9a-f-]{27,})",
    },
    SessionIdRule {
        name: "session-id-pair",
        pattern: r"session[_\s-]?id\s*[:=]\s*([A-Za-z0-9._-]+)",
    },
    SessionIdRule {
        name: "conversation-id-pair",
        pattern: r"conversation[_\s-]?id\s*[:=]\s*([A-Za-z0-9._-]+)",
    },
    SessionIdRule {
        name: "session-phrase",
        pattern: r"\bsession\s+([A-Za-z0-9._:-]{8,})",
    },
];

static COMPILED_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SESSION_ID_RULES
        .iter()
        .map(|rule| {
            let regex = Regex::new(&format!("(?i){}", rule.pattern)).unwrap();
            (rule.name, regex)
        })
        .collect()
});

/// Recover a session id from free-form agent output.
///
/// Rules are tried in table order and the first match wins; returns an empty
/// string when no rule matches.
pub fn extract_session_id(output: &str) -> String {
    match_session_rule(output)
        .map(|(_, id)| id)
        .unwrap_or_default()
}

/// Like [`extract_session_id`], but also reports which rule matched.
pub fn match_session_rule(output: &str) -> Option<(&'static str, String)> {
    COMPILED_RULES.iter().find_map(|(name, regex)| {
        regex
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| (*name, m.as_str().trim().to_string()))
    })
}
