//! Structured construction of agent invocations.
//!
//! A command template such as `codex --model o3` or
//! `my-agent --resume {session_id} --message {prompt}` is split into words once,
//! and the prompt is always carried as a single argument. Nothing is ever
//! re-parsed by a shell, so prompts need no escaping.

use std::fmt;

use anyhow::{Result, bail};

pub const PROMPT_PLACEHOLDER: &str = "{prompt}";
pub const SESSION_PLACEHOLDER: &str = "{session_id}";

/// Subcommands that already make an agent run non-interactively.
const NON_INTERACTIVE_SUBCOMMANDS: [&str; 2] = ["exec", "review"];

/// A program plus its argument vector, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn from_words(mut words: Vec<String>) -> Result<Self> {
        if words.is_empty() {
            bail!("command template produced no program to run");
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    /// All words, program first.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.words().map(quote_word).collect();
        f.write_str(&quoted.join(" "))
    }
}

/// How an invocation is run. Both strategies produce the same result contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Inherit the caller's terminal; nothing is captured.
    Interactive,
    /// Pipe, forward and buffer the combined output.
    Capture,
}

impl ExecutionMode {
    /// Interactive only for a single bare word that is not a non-interactive subcommand.
    pub fn select(invocation: &Invocation) -> Self {
        if invocation.args.is_empty() && !is_non_interactive([invocation.program.as_str()]) {
            ExecutionMode::Interactive
        } else {
            ExecutionMode::Capture
        }
    }
}

/// True when any word is a non-interactive subcommand (`exec`, `review`).
pub fn is_non_interactive<'a>(words: impl IntoIterator<Item = &'a str>) -> bool {
    words.into_iter().any(|word| {
        let lower = word.to_ascii_lowercase();
        NON_INTERACTIVE_SUBCOMMANDS.contains(&lower.as_str())
    })
}

/// Build the invocation for one agent run.
///
/// Templates with a `{prompt}` placeholder are filled in place; `{session_id}`
/// is substituted when present, otherwise `resume <id>` is inserted ahead of
/// the prompt word. Templates without placeholders get the prompt appended,
/// preceded by `exec` in auto-close mode and by `resume <id>` when resuming.
pub fn build_invocation(
    template: &str,
    prompt: &str,
    session_id: &str,
    auto_close: bool,
) -> Result<Invocation> {
    let words = split_words(template)?;
    if words.is_empty() {
        bail!("command is empty");
    }

    if words.iter().any(|word| word.contains(PROMPT_PLACEHOLDER)) {
        return Invocation::from_words(fill_placeholders(words, prompt, session_id));
    }

    let mut out = words;
    if auto_close && !is_non_interactive(out.iter().map(String::as_str)) {
        out.push("exec".to_string());
    }
    if !session_id.is_empty() {
        out.push("resume".to_string());
        out.push(session_id.to_string());
    }
    out.push(prompt.to_string());
    Invocation::from_words(out)
}

fn fill_placeholders(words: Vec<String>, prompt: &str, session_id: &str) -> Vec<String> {
    let has_session_slot = words.iter().any(|word| word.contains(SESSION_PLACEHOLDER));
    let mut resume_pending = !has_session_slot && !session_id.is_empty();
    let mut out = Vec::with_capacity(words.len() + 2);

    for mut word in words {
        // Session first, so a prompt that happens to contain the session
        // placeholder text is never rewritten.
        if word.contains(SESSION_PLACEHOLDER) {
            if word == SESSION_PLACEHOLDER && session_id.is_empty() {
                continue;
            }
            word = word.replace(SESSION_PLACEHOLDER, session_id);
        }
        if word.contains(PROMPT_PLACEHOLDER) {
            if resume_pending {
                out.push("resume".to_string());
                out.push(session_id.to_string());
                resume_pending = false;
            }
            word = word.replace(PROMPT_PLACEHOLDER, prompt);
        }
        out.push(word);
    }
    out
}

/// Split a command template into words using POSIX-like quoting.
///
/// Single quotes are literal, double quotes honour `\"` and `\\`, and a
/// backslash outside quotes escapes the next character.
pub fn split_words(template: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => bail!("unterminated single quote in command {template:?}"),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => bail!("unterminated double quote in command {template:?}"),
                        },
                        Some(inner) => current.push(inner),
                        None => bail!("unterminated double quote in command {template:?}"),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn quote_word(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,{}".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(invocation: &Invocation) -> Vec<&str> {
        invocation.words().collect()
    }

    #[test]
    fn split_words_honours_quotes_and_escapes() {
        let parsed = split_words(r#"sh -c 'echo "hi there"' "a \"b\"" c\ d"#).expect("split");
        assert_eq!(parsed, vec!["sh", "-c", "echo \"hi there\"", "a \"b\"", "c d"]);
    }

    #[test]
    fn split_words_rejects_unterminated_quote() {
        let err = split_words("codex 'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(build_invocation("   ", "p", "", true).is_err());
    }

    #[test]
    fn prompt_placeholder_keeps_prompt_as_one_argument() {
        let inv = build_invocation("agent --msg {prompt}", "rm -rf \"$HOME\"; echo", "", true)
            .expect("build");
        assert_eq!(words(&inv), vec!["agent", "--msg", "rm -rf \"$HOME\"; echo"]);
    }

    #[test]
    fn prompt_placeholder_inserts_resume_ahead_of_prompt() {
        let inv = build_invocation("agent --msg {prompt}", "go on", "abc", true).expect("build");
        assert_eq!(words(&inv), vec!["agent", "--msg", "resume", "abc", "go on"]);
    }

    #[test]
    fn session_placeholder_is_substituted() {
        let inv = build_invocation("agent --session={session_id} {prompt}", "hi", "s1", false)
            .expect("build");
        assert_eq!(words(&inv), vec!["agent", "--session=s1", "hi"]);
    }

    #[test]
    fn bare_session_placeholder_is_dropped_without_session() {
        let inv = build_invocation("agent {session_id} {prompt}", "hi", "", false).expect("build");
        assert_eq!(words(&inv), vec!["agent", "hi"]);
    }

    #[test]
    fn prompt_containing_placeholder_text_is_not_rewritten() {
        let inv = build_invocation("agent {session_id} {prompt}", "say {session_id}", "s9", false)
            .expect("build");
        assert_eq!(words(&inv), vec!["agent", "s9", "say {session_id}"]);
    }

    #[test]
    fn auto_close_appends_exec_and_resume() {
        let fresh = build_invocation("codex", "fix it", "", true).expect("build");
        assert_eq!(words(&fresh), vec!["codex", "exec", "fix it"]);

        let resumed = build_invocation("codex", "fix it", "abc", true).expect("build");
        assert_eq!(words(&resumed), vec!["codex", "exec", "resume", "abc", "fix it"]);
    }

    #[test]
    fn auto_close_does_not_duplicate_exec() {
        let inv = build_invocation("codex exec --full-auto", "p", "abc", true).expect("build");
        assert_eq!(
            words(&inv),
            vec!["codex", "exec", "--full-auto", "resume", "abc", "p"]
        );
    }

    #[test]
    fn without_auto_close_only_resume_is_added() {
        let fresh = build_invocation("codex", "p", "", false).expect("build");
        assert_eq!(words(&fresh), vec!["codex", "p"]);

        let resumed = build_invocation("codex", "p", "abc", false).expect("build");
        assert_eq!(words(&resumed), vec!["codex", "resume", "abc", "p"]);
    }

    #[test]
    fn mode_selection_prefers_capture() {
        let single = Invocation::from_words(vec!["codex".to_string()]).expect("inv");
        assert_eq!(ExecutionMode::select(&single), ExecutionMode::Interactive);

        let exec_only = Invocation::from_words(vec!["EXEC".to_string()]).expect("inv");
        assert_eq!(ExecutionMode::select(&exec_only), ExecutionMode::Capture);

        let with_prompt = build_invocation("codex", "p", "", false).expect("build");
        assert_eq!(ExecutionMode::select(&with_prompt), ExecutionMode::Capture);
    }

    #[test]
    fn bare_prompt_template_runs_interactively() {
        let inv = build_invocation("{prompt}", "vim", "", true).expect("build");
        assert_eq!(ExecutionMode::select(&inv), ExecutionMode::Interactive);
    }

    #[test]
    fn display_quotes_words_that_need_it() {
        let inv = build_invocation("codex", "it's done", "", false).expect("build");
        assert_eq!(inv.to_string(), r"codex 'it'\''s done'");
    }
}
