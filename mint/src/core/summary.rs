//! Ticket labels derived from task prompts.

/// Longest ticket, in characters, including the ellipsis.
pub const TICKET_MAX_CHARS: usize = 96;
const ELLIPSIS: &str = "...";

/// Collapse every whitespace run to a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse a prompt into a ticket of at most [`TICKET_MAX_CHARS`] characters.
///
/// Prompts that fit after whitespace collapsing are returned as-is; longer ones
/// keep their first 93 characters (trailing whitespace trimmed) plus `...`.
pub fn summarize(prompt: &str) -> String {
    let clean = collapse_whitespace(prompt);
    if clean.chars().count() <= TICKET_MAX_CHARS {
        return clean;
    }
    let keep = TICKET_MAX_CHARS - ELLIPSIS.len();
    let head: String = clean.chars().take(keep).collect();
    format!("{}{ELLIPSIS}", head.trim_end())
}
