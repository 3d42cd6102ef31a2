//! Keep user-supplied text (display names, guild names, raw command lines) on one log line.

/// Longest preview of user text that reaches the log, in characters.
pub const MAX_PREVIEW: usize = 200;

/// Debug-escape `s` (newlines, tabs, quotes, control characters) and cut it at
/// [`MAX_PREVIEW`] characters, marking the cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    match s.char_indices().nth(MAX_PREVIEW) {
        Some((cut, _)) => format!("{}…", s[..cut].escape_debug()),
        None => s.escape_debug().to_string(),
    }
}
