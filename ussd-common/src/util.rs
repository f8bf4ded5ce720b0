//! Small text helpers shared by handlers and the dispatcher.

/// Join lines with `\n`, the line separator handsets expect.
pub fn new_line_strings<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n")
}

/// True when the text is empty or whitespace only.
pub fn is_empty_text(text: &str) -> bool {
    text.trim().is_empty()
}

/// Cut `s` to `max_chars` characters, marking the cut with `...`.
///
/// Counts characters rather than bytes, so handset text with emoji or
/// accented letters is never split mid-character.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let Some((cut, _)) = s.char_indices().nth(max_chars) else {
        return s.to_string();
    };
    let mut out = s[..cut].trim_end().to_string();
    out.push_str("...");
    out
}
