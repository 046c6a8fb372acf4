//! Small string helpers shared by the protocol engine and the CLI.

/// Largest byte index <= `i` that sits on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Truncate `&str` to at most `max_bytes`, never splitting a UTF-8 codepoint.
///
/// Used to keep event payloads in log lines short.
pub fn preview(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        s
    } else {
        &s[..floor_char_boundary(s, max_bytes)]
    }
}

/// If `line` is a header named `name` (ASCII case-insensitive), return its
/// value with surrounding whitespace trimmed.
///
/// `header_value("Location: /next", "location") == Some("/next")`
pub fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (field, value) = line.split_once(':')?;
    field
        .trim()
        .eq_ignore_ascii_case(name)
        .then(|| value.trim())
}

/// `true` if `s` consists only of ASCII digits. The empty string qualifies.
pub fn is_ascii_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}
