use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Terminal columns occupied by `s` (CJK and emoji count as two).
///
/// ```
/// use newsline::util::display_width;
///
/// assert_eq!(display_width("Hello"), 5);
/// assert_eq!(display_width("日本"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Cut `s` so it fits in `max_width` columns, ending in `...` when cut.
///
/// Widths of three columns or fewer have no room for the ellipsis and get a
/// plain prefix instead. Borrows when nothing is removed.
///
/// ```
/// use newsline::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= ELLIPSIS_WIDTH {
        return Cow::Owned(prefix_within(s, max_width).to_string());
    }
    let head = prefix_within(s, max_width - ELLIPSIS_WIDTH);
    Cow::Owned(format!("{head}{ELLIPSIS}"))
}

/// Longest prefix of `s` no wider than `width` columns.
fn prefix_within(s: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            return &s[..idx];
        }
        used += w;
    }
    s
}

fn is_stripped(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Remove terminal control characters and ANSI escape sequences.
///
/// Tab, newline and carriage return are kept. CSI (`ESC [ ... final`) and
/// OSC (`ESC ] ... BEL` or `ESC ] ... ESC \`) sequences are dropped whole so
/// remote text cannot restyle or retitle the terminal.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameters run until a final byte in 0x40..=0x7E
                    for p in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&p) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(p) = chars.next() {
                        if p == '\x07' {
                            break;
                        }
                        if p == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Render remote text as one terminal line at most `max_width` columns wide.
///
/// Control sequences are removed and any run of whitespace (including
/// newlines) collapses to a single space before truncation.
///
/// ```
/// use newsline::util::single_line;
///
/// assert_eq!(single_line("Breaking:\n  markets\trally", 80), "Breaking: markets rally");
/// assert_eq!(single_line("A rather long headline", 11), "A rather...");
/// ```
pub fn single_line(s: &str, max_width: usize) -> String {
    let clean = strip_control_chars(s);
    let joined = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_to_width(&joined, max_width).into_owned()
}
