//! Escaping of names and paths embedded in the snapshot array.
//!
//! Every escaped value sits inside a double-quoted script string on a
//! single line, with `*` separating the fields of a record. The viewer
//! splits on `*` after the string is parsed, so a literal asterisk is
//! written as the entity `&#42;` rather than a script escape.

use std::fmt::Write;
use std::path::MAIN_SEPARATOR;

/// Characters that must never appear literally in the output.
const STRIPPED: [char; 3] = ['\u{2028}', '\u{2029}', '\u{0004}'];

/// Escape a file or folder name for a double-quoted script string.
///
/// Backslashes are doubled, `&` becomes `&amp;`, `*` becomes `&#42;` and
/// `"` becomes `\"`. Line feed, carriage return and tab use their short
/// escapes, other control characters become `\uXXXX`. U+2028, U+2029 and
/// U+0004 are removed.
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    push_escaped(&mut out, name);
    out
}

/// Escape a directory path, converting the platform separator to `/` first.
pub fn escape_dir_path(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        escape_name(path)
    } else {
        escape_name(&path.replace(MAIN_SEPARATOR, "/"))
    }
}

/// Append the escaped form of `text` to `out`.
pub(crate) fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("\\\""),
            '*' => out.push_str("&#42;"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if STRIPPED.contains(&c) => {}
            c if c.is_control() && (c as u32) < 0x80 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
}
