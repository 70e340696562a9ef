//! Reversible conversion of OS strings to UTF-8 text.
//!
//! Names that are not valid UTF-8 cannot be replaced lossily: two siblings
//! differing only in invalid bytes would collapse into one path and break
//! the path-to-index lookup. Invalid bytes are percent-encoded instead, and
//! a literal `%` that would read as an encoded byte is itself encoded.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::fmt::Write;

/// Convert an OS string to UTF-8 such that distinct inputs stay distinct.
///
/// Valid UTF-8 passes through unchanged, except that a `%` followed by two
/// hex digits becomes `%25`. Every byte outside valid UTF-8 becomes `%XX`.
pub fn lossless_text(text: &OsStr) -> Cow<'_, str> {
    if let Some(valid) = text.to_str() {
        if !has_encoded_lookalike(valid) {
            return Cow::Borrowed(valid);
        }
    }

    let bytes = text.as_encoded_bytes();
    let mut out = String::with_capacity(bytes.len() + 8);
    for chunk in bytes.utf8_chunks() {
        push_valid(&mut out, chunk.valid());
        for byte in chunk.invalid() {
            // Writing into a String cannot fail.
            let _ = write!(out, "%{byte:02X}");
        }
    }
    Cow::Owned(out)
}

/// [`lossless_text`] for a path.
pub fn path_text(path: &std::path::Path) -> Cow<'_, str> {
    lossless_text(path.as_os_str())
}

fn has_encoded_lookalike(text: &str) -> bool {
    let bytes = text.as_bytes();
    (0..bytes.len()).any(|i| is_encoded_at(bytes, i))
}

fn is_encoded_at(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'%'
        && bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
        && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit)
}

fn push_valid(out: &mut String, text: &str) {
    let bytes = text.as_bytes();
    let mut start = 0;
    for i in 0..bytes.len() {
        if is_encoded_at(bytes, i) {
            out.push_str(&text[start..i]);
            out.push_str("%25");
            start = i + 1;
        }
    }
    out.push_str(&text[start..]);
}
