//! Compound key-path helpers.
//!
//! A compound key path encodes structural position in the flat field bag:
//! `name[0]` (list element), `name[key]` (map entry), `name.sub` (record
//! field), nesting freely (`packages[2].depends[0]`). The bracket and dot
//! characters are structural, so a map key that contains them must be
//! escaped independently of the outer wire encoding.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters that would be ambiguous inside a bracketed key component.
/// `%` is included so escaping round-trips.
const COMPONENT: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'[')
    .add(b']')
    .add(b'.')
    .add(b'=')
    .add(b'&');

/// Escape a map-key component for embedding between `[` and `]`.
pub fn escape_component(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

/// Inverse of [`escape_component`].
pub fn unescape_component(component: &str) -> String {
    percent_decode_str(component)
        .decode_utf8_lossy()
        .into_owned()
}

/// Match `full` against `prefix[<component>]<tail>` where `prefix` already
/// ends with the opening bracket. Returns the raw (still escaped) component
/// when the tail is empty or continues structurally with `.` or `[`.
///
/// Escaped components never contain a literal `]`, so the first `]` after
/// the prefix is always the structural close.
pub(crate) fn bracketed_child<'a>(full: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = full.strip_prefix(prefix)?;
    let end = rest.find(']')?;
    let tail = &rest[end + 1..];
    if tail.is_empty() || tail.starts_with('.') || tail.starts_with('[') {
        Some(&rest[..end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_round_trips_delimiters() {
        let key = "odd[key].with=delims&100%";
        let escaped = escape_component(key);
        assert!(!escaped.contains('['));
        assert!(!escaped.contains(']'));
        assert!(!escaped.contains('.'));
        assert_eq!(unescape_component(&escaped), key);
    }

    #[test]
    fn plain_components_pass_through() {
        assert_eq!(escape_component("x86_64"), "x86_64");
        assert_eq!(unescape_component("x86_64"), "x86_64");
    }

    #[test]
    fn bracketed_child_accepts_structural_tails() {
        assert_eq!(bracketed_child("items[3]", "items["), Some("3"));
        assert_eq!(bracketed_child("items[3].name", "items["), Some("3"));
        assert_eq!(bracketed_child("items[3][0]", "items["), Some("3"));
    }

    #[test]
    fn bracketed_child_rejects_lookalikes() {
        assert_eq!(bracketed_child("items[3]x", "items["), None);
        assert_eq!(bracketed_child("itemsx[3]", "items["), None);
        assert_eq!(bracketed_child("items", "items["), None);
    }
}
