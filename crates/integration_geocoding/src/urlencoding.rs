//! Percent-encoding for queries embedded in URL paths
//!
//! Mapbox and TomTom take the search text as a path segment
//! (`.../geocode/<text>.json`), where `+` is not a space.

use std::fmt::Write;

/// Percent-encode a string for use as a single URL path segment
///
/// Encodes all characters except unreserved characters (`A-Z`, `a-z`, `0-9`,
/// `-`, `_`, `.`, `~`). Spaces are encoded as `%20`.
pub fn encode_path_segment(input: &str) -> String {
    let mut result = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(char::from(b));
            },
            _ => {
                let _ = write!(result, "%{b:02X}");
            },
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_spaces_as_percent_twenty() {
        assert_eq!(encode_path_segment("1600 Pennsylvania Ave"), "1600%20Pennsylvania%20Ave");
    }

    #[test]
    fn encode_path_separators() {
        assert_eq!(encode_path_segment("a/b?c#d"), "a%2Fb%3Fc%23d");
    }

    #[test]
    fn encode_unreserved_chars() {
        assert_eq!(encode_path_segment("abc-123_test.file~v2"), "abc-123_test.file~v2");
    }

    #[test]
    fn encode_empty() {
        assert_eq!(encode_path_segment(""), "");
    }

    #[test]
    fn encode_multibyte() {
        assert_eq!(encode_path_segment("München"), "M%C3%BCnchen");
    }
}
