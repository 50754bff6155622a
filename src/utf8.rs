//! UTF-8 validation for text messages and close reasons
//!
//! Backed by `simdutf8`, which picks the widest SIMD path the CPU supports
//! and falls back to std elsewhere.

/// Validate that the input is valid UTF-8
#[inline]
pub fn validate_utf8(data: &[u8]) -> bool {
    simdutf8::basic::from_utf8(data).is_ok()
}

/// Validate UTF-8 that may end in the middle of a multi-byte sequence
///
/// Returns:
/// - (true, n) if all complete sequences are valid, where n is the number of
///   trailing bytes that form an incomplete sequence (0-3 bytes)
/// - (false, 0) if there's an invalid UTF-8 sequence
///
/// Used on fragmented text messages, whose fragment boundaries may split
/// a character.
pub fn validate_utf8_incomplete(data: &[u8]) -> (bool, usize) {
    match simdutf8::compat::from_utf8(data) {
        Ok(_) => (true, 0),
        // error_len() is None only when the input ends inside a sequence
        Err(e) if e.error_len().is_none() => (true, data.len() - e.valid_up_to()),
        Err(_) => (false, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ascii() {
        assert!(validate_utf8(b"Hello, World!"));
        assert!(validate_utf8(b""));
    }

    #[test]
    fn test_valid_multibyte() {
        assert!(validate_utf8("Hello, 世界!".as_bytes()));
        assert!(validate_utf8("émoji: 🎉".as_bytes()));
    }

    #[test]
    fn test_invalid_utf8() {
        // Overlong NUL
        assert!(!validate_utf8(&[0xC0, 0x80]));
        // Invalid leading byte
        assert!(!validate_utf8(&[0xFF]));
        // Surrogate half U+D800
        assert!(!validate_utf8(&[0xED, 0xA0, 0x80]));
        // Truncated sequence
        assert!(!validate_utf8(&[0xE4, 0xB8]));
    }

    #[test]
    fn test_validate_utf8_incomplete() {
        assert_eq!(validate_utf8_incomplete(b"hello"), (true, 0));
        assert_eq!(validate_utf8_incomplete(&[0xC2]), (true, 1));
        assert_eq!(validate_utf8_incomplete(&[0xE4, 0xB8]), (true, 2));

        let mut data = b"hi".to_vec();
        data.extend_from_slice(&[0xE4, 0xB8]);
        assert_eq!(validate_utf8_incomplete(&data), (true, 2));

        // A broken sequence is not rescued by being at the end
        assert_eq!(validate_utf8_incomplete(&[0xE4, 0x41]), (false, 0));
    }
}
