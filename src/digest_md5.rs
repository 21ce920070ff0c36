//! Thin wrapper over the `md-5` crate: the one opaque hash primitive
//! Digest authentication needs.

use md5::{Digest as _, Md5};

/// Upper-case hex MD5 digest of `input`, exactly 32 characters.
#[must_use]
pub fn hash_hex_upper(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    let mut out = String::with_capacity(32);
    for byte in digest {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // MD5("") is a standard test vector.
        assert_eq!(hash_hex_upper(""), "D41D8CD98F00B204E9800998ECF8427E");
    }

    #[test]
    fn is_always_32_uppercase_hex_chars() {
        let out = hash_hex_upper("iTunes:airtunes:geheim");
        assert_eq!(out.len(), 32);
        assert!(out.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    proptest::proptest! {
        #[test]
        fn hash_hex_upper_is_always_32_uppercase_hex_chars(input in ".*") {
            let out = hash_hex_upper(&input);
            proptest::prop_assert_eq!(out.len(), 32);
            proptest::prop_assert!(out.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }
}
