//! HTTP Digest authentication (MD5, no `qop`) for the RTSP control
//! channel.
//!
//! ```text
//! HA1 = MD5("iTunes" ":" realm ":" "geheim")
//! HA2 = MD5(method ":" url)
//! response = MD5(HA1_hex_upper ":" nonce ":" HA2_hex_upper)
//! ```
//!
//! Username and password are hard-coded. The reference source accepts
//! a `-c password` flag but never wires it into the hash, so there is
//! no override here either — see `DESIGN.md`.

use crate::digest_md5::hash_hex_upper;
use crate::protocol::rtsp::Method;

const USERNAME: &str = "iTunes";
const PASSWORD: &str = "geheim";

/// Compute the `response` field of a Digest `Authorization` header.
#[must_use]
pub fn response_hex(method: Method, uri: &str, realm: &str, nonce: &str) -> String {
    let ha1 = hash_hex_upper(&format!("{USERNAME}:{realm}:{PASSWORD}"));
    let ha2 = hash_hex_upper(&format!("{method}:{uri}"));
    hash_hex_upper(&format!("{ha1}:{nonce}:{ha2}"))
}

/// Build the full `Authorization: Digest ...` header value.
#[must_use]
pub fn build_authorization_header(method: Method, uri: &str, realm: &str, nonce: &str) -> String {
    let response = response_hex(method, uri, realm, nonce);
    format!(
        "Digest username=\"{USERNAME}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", response=\"{response}\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_worked_example() {
        // From the end-to-end auth-challenge scenario: realm="airtunes",
        // nonce="abc123", uri="rtsp://192.168.1.10/1".
        let ha1 = hash_hex_upper("iTunes:airtunes:geheim");
        let ha2 = hash_hex_upper("OPTIONS:rtsp://192.168.1.10/1");
        let expected = hash_hex_upper(&format!("{ha1}:abc123:{ha2}"));

        let got = response_hex(Method::Options, "rtsp://192.168.1.10/1", "airtunes", "abc123");
        assert_eq!(got, expected);
        assert_eq!(got.len(), 32);
        assert!(got.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn header_contains_all_required_fields() {
        let header = build_authorization_header(
            Method::Options,
            "rtsp://192.168.1.10/1",
            "airtunes",
            "abc123",
        );
        assert!(header.starts_with("Digest username=\"iTunes\""));
        assert!(header.contains("realm=\"airtunes\""));
        assert!(header.contains("nonce=\"abc123\""));
        assert!(header.contains("uri=\"rtsp://192.168.1.10/1\""));
        assert!(header.contains("response=\""));
    }
}
