//! Base64 helpers for the attestation wire formats.
//!
//! Attestation services emit base64url without padding, but report-data
//! claims and IMDS envelopes are seen in the wild with either alphabet and
//! with or without padding, so decoding is lenient about both.

use base64ct::{Base64Unpadded, Base64UrlUnpadded, Encoding};

pub fn b64url_encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

/// Decode base64url, tolerating trailing `=` padding.
pub fn b64url_decode(data: &str) -> Result<Vec<u8>, base64ct::Error> {
    Base64UrlUnpadded::decode_vec(data.trim().trim_end_matches('='))
}

/// Decode either base64 alphabet, padded or not.
pub fn b64_decode_any(data: &str) -> Result<Vec<u8>, base64ct::Error> {
    let data = data.trim().trim_end_matches('=');
    if data.contains(&['+', '/'][..]) {
        Base64Unpadded::decode_vec(data)
    } else {
        Base64UrlUnpadded::decode_vec(data)
    }
}
