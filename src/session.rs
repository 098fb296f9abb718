//! Credential cookie handling.
//!
//! The cookie carries `base64(HMAC(secret, fingerprint))`. It is checked by
//! recomputing the HMAC and comparing in constant time, never by lookup.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};
use subtle::ConstantTimeEq;

/// Protocol name of the credential cookie and of the submission form field.
pub const COOKIE_NAME: &str = "powgate";

/// Find the credential cookie among the request's `Cookie` headers.
///
/// Only the `powgate` pair is looked at, so other cookies may carry any
/// bytes. `None` when no credential was presented or its value is not UTF-8;
/// both read as "not authenticated".
pub fn presented_credential(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get_all(COOKIE)
        .iter()
        .flat_map(|header| header.as_bytes().split(|b| *b == b';'))
        .find_map(|pair| {
            let eq = pair.iter().position(|b| *b == b'=')?;
            (pair[..eq].trim_ascii() == COOKIE_NAME.as_bytes())
                .then(|| pair[eq + 1..].trim_ascii())
        })?;
    let value = std::str::from_utf8(value).ok()?;
    Some(
        value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value),
    )
}

/// Whether the presented cookie value is the expected credential.
///
/// Absence, bad base64 and a mismatch all read as "not authenticated".
pub fn is_authenticated(presented: Option<&str>, expected_mac: &[u8; 32]) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(presented) else {
        return false;
    };
    decoded.as_slice().ct_eq(expected_mac.as_slice()).into()
}

/// `Set-Cookie` value issued after a solved challenge.
///
/// No expiry: the credential dies with the epoch, not with a cookie TTL.
pub fn credential_cookie(mac: &[u8; 32]) -> HeaderValue {
    let cookie = format!(
        "{COOKIE_NAME}={}; Path=/; HttpOnly; Secure",
        STANDARD.encode(mac)
    );
    HeaderValue::try_from(cookie).expect("cookie name and base64 value are visible ASCII")
}
