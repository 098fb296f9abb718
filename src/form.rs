//! Strict `application/x-www-form-urlencoded` decoding for challenge
//! submissions.
//!
//! Unlike lenient decoders this rejects bad `%` escapes and `;` separators,
//! so that garbage reaches the client as a "malformed form" message instead
//! of being silently reinterpreted.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("invalid percent escape in form data")]
    BadEscape,
    #[error("invalid semicolon separator in form data")]
    Semicolon,
    #[error("form data is not valid UTF-8")]
    NotUtf8,
    #[error("malformed content type")]
    ContentType,
    #[error("failed to read form body: {0}")]
    Body(String),
}

/// Decoded key/value pairs in submission order; repeated keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn parse(input: &[u8]) -> Result<Self, FormError> {
        let mut pairs = Vec::new();
        for segment in input.split(|b| *b == b'&') {
            if segment.is_empty() {
                continue;
            }
            if segment.contains(&b';') {
                return Err(FormError::Semicolon);
            }
            let (key, value) = match segment.iter().position(|b| *b == b'=') {
                Some(i) => (&segment[..i], &segment[i + 1..]),
                None => (segment, &[][..]),
            };
            pairs.push((unescape(key)?, unescape(value)?));
        }
        Ok(Self(pairs))
    }

    /// Every value submitted under `name`.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether this request carries a urlencoded body worth reading.
///
/// Only `POST`, `PUT` and `PATCH` bodies count. A missing content type is
/// treated as opaque bytes; an unparseable one is an error.
pub fn expects_form_body(method: &Method, headers: &HeaderMap) -> Result<bool, FormError> {
    if !matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        return Ok(false);
    }
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(false);
    };
    let value = value.to_str().map_err(|_| FormError::ContentType)?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((ty, sub)) if is_token(ty) && is_token(sub) => {
            Ok(essence.eq_ignore_ascii_case(FORM_URLENCODED))
        }
        _ => Err(FormError::ContentType),
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

fn unescape(raw: &[u8]) -> Result<String, FormError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = raw.get(i + 1).and_then(|b| hex_digit(*b));
                let lo = raw.get(i + 2).and_then(|b| hex_digit(*b));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => return Err(FormError::BadEscape),
                }
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| FormError::NotUtf8)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
