//! Per-client identity: a weekly-rotating fingerprint and the credential
//! (HMAC) that proves the fingerprint's challenge was solved.
//!
//! Nothing here is stored. The gate recomputes both values from the request
//! on every call and compares; see [`crate::session`].

use crate::secret::ServerSecret;
use crate::time::{Epoch, SystemTimeProvider, TimeProvider};
use http::header::{ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use http::HeaderMap;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The request attributes a fingerprint is built from.
///
/// Missing headers are empty slices; they still contribute to the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientMeta<'a> {
    pub address: &'a str,
    pub user_agent: &'a [u8],
    pub accept_encoding: &'a [u8],
    pub accept_language: &'a [u8],
}

impl<'a> ClientMeta<'a> {
    pub fn from_headers(address: &'a str, headers: &'a HeaderMap) -> Self {
        let get = |name| headers.get(name).map(|v| v.as_bytes()).unwrap_or_default();
        Self {
            address,
            user_agent: get(USER_AGENT),
            accept_encoding: get(ACCEPT_ENCODING),
            accept_language: get(ACCEPT_LANGUAGE),
        }
    }

    pub fn user_agent_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.user_agent)
    }
}

/// Fingerprint and expected credential for one client in one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity {
    pub fingerprint: [u8; 32],
    pub mac: [u8; 32],
}

/// Derives [`ClientIdentity`] values from request metadata.
#[derive(Clone)]
pub struct IdentityDeriver {
    secret: Arc<ServerSecret>,
    trust_forwarded_for: bool,
    clock: Arc<dyn TimeProvider>,
}

impl IdentityDeriver {
    pub fn new(secret: Arc<ServerSecret>, trust_forwarded_for: bool) -> Self {
        Self {
            secret,
            trust_forwarded_for,
            clock: Arc::new(SystemTimeProvider),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn trusts_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    pub fn current_epoch(&self) -> Epoch {
        self.clock.epoch()
    }

    /// Address the fingerprint is bound to.
    ///
    /// Normally the peer IP with the port dropped. In secondary-hop mode the
    /// first `X-Forwarded-For` entry wins; anything in front of the gate can
    /// set it, so that mode is only safe behind a trusted proxy.
    pub fn client_address(&self, peer: SocketAddr, headers: &HeaderMap) -> String {
        if self.trust_forwarded_for {
            let forwarded = headers
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .unwrap_or_default();
            if !forwarded.is_empty() {
                return forwarded.to_owned();
            }
        }
        peer.ip().to_string()
    }

    /// Derive the identity for the current epoch.
    pub fn derive(&self, meta: &ClientMeta<'_>) -> ClientIdentity {
        self.derive_at(self.current_epoch(), meta)
    }

    pub fn derive_at(&self, epoch: Epoch, meta: &ClientMeta<'_>) -> ClientIdentity {
        let mut hasher = Sha256::new();
        hasher.update(epoch.to_varint_block());
        hasher.update(meta.address.as_bytes());
        hasher.update(meta.user_agent);
        hasher.update(meta.accept_encoding);
        hasher.update(meta.accept_language);
        hasher.update(self.secret.digest());
        let fingerprint: [u8; 32] = hasher.finalize().into();
        let mac = self.secret.sign(&fingerprint);
        ClientIdentity { fingerprint, mac }
    }
}
