use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

pub type HmacSha256 = Hmac<Sha256>;

/// Process-wide key material every fingerprint and credential is derived from.
///
/// Generated once at startup and never mutated, persisted or sent anywhere.
/// Share it behind an `Arc`; all access is read-only.
pub struct ServerSecret {
    digest: [u8; 32],
    mac: HmacSha256,
}

impl ServerSecret {
    /// Draw a fresh secret from the operating system RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::from_bytes(key)
    }

    /// Build a secret from known bytes. Only tests and tooling should need this.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        let digest = Sha256::digest(key).into();
        let mac = HmacSha256::new_from_slice(&key).expect("HMAC-SHA256 accepts 32-byte keys");
        Self { digest, mac }
    }

    /// SHA-256 of the key, mixed into fingerprints for domain separation.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// HMAC-SHA256 keyed with the secret.
    pub fn sign(&self, message: &[u8]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.finalize().into_bytes().into()
    }
}

impl fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSecret")
            .field("digest", &hex::encode(&self.digest[..4]))
            .finish_non_exhaustive()
    }
}
