use std::time::{SystemTime, UNIX_EPOCH};

/// Width of one fingerprint rotation bucket: seven days.
pub const EPOCH_SECONDS: u64 = 604_800;

/// Abstraction to allow testing/time injection.
pub trait TimeProvider: Send + Sync {
    fn now_seconds(&self) -> u64;

    fn epoch(&self) -> Epoch {
        Epoch::from_unix_seconds(self.now_seconds())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeProvider(pub u64);

impl TimeProvider for FixedTimeProvider {
    fn now_seconds(&self) -> u64 {
        self.0
    }
}

/// Weekly rotation bucket. Fingerprints, and therefore credentials and
/// outstanding challenges, change when it ticks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl Epoch {
    pub const fn from_unix_seconds(secs: u64) -> Self {
        Epoch(secs / EPOCH_SECONDS)
    }

    /// Zig-zag varint encoding of the bucket, zero-padded to ten bytes.
    ///
    /// The padded width is what gets hashed, so the layout is fixed
    /// regardless of how many varint bytes the value needs.
    pub fn to_varint_block(self) -> [u8; 10] {
        let signed = i64::try_from(self.0).unwrap_or(i64::MAX);
        let mut zz = ((signed << 1) ^ (signed >> 63)) as u64;
        let mut out = [0u8; 10];
        let mut i = 0;
        while zz >= 0x80 {
            out[i] = (zz as u8) | 0x80;
            zz >>= 7;
            i += 1;
        }
        out[i] = zz as u8;
        out
    }
}
