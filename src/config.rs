use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::Error;
use crate::proxy::validate_upstream;

/// Largest difficulty the 256-bit solution digest can express.
pub const MAX_DIFFICULTY: u32 = 256;

/// Startup configuration. Read once; nothing here changes while serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Address the gate listens on.
    pub listen: SocketAddr,
    /// Origin base URI admitted requests are forwarded to.
    pub upstream: String,
    /// Leading zero bits required of `SHA-256(fingerprint || nonce)`.
    pub difficulty: u32,
    /// Bind fingerprints to the first `X-Forwarded-For` entry instead of the
    /// peer address. Only for deployments behind a trusted proxy.
    pub trust_forwarded_for: bool,
    /// Upper bound on a submitted form body.
    pub max_form_bytes: usize,
    /// Seconds to wait for the origin's response before answering `504`;
    /// 0 disables it. Challenge handling is never cut short.
    pub request_timeout_secs: u64,
    /// Link to the gate's source, shown on the challenge page.
    pub source_url: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8081)),
            upstream: "http://127.0.0.1:8080".to_owned(),
            difficulty: 20,
            trust_forwarded_for: false,
            max_form_bytes: 10 << 20,
            request_timeout_secs: 0,
            source_url: None,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(Error::InvalidConfig(format!(
                "difficulty must be <= {MAX_DIFFICULTY}, got {}",
                self.difficulty
            )));
        }
        if self.max_form_bytes == 0 {
            return Err(Error::InvalidConfig("max_form_bytes must be >= 1".into()));
        }
        validate_upstream(&self.upstream).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }
}
