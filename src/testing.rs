//! Fixtures shared by unit tests.

use crate::identity::IdentityDeriver;
use crate::proxy::Upstream;
use crate::secret::ServerSecret;
use crate::solver::SolverBuilder;
use crate::time::{FixedTimeProvider, EPOCH_SECONDS};
use async_trait::async_trait;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{Request, StatusCode};
use std::sync::{Arc, Mutex};

pub(crate) const SECRET: [u8; 32] = [7u8; 32];
pub(crate) const NOW: u64 = 2900 * EPOCH_SECONDS + 1234;

pub(crate) fn fixed_deriver(trust_forwarded_for: bool) -> IdentityDeriver {
    IdentityDeriver::new(Arc::new(ServerSecret::from_bytes(SECRET)), trust_forwarded_for)
        .with_clock(Arc::new(FixedTimeProvider(NOW)))
}

pub(crate) fn solve_for(fingerprint: &[u8; 32], difficulty: u32) -> [u8; 8] {
    SolverBuilder::default()
        .difficulty(difficulty)
        .build_validated()
        .expect("build solver")
        .solve(fingerprint)
        .expect("solve")
        .nonce
}

/// Origin stand-in that records what reached it.
#[derive(Debug, Default)]
pub(crate) struct StubUpstream {
    forwarded: Mutex<Vec<(String, String)>>,
}

impl StubUpstream {
    /// `(request target, client)` pairs, in arrival order.
    pub(crate) fn forwarded(&self) -> Vec<(String, String)> {
        self.forwarded.lock().expect("stub lock").clone()
    }
}

#[async_trait]
impl Upstream for StubUpstream {
    async fn forward(&self, request: Request<Body>, client: &str) -> Response {
        self.forwarded
            .lock()
            .expect("stub lock")
            .push((request.uri().to_string(), client.to_owned()));
        (StatusCode::OK, "origin").into_response()
    }
}

/// `powgate=<base64 nonce>` as a urlencoded form body.
pub(crate) fn submission_body(nonce: &[u8]) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(nonce)
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D");
    format!("powgate={encoded}")
}
