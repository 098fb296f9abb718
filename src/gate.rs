//! Admission gate: per request, admit, challenge or reject.
//!
//! ```text
//! Start ── credential ok ──────────────────────────────► Proxy
//!   │
//!   └─ no/invalid credential ─ parse form
//!        ├─ parse error ─────────────────────────────────► ChallengeMalformed(Form)
//!        ├─ no submission field ─────────────────────────► ChallengeNoSubmission
//!        ├─ field repeated ──────────────────────────────► ChallengeMalformed(FieldCount)
//!        ├─ > 43 chars ──────────────────────────────────► ChallengeMalformed(TooLong)
//!        ├─ not base64 ──────────────────────────────────► ChallengeMalformed(Encoding)
//!        └─ verify(fingerprint, nonce, difficulty)
//!             ├─ false ──────────────────────────────────► ChallengeRejected
//!             └─ true ───────────────────────────────────► ChallengeAccepted (303 + cookie)
//! ```
//!
//! Every branch ends in a single audit event. The gate itself never answers
//! with an error status: everything the client did wrong gets a challenge
//! page and `200 OK`.

use crate::audit::{AuditEvent, AuditSink, Outcome, TracingAuditSink};
use crate::config::MAX_DIFFICULTY;
use crate::error::Error;
use crate::form::{expects_form_body, FormError, FormFields};
use crate::identity::{ClientIdentity, ClientMeta, IdentityDeriver};
use crate::page::{ChallengeRenderer, ChallengeView, HtmlChallengePage};
use crate::proxy::Upstream;
use crate::session::{credential_cookie, is_authenticated, presented_credential, COOKIE_NAME};
use crate::verify::verify_solution;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use derive_builder::Builder;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::request::Parts;
use http::{HeaderValue, Request, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;

/// Longest accepted submission: base64 of 32 bytes without padding.
pub const MAX_SUBMISSION_CHARS: usize = 43;

/// Form field the nonce is submitted in.
pub const SUBMISSION_FIELD: &str = COOKIE_NAME;

pub const DEFAULT_MAX_FORM_BYTES: usize = 10 << 20;

/// Why a submission could not even be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Malformed {
    Form,
    FieldCount,
    TooLong,
    Encoding,
}

impl Malformed {
    pub const fn message(self) -> &'static str {
        match self {
            Malformed::Form => "You submitted a malformed form.",
            Malformed::FieldCount => "You submitted an invalid number of form values.",
            Malformed::TooLong => "Your submission was too long.",
            Malformed::Encoding => "Your submission was improperly encoded.",
        }
    }
}

/// Shown for both wrong and expired solutions; the two are indistinguishable.
pub const REJECTED_MESSAGE: &str =
    "Your submission was incorrect, or your session has expired while submitting.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateState {
    Proxy,
    ChallengeNoSubmission,
    ChallengeAccepted,
    ChallengeRejected,
    ChallengeMalformed(Malformed),
}

impl GateState {
    pub const fn outcome(self) -> Outcome {
        match self {
            GateState::Proxy => Outcome::Proxy,
            GateState::ChallengeNoSubmission => Outcome::Challenge,
            GateState::ChallengeAccepted => Outcome::Accepted,
            GateState::ChallengeRejected => Outcome::Wrong,
            GateState::ChallengeMalformed(Malformed::Form) => Outcome::Malformed,
            GateState::ChallengeMalformed(Malformed::FieldCount) => Outcome::FormValues,
            GateState::ChallengeMalformed(Malformed::TooLong) => Outcome::TooLong,
            GateState::ChallengeMalformed(Malformed::Encoding) => Outcome::Base64,
        }
    }

    /// Message shown on the challenge page, if any.
    pub const fn message(self) -> Option<&'static str> {
        match self {
            GateState::ChallengeRejected => Some(REJECTED_MESSAGE),
            GateState::ChallengeMalformed(reason) => Some(reason.message()),
            _ => None,
        }
    }
}

#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Gate {
    identity: IdentityDeriver,
    difficulty: u32,
    upstream: Arc<dyn Upstream>,
    #[builder(default = "DEFAULT_MAX_FORM_BYTES")]
    max_form_bytes: usize,
    #[builder(default = "Arc::new(HtmlChallengePage::default())")]
    renderer: Arc<dyn ChallengeRenderer>,
    #[builder(default = "Arc::new(TracingAuditSink)")]
    audit: Arc<dyn AuditSink>,
}

impl GateBuilder {
    fn validate(&self) -> Result<(), Error> {
        if self.identity.is_none() {
            return Err(Error::InvalidConfig("identity deriver must be provided".into()));
        }
        if self.upstream.is_none() {
            return Err(Error::InvalidConfig("upstream must be provided".into()));
        }
        match self.difficulty {
            None => return Err(Error::InvalidConfig("difficulty must be provided".into())),
            Some(bits) if bits > MAX_DIFFICULTY => {
                return Err(Error::InvalidConfig(format!(
                    "difficulty must be <= {MAX_DIFFICULTY}"
                )))
            }
            Some(_) => {}
        }
        if self.max_form_bytes == Some(0) {
            return Err(Error::InvalidConfig("max_form_bytes must be >= 1".into()));
        }
        Ok(())
    }

    pub fn build_validated(self) -> Result<Gate, Error> {
        self.validate()?;
        self.build().map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Who asked for what, carried into the audit event.
struct RequestLog {
    client: String,
    target: String,
    user_agent: String,
}

impl Gate {
    pub fn identity(&self) -> &IdentityDeriver {
        &self.identity
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Run one request through the gate.
    pub async fn handle(&self, request: Request<Body>, peer: SocketAddr) -> Response {
        let (parts, body) = request.into_parts();
        let client = self.identity.client_address(peer, &parts.headers);
        let meta = ClientMeta::from_headers(&client, &parts.headers);
        let log = RequestLog {
            target: request_target(&parts),
            user_agent: meta.user_agent_lossy().into_owned(),
            client: client.clone(),
        };

        let presented = presented_credential(&parts.headers);
        let identity = self.identity.derive(&meta);
        if is_authenticated(presented, &identity.mac) {
            self.emit(&log, GateState::Proxy.outcome());
            return self
                .upstream
                .forward(Request::from_parts(parts, body), &log.client)
                .await;
        }

        let form = self.read_form(&parts, body).await;
        let state = self.evaluate(&identity, form);
        tracing::debug!(
            fingerprint = %hex::encode(&identity.fingerprint[..8]),
            ?state,
            "challenge evaluated"
        );
        self.emit(&log, state.outcome());
        self.respond(state, &identity, &log.target)
    }

    /// Decide what to do with a client that has no valid credential.
    pub fn evaluate(
        &self,
        identity: &ClientIdentity,
        form: Result<FormFields, FormError>,
    ) -> GateState {
        let Ok(fields) = form else {
            return GateState::ChallengeMalformed(Malformed::Form);
        };

        let mut values = fields.values(SUBMISSION_FIELD);
        let Some(submission) = values.next() else {
            return GateState::ChallengeNoSubmission;
        };
        if values.next().is_some() {
            return GateState::ChallengeMalformed(Malformed::FieldCount);
        }

        if submission.len() > MAX_SUBMISSION_CHARS {
            return GateState::ChallengeMalformed(Malformed::TooLong);
        }
        let Ok(nonce) = STANDARD.decode(submission) else {
            return GateState::ChallengeMalformed(Malformed::Encoding);
        };

        if verify_solution(&identity.fingerprint, &nonce, self.difficulty) {
            GateState::ChallengeAccepted
        } else {
            GateState::ChallengeRejected
        }
    }

    async fn read_form(&self, parts: &Parts, body: Body) -> Result<FormFields, FormError> {
        // The query string is checked the same way but never carries a submission.
        if let Some(query) = parts.uri.query() {
            FormFields::parse(query.as_bytes())?;
        }
        if !expects_form_body(&parts.method, &parts.headers)? {
            return Ok(FormFields::default());
        }
        let bytes = axum::body::to_bytes(body, self.max_form_bytes)
            .await
            .map_err(|e| FormError::Body(e.to_string()))?;
        FormFields::parse(&bytes)
    }

    fn respond(&self, state: GateState, identity: &ClientIdentity, target: &str) -> Response {
        match state {
            GateState::ChallengeAccepted => {
                let location =
                    HeaderValue::from_str(target).unwrap_or(HeaderValue::from_static("/"));
                (
                    StatusCode::SEE_OTHER,
                    [(LOCATION, location), (SET_COOKIE, credential_cookie(&identity.mac))],
                )
                    .into_response()
            }
            _ => {
                let fingerprint = STANDARD.encode(identity.fingerprint);
                let html = self.renderer.render(&ChallengeView {
                    fingerprint_b64: &fingerprint,
                    difficulty: self.difficulty,
                    message: state.message(),
                });
                (
                    StatusCode::OK,
                    [
                        (CONTENT_TYPE, "text/html; charset=utf-8"),
                        (CACHE_CONTROL, "no-store"),
                    ],
                    html,
                )
                    .into_response()
            }
        }
    }

    fn emit(&self, log: &RequestLog, outcome: Outcome) {
        self.audit.record(AuditEvent {
            outcome,
            client: log.client.clone(),
            target: log.target.clone(),
            user_agent: log.user_agent.clone(),
        });
    }
}

fn request_target(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixed_deriver, solve_for, submission_body, StubUpstream};

    fn gate(difficulty: u32) -> Gate {
        GateBuilder::default()
            .identity(fixed_deriver(false))
            .difficulty(difficulty)
            .upstream(Arc::new(StubUpstream::default()))
            .build_validated()
            .expect("build gate")
    }

    fn identity() -> ClientIdentity {
        ClientIdentity {
            fingerprint: [0x24; 32],
            mac: [0x42; 32],
        }
    }

    fn form(raw: &str) -> Result<FormFields, FormError> {
        FormFields::parse(raw.as_bytes())
    }

    #[test]
    fn builder_requires_parts_and_bounds_difficulty() {
        assert!(GateBuilder::default().build_validated().is_err());
        let too_hard = GateBuilder::default()
            .identity(fixed_deriver(false))
            .difficulty(MAX_DIFFICULTY + 1)
            .upstream(Arc::new(StubUpstream::default()))
            .build_validated();
        assert!(matches!(too_hard, Err(Error::InvalidConfig(_))));
        assert_eq!(gate(0).difficulty(), 0);
    }

    #[test]
    fn no_submission_is_a_fresh_challenge() {
        let g = gate(8);
        assert_eq!(
            g.evaluate(&identity(), Ok(FormFields::default())),
            GateState::ChallengeNoSubmission
        );
        assert_eq!(
            g.evaluate(&identity(), form("other=1")),
            GateState::ChallengeNoSubmission
        );
    }

    #[test]
    fn malformed_branches_are_distinct() {
        let g = gate(8);
        assert_eq!(
            g.evaluate(&identity(), Err(FormError::BadEscape)),
            GateState::ChallengeMalformed(Malformed::Form)
        );
        assert_eq!(
            g.evaluate(&identity(), form("powgate=AAAA&powgate=AAAA")),
            GateState::ChallengeMalformed(Malformed::FieldCount)
        );
        let long = format!("powgate={}", "A".repeat(MAX_SUBMISSION_CHARS + 1));
        assert_eq!(
            g.evaluate(&identity(), form(&long)),
            GateState::ChallengeMalformed(Malformed::TooLong)
        );
        assert_eq!(
            g.evaluate(&identity(), form("powgate=%21%21%21")),
            GateState::ChallengeMalformed(Malformed::Encoding)
        );
        // 43 characters is within the bound but not valid padded base64.
        let unpadded = format!("powgate={}", "A".repeat(MAX_SUBMISSION_CHARS));
        assert_eq!(
            g.evaluate(&identity(), form(&unpadded)),
            GateState::ChallengeMalformed(Malformed::Encoding)
        );
    }

    #[test]
    fn verification_decides_between_accept_and_reject() {
        let g = gate(8);
        let id = identity();
        let body = submission_body(&solve_for(&id.fingerprint, 8));
        assert_eq!(g.evaluate(&id, form(&body)), GateState::ChallengeAccepted);
        // Resubmitting is accepted again; nothing is consumed.
        assert_eq!(g.evaluate(&id, form(&body)), GateState::ChallengeAccepted);

        let other = ClientIdentity {
            fingerprint: [0x25; 32],
            ..id
        };
        let bad = (0u64..)
            .map(u64::to_le_bytes)
            .find(|n| !verify_solution(&other.fingerprint, n, 8))
            .unwrap();
        let body = submission_body(&bad);
        assert_eq!(g.evaluate(&other, form(&body)), GateState::ChallengeRejected);
    }

    #[test]
    fn zero_difficulty_accepts_any_well_formed_nonce() {
        let g = gate(0);
        assert_eq!(
            g.evaluate(&identity(), form("powgate=")),
            GateState::ChallengeAccepted
        );
    }

    #[test]
    fn states_map_to_tags_and_messages() {
        assert_eq!(GateState::Proxy.outcome().tag(), "PROXY");
        assert_eq!(GateState::ChallengeNoSubmission.message(), None);
        assert_eq!(GateState::ChallengeAccepted.message(), None);
        assert_eq!(
            GateState::ChallengeRejected.message(),
            Some(REJECTED_MESSAGE)
        );
        let reasons = [
            Malformed::Form,
            Malformed::FieldCount,
            Malformed::TooLong,
            Malformed::Encoding,
        ];
        let messages: std::collections::HashSet<_> =
            reasons.iter().map(|r| r.message()).collect();
        assert_eq!(messages.len(), reasons.len());
        assert_eq!(
            GateState::ChallengeMalformed(Malformed::Encoding).outcome(),
            Outcome::Base64
        );
    }
}
