//! Stateless proof-of-work admission gate for HTTP origins.
//!
//! Clients without a valid credential cookie get a challenge page. Solving it
//! (finding a nonce whose `SHA-256(fingerprint || nonce)` starts with enough
//! zero bits) earns an HMAC cookie that admits the client until the weekly
//! epoch rotates. The gate keeps no per-client state.

pub mod audit;
pub mod bits;
pub mod config;
pub mod error;
pub mod form;
pub mod gate;
pub mod identity;
pub mod page;
pub mod proxy;
pub mod secret;
pub mod server;
pub mod session;
pub mod solver;
pub mod time;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, Outcome, TracingAuditSink};
pub use config::GateConfig;
pub use error::Error;
pub use gate::{Gate, GateBuilder, GateState, Malformed};
pub use identity::{ClientIdentity, ClientMeta, IdentityDeriver};
pub use page::{ChallengeRenderer, ChallengeView, HtmlChallengePage};
pub use proxy::{HyperUpstream, Upstream};
pub use secret::ServerSecret;
pub use solver::{Solution, Solver, SolverBuilder};
pub use time::{Epoch, SystemTimeProvider, TimeProvider};
pub use verify::verify_solution;
