//! HTTP front: every path and method goes through the gate.

use crate::config::GateConfig;
use crate::error::Error;
use crate::gate::{Gate, GateBuilder};
use crate::identity::IdentityDeriver;
use crate::page::HtmlChallengePage;
use crate::proxy::{HyperUpstream, ProxyError};
use crate::secret::ServerSecret;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] Error),
    #[error(transparent)]
    Upstream(#[from] ProxyError),
    #[error("listener failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
}

/// Router with the gate as the fallback for every request.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(admit).with_state(state)
}

async fn admit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    state.gate.handle(request, peer).await
}

/// Wire a gate from configuration and a process secret.
pub fn build_gate(config: &GateConfig, secret: Arc<ServerSecret>) -> Result<Gate, ServeError> {
    config.validate()?;
    let upstream = HyperUpstream::new(&config.upstream)?.with_timeout(config.request_timeout());
    let gate = GateBuilder::default()
        .identity(IdentityDeriver::new(secret, config.trust_forwarded_for))
        .difficulty(config.difficulty)
        .max_form_bytes(config.max_form_bytes)
        .upstream(Arc::new(upstream))
        .renderer(Arc::new(HtmlChallengePage::new(config.source_url.clone())))
        .build_validated()?;
    Ok(gate)
}

/// Serve until Ctrl-C. The secret lives for the lifetime of this call.
pub async fn run(config: GateConfig) -> Result<(), ServeError> {
    let secret = Arc::new(ServerSecret::generate());
    let gate = build_gate(&config, secret)?;
    let app = router(AppState {
        gate: Arc::new(gate),
    });

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(
        addr = %listener.local_addr()?,
        upstream = %config.upstream,
        difficulty = config.difficulty,
        trust_forwarded_for = config.trust_forwarded_for,
        "powgate listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("powgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
