//! HTTP control-panel API.
//!
//! Thin handlers that delegate to the [`Supervisor`]; no business logic
//! lives here. This is the only surface through which external callers touch
//! core state, and every operation it exposes is safe under concurrent
//! watchdog execution.

use std::sync::Arc;

use thiserror::Error;

use crate::supervisor::Supervisor;

pub mod http;
pub mod response;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Supervisor owning the appliance state and watchdog loops.
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    /// Creates the API state around a supervisor.
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }
}

/// Starts the HTTP server on the configured port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let port = state.supervisor.bind_port();
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Control panel listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);

    axum::serve(listener, app).await?;
    Ok(())
}
