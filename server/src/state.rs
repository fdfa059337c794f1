use tokio_util::sync::CancellationToken;

use crate::config::WsConfig;
use crate::ws::SharedRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live connections keyed by client id
    pub connections: SharedRegistry,
    /// Per-connection limits and heartbeat timing
    pub ws: WsConfig,
    /// Cancelled when the server shuts down; every connection actor watches it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(ws: WsConfig) -> Self {
        Self {
            connections: crate::ws::new_connection_registry(),
            ws,
            shutdown: CancellationToken::new(),
        }
    }
}
