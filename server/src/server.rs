use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, RelayConfig};
use crate::routes;
use crate::state::AppState;
use crate::ws::SharedRegistry;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// The relay server: a bound listener plus the state shared by its connections.
///
/// The registry lives exactly as long as the server: it is created in
/// [`RelayServer::bind`] and cleared when [`RelayServer::run`] returns.
pub struct RelayServer {
    listener: TcpListener,
    state: AppState,
}

impl RelayServer {
    /// Bind the configured address.
    pub async fn bind(config: &RelayConfig) -> Result<Self, ServerError> {
        config.ws.validate()?;
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::from_listener(listener, AppState::new(config.ws.clone()))?)
    }

    /// Wrap an already bound listener. Fails if `state.ws` holds a value the
    /// connection actor cannot run with.
    pub fn from_listener(listener: TcpListener, state: AppState) -> Result<Self, ConfigError> {
        state.ws.validate()?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> SharedRegistry {
        self.state.connections.clone()
    }

    /// Token that stops the server (and every connection) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Serve until the shutdown token is cancelled.
    ///
    /// Individual connection failures never end this loop; only a listener
    /// error or shutdown does.
    pub async fn run(self) -> std::io::Result<()> {
        let Self { listener, state } = self;
        let shutdown = state.shutdown.clone();
        let registry = state.connections.clone();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Relay listening on ws://{}", addr);
        }

        let app = routes::build_router(state);
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

        let remaining = registry.len();
        registry.clear();
        tracing::info!(remaining_connections = remaining, "Relay stopped");
        result
    }
}
