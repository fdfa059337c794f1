use axum::Router;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router.
///
/// The handshake path carries the client id: `GET /{client_id}` upgrades a
/// relay connection, `GET /` upgrades and closes with "missing client id".
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", axum::routing::get(ws_handler::ws_upgrade_root))
        .route("/{*client_id}", axum::routing::get(ws_handler::ws_upgrade))
        .with_state(state)
}
