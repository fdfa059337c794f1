use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    response::Response,
};
use std::net::SocketAddr;

use crate::state::AppState;
use crate::ws::{actor, ClientId, HandshakeError};

/// WebSocket close codes:
/// 4000 = no client id in the handshake path
/// 4001 = client id present but unusable
/// 4002 = client id already has a live connection
/// 1001 = going away (server shutdown or pong timeout)
pub const CLOSE_MISSING_CLIENT_ID: u16 = 4000;
pub const CLOSE_MALFORMED_CLIENT_ID: u16 = 4001;
pub const CLOSE_ALREADY_CONNECTED: u16 = 4002;
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// GET /
/// A connection without an id segment: upgrade, then close with 4000.
pub async fn ws_upgrade_root(ws: WebSocketUpgrade) -> Response {
    reject(ws, HandshakeError::MissingClientId)
}

/// GET /{client_id}
/// WebSocket upgrade endpoint. The client id is the request path.
/// On a bad id, upgrades then immediately closes with the matching close code.
/// On success, hands the socket to the connection actor.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match ClientId::from_path(&path, state.ws.max_client_id_len) {
        Ok(client_id) => {
            tracing::info!(client_id = %client_id, peer = %peer, "WebSocket handshake accepted");
            let max_message_size = state.ws.max_message_size;
            ws.max_message_size(max_message_size)
                .on_upgrade(move |socket| actor::run_connection(socket, state, client_id))
        }
        Err(err) => reject(ws, err),
    }
}

fn close_code_for(err: &HandshakeError) -> (u16, &'static str) {
    match err {
        HandshakeError::MissingClientId => (CLOSE_MISSING_CLIENT_ID, "missing client id"),
        HandshakeError::MalformedClientId(_) => (CLOSE_MALFORMED_CLIENT_ID, "malformed client id"),
    }
}

/// Upgrade the connection, then immediately close it. Nothing is registered.
fn reject(ws: WebSocketUpgrade, err: HandshakeError) -> Response {
    let (close_code, reason) = close_code_for(&err);
    tracing::warn!(
        close_code = close_code,
        error = %err,
        "WebSocket handshake rejected"
    );

    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code: close_code,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(
            close_code_for(&HandshakeError::MissingClientId),
            (4000, "missing client id")
        );
        assert_eq!(
            close_code_for(&HandshakeError::MalformedClientId("x".into())).0,
            4001
        );
    }
}
