//! Relay client: connect under an id, send text, receive relayed text.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client id must not be empty")]
    MissingClientId,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("server closed the connection with code {code}: {reason}")]
    Rejected { code: u16, reason: String },
}

/// Connection parameters for one client.
#[derive(Debug, Clone)]
pub struct RelayClient {
    uri: String,
    client_id: String,
}

impl RelayClient {
    pub fn new(uri: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client_id: client_id.into(),
        }
    }

    /// Handshake URL: `{uri}/{client_id}`.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.uri.trim_end_matches('/'),
            self.client_id.trim_matches('/')
        )
    }

    pub async fn connect(&self) -> Result<ClientConnection, ClientError> {
        if self.client_id.trim_matches('/').is_empty() {
            return Err(ClientError::MissingClientId);
        }

        let url = self.url();
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::info!(client_id = %self.client_id, url = %url, "Connected to relay");
        Ok(ClientConnection { stream })
    }
}

/// An open client connection.
pub struct ClientConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ClientConnection {
    pub async fn send(&mut self, text: &str) -> Result<(), ClientError> {
        self.stream.send(Message::Text(text.to_string().into())).await?;
        tracing::debug!(bytes = text.len(), "Message sent");
        Ok(())
    }

    /// Wait for the next relayed text message.
    ///
    /// Returns `Ok(None)` when the server closes normally and
    /// `Err(ClientError::Rejected)` when it closes with an application code
    /// (a rejected handshake, for instance).
    pub async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => return Ok(Some(text.as_str().to_string())),
                Message::Close(Some(frame)) => {
                    let code = u16::from(frame.code);
                    return match frame.code {
                        CloseCode::Normal | CloseCode::Away => Ok(None),
                        _ => Err(ClientError::Rejected {
                            code,
                            reason: frame.reason.as_str().to_string(),
                        }),
                    };
                }
                Message::Close(None) => return Ok(None),
                // Pings are answered by tungstenite; binary frames are never relayed
                _ => continue,
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
