use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OAuth2 client credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint must not be empty")]
    MissingEndpoint,

    #[error("client id must not be empty")]
    MissingClientId,

    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token response is missing 'access_token'")]
    MissingAccessToken,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Fetch an access token with the OAuth2 client-credentials grant.
pub async fn fetch_token(
    http: &reqwest::Client,
    token_endpoint: &str,
    credentials: &ClientCredentials,
) -> Result<String, AuthError> {
    if token_endpoint.trim().is_empty() {
        return Err(AuthError::MissingEndpoint);
    }
    if credentials.client_id.is_empty() {
        return Err(AuthError::MissingClientId);
    }

    let resp = http
        .post(token_endpoint)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse = resp.json().await?;
    match token.access_token {
        Some(t) if !t.is_empty() => {
            tracing::debug!(endpoint = %token_endpoint, "Fetched access token");
            Ok(t)
        }
        _ => Err(AuthError::MissingAccessToken),
    }
}

/// Where an uploader gets its bearer token.
#[derive(Debug, Clone, Default)]
pub enum TokenSource {
    /// No Authorization header
    #[default]
    None,
    /// A fixed token
    Static(String),
    /// Fetch a fresh token before every upload
    ClientCredentials {
        token_url: String,
        credentials: ClientCredentials,
    },
}

impl TokenSource {
    pub async fn token(&self, http: &reqwest::Client) -> Result<Option<String>, AuthError> {
        match self {
            Self::None => Ok(None),
            Self::Static(t) if t.is_empty() => Ok(None),
            Self::Static(t) => Ok(Some(t.clone())),
            Self::ClientCredentials {
                token_url,
                credentials,
            } => fetch_token(http, token_url, credentials).await.map(Some),
        }
    }
}
