use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::token::{AuthError, TokenSource};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("local file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid remote target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("hostname must not be empty")]
    MissingHost,

    #[error("no password or key file given for {0:?}")]
    MissingCredentials(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("transfer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Uploads one local file to a remote target.
///
/// Credentials belong to the uploader; `remote_target` is an endpoint URL for
/// HTTP and an object key for object storage.
pub trait FileUploader {
    fn upload_file(
        &self,
        local_path: &Path,
        remote_target: &str,
    ) -> impl Future<Output = Result<(), TransferError>> + Send;
}

/// Fail early with `NotFound` before any connection is opened.
pub(super) async fn ensure_local_file(path: &Path) -> Result<(), TransferError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(TransferError::NotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TransferError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(TransferError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

pub(super) fn require_remote_path(remote_target: &str) -> Result<(), TransferError> {
    if remote_target.trim().is_empty() {
        return Err(TransferError::InvalidTarget {
            target: remote_target.to_string(),
            reason: "empty remote path".to_string(),
        });
    }
    Ok(())
}

async fn read_local(path: &Path) -> Result<Vec<u8>, TransferError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TransferError::NotFound(path.to_path_buf()),
        _ => TransferError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// Multipart POST uploader with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    http: reqwest::Client,
    tokens: TokenSource,
    timeout: Duration,
}

impl HttpUploader {
    pub fn new(tokens: TokenSource, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            timeout,
        }
    }

    pub fn with_client(http: reqwest::Client, tokens: TokenSource, timeout: Duration) -> Self {
        Self {
            http,
            tokens,
            timeout,
        }
    }
}

impl FileUploader for HttpUploader {
    async fn upload_file(&self, local_path: &Path, remote_target: &str) -> Result<(), TransferError> {
        if remote_target.trim().is_empty() {
            return Err(TransferError::InvalidTarget {
                target: remote_target.to_string(),
                reason: "empty URL".to_string(),
            });
        }

        let data = read_local(local_path).await?;
        let token = self.tokens.token(&self.http).await?;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let size = data.len();
        let part = reqwest::multipart::Part::bytes(data).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut req = self
            .http
            .post(remote_target)
            .multipart(form)
            .timeout(self.timeout);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransferError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            file = %local_path.display(),
            target = %remote_target,
            bytes = size,
            status = status.as_u16(),
            "Upload successful"
        );
        Ok(())
    }
}

/// S3 connection settings. Unset keys fall back to the usual `AWS_*`
/// environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Uploads files as objects; `remote_target` is the object key.
#[derive(Debug, Clone)]
pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreUploader {
    /// Use any object store backend.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Build an S3 uploader.
    pub fn s3(config: &S3Config) -> Result<Self, TransferError> {
        if config.bucket.trim().is_empty() {
            return Err(TransferError::InvalidTarget {
                target: config.bucket.clone(),
                reason: "empty bucket name".to_string(),
            });
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        Ok(Self::new(Arc::new(builder.build()?)))
    }
}

impl FileUploader for ObjectStoreUploader {
    async fn upload_file(&self, local_path: &Path, remote_target: &str) -> Result<(), TransferError> {
        let location =
            ObjectPath::parse(remote_target).map_err(|e| TransferError::InvalidTarget {
                target: remote_target.to_string(),
                reason: e.to_string(),
            })?;
        if location.as_ref().is_empty() {
            return Err(TransferError::InvalidTarget {
                target: remote_target.to_string(),
                reason: "empty object key".to_string(),
            });
        }

        let data = read_local(local_path).await?;
        let size = data.len();
        self.store.put(&location, PutPayload::from(data)).await?;

        tracing::info!(
            file = %local_path.display(),
            key = %location,
            bytes = size,
            "Upload successful"
        );
        Ok(())
    }
}
