use serde::{Deserialize, Serialize};
use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use suppaftp::types::FileType;
use suppaftp::FtpStream;

use super::upload::{ensure_local_file, require_remote_path, FileUploader, TransferError};

const ANONYMOUS_USER: &str = "anonymous";

fn default_ftp_port() -> u16 {
    21
}

/// Where and how to log in to an FTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpConnectionDetails {
    pub hostname: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    /// Empty means anonymous login
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl FtpConnectionDetails {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: default_ftp_port(),
            username: String::new(),
            password: None,
        }
    }
}

/// Plain FTP uploader. One connection per upload, binary mode, `STOR` to the
/// remote path. `suppaftp` is blocking, so the session runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct FtpUploader {
    details: FtpConnectionDetails,
}

impl FtpUploader {
    pub fn new(details: FtpConnectionDetails) -> Self {
        Self { details }
    }
}

fn store_file(
    details: &FtpConnectionDetails,
    local_path: &Path,
    remote_path: &str,
) -> Result<u64, TransferError> {
    let mut ftp = FtpStream::connect((details.hostname.as_str(), details.port))?;

    let user = if details.username.is_empty() {
        ANONYMOUS_USER
    } else {
        details.username.as_str()
    };
    ftp.login(user, details.password.as_deref().unwrap_or(""))?;
    ftp.transfer_type(FileType::Binary)?;

    let mut file = File::open(local_path).map_err(|source| TransferError::Io {
        path: local_path.to_path_buf(),
        source,
    })?;
    let written = ftp.put_file(remote_path, &mut file)?;

    if let Err(e) = ftp.quit() {
        tracing::debug!(error = %e, "FTP quit failed after upload");
    }
    Ok(written)
}

impl FileUploader for FtpUploader {
    fn upload_file(
        &self,
        local_path: &Path,
        remote_target: &str,
    ) -> impl Future<Output = Result<(), TransferError>> + Send {
        let details = self.details.clone();
        let local_path: PathBuf = local_path.to_path_buf();
        let remote_path = remote_target.to_string();

        async move {
            if details.hostname.trim().is_empty() {
                return Err(TransferError::MissingHost);
            }
            require_remote_path(&remote_path)?;
            ensure_local_file(&local_path).await?;

            let host = details.hostname.clone();
            let (file, remote) = (local_path.clone(), remote_path.clone());
            let bytes =
                tokio::task::spawn_blocking(move || store_file(&details, &file, &remote)).await??;

            tracing::info!(
                file = %local_path.display(),
                host = %host,
                remote = %remote_path,
                bytes,
                "FTP upload successful"
            );
            Ok(())
        }
    }
}
