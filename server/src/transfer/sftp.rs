use serde::{Deserialize, Serialize};
use ssh2::Session;
use std::fs::File;
use std::future::Future;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use super::upload::{ensure_local_file, require_remote_path, FileUploader, TransferError};

fn default_sftp_port() -> u16 {
    22
}

/// Where and how to log in to an SSH server for SFTP.
///
/// With a key file the password, if any, is used as its passphrase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConnectionDetails {
    pub hostname: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key_file: Option<PathBuf>,
}

impl SftpConnectionDetails {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: default_sftp_port(),
            username: username.into(),
            password: None,
            ssh_key_file: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_key_file = Some(path.into());
        self
    }

    fn validate(&self) -> Result<(), TransferError> {
        if self.hostname.trim().is_empty() {
            return Err(TransferError::MissingHost);
        }
        if self.password.is_none() && self.ssh_key_file.is_none() {
            return Err(TransferError::MissingCredentials(self.username.clone()));
        }
        Ok(())
    }
}

/// SFTP uploader over `ssh2`. One session per upload, run on the blocking pool.
#[derive(Debug, Clone)]
pub struct SftpUploader {
    details: SftpConnectionDetails,
}

impl SftpUploader {
    pub fn new(details: SftpConnectionDetails) -> Self {
        Self { details }
    }
}

fn open_session(details: &SftpConnectionDetails) -> Result<Session, TransferError> {
    let addr = format!("{}:{}", details.hostname, details.port);
    let tcp = TcpStream::connect((details.hostname.as_str(), details.port))
        .map_err(|source| TransferError::Connect { addr, source })?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;

    match (&details.ssh_key_file, &details.password) {
        (Some(key), passphrase) => {
            session.userauth_pubkey_file(&details.username, None, key, passphrase.as_deref())?
        }
        (None, Some(password)) => session.userauth_password(&details.username, password)?,
        (None, None) => return Err(TransferError::MissingCredentials(details.username.clone())),
    }
    Ok(session)
}

fn put_file(
    details: &SftpConnectionDetails,
    local_path: &Path,
    remote_path: &str,
) -> Result<u64, TransferError> {
    let session = open_session(details)?;
    let sftp = session.sftp()?;

    let mut local = File::open(local_path).map_err(|source| TransferError::Io {
        path: local_path.to_path_buf(),
        source,
    })?;
    let mut remote = sftp.create(Path::new(remote_path))?;
    let written = std::io::copy(&mut local, &mut remote).map_err(|source| TransferError::Io {
        path: PathBuf::from(remote_path),
        source,
    })?;

    if let Err(e) = session.disconnect(None, "upload complete", None) {
        tracing::debug!(error = %e, "SSH disconnect failed after upload");
    }
    Ok(written)
}

impl FileUploader for SftpUploader {
    fn upload_file(
        &self,
        local_path: &Path,
        remote_target: &str,
    ) -> impl Future<Output = Result<(), TransferError>> + Send {
        let details = self.details.clone();
        let local_path = local_path.to_path_buf();
        let remote_path = remote_target.to_string();

        async move {
            details.validate()?;
            require_remote_path(&remote_path)?;
            ensure_local_file(&local_path).await?;

            let host = details.hostname.clone();
            let (file, remote) = (local_path.clone(), remote_path.clone());
            let bytes =
                tokio::task::spawn_blocking(move || put_file(&details, &file, &remote)).await??;

            tracing::info!(
                file = %local_path.display(),
                host = %host,
                remote = %remote_path,
                bytes,
                "SFTP upload successful"
            );
            Ok(())
        }
    }
}
