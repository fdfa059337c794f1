//! File transfer collaborators: OAuth2 token retrieval and file uploaders.
//!
//! Each operation validates its inputs, performs one remote call and maps the
//! library error into [`AuthError`] or [`TransferError`]. Errors are returned,
//! not logged, so the caller logs once where it handles them.

pub mod ftp;
pub mod sftp;
pub mod token;
pub mod upload;

pub use ftp::{FtpConnectionDetails, FtpUploader};
pub use sftp::{SftpConnectionDetails, SftpUploader};
pub use token::{fetch_token, AuthError, ClientCredentials, TokenSource};
pub use upload::{FileUploader, HttpUploader, ObjectStoreUploader, S3Config, TransferError};
