//! Async transport abstraction for the Smart-HTTP git wire protocol.
//!
//! This crate knows nothing about pkt-lines, capabilities, or packfiles —
//! it only ships bytes to and from the two Smart-HTTP endpoints a remote
//! repository exposes, and maps transport-level failures (connection
//! errors, non-2xx responses) onto [`TransportError`]. pkt-line framing
//! and the upload-pack request body are built one layer up, in
//! `gitfetch-protocol`.

pub mod http;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use http::ReqwestTransport;

/// Errors that can occur while talking to a Smart-HTTP remote.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("authentication required")]
    Unauthorized,

    #[error("operation cancelled")]
    Cancelled,
}

/// Content types used by the two Smart-HTTP endpoints this client speaks.
pub const UPLOAD_PACK_REQUEST_CONTENT_TYPE: &str = "application/x-git-upload-pack-request";
pub const UPLOAD_PACK_RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

/// Transport for the two requests a Smart-HTTP fetch needs.
///
/// Implementations own their own connection pool / client handle; nothing
/// here is shared mutable state, so two concurrent fetches against two
/// `UploadPackTransport` instances never interfere with each other.
#[async_trait]
pub trait UploadPackTransport: Send + Sync {
    /// `GET {repo}/info/refs?service=git-upload-pack`.
    async fn get_info_refs(
        &self,
        repo_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TransportError>;

    /// `POST {repo}/git-upload-pack` with a pkt-line framed body.
    async fn post_upload_pack(
        &self,
        repo_url: &str,
        body: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TransportError>;
}
