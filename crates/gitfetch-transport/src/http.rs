//! `reqwest`-backed implementation of [`UploadPackTransport`].

use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::{
    TransportError, UploadPackTransport, UPLOAD_PACK_REQUEST_CONTENT_TYPE,
    UPLOAD_PACK_RESULT_CONTENT_TYPE,
};

/// A Smart-HTTP transport backed by a pooled `reqwest::Client`.
///
/// Cheap to clone — `reqwest::Client` is an `Arc` internally — so callers
/// fetching several repositories concurrently can share one instance
/// without contending on connection setup.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport with rustls-backed TLS and no persistent cookies.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("gitfetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new().expect("default reqwest client construction cannot fail")
    }
}

async fn run_cancellable<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    if cancel.is_cancelled() {
        return Err(TransportError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = fut => result,
    }
}

fn classify_status(status: StatusCode, body_preview: String) -> TransportError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized,
        _ => TransportError::Http {
            status: status.as_u16(),
            message: body_preview,
        },
    }
}

#[async_trait::async_trait]
impl UploadPackTransport for ReqwestTransport {
    async fn get_info_refs(
        &self,
        repo_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/info/refs?service=git-upload-pack", repo_url.trim_end_matches('/'));

        run_cancellable(cancel, async {
            let response = self
                .client
                .get(&url)
                .header("Accept", "*/*")
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, body));
            }
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| TransportError::Network(e.to_string()))
        })
        .await
    }

    async fn post_upload_pack(
        &self,
        repo_url: &str,
        body: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/git-upload-pack", repo_url.trim_end_matches('/'));

        run_cancellable(cancel, async {
            let response = self
                .client
                .post(&url)
                .header("Content-Type", UPLOAD_PACK_REQUEST_CONTENT_TYPE)
                .header("Accept", UPLOAD_PACK_RESULT_CONTENT_TYPE)
                .body(body)
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, body));
            }
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| TransportError::Network(e.to_string()))
        })
        .await
    }
}
