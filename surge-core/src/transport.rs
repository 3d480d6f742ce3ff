use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use surge_http::{FailureKind, HttpClient, ProbeRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Request-level failure that produced no HTTP status. `Timeout` is raised by the
/// executor's deadline, never by the transport itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl From<surge_http::Error> for TransportError {
    fn from(err: surge_http::Error) -> Self {
        match err.kind() {
            FailureKind::Refused => TransportError::ConnectionRefused,
            _ => TransportError::Other(err.to_string()),
        }
    }
}

/// Issues one GET against the target. Implementations must be cheap to share across VUs.
pub trait Transport: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

impl Transport for HttpClient {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, TransportError> {
        let res = self
            .probe(ProbeRequest::new(url).headers(headers))
            .await?;
        Ok(TransportResponse {
            status: res.status,
            body: res.body,
        })
    }
}
