use std::time::Duration;

use crate::transport::TransportError;

/// Failure category of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// 502 from the gateway, or the target refused the connection.
    ConnRefused,
    /// 504 from the gateway, or the local timeout fired.
    GatewayTimeout,
    /// Any other status, an invalid 200 body, or any other transport failure.
    Other,
}

impl ErrorKind {
    pub fn counter_name(self) -> &'static str {
        match self {
            ErrorKind::ConnRefused => crate::request_metrics::ERRORS_502,
            ErrorKind::GatewayTimeout => crate::request_metrics::ERRORS_504,
            ErrorKind::Other => crate::request_metrics::ERRORS_OTHER,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::ConnRefused => "backend connection refused",
            ErrorKind::GatewayTimeout => "backend timeout",
            ErrorKind::Other => "unexpected status or body",
        }
    }
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    /// `None` when no response arrived.
    pub status: Option<u16>,
    pub latency: Duration,
    pub error: Option<ErrorKind>,
    pub retries: u64,
    pub transport_error: Option<TransportError>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Raw observation fed to [`classify`].
#[derive(Debug, Clone, Copy)]
pub enum Observed<'a> {
    Response { status: u16, body_valid: bool },
    Failed(&'a TransportError),
}

/// `None` means success. Only a 200 with a valid body succeeds.
pub fn classify(observed: Observed<'_>) -> Option<ErrorKind> {
    match observed {
        Observed::Response {
            status: 200,
            body_valid: true,
        } => None,
        Observed::Response { status: 502, .. } => Some(ErrorKind::ConnRefused),
        Observed::Response { status: 504, .. } => Some(ErrorKind::GatewayTimeout),
        Observed::Response { .. } => Some(ErrorKind::Other),
        Observed::Failed(TransportError::ConnectionRefused) => Some(ErrorKind::ConnRefused),
        Observed::Failed(TransportError::Timeout(_)) => Some(ErrorKind::GatewayTimeout),
        Observed::Failed(TransportError::Other(_)) => Some(ErrorKind::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body_valid: bool) -> Option<ErrorKind> {
        classify(Observed::Response { status, body_valid })
    }

    #[test]
    fn only_valid_200_is_success() {
        assert_eq!(status(200, true), None);
        assert_eq!(status(200, false), Some(ErrorKind::Other));
        assert_eq!(status(201, true), Some(ErrorKind::Other));
        assert_eq!(status(500, true), Some(ErrorKind::Other));
        assert_eq!(status(503, true), Some(ErrorKind::Other));
    }

    #[test]
    fn gateway_statuses_map_to_their_buckets() {
        assert_eq!(status(502, false), Some(ErrorKind::ConnRefused));
        assert_eq!(status(504, true), Some(ErrorKind::GatewayTimeout));
    }

    #[test]
    fn transport_failures_map_to_buckets() {
        let refused = TransportError::ConnectionRefused;
        let timeout = TransportError::Timeout(Duration::from_secs(15));
        let reset = TransportError::Other("connection reset".to_string());
        assert_eq!(classify(Observed::Failed(&refused)), Some(ErrorKind::ConnRefused));
        assert_eq!(classify(Observed::Failed(&timeout)), Some(ErrorKind::GatewayTimeout));
        assert_eq!(classify(Observed::Failed(&reset)), Some(ErrorKind::Other));
    }

    #[test]
    fn counter_names() {
        assert_eq!(ErrorKind::ConnRefused.counter_name(), "errors_502");
        assert_eq!(ErrorKind::GatewayTimeout.counter_name(), "errors_504");
        assert_eq!(ErrorKind::Other.counter_name(), "errors_other");
        assert_eq!(ErrorKind::GatewayTimeout.to_string(), "gateway_timeout");
    }
}
