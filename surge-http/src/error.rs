use crate::util::is_connection_refused;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a probe that produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    BadTarget,
    BadHeader,
    Refused,
    Connect,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("target `{0}` is not a valid url")]
    InvalidUrl(String),

    #[error("target `{0}` must use http:// or https://")]
    UnsupportedScheme(String),

    #[error("cannot build probe request: {0}")]
    Build(#[from] http::Error),

    #[error("bad header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("bad header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("probe failed: {0}")]
    Send(#[from] hyper_util::client::legacy::Error),

    #[error("response body aborted: {0}")]
    Body(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidUrl(_) | Self::UnsupportedScheme(_) | Self::Build(_) => {
                FailureKind::BadTarget
            }
            Self::HeaderName(_) | Self::HeaderValue(_) => FailureKind::BadHeader,
            Self::Send(e) if is_connection_refused(e) => FailureKind::Refused,
            Self::Send(e) if e.is_connect() => FailureKind::Connect,
            Self::Send(_) | Self::Body(_) => FailureKind::Io,
        }
    }
}
