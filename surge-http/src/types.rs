use bytes::Bytes;

/// Status and body of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Probes are always bodiless GETs. Deadlines are applied by the caller.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ProbeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }
}
