use bytes::Bytes;
use http_body_util::{BodyExt as _, Empty};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::util::{has_header, host_header_value};
use super::{Error, ProbeRequest, ProbeResponse, Result};

/// Bound on TCP connect so an unreachable target fails well before the request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

type Pool = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// Keep-alive client shared by every virtual user of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    pool: Pool,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::with_connect_timeout(Some(CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn with_connect_timeout(connect_timeout: Option<Duration>) -> Self {
        let mut tcp = HttpConnector::new();
        tcp.enforce_http(false);
        tcp.set_nodelay(true);
        tcp.set_connect_timeout(connect_timeout);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(tcp);

        Self {
            pool: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    /// Sends one probe and reads the whole body. No deadline is applied here.
    pub async fn probe(&self, req: ProbeRequest) -> Result<ProbeResponse> {
        let target = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(Error::UnsupportedScheme(req.url));
        }
        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::get(uri);
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&target)
        {
            builder = builder.header(http::header::HOST, host);
        }
        for (name, value) in &req.headers {
            builder = builder.header(
                http::header::HeaderName::from_bytes(name.as_bytes())?,
                http::header::HeaderValue::from_str(value)?,
            );
        }

        let res = self.pool.request(builder.body(Empty::new())?).await?;
        let (parts, body) = res.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(ProbeResponse {
            status: parts.status.as_u16(),
            body,
        })
    }
}
