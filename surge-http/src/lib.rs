#![forbid(unsafe_code)]

//! Pooled HTTP/1 client used to probe the target behind a gateway.

mod client;
mod error;
mod types;
mod util;

pub use client::HttpClient;
pub use error::{Error, FailureKind, Result};
pub use types::{ProbeRequest, ProbeResponse};
