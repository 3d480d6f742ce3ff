use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::body_check::BodyCheck;
use crate::config::RunPlan;
use crate::outcome::{Observed, RequestOutcome, classify};
use crate::transport::{Transport, TransportError};

/// Issues one probe and turns whatever happened into a [`RequestOutcome`].
#[derive(Debug)]
pub struct RequestExecutor<T> {
    transport: Arc<T>,
    target: Arc<str>,
    headers: Arc<[(String, String)]>,
    timeout: Duration,
    check: Arc<BodyCheck>,
}

impl<T> Clone for RequestExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            target: self.target.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout,
            check: self.check.clone(),
        }
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: Arc<T>, plan: &RunPlan) -> Self {
        Self {
            transport,
            target: Arc::from(plan.target.as_str()),
            headers: Arc::from(plan.headers.clone()),
            timeout: plan.timeout,
            check: Arc::new(plan.check.clone()),
        }
    }

    pub async fn execute(&self) -> RequestOutcome {
        let started = Instant::now();
        let res = tokio::time::timeout(
            self.timeout,
            self.transport.fetch(&self.target, &self.headers),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(self.timeout)));
        let latency = started.elapsed();

        match res {
            Ok(resp) => {
                let verdict = self.check.evaluate(&resp.body);
                let error = classify(Observed::Response {
                    status: resp.status,
                    body_valid: verdict.valid,
                });
                RequestOutcome {
                    status: Some(resp.status),
                    latency,
                    error,
                    retries: verdict.retries,
                    transport_error: None,
                }
            }
            Err(err) => RequestOutcome {
                status: None,
                latency,
                error: classify(Observed::Failed(&err)),
                retries: 0,
                transport_error: Some(err),
            },
        }
    }
}
