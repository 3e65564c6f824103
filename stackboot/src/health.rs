//! Readiness polling with a bounded number of attempts
//!
//! The gate never sleeps after its last attempt and never waits forever:
//! total wall time is bounded by `interval * (max_attempts - 1)` plus the
//! probes themselves.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::BootstrapError;
use crate::http::client::HttpClient;

/// One readiness check
#[async_trait]
pub trait Probe: Send + Sync {
    /// What is being probed, for logs and reports
    fn endpoint(&self) -> String;

    /// `Ok` when ready, otherwise the reason it is not
    async fn check(&self) -> Result<(), String>;
}

/// Passes when `GET url` answers 2xx with `marker` in the body
pub struct HttpProbe {
    client: HttpClient,
    path: String,
    marker: String,
}

impl HttpProbe {
    pub fn new(base_url: &str, path: &str, marker: &str) -> Result<Self, BootstrapError> {
        Ok(Self {
            client: HttpClient::with_timeout(base_url, Duration::from_secs(5))?,
            path: path.to_string(),
            marker: marker.to_string(),
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn endpoint(&self) -> String {
        self.client.url(&self.path)
    }

    async fn check(&self) -> Result<(), String> {
        let response = self
            .client
            .get_text(&self.path)
            .await
            .map_err(|e| e.to_string())?;

        if !response.status.is_success() {
            return Err(format!("status {}", response.status));
        }
        if !response.body.contains(&self.marker) {
            return Err(format!("response does not contain '{}'", self.marker));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    Pending,
    Ready,
    Exhausted { last_error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub endpoint: String,
    /// Attempts made, 1-based
    pub attempt: u32,
    pub outcome: HealthOutcome,
}

impl HealthCheckResult {
    pub fn is_ready(&self) -> bool {
        self.outcome == HealthOutcome::Ready
    }

    /// Exhaustion as an error, for reporting
    pub fn into_error(self) -> Option<BootstrapError> {
        match self.outcome {
            HealthOutcome::Exhausted { last_error } => Some(BootstrapError::HealthExhausted {
                endpoint: self.endpoint,
                attempts: self.attempt,
                reason: last_error,
            }),
            _ => None,
        }
    }
}

/// Health gate settings
#[derive(Debug, Clone, Copy)]
pub struct HealthGate {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl HealthGate {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Poll `probe` until it passes or the attempts run out
    pub async fn wait<S, F>(&self, probe: &dyn Probe, sleep_fn: S) -> HealthCheckResult
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        let endpoint = probe.endpoint();
        info!(
            "Waiting for {} (up to {} attempts, {:?} apart)",
            endpoint, self.max_attempts, self.interval
        );

        let mut result = HealthCheckResult {
            endpoint,
            attempt: 0,
            outcome: HealthOutcome::Pending,
        };

        for attempt in 1..=self.max_attempts {
            result.attempt = attempt;
            match probe.check().await {
                Ok(()) => {
                    info!("{} ready after {} attempt(s)", result.endpoint, attempt);
                    result.outcome = HealthOutcome::Ready;
                    return result;
                }
                Err(reason) => {
                    debug!(
                        "{} not ready ({}/{}): {}",
                        result.endpoint, attempt, self.max_attempts, reason
                    );
                    if attempt == self.max_attempts {
                        warn!(
                            "{} not ready after {} attempts: {}",
                            result.endpoint, attempt, reason
                        );
                        result.outcome = HealthOutcome::Exhausted { last_error: reason };
                        return result;
                    }
                }
            }
            sleep_fn(self.interval).await;
        }

        result
    }
}
