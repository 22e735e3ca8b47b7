//! HTTP health probe

use super::{HealthProbe, ProbeOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Hard timeout for a single health probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes the service root with a GET request
pub struct HttpProbe {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let url = Url::parse(url).context("Invalid target URL")?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Port of the target, falling back to the scheme default
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    fn classify_error(&self, err: &reqwest::Error) -> ProbeOutcome {
        if err.is_timeout() {
            return ProbeOutcome::TimedOut {
                after: self.timeout,
            };
        }

        if is_connection_refused(err) {
            return ProbeOutcome::ConnectionRefused {
                detail: error_chain(err),
            };
        }

        ProbeOutcome::Failed {
            detail: error_chain(err),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self) -> ProbeOutcome {
        let start = Instant::now();

        match self.client.get(self.url.clone()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so latency covers the full response.
                let _ = response.text().await;
                let latency = start.elapsed();
                debug!(url = %self.url, status, latency_ms = latency.as_millis() as u64, "Probe completed");
                ProbeOutcome::Responded { status, latency }
            }
            Err(e) => {
                let outcome = self.classify_error(&e);
                debug!(url = %self.url, outcome = ?outcome, "Probe failed");
                outcome
            }
        }
    }
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        if e.to_string().to_lowercase().contains("connection refused") {
            return true;
        }
        source = e.source();
    }
    false
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}
