//! Endpoint health probes.
//!
//! # Responsibilities
//! - Decide whether an endpoint is fit to receive traffic
//! - Report the observed round-trip latency when it is
//!
//! # Design Decisions
//! - `HttpProbe` performs a real GET round trip against `address + path`
//! - `ErrorRatioProbe` judges an endpoint by its own recent outcomes; it is a
//!   stand-in for addresses the HTTP probe cannot reach (e.g. `host:port`)
//! - `AutoProbe` picks between the two per endpoint

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use crate::config::{ProbeConfig, ProbeKind};
use crate::failover::endpoint::Endpoint;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid endpoint address: {0}")]
    InvalidAddress(#[from] url::ParseError),

    #[error("probe timed out")]
    Timeout,

    #[error("probe request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("probe returned status {0}")]
    Status(u16),

    #[error("error ratio {ratio:.2} exceeds {max:.2}")]
    ErrorRatio { ratio: f64, max: f64 },
}

/// A health probe for one endpoint. Returns the observed latency on success.
pub trait EndpointProbe: Send + Sync {
    fn probe<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Duration, ProbeError>>;
}

/// Build the probe described by the configuration.
pub fn from_config(config: &ProbeConfig) -> Arc<dyn EndpointProbe> {
    match config.kind {
        ProbeKind::Auto => Arc::new(AutoProbe::new(config)),
        ProbeKind::Http => Arc::new(HttpProbe::new(config)),
        ProbeKind::ErrorRatio => Arc::new(ErrorRatioProbe::new(config)),
    }
}

/// GET round trip against the endpoint's health path.
pub struct HttpProbe {
    client: reqwest::Client,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            path: config.path.clone(),
            timeout: config.timeout(),
        }
    }

    async fn round_trip(&self, endpoint: &Endpoint) -> Result<Duration, ProbeError> {
        let url = Url::parse(&endpoint.address)?.join(&self.path)?;
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .header("user-agent", "backend-shield-probe")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout
                } else {
                    ProbeError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }
        Ok(started.elapsed())
    }
}

impl EndpointProbe for HttpProbe {
    fn probe<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Duration, ProbeError>> {
        Box::pin(self.round_trip(endpoint))
    }
}

/// Passes while the endpoint's rolling error ratio stays under a limit.
pub struct ErrorRatioProbe {
    max_error_ratio: f64,
    min_samples: usize,
}

impl ErrorRatioProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            max_error_ratio: config.max_error_ratio,
            min_samples: config.min_samples,
        }
    }

    fn check(&self, endpoint: &Endpoint) -> Result<Duration, ProbeError> {
        let ratio = endpoint.error_ratio();
        if endpoint.sample_count() >= self.min_samples && ratio > self.max_error_ratio {
            return Err(ProbeError::ErrorRatio {
                ratio,
                max: self.max_error_ratio,
            });
        }
        Ok(Duration::from_millis(endpoint.latency_ms.unwrap_or(0)))
    }
}

impl EndpointProbe for ErrorRatioProbe {
    fn probe<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Duration, ProbeError>> {
        let result = self.check(endpoint);
        Box::pin(async move { result })
    }
}

/// HTTP round trip for `http(s)://` addresses, error ratio otherwise.
pub struct AutoProbe {
    http: HttpProbe,
    ratio: ErrorRatioProbe,
}

impl AutoProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            http: HttpProbe::new(config),
            ratio: ErrorRatioProbe::new(config),
        }
    }
}

impl EndpointProbe for AutoProbe {
    fn probe<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Duration, ProbeError>> {
        if endpoint.is_http() {
            self.http.probe(endpoint)
        } else {
            self.ratio.probe(endpoint)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection.
    async fn serve(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_error_ratio_needs_min_samples() {
        let probe = ErrorRatioProbe::new(&ProbeConfig::default());
        let mut endpoint = Endpoint::new("eu", "eu-db:5432");
        for _ in 0..4 {
            endpoint.record_outcome(false);
        }
        assert!(probe.check(&endpoint).is_ok());

        endpoint.record_outcome(false);
        assert!(matches!(
            probe.check(&endpoint),
            Err(ProbeError::ErrorRatio { .. })
        ));
    }

    #[test]
    fn test_error_ratio_reports_last_latency() {
        let probe = ErrorRatioProbe::new(&ProbeConfig::default());
        let mut endpoint = Endpoint::new("eu", "eu-db:5432");
        endpoint.record_latency(Duration::from_millis(42));
        assert_eq!(probe.check(&endpoint).unwrap(), Duration::from_millis(42));
    }

    #[tokio::test]
    async fn test_http_probe_success_and_status() {
        let probe = HttpProbe::new(&ProbeConfig::default());

        let ok = Endpoint::new("ok", serve("HTTP/1.1 200 OK").await);
        assert!(probe.probe(&ok).await.is_ok());

        let down = Endpoint::new("down", serve("HTTP/1.1 503 Service Unavailable").await);
        assert!(matches!(probe.probe(&down).await, Err(ProbeError::Status(503))));
    }

    #[tokio::test]
    async fn test_http_probe_rejects_bad_address() {
        let probe = HttpProbe::new(&ProbeConfig::default());
        let endpoint = Endpoint::new("bad", "not a url");
        assert!(matches!(
            probe.probe(&endpoint).await,
            Err(ProbeError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_probe_falls_back_to_error_ratio() {
        let probe = AutoProbe::new(&ProbeConfig::default());
        let mut endpoint = Endpoint::new("eu", "eu-db:5432");
        for _ in 0..10 {
            endpoint.record_outcome(false);
        }
        assert!(matches!(
            probe.probe(&endpoint).await,
            Err(ProbeError::ErrorRatio { .. })
        ));
    }
}
