//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use backend_shield::config::{EndpointConfig, ShieldConfig};
use backend_shield::failover::{Endpoint, EndpointProbe, ProbeError};

/// Start a programmable HTTP backend on an ephemeral port.
///
/// Every request is answered with the `(status, body)` returned by `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Probe whose verdict per endpoint id is set by the test.
#[derive(Default)]
pub struct ScriptedProbe {
    failing: Mutex<HashSet<String>>,
}

impl ScriptedProbe {
    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn pass(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }
}

impl EndpointProbe for ScriptedProbe {
    fn probe<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Duration, ProbeError>> {
        let failing = self.failing.lock().unwrap().contains(&endpoint.id);
        Box::pin(async move {
            if failing {
                Err(ProbeError::Status(503))
            } else {
                Ok(Duration::from_millis(5))
            }
        })
    }
}

pub fn endpoint(id: &str, address: &str, priority: u32, primary: bool) -> EndpointConfig {
    EndpointConfig {
        id: id.into(),
        name: None,
        address: address.into(),
        priority,
        region: None,
        primary,
    }
}

/// Two-endpoint configuration with fast timings for tests.
pub fn shield_config() -> ShieldConfig {
    let mut config = ShieldConfig::default();
    config.failover.endpoints = vec![
        endpoint("eu", "eu-db:5432", 1, true),
        endpoint("us", "us-db:5432", 2, false),
    ];
    config.failover.failure_threshold = 3;
    config.failover.graceful_timeout_ms = 200;
    config.failover.auto_recovery_delay_ms = 1_000;
    config.failover.health_check_interval_ms = 500;
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 1_000;
    config
}
