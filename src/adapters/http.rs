//! reqwest-backed probe and transport.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Probe, Transport};

/// GET-based reachability probe
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("pagewright/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for probe")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        Ok(response.status().as_u16())
    }
}

/// JSON POST transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("pagewright/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for transport")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to POST to {}", url))?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_reports_connection_errors() {
        let probe = HttpProbe::new(Duration::from_millis(200)).unwrap();
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let result = probe.check("http://127.0.0.1:9/").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transport_rejects_invalid_url() {
        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        let result = transport
            .post_json("not a url", &serde_json::json!({"a": 1}))
            .await;
        assert!(result.is_err());
    }
}
