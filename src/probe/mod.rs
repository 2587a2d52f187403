//! # Connectivity Probe
//!
//! Bounded check of whether any route to the internet is open.
//!
//! The probe sends a `HEAD` request to a well-known URL; any HTTP response,
//! whatever its status, counts as online. A positive answer says nothing
//! about the document store itself; store failures are handled by the
//! uploader.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::error::UplinkError;

/// Reachability check consulted before every upload
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// `true` if the network looks usable; never errors
    async fn is_reachable(&self) -> bool;
}

/// HTTP `HEAD` probe against a fixed URL
#[derive(Debug, Clone)]
pub struct HttpHeadProbe {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpHeadProbe {
    /// Build a probe whose whole exchange, name resolution included, is
    /// bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns error if `url` is not an http(s) URL or the HTTP client
    /// cannot be built
    pub fn new(url: &str, timeout: Duration) -> Result<Self, UplinkError> {
        let url = Url::parse(url).map_err(|e| {
            UplinkError::Connectivity(format!("invalid connectivity check url '{}': {}", url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UplinkError::Connectivity(format!(
                "connectivity check url '{}' is not http(s)",
                url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("sensor-uplink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UplinkError::Connectivity(e.to_string()))?;

        Ok(Self { client, url, timeout })
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self, UplinkError> {
        Self::new(&config.url, config.timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpHeadProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(response) => {
                debug!("Connectivity check {} answered {}", self.url, response.status());
                true
            }
            Err(e) if e.is_timeout() => {
                debug!("Connectivity check {} timed out after {:?}", self.url, self.timeout);
                false
            }
            Err(e) => {
                debug!("Connectivity check {} failed: {}", self.url, e);
                false
            }
        }
    }
}
