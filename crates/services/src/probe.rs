//! Reachability probe for a dev server that reports itself as still starting.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `Ok` when something answered at `url`, whatever the HTTP status
    async fn probe(&self, url: &str) -> Result<()>;
}

/// HEAD probe with opaque-response semantics: any HTTP answer counts as
/// reachable, only transport failures do not.
pub struct HttpProbe {
    http: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("building probe HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<()> {
        let resp = self
            .http
            .head(url)
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;
        tracing::debug!("probe {} answered {}", url, resp.status());
        Ok(())
    }
}
