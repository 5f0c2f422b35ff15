//! HTTP client for the backend that owns dev-server processes.
//!
//! The backend spawns, monitors and kills the dev server; this client only
//! speaks its REST contract. Everything is keyed by chat session id.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::preview_types::{
    ComplianceReport, ConflictAction, LogsResponse, StartOutcome, StartResponse, StatusReport,
};
use shared::settings::PreviewConfig;
use url::Url;

/// Backend operations consumed by the preview controller
#[async_trait]
pub trait PreviewBackend: Send + Sync {
    async fn check_compliance(&self, session_id: &str) -> Result<ComplianceReport>;

    async fn get_status(&self, session_id: &str) -> Result<StatusReport>;

    async fn start(&self, session_id: &str) -> Result<StartOutcome>;

    async fn resolve_conflict(
        &self,
        session_id: &str,
        action: ConflictAction,
    ) -> Result<StartOutcome>;

    /// Best-effort
    async fn stop(&self, session_id: &str) -> Result<()>;

    async fn get_logs(&self, session_id: &str, limit: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct ResolveConflictRequest {
    action: ConflictAction,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

pub struct HttpPreviewBackend {
    http: Client,
    base: Url,
}

impl HttpPreviewBackend {
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(2)
            .build()
            .context("building preview HTTP client")?;
        Self::with_client(http, &config.backend_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid backend url {:?}", base_url))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("backend url {:?} cannot be a base", base_url));
        }
        Ok(Self { http, base })
    }

    /// `{base}/api/preview/{session_id}/{action}` with the session id as one segment
    fn endpoint(&self, session_id: &str, action: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend url cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "preview", session_id, action]);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url.path()))?;
        decode_success(resp).await
    }

    async fn post_start_like(
        &self,
        url: Url,
        body: Option<&ResolveConflictRequest>,
    ) -> Result<StartOutcome> {
        let mut req = self.http.post(url.clone());
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("POST {} failed", url.path()))?;
        let parsed: StartResponse = decode_lenient(resp).await?;
        Ok(parsed.into_outcome())
    }
}

#[async_trait]
impl PreviewBackend for HttpPreviewBackend {
    async fn check_compliance(&self, session_id: &str) -> Result<ComplianceReport> {
        self.get_json(self.endpoint(session_id, "compliance")?).await
    }

    async fn get_status(&self, session_id: &str) -> Result<StatusReport> {
        self.get_json(self.endpoint(session_id, "status")?).await
    }

    async fn start(&self, session_id: &str) -> Result<StartOutcome> {
        self.post_start_like(self.endpoint(session_id, "start")?, None)
            .await
    }

    async fn resolve_conflict(
        &self,
        session_id: &str,
        action: ConflictAction,
    ) -> Result<StartOutcome> {
        let body = ResolveConflictRequest { action };
        self.post_start_like(self.endpoint(session_id, "resolve-conflict")?, Some(&body))
            .await
    }

    async fn stop(&self, session_id: &str) -> Result<()> {
        let url = self.endpoint(session_id, "stop")?;
        let resp = self
            .http
            .post(url.clone())
            .send()
            .await
            .with_context(|| format!("POST {} failed", url.path()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(error_message(status.as_u16(), &body)));
        }
        Ok(())
    }

    async fn get_logs(&self, session_id: &str, limit: usize) -> Result<Vec<String>> {
        let mut url = self.endpoint(session_id, "logs")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let body: LogsResponse = self.get_json(url).await?;
        Ok(body.logs)
    }
}

/// Decode a 2xx JSON body; anything else becomes an error carrying the
/// backend's own message when it sent one.
async fn decode_success<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await.context("reading backend response")?;
    if !status.is_success() {
        return Err(anyhow!(error_message(status.as_u16(), &body)));
    }
    serde_json::from_str(&body)
        .with_context(|| format!("unexpected backend response: {}", snippet(&body)))
}

/// Decode the body whatever the status. Start-like endpoints answer 409/500
/// with `{conflict}` / `{error}` bodies.
async fn decode_lenient<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await.context("reading backend response")?;
    match serde_json::from_str(&body) {
        Ok(parsed) => Ok(parsed),
        Err(_) if !status.is_success() => Err(anyhow!(error_message(status.as_u16(), &body))),
        Err(e) => Err(anyhow!("unexpected backend response ({}): {}", e, snippet(&body))),
    }
}

pub(crate) fn error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(msg) = parsed.error.or(parsed.message).filter(|m| !m.is_empty()) {
            return msg;
        }
    }
    if body.trim().is_empty() {
        format!("backend error {}", status)
    } else {
        format!("backend error {}: {}", status, snippet(body))
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(300)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Accept one connection, answer with the canned response, return the raw request
    pub async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(head_end) = find(&buf, b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + body_len {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{}", addr), handle)
    }
}
