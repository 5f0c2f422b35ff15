pub mod events;
pub mod inspector;
pub mod preview_types;

pub mod settings {
    use anyhow::{anyhow, Context, Result};
    use serde::{Deserialize, Serialize};
    use std::path::Path;
    use std::time::Duration;

    fn default_backend_url() -> String {
        "http://127.0.0.1:3011".to_string()
    }

    fn default_poll_interval_ms() -> u64 {
        2000
    }

    fn default_poll_timeout_ms() -> u64 {
        60_000
    }

    fn default_log_refresh_interval_ms() -> u64 {
        3000
    }

    fn default_log_limit() -> usize {
        100
    }

    fn default_handshake_timeout_ms() -> u64 {
        500
    }

    fn default_probe_timeout_ms() -> u64 {
        1500
    }

    fn default_request_timeout_ms() -> u64 {
        15_000
    }

    /// Preview controller settings
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PreviewConfig {
        /// Base URL of the backend that owns the dev-server processes
        #[serde(default = "default_backend_url")]
        pub backend_url: String,
        #[serde(default = "default_poll_interval_ms")]
        pub poll_interval_ms: u64,
        /// Polling loop is force-cancelled after this long
        #[serde(default = "default_poll_timeout_ms")]
        pub poll_timeout_ms: u64,
        #[serde(default = "default_log_refresh_interval_ms")]
        pub log_refresh_interval_ms: u64,
        #[serde(default = "default_log_limit")]
        pub log_limit: usize,
        #[serde(default = "default_handshake_timeout_ms")]
        pub handshake_timeout_ms: u64,
        #[serde(default = "default_probe_timeout_ms")]
        pub probe_timeout_ms: u64,
        #[serde(default = "default_request_timeout_ms")]
        pub request_timeout_ms: u64,
    }

    impl Default for PreviewConfig {
        fn default() -> Self {
            Self {
                backend_url: default_backend_url(),
                poll_interval_ms: default_poll_interval_ms(),
                poll_timeout_ms: default_poll_timeout_ms(),
                log_refresh_interval_ms: default_log_refresh_interval_ms(),
                log_limit: default_log_limit(),
                handshake_timeout_ms: default_handshake_timeout_ms(),
                probe_timeout_ms: default_probe_timeout_ms(),
                request_timeout_ms: default_request_timeout_ms(),
            }
        }
    }

    impl PreviewConfig {
        /// Defaults, then the JSON file named by `PREVIEW_CONFIG`, then env overrides.
        pub fn load() -> Result<Self> {
            let mut config = match std::env::var("PREVIEW_CONFIG") {
                Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
                _ => Self::default(),
            };
            config.apply_overrides(std::env::vars())?;
            Ok(config)
        }

        pub fn from_file(path: &Path) -> Result<Self> {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading preview config {}", path.display()))?;
            let config: Self = serde_json::from_str(&raw)
                .with_context(|| format!("parsing preview config {}", path.display()))?;
            Ok(config)
        }

        /// Apply `PREVIEW_BACKEND_URL` / `PREVIEW_LOG_LIMIT` from the given variables
        pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
        where
            I: IntoIterator<Item = (K, V)>,
            K: AsRef<str>,
            V: AsRef<str>,
        {
            for (key, value) in vars {
                let value = value.as_ref().trim();
                match key.as_ref() {
                    "PREVIEW_BACKEND_URL" if !value.is_empty() => {
                        self.backend_url = value.trim_end_matches('/').to_string();
                    }
                    "PREVIEW_LOG_LIMIT" if !value.is_empty() => {
                        self.log_limit = value
                            .parse()
                            .map_err(|_| {
                                anyhow!("PREVIEW_LOG_LIMIT must be a number, got {:?}", value)
                            })?;
                    }
                    _ => {}
                }
            }
            Ok(())
        }

        /// Origin that serves the proxied preview (and therefore the inspector)
        pub fn host_origin(&self) -> Result<String> {
            let url = url::Url::parse(&self.backend_url)
                .with_context(|| format!("invalid backend url {:?}", self.backend_url))?;
            let origin = url.origin();
            if !origin.is_tuple() {
                return Err(anyhow!("backend url {:?} has no origin", self.backend_url));
            }
            Ok(origin.ascii_serialization())
        }

        pub fn poll_interval(&self) -> Duration {
            Duration::from_millis(self.poll_interval_ms)
        }

        pub fn poll_timeout(&self) -> Duration {
            Duration::from_millis(self.poll_timeout_ms)
        }

        pub fn log_refresh_interval(&self) -> Duration {
            Duration::from_millis(self.log_refresh_interval_ms)
        }

        pub fn handshake_timeout(&self) -> Duration {
            Duration::from_millis(self.handshake_timeout_ms)
        }

        pub fn probe_timeout(&self) -> Duration {
            Duration::from_millis(self.probe_timeout_ms)
        }

        pub fn request_timeout(&self) -> Duration {
            Duration::from_millis(self.request_timeout_ms)
        }
    }

}
