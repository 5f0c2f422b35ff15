//! Preview lifecycle types for the native dev-server preview.
//!
//! This module defines the lifecycle status, the per-session preview record,
//! the identity used to decide whether the preview frame must be remounted,
//! and the JSON shapes exchanged with the preview backend.

use serde::{Deserialize, Serialize};

/// Branch assumed when the backend or the session does not report one
pub const DEFAULT_BRANCH: &str = "main";

/// Lifecycle status of the preview panel. Exactly one value at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Stopped,
    Starting,
    Running,
    Error,
    Switching,
    Unavailable,
    Conflict,
}

impl PreviewStatus {
    pub fn all() -> &'static [PreviewStatus] {
        &[
            PreviewStatus::Stopped,
            PreviewStatus::Starting,
            PreviewStatus::Running,
            PreviewStatus::Error,
            PreviewStatus::Switching,
            PreviewStatus::Unavailable,
            PreviewStatus::Conflict,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewStatus::Stopped => "stopped",
            PreviewStatus::Starting => "starting",
            PreviewStatus::Running => "running",
            PreviewStatus::Error => "error",
            PreviewStatus::Switching => "switching",
            PreviewStatus::Unavailable => "unavailable",
            PreviewStatus::Conflict => "conflict",
        }
    }

    /// States from which `start()` may be issued
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            PreviewStatus::Stopped | PreviewStatus::Error | PreviewStatus::Unavailable
        )
    }

    /// States in which a server process may exist on the backend
    pub fn can_stop(&self) -> bool {
        matches!(
            self,
            PreviewStatus::Starting
                | PreviewStatus::Running
                | PreviewStatus::Error
                | PreviewStatus::Switching
        )
    }

    pub fn can_restart(&self) -> bool {
        matches!(
            self,
            PreviewStatus::Starting | PreviewStatus::Running | PreviewStatus::Error
        )
    }
}

impl std::fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chat session (and its workspace) that owns the preview
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub project_id: Option<String>,
    pub branch: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            project_id: None,
            branch: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Normalize a reported branch name, falling back to [`DEFAULT_BRANCH`]
pub fn normalize_branch(branch: Option<&str>) -> String {
    match branch.map(str::trim) {
        Some(b) if !b.is_empty() => b.to_string(),
        _ => DEFAULT_BRANCH.to_string(),
    }
}

/// `(port, projectId, normalized branch)`: two observations with equal
/// identities are the same preview and must not remount the frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PreviewIdentity {
    pub port: Option<u16>,
    pub project_id: Option<String>,
    pub branch: String,
}

impl PreviewIdentity {
    pub fn new(port: Option<u16>, project_id: Option<&str>, branch: Option<&str>) -> Self {
        Self {
            port,
            project_id: project_id.map(str::to_string),
            branch: normalize_branch(branch),
        }
    }

    pub fn is_same_preview(&self, other: &PreviewIdentity) -> bool {
        self == other
    }
}

/// Backend verdict on whether the session's project can be previewed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComplianceReport {
    pub can_preview: bool,
    pub reason: Option<String>,
    pub suggestions: Vec<String>,
    pub framework: Option<String>,
    pub resolved_path: Option<String>,
    pub needs_install: bool,
}

/// Sub-status of the dev-server process as reported by the backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerPhase {
    Starting,
    Running,
    Error,
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Response of the backend status endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusReport {
    pub running: bool,
    pub status: ServerPhase,
    pub url: Option<String>,
    pub port: Option<u16>,
    pub project_id: Option<String>,
    pub branch: Option<String>,
    pub framework: Option<String>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn identity(&self) -> PreviewIdentity {
        PreviewIdentity::new(self.port, self.project_id.as_deref(), self.branch.as_deref())
    }
}

/// The process currently holding the requested port
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConflictProcess {
    pub name: Option<String>,
    pub pid: Option<u32>,
    pub is_dev_server: bool,
    pub command: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConflictInfo {
    pub requested_port: u16,
    pub alternative_port: u16,
    #[serde(default)]
    pub conflict_process: ConflictProcess,
}

impl PortConflictInfo {
    /// Human description of the blocking process
    pub fn describe(&self) -> String {
        let name = self
            .conflict_process
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("another process");
        let pid = self
            .conflict_process
            .pid
            .map(|p| format!(" (pid {})", p))
            .unwrap_or_default();
        if self.conflict_process.is_dev_server {
            format!(
                "Port {} is used by {}{}, which looks like another dev server",
                self.requested_port, name, pid
            )
        } else {
            format!("Port {} is used by {}{}", self.requested_port, name, pid)
        }
    }
}

/// How to resolve a port conflict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    UseAlternative,
    KillAndUseOriginal,
}

impl ConflictAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictAction::UseAlternative => "use_alternative",
            ConflictAction::KillAndUseOriginal => "kill_and_use_original",
        }
    }
}

/// Raw shape returned by the start and resolve-conflict endpoints.
///
/// Use [`StartResponse::into_outcome`] to get the tagged form.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartResponse {
    pub success: bool,
    pub url: Option<String>,
    pub port: Option<u16>,
    pub conflict: Option<PortConflictInfo>,
    pub error: Option<String>,
}

impl StartResponse {
    /// A conflict wins over an error, an error wins over success.
    pub fn into_outcome(self) -> StartOutcome {
        if let Some(conflict) = self.conflict {
            return StartOutcome::Conflict(conflict);
        }
        if let Some(error) = self.error.filter(|e| !e.is_empty()) {
            return StartOutcome::Failed { error };
        }
        if self.success {
            StartOutcome::Started {
                url: self.url,
                port: self.port,
            }
        } else {
            StartOutcome::Failed {
                error: START_FAILED.to_string(),
            }
        }
    }
}

/// Result of a start or resolve-conflict request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        url: Option<String>,
        port: Option<u16>,
    },
    Conflict(PortConflictInfo),
    Failed {
        error: String,
    },
}

pub const START_FAILED: &str = "Failed to start preview";
pub const SERVER_FAILED: &str = "Preview server failed";
pub const STOP_FAILED: &str = "Failed to stop preview";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

/// Whether the injected inspector answered and whether pick mode is on.
/// Both are false after every frame remount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InspectorHandshake {
    pub ready: bool,
    pub inspect_mode: bool,
}

/// Per-session preview record (runtime only, not persisted)
#[derive(Clone, Debug)]
pub struct PreviewSession {
    pub status: PreviewStatus,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub branch: Option<String>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub framework: Option<String>,
    pub error: Option<String>,
    pub compliance: Option<ComplianceReport>,
    /// Present only while `status == Conflict`
    pub port_conflict: Option<PortConflictInfo>,
    /// Remount key of the preview frame
    pub iframe_key: u64,
    pub inspector: InspectorHandshake,
}

impl Default for PreviewSession {
    fn default() -> Self {
        Self {
            status: PreviewStatus::Stopped,
            session_id: None,
            project_id: None,
            branch: None,
            port: None,
            url: None,
            framework: None,
            error: None,
            compliance: None,
            port_conflict: None,
            iframe_key: 0,
            inspector: InspectorHandshake::default(),
        }
    }
}

impl PreviewSession {
    pub fn for_session(session: Option<&SessionContext>) -> Self {
        Self {
            session_id: session.map(|s| s.session_id.clone()),
            ..Self::default()
        }
    }

    pub fn identity(&self) -> PreviewIdentity {
        PreviewIdentity::new(self.port, self.project_id.as_deref(), self.branch.as_deref())
    }

    /// Clear everything that describes a running server
    pub fn clear_target(&mut self) {
        self.url = None;
        self.port = None;
        self.project_id = None;
        self.branch = None;
        self.framework = None;
    }

    /// Adopt the fields of a status report. Absent fields keep their value.
    pub fn adopt(&mut self, report: &StatusReport) {
        if report.url.is_some() {
            self.url = report.url.clone();
        }
        if report.port.is_some() {
            self.port = report.port;
        }
        if report.project_id.is_some() {
            self.project_id = report.project_id.clone();
        }
        if report.branch.is_some() {
            self.branch = report.branch.clone();
        }
        if report.framework.is_some() {
            self.framework = report.framework.clone();
        }
        if report.error.is_some() {
            self.error = report.error.clone();
        }
    }

    /// Take the server identity exactly as reported, then adopt the rest.
    /// A missing branch means the default branch, not the previous one.
    pub fn adopt_target(&mut self, report: &StatusReport) {
        self.port = report.port;
        self.project_id = report.project_id.clone();
        self.branch = report.branch.clone();
        self.adopt(report);
    }

    /// Give the frame a new key. A fresh document has no inspector attached yet.
    pub fn remount_frame(&mut self) -> u64 {
        self.iframe_key = self.iframe_key.wrapping_add(1);
        self.inspector = InspectorHandshake::default();
        self.iframe_key
    }

    /// Same-origin proxy path serving the dev server
    pub fn proxy_path(&self) -> Option<String> {
        self.port.map(proxy_path)
    }
}

pub fn proxy_path(port: u16) -> String {
    format!("/api/preview/proxy/{}/", port)
}

/// Guard failures of preview controller operations
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("No session selected")]
    NoSession,

    #[error("Cannot {action} while preview is {status}")]
    InvalidTransition {
        action: &'static str,
        status: PreviewStatus,
    },

    #[error("{action} already in progress")]
    Busy { action: &'static str },

    #[error("Preview has no URL yet")]
    NoPreviewUrl,

    #[error("Preview frame unavailable: {0}")]
    Frame(String),

    #[error("Could not open browser: {0}")]
    Browser(String),
}
