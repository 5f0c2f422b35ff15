//! Render model of the preview panel, derived from state on demand.

use shared::preview_types::PreviewStatus;

use crate::conflict::ConflictPrompt;
use crate::log_drawer::should_refresh;
use crate::state::{Action, PanelState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewView {
    pub status: PreviewStatus,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_restart: bool,
    pub can_recheck: bool,
    /// The frame exists only while running
    pub show_frame: bool,
    /// Same-origin proxy path loaded by the frame
    pub frame_src: Option<String>,
    pub frame_key: u64,
    /// The dev server's own address, for "open in browser"
    pub url: Option<String>,
    pub framework: Option<String>,
    pub error: Option<String>,
    pub conflict: Option<ConflictPrompt>,
    pub suggestions: Vec<String>,
    pub install_hint: bool,
    pub drawer_open: bool,
    /// Logs re-fetch on an interval while this holds
    pub log_refresh_active: bool,
    pub log_lines: usize,
    pub inspect_available: bool,
    pub inspect_mode: bool,
    pub busy: bool,
}

impl PreviewView {
    pub(crate) fn derive(st: &PanelState) -> Self {
        let session = &st.session;
        let status = session.status;
        let has_session = session.session_id.is_some();
        let idle = !st.busy.any();
        let enabled = |action: Action| has_session && idle && action.allowed(status);
        let show_frame = status == PreviewStatus::Running;

        let conflict = match (status, &session.port_conflict) {
            (PreviewStatus::Conflict, Some(info)) => {
                Some(ConflictPrompt::new(info, st.busy.resolving_conflict))
            }
            _ => None,
        };
        let compliance = session.compliance.as_ref();

        Self {
            status,
            can_start: enabled(Action::Start),
            can_stop: enabled(Action::Stop),
            can_restart: enabled(Action::Restart),
            can_recheck: enabled(Action::Recheck),
            show_frame,
            frame_src: if show_frame { session.proxy_path() } else { None },
            frame_key: session.iframe_key,
            url: session.url.clone(),
            framework: session.framework.clone(),
            error: session.error.clone(),
            conflict,
            suggestions: compliance.map(|c| c.suggestions.clone()).unwrap_or_default(),
            install_hint: compliance.map(|c| c.needs_install).unwrap_or(false),
            drawer_open: st.drawer.open,
            log_refresh_active: should_refresh(st),
            log_lines: st.drawer.lines.len(),
            inspect_available: show_frame,
            inspect_mode: session.inspector.inspect_mode,
            busy: !idle,
        }
    }
}
