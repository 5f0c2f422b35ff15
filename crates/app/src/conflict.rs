//! Port conflict prompt and its resolution.

use shared::preview_types::{ConflictAction, PortConflictInfo, PreviewError, PreviewStatus};

use crate::preview_panel::PreviewPanel;
use crate::state::Action;

/// What the conflict dialog shows
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictPrompt {
    pub requested_port: u16,
    pub alternative_port: u16,
    pub blocker: String,
    pub is_dev_server: bool,
    /// False while a resolution request is in flight
    pub actions_enabled: bool,
}

impl ConflictPrompt {
    pub fn new(info: &PortConflictInfo, resolving: bool) -> Self {
        Self {
            requested_port: info.requested_port,
            alternative_port: info.alternative_port,
            blocker: info.describe(),
            is_dev_server: info.conflict_process.is_dev_server,
            actions_enabled: !resolving,
        }
    }

    pub fn use_alternative_label(&self) -> String {
        format!("Use port {}", self.alternative_port)
    }

    pub fn kill_label(&self) -> String {
        format!("Stop it and use port {}", self.requested_port)
    }
}

impl PreviewPanel {
    /// Answer the conflict dialog. A fresh conflict keeps the dialog open
    /// with the new ports.
    pub async fn resolve_conflict(
        &self,
        action: ConflictAction,
    ) -> Result<PreviewStatus, PreviewError> {
        let (session_id, epoch) = self.inner.begin(Action::ResolveConflict)?;
        tracing::info!("resolving port conflict for {} with {}", session_id, action.as_str());
        let result = self.inner.backend.resolve_conflict(&session_id, action).await;
        self.inner
            .apply_start_result(epoch, result, Action::ResolveConflict)
            .await;
        Ok(self.status())
    }

    /// Dismiss the dialog without asking the backend for anything
    pub fn cancel_conflict(&self) -> Result<PreviewStatus, PreviewError> {
        let mut st = self.inner.state.lock();
        if st.busy.resolving_conflict {
            return Err(PreviewError::Busy {
                action: Action::ResolveConflict.name(),
            });
        }
        if st.session.status != PreviewStatus::Conflict {
            return Err(PreviewError::InvalidTransition {
                action: "cancel conflict",
                status: st.session.status,
            });
        }
        st.session.port_conflict = None;
        self.inner.transition(&mut st, PreviewStatus::Stopped);
        Ok(st.session.status)
    }
}
