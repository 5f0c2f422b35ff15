//! Compliance gate: can this session's project be previewed at all?
//!
//! Runs on every session change and on manual re-check, never on a timer.

use shared::events::PreviewEvent;
use shared::preview_types::PreviewStatus;
use std::sync::Arc;

use crate::state::PanelInner;

const NOT_PREVIEWABLE: &str = "This project cannot be previewed";

impl PanelInner {
    pub(crate) async fn evaluate(self: &Arc<Self>, session_id: &str, epoch: u64) {
        let report = match self.backend.check_compliance(session_id).await {
            Ok(report) => report,
            Err(e) => {
                // An unreachable backend reads as "not yet known"
                tracing::warn!("compliance check failed for {}: {:#}", session_id, e);
                self.with_epoch(epoch, |st| {
                    st.busy.checking = false;
                    st.session.compliance = None;
                    st.session.clear_target();
                    st.displayed = None;
                    self.transition(st, PreviewStatus::Stopped);
                });
                return;
            }
        };
        self.emit(PreviewEvent::ComplianceChecked {
            can_preview: report.can_preview,
        });

        if !report.can_preview {
            self.with_epoch(epoch, |st| {
                st.busy.checking = false;
                st.session.error = Some(
                    report
                        .reason
                        .clone()
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| NOT_PREVIEWABLE.to_string()),
                );
                st.session.clear_target();
                st.session.framework = report.framework.clone();
                st.session.compliance = Some(report);
                st.displayed = None;
                self.transition(st, PreviewStatus::Unavailable);
            });
            return;
        }

        let current = self.with_epoch(epoch, |st| {
            if st.session.framework.is_none() {
                st.session.framework = report.framework.clone();
            }
            st.session.compliance = Some(report);
        });
        if current.is_none() {
            return;
        }

        self.check_status_and_maybe_switch(session_id, epoch).await;
        self.with_epoch(epoch, |st| st.busy.checking = false);
    }
}
