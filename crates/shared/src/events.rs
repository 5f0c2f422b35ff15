//! Events emitted by the preview controller for the host UI.

use serde::{Deserialize, Serialize};

use crate::preview_types::PreviewStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreviewEvent {
    /// Lifecycle status changed
    StatusChanged {
        from: PreviewStatus,
        to: PreviewStatus,
    },
    /// The preview frame must be recreated with a new key
    FrameRemounted { key: u64 },
    /// Log drawer content was refreshed
    LogsUpdated { lines: usize },
    /// Compliance gate finished for the current session
    ComplianceChecked { can_preview: bool },
}

impl PreviewEvent {
    pub fn is_terminal_status(&self) -> bool {
        matches!(
            self,
            PreviewEvent::StatusChanged {
                to: PreviewStatus::Running
                    | PreviewStatus::Error
                    | PreviewStatus::Conflict
                    | PreviewStatus::Unavailable,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status_events() {
        let running = PreviewEvent::StatusChanged {
            from: PreviewStatus::Starting,
            to: PreviewStatus::Running,
        };
        let starting = PreviewEvent::StatusChanged {
            from: PreviewStatus::Stopped,
            to: PreviewStatus::Starting,
        };
        assert!(running.is_terminal_status());
        assert!(!starting.is_terminal_status());
        assert!(!PreviewEvent::FrameRemounted { key: 3 }.is_terminal_status());
    }
}
