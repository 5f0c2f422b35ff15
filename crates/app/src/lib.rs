//! Preview panel controller
//!
//! Owns the lifecycle of a locally-run dev server shown in a single frame:
//! compliance gate, start / stop / restart, port conflicts, status polling,
//! the log drawer, and the element inspector bridge.

mod compliance;
pub mod conflict;
pub mod inspector;
mod log_drawer;
mod poller;
pub mod preview_panel;
mod state;
pub mod view;

#[cfg(test)]
mod test_support;

pub use conflict::ConflictPrompt;
pub use inspector::{FramePort, MessageBus, Subscription};
pub use log_drawer::LogDrawer;
pub use preview_panel::{PreviewPanel, PreviewPanelBuilder};
pub use state::BusyFlags;
pub use view::PreviewView;
