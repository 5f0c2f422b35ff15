//! Services - I/O collaborators of the preview controller
//!
//! - `preview_backend`: REST client for the dev-server process manager
//! - `probe`: HEAD reachability probe for a starting dev server

pub mod preview_backend;
pub mod probe;

pub use preview_backend::{HttpPreviewBackend, PreviewBackend};
pub use probe::{HttpProbe, ReachabilityProbe};
