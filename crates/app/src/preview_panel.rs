//! Preview Panel controller for the native dev-server preview.
//!
//! This module provides the PreviewPanel struct, which owns the lifecycle of
//! one locally-run dev server previewed through a single frame: starting,
//! stopping, restarting, following it while it boots, and keeping the frame
//! stable when the same preview is observed again after a session switch.

use anyhow::Result;
use parking_lot::Mutex;
use services::{PreviewBackend, ReachabilityProbe};
use shared::events::PreviewEvent;
use shared::inspector::ElementDescriptor;
use shared::preview_types::{
    InspectorHandshake, PreviewError, PreviewSession, PreviewStatus, SessionContext, StartOutcome,
    START_FAILED, STOP_FAILED,
};
use shared::settings::PreviewConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::inspector::{FramePort, MessageBus, Subscription};
use crate::log_drawer::LogDrawer;
use crate::state::{
    failure_message, Action, BusyFlags, ElementCallback, PanelInner, PanelState, Tasks,
};
use crate::view::PreviewView;

/// What to do once a start-like response has been applied
enum AfterStart {
    Poll,
    FetchLogs,
    Nothing,
}

pub struct PreviewPanelBuilder {
    config: PreviewConfig,
    backend: Arc<dyn PreviewBackend>,
    probe: Arc<dyn ReachabilityProbe>,
    events: Option<mpsc::UnboundedSender<PreviewEvent>>,
    frame: Option<Arc<dyn FramePort>>,
    on_element_inspected: Option<ElementCallback>,
    bus: Option<Arc<MessageBus>>,
}

impl PreviewPanelBuilder {
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PreviewEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_frame(mut self, frame: Arc<dyn FramePort>) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Called once per element the user picks inside the preview
    pub fn on_element_inspected(
        mut self,
        callback: impl Fn(ElementDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.on_element_inspected = Some(Arc::new(callback));
        self
    }

    /// Listen for inspector messages on `bus` for the panel's lifetime
    pub fn with_message_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<PreviewPanel> {
        let host_origin = self.config.host_origin()?;
        let inner = Arc::new(PanelInner {
            config: self.config,
            host_origin,
            backend: self.backend,
            probe: self.probe,
            frame: Mutex::new(self.frame),
            on_element_inspected: self.on_element_inspected,
            events: self.events,
            state: Mutex::new(PanelState::new()),
            tasks: Mutex::new(Tasks::default()),
            polls_started: AtomicU64::new(0),
        });

        let subscription = self.bus.map(|bus| {
            let weak = Arc::downgrade(&inner);
            bus.subscribe(move |origin, data| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_inspector_message(origin, data);
                }
            })
        });

        Ok(PreviewPanel {
            inner,
            subscription: Mutex::new(subscription),
        })
    }
}

/// The preview panel controller. Dropping it tears down every timer and
/// the message-bus subscription.
pub struct PreviewPanel {
    pub(crate) inner: Arc<PanelInner>,
    subscription: Mutex<Option<Subscription>>,
}

impl PreviewPanel {
    pub fn builder(
        backend: Arc<dyn PreviewBackend>,
        probe: Arc<dyn ReachabilityProbe>,
        config: PreviewConfig,
    ) -> PreviewPanelBuilder {
        PreviewPanelBuilder {
            config,
            backend,
            probe,
            events: None,
            frame: None,
            on_element_inspected: None,
            bus: None,
        }
    }

    /// Switch to another chat session (or none). A new session id resets the
    /// preview record and re-runs the compliance gate; the frame key and the
    /// displayed identity survive so the same preview is not reloaded.
    pub async fn set_session(&self, context: Option<SessionContext>) {
        let inner = &self.inner;
        {
            let mut st = inner.state.lock();
            let same_id = st.context.as_ref().map(|c| c.session_id.as_str())
                == context.as_ref().map(|c| c.session_id.as_str());
            if same_id {
                st.context = context;
                return;
            }
        }

        inner.cancel_polling();
        inner.cancel_handshake();

        let epoch = {
            let mut st = inner.state.lock();
            st.epoch += 1;
            let previous = std::mem::take(&mut st.session);
            let had_preview = st.displayed.is_some()
                && matches!(
                    previous.status,
                    PreviewStatus::Running | PreviewStatus::Starting | PreviewStatus::Switching
                );

            let mut fresh = PreviewSession::for_session(context.as_ref());
            fresh.status = previous.status;
            fresh.iframe_key = previous.iframe_key;
            fresh.inspector = previous.inspector;
            if had_preview {
                fresh.url = previous.url;
                fresh.port = previous.port;
                fresh.project_id = previous.project_id;
                fresh.branch = previous.branch;
                fresh.framework = previous.framework;
            } else {
                st.displayed = None;
            }

            st.session = fresh;
            st.context = context.clone();
            st.busy = BusyFlags::default();
            st.drawer = LogDrawer::default();
            st.busy.checking = context.is_some();

            let target = if context.is_some() && had_preview {
                PreviewStatus::Switching
            } else {
                PreviewStatus::Stopped
            };
            inner.transition(&mut st, target);
            st.epoch
        };

        if let Some(context) = context {
            tracing::debug!("preview session switched to {}", context.session_id);
            inner.evaluate(&context.session_id, epoch).await;
        }
    }

    /// Manual re-check of the compliance gate
    pub async fn recheck(&self) -> Result<PreviewStatus, PreviewError> {
        let (session_id, epoch) = self.inner.begin(Action::Recheck)?;
        self.inner.evaluate(&session_id, epoch).await;
        Ok(self.status())
    }

    pub async fn start(&self) -> Result<PreviewStatus, PreviewError> {
        let (session_id, epoch) = self.inner.begin(Action::Start)?;
        self.inner.with_epoch(epoch, |st| {
            st.session.error = None;
            st.session.port_conflict = None;
        });
        let result = self.inner.backend.start(&session_id).await;
        self.inner
            .apply_start_result(epoch, result, Action::Start)
            .await;
        Ok(self.status())
    }

    /// Stop the dev server. The panel ends up `stopped` even if the backend
    /// call fails; the failure is kept in `error`.
    pub async fn stop(&self) -> Result<PreviewStatus, PreviewError> {
        let (session_id, epoch) = self.inner.begin(Action::Stop)?;
        self.inner.cancel_polling();
        let result = self.inner.backend.stop(&session_id).await;
        if let Err(e) = &result {
            tracing::warn!("stopping preview for {} failed: {:#}", session_id, e);
        }
        self.inner.with_epoch(epoch, |st| {
            st.busy.stopping = false;
            st.session.clear_target();
            st.session.port_conflict = None;
            st.displayed = None;
            st.session.error = result.as_ref().err().map(|e| failure_message(e, STOP_FAILED));
            self.inner.transition(st, PreviewStatus::Stopped);
        });
        Ok(self.status())
    }

    /// Stop, then start again with the same failure handling as `start`
    pub async fn restart(&self) -> Result<PreviewStatus, PreviewError> {
        let (session_id, epoch) = self.inner.begin(Action::Restart)?;
        self.inner.cancel_polling();
        self.inner.with_epoch(epoch, |st| {
            st.session.error = None;
            st.session.port_conflict = None;
        });

        if let Err(e) = self.inner.backend.stop(&session_id).await {
            tracing::warn!("stop before restart failed for {}: {:#}", session_id, e);
        }
        if self
            .inner
            .with_epoch(epoch, |st| st.session.clear_target())
            .is_none()
        {
            return Ok(self.status());
        }

        let result = self.inner.backend.start(&session_id).await;
        self.inner
            .apply_start_result(epoch, result, Action::Restart)
            .await;
        Ok(self.status())
    }

    /// Reload the frame on explicit request
    pub fn refresh(&self) -> Result<u64, PreviewError> {
        let mut st = self.inner.state.lock();
        if st.session.port.is_none() && st.session.url.is_none() {
            return Err(PreviewError::NoPreviewUrl);
        }
        self.inner.remount(&mut st);
        Ok(st.session.iframe_key)
    }

    /// Open the dev server's own URL in the system browser
    pub fn open_in_browser(&self) -> Result<(), PreviewError> {
        let url = self
            .inner
            .state
            .lock()
            .session
            .url
            .clone()
            .ok_or(PreviewError::NoPreviewUrl)?;
        open::that(&url).map_err(|e| PreviewError::Browser(e.to_string()))
    }

    /// Open the log drawer and fetch the latest lines
    pub async fn view_logs(&self) -> Result<usize, PreviewError> {
        let epoch = {
            let mut st = self.inner.state.lock();
            if st.session.session_id.is_none() {
                return Err(PreviewError::NoSession);
            }
            self.inner.set_drawer_open(&mut st, true);
            st.epoch
        };
        self.inner.fetch_logs(epoch).await;
        Ok(self.inner.state.lock().drawer.lines.len())
    }

    pub fn close_logs(&self) {
        let mut st = self.inner.state.lock();
        self.inner.set_drawer_open(&mut st, false);
    }

    /// Replace the frame the inspector commands are posted to
    pub fn attach_frame(&self, frame: Option<Arc<dyn FramePort>>) {
        *self.inner.frame.lock() = frame;
    }

    pub fn status(&self) -> PreviewStatus {
        self.inner.state.lock().session.status
    }

    pub fn session(&self) -> PreviewSession {
        self.inner.state.lock().session.clone()
    }

    pub fn inspector(&self) -> InspectorHandshake {
        self.inner.state.lock().session.inspector
    }

    /// Derived view for rendering, recomputed from the current state
    pub fn view(&self) -> PreviewView {
        PreviewView::derive(&self.inner.state.lock())
    }

    pub fn logs(&self) -> Vec<String> {
        self.inner.state.lock().drawer.lines.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.is_polling()
    }

    /// How many polling loops were ever installed
    pub fn polls_started(&self) -> u64 {
        self.inner.polls_started.load(Ordering::Relaxed)
    }

    pub fn is_refreshing_logs(&self) -> bool {
        self.inner
            .tasks
            .lock()
            .log_refresh
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Cancel every timer and stop listening for inspector messages
    pub fn shutdown(&self) {
        self.inner.state.lock().poll_generation += 1;
        self.inner.tasks.lock().abort_all();
        self.subscription.lock().take();
    }
}

impl Drop for PreviewPanel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PanelInner {
    /// Apply a start / restart / resolve-conflict response
    pub(crate) async fn apply_start_result(
        self: &Arc<Self>,
        epoch: u64,
        result: Result<StartOutcome>,
        action: Action,
    ) {
        let outcome = result.unwrap_or_else(|e| {
            tracing::warn!("{} request failed: {:#}", action.name(), e);
            StartOutcome::Failed {
                error: failure_message(&e, START_FAILED),
            }
        });

        let next = self.with_epoch(epoch, |st| {
            *action.flag(&mut st.busy) = false;
            match outcome {
                StartOutcome::Started { url, port } => {
                    st.session.port_conflict = None;
                    st.session.error = None;
                    st.session.url = url;
                    st.session.port = port;
                    st.session.project_id = st.context.as_ref().and_then(|c| c.project_id.clone());
                    st.session.branch = st.context.as_ref().and_then(|c| c.branch.clone());
                    self.transition(st, PreviewStatus::Starting);
                    AfterStart::Poll
                }
                StartOutcome::Conflict(info) => {
                    tracing::info!(
                        "port {} is taken, {} offered",
                        info.requested_port,
                        info.alternative_port
                    );
                    st.session.port_conflict = Some(info);
                    self.transition(st, PreviewStatus::Conflict);
                    AfterStart::Nothing
                }
                StartOutcome::Failed { error } => {
                    st.session.port_conflict = None;
                    st.session.error = Some(error);
                    self.transition(st, PreviewStatus::Error);
                    AfterStart::FetchLogs
                }
            }
        });

        match next {
            Some(AfterStart::Poll) => self.start_polling(),
            Some(AfterStart::FetchLogs) => self.fetch_logs_and_open(epoch).await,
            Some(AfterStart::Nothing) | None => {}
        }
    }
}
