//! State owned by one preview panel instance
//!
//! `PanelState` sits behind a single mutex; every transition goes through
//! [`PanelInner::transition`] so derived side effects (the log refresher)
//! are re-synced after each mutation.

use parking_lot::Mutex;
use services::{PreviewBackend, ReachabilityProbe};
use shared::events::PreviewEvent;
use shared::inspector::ElementDescriptor;
use shared::preview_types::{
    PreviewError, PreviewIdentity, PreviewSession, PreviewStatus, SessionContext,
};
use shared::settings::PreviewConfig;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::inspector::FramePort;
use crate::log_drawer::LogDrawer;
use crate::poller::PollHandle;

pub type ElementCallback = Arc<dyn Fn(ElementDescriptor) + Send + Sync>;

/// Requests in flight; each one blocks re-entry of its own action
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusyFlags {
    pub checking: bool,
    pub starting: bool,
    pub stopping: bool,
    pub restarting: bool,
    pub resolving_conflict: bool,
}

impl BusyFlags {
    pub fn any(&self) -> bool {
        self.checking
            || self.starting
            || self.stopping
            || self.restarting
            || self.resolving_conflict
    }
}

/// User-triggered operations that talk to the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    Recheck,
    Start,
    Stop,
    Restart,
    ResolveConflict,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Recheck => "re-check",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::ResolveConflict => "resolve conflict",
        }
    }

    pub fn flag(self, busy: &mut BusyFlags) -> &mut bool {
        match self {
            Action::Recheck => &mut busy.checking,
            Action::Start => &mut busy.starting,
            Action::Stop => &mut busy.stopping,
            Action::Restart => &mut busy.restarting,
            Action::ResolveConflict => &mut busy.resolving_conflict,
        }
    }

    pub fn allowed(self, status: PreviewStatus) -> bool {
        match self {
            Action::Recheck | Action::Start => status.can_start(),
            Action::Stop => status.can_stop(),
            Action::Restart => status.can_restart(),
            Action::ResolveConflict => status == PreviewStatus::Conflict,
        }
    }
}

/// Backend text when there is any, `fallback` otherwise
pub(crate) fn failure_message(error: &anyhow::Error, fallback: &str) -> String {
    let message = format!("{:#}", error);
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

pub(crate) struct PanelState {
    pub session: PreviewSession,
    pub context: Option<SessionContext>,
    /// Bumped on every session change; results of older epochs are dropped
    pub epoch: u64,
    /// Bumped whenever a polling loop is started or cancelled
    pub poll_generation: u64,
    /// Identity of the preview the frame currently shows
    pub displayed: Option<PreviewIdentity>,
    pub drawer: LogDrawer,
    pub busy: BusyFlags,
}

impl PanelState {
    pub fn new() -> Self {
        Self {
            session: PreviewSession::default(),
            context: None,
            epoch: 0,
            poll_generation: 0,
            displayed: None,
            drawer: LogDrawer::default(),
            busy: BusyFlags::default(),
        }
    }
}

#[derive(Default)]
pub(crate) struct Tasks {
    pub poller: Option<PollHandle>,
    pub log_refresh: Option<JoinHandle<()>>,
    pub handshake: Option<JoinHandle<()>>,
}

impl Tasks {
    pub fn abort_all(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.task.abort();
        }
        if let Some(task) = self.log_refresh.take() {
            task.abort();
        }
        if let Some(task) = self.handshake.take() {
            task.abort();
        }
    }
}

/// Shared between the panel handle and its timer tasks.
///
/// Lock order: `state` before `tasks`, never the other way round.
pub(crate) struct PanelInner {
    pub config: PreviewConfig,
    pub host_origin: String,
    pub backend: Arc<dyn PreviewBackend>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub frame: Mutex<Option<Arc<dyn FramePort>>>,
    pub on_element_inspected: Option<ElementCallback>,
    pub events: Option<mpsc::UnboundedSender<PreviewEvent>>,
    pub state: Mutex<PanelState>,
    pub tasks: Mutex<Tasks>,
    pub polls_started: AtomicU64,
}

impl PanelInner {
    pub fn emit(&self, event: PreviewEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Move to `to` and re-sync derived side effects
    pub fn transition(self: &Arc<Self>, st: &mut PanelState, to: PreviewStatus) {
        let from = st.session.status;
        if from != to {
            tracing::info!("preview {} -> {}", from, to);
            st.session.status = to;
            self.emit(PreviewEvent::StatusChanged { from, to });
        }
        self.sync_log_refresh_locked(st);
    }

    /// Give the frame a new key; the inspector handshake starts over
    pub fn remount(&self, st: &mut PanelState) {
        let key = st.session.remount_frame();
        tracing::debug!("preview frame remounted with key {}", key);
        self.emit(PreviewEvent::FrameRemounted { key });
    }

    /// Claim `action`: a session must be selected, nothing else in flight,
    /// and the current status must allow it
    pub fn begin(&self, action: Action) -> Result<(String, u64), PreviewError> {
        let mut st = self.state.lock();
        let session_id = st
            .session
            .session_id
            .clone()
            .ok_or(PreviewError::NoSession)?;
        if st.busy.any() {
            return Err(PreviewError::Busy {
                action: action.name(),
            });
        }
        let status = st.session.status;
        if !action.allowed(status) {
            return Err(PreviewError::InvalidTransition {
                action: action.name(),
                status,
            });
        }
        *action.flag(&mut st.busy) = true;
        Ok((session_id, st.epoch))
    }

    /// Run `f` only if the session has not changed since `epoch`
    pub fn with_epoch<R>(&self, epoch: u64, f: impl FnOnce(&mut PanelState) -> R) -> Option<R> {
        let mut st = self.state.lock();
        if st.epoch != epoch {
            tracing::debug!("dropping result for stale session epoch {}", epoch);
            return None;
        }
        Some(f(&mut *st))
    }
}
