//! Element inspector bridge between the host and the previewed page.
//!
//! Commands go into the frame through a [`FramePort`]; replies arrive on the
//! host-wide [`MessageBus`] and are accepted only from the host's own origin.

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;
use shared::inspector::{InspectorCommand, InspectorMessage};
use shared::preview_types::{PreviewError, PreviewStatus};
use std::sync::{Arc, Weak};

use crate::preview_panel::PreviewPanel;
use crate::state::PanelInner;

/// Where inspector commands are posted (the preview frame's window)
pub trait FramePort: Send + Sync {
    fn post(&self, command: InspectorCommand) -> Result<()>;
}

type Listener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Host window message channel: every posted message and its origin
#[derive(Default)]
pub struct MessageBus {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: Mutex<u64>,
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Deliver a message to every listener
    pub fn dispatch(&self, origin: &str, data: &Value) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(origin, data);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners.lock().retain(|(other, _)| *other != id);
    }
}

/// Removes its listener from the bus when dropped
pub struct Subscription {
    bus: Weak<MessageBus>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

impl PanelInner {
    pub(crate) fn handle_inspector_message(self: &Arc<Self>, origin: &str, data: &Value) {
        if origin != self.host_origin {
            return;
        }
        let Some(message) = InspectorMessage::from_value(data) else {
            return;
        };

        match message {
            InspectorMessage::Ready | InspectorMessage::Pong => {
                self.state.lock().session.inspector.ready = true;
                self.cancel_handshake();
                tracing::debug!("preview inspector ready");
            }
            InspectorMessage::ElementSelected(element) => {
                tracing::info!("element inspected: {}", element.selector);
                if let Some(callback) = &self.on_element_inspected {
                    callback(element);
                }
                self.state.lock().session.inspector.inspect_mode = false;
            }
            InspectorMessage::InspectorDisabled => {
                self.state.lock().session.inspector.inspect_mode = false;
            }
        }
    }

    pub(crate) fn cancel_handshake(&self) {
        if let Some(task) = self.tasks.lock().handshake.take() {
            task.abort();
        }
    }

    fn post_to_frame(&self, command: InspectorCommand) -> Result<(), PreviewError> {
        let frame = self
            .frame
            .lock()
            .clone()
            .ok_or_else(|| PreviewError::Frame("no frame attached".into()))?;
        if let Err(e) = frame.post(command) {
            tracing::warn!("posting {:?} to preview frame failed: {:#}", command, e);
        }
        Ok(())
    }

    fn arm_handshake_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let timeout = self.config.handshake_timeout();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                if !inner.state.lock().session.inspector.ready {
                    tracing::debug!("preview inspector did not answer within {:?}", timeout);
                }
            }
        });
        if let Some(previous) = self.tasks.lock().handshake.replace(task) {
            previous.abort();
        }
    }
}

impl PreviewPanel {
    /// Flip pick mode. Returns the new mode, or `false` while the inspector
    /// has not answered yet (a ping is sent and the user may try again).
    pub fn toggle_inspect_mode(&self) -> Result<bool, PreviewError> {
        let inner = &self.inner;
        let (ready, enable) = {
            let st = inner.state.lock();
            if st.session.status != PreviewStatus::Running {
                return Err(PreviewError::InvalidTransition {
                    action: "inspect",
                    status: st.session.status,
                });
            }
            (st.session.inspector.ready, !st.session.inspector.inspect_mode)
        };
        if inner.frame.lock().is_none() {
            return Err(PreviewError::Frame("no frame attached".into()));
        }

        if !ready {
            inner.post_to_frame(InspectorCommand::Ping)?;
            inner.arm_handshake_timer();
            return Ok(false);
        }

        inner.state.lock().session.inspector.inspect_mode = enable;
        let command = if enable {
            InspectorCommand::EnableInspect
        } else {
            InspectorCommand::DisableInspect
        };
        inner.post_to_frame(command)?;
        Ok(enable)
    }

    pub fn handshake_pending(&self) -> bool {
        self.inner
            .tasks
            .lock()
            .handshake
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}
