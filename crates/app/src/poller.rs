//! Status poller
//!
//! One-shot status check after the compliance gate, and the polling loop that
//! follows a starting dev server until it runs, fails, or the hard timeout
//! expires. At most one loop is active per panel: starting a loop cancels
//! the previous one, and every tick re-checks its generation under the state
//! lock before mutating anything.

use shared::preview_types::{PreviewStatus, ServerPhase, SERVER_FAILED, StatusReport};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::state::PanelInner;

pub(crate) struct PollHandle {
    pub generation: u64,
    pub task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollStep {
    Continue,
    Done,
}

impl PanelInner {
    /// Adopt the backend's current view of the session's dev server
    pub(crate) async fn check_status_and_maybe_switch(
        self: &Arc<Self>,
        session_id: &str,
        epoch: u64,
    ) {
        let report = match self.backend.get_status(session_id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("preview status check failed for {}: {:#}", session_id, e);
                self.with_epoch(epoch, |st| {
                    st.session.clear_target();
                    st.displayed = None;
                    self.transition(st, PreviewStatus::Stopped);
                });
                return;
            }
        };

        if !report.running {
            self.with_epoch(epoch, |st| {
                st.session.clear_target();
                st.displayed = None;
                self.transition(st, PreviewStatus::Stopped);
            });
            return;
        }

        match report.status {
            ServerPhase::Starting => {
                let current = self.with_epoch(epoch, |st| {
                    st.session.adopt_target(&report);
                    self.transition(st, PreviewStatus::Starting);
                });
                if current.is_some() {
                    self.start_polling();
                }
            }
            ServerPhase::Error => {
                let current = self.with_epoch(epoch, |st| {
                    st.session.adopt_target(&report);
                    let message = report.error.clone();
                    st.session.error = Some(message.unwrap_or_else(|| SERVER_FAILED.to_string()));
                    self.transition(st, PreviewStatus::Error);
                });
                if current.is_some() {
                    self.fetch_logs_and_open(epoch).await;
                }
            }
            _ => {
                self.with_epoch(epoch, |st| {
                    st.session.adopt_target(&report);
                    let identity = st.session.identity();
                    let same = st
                        .displayed
                        .as_ref()
                        .map(|shown| shown.is_same_preview(&identity))
                        .unwrap_or(false);
                    if !same {
                        st.displayed = Some(identity);
                        self.remount(st);
                    }
                    self.transition(st, PreviewStatus::Running);
                });
            }
        }
    }

    /// Cancel any active loop and install a new one
    pub(crate) fn start_polling(self: &Arc<Self>) {
        let generation = {
            let mut st = self.state.lock();
            st.poll_generation += 1;
            st.poll_generation
        };

        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.poller.take() {
            tracing::debug!("cancelling status poll #{}", previous.generation);
            previous.task.abort();
        }
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            inner.run_poll_loop(generation).await;
        });
        tasks.poller = Some(PollHandle { generation, task });
        self.polls_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("status poll #{} started", generation);
    }

    pub(crate) fn cancel_polling(&self) {
        self.state.lock().poll_generation += 1;
        if let Some(previous) = self.tasks.lock().poller.take() {
            previous.task.abort();
        }
    }

    pub(crate) fn is_polling(&self) -> bool {
        self.tasks
            .lock()
            .poller
            .as_ref()
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false)
    }

    async fn run_poll_loop(self: Arc<Self>, generation: u64) {
        let period = self.config.poll_interval();
        let limit = self.config.poll_timeout();
        let ticks = async {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.poll_tick(generation).await == PollStep::Done {
                    break;
                }
            }
        };

        if tokio::time::timeout(limit, ticks).await.is_err() {
            tracing::info!("status poll #{} gave up after {:?}", generation, limit);
        }

        let mut tasks = self.tasks.lock();
        if tasks.poller.as_ref().map(|h| h.generation) == Some(generation) {
            tasks.poller = None;
        }
    }

    fn poll_target(&self, generation: u64) -> Option<(String, u64)> {
        let st = self.state.lock();
        if st.poll_generation != generation {
            return None;
        }
        st.session.session_id.clone().map(|id| (id, st.epoch))
    }

    async fn poll_tick(self: &Arc<Self>, generation: u64) -> PollStep {
        let Some((session_id, epoch)) = self.poll_target(generation) else {
            return PollStep::Done;
        };

        let report = match self.backend.get_status(&session_id).await {
            Ok(report) => report,
            Err(e) => {
                // Can no longer tell; leave the status as it is
                tracing::debug!("status poll #{} stopped: {:#}", generation, e);
                return PollStep::Done;
            }
        };
        tracing::debug!(
            "status poll #{}: running={} status={:?}",
            generation,
            report.running,
            report.status
        );

        if report.status == ServerPhase::Running {
            self.promote_running(generation, &report);
            return PollStep::Done;
        }

        if report.status == ServerPhase::Error || !report.running {
            let failed = {
                let mut st = self.state.lock();
                if st.poll_generation == generation {
                    let message = report.error.clone();
                    st.session.error = Some(message.unwrap_or_else(|| SERVER_FAILED.to_string()));
                    self.transition(&mut st, PreviewStatus::Error);
                    true
                } else {
                    false
                }
            };
            if failed {
                self.fetch_logs_and_open(epoch).await;
            }
            return PollStep::Done;
        }

        if report.status == ServerPhase::Starting {
            if let Some(url) = report.url.as_deref() {
                match self.probe.probe(url).await {
                    Ok(()) => {
                        self.promote_running(generation, &report);
                        return PollStep::Done;
                    }
                    Err(e) => tracing::debug!("dev server not reachable yet: {:#}", e),
                }
            }
        }

        PollStep::Continue
    }

    /// The server that was starting now serves; the frame gets a fresh document
    fn promote_running(self: &Arc<Self>, generation: u64, report: &StatusReport) {
        let mut st = self.state.lock();
        if st.poll_generation != generation {
            return;
        }
        st.session.adopt(report);
        st.session.error = None;
        st.displayed = Some(st.session.identity());
        self.remount(&mut st);
        self.transition(&mut st, PreviewStatus::Running);
    }
}
