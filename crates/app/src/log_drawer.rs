//! Log drawer: backend-held dev-server output shown under the preview.
//!
//! Logs are fetched when the preview enters `error` and whenever the user
//! opens the drawer. While the drawer is open and the preview is running
//! the content refreshes on an interval; nothing polls while it is hidden.

use chrono::{DateTime, Utc};
use shared::events::PreviewEvent;
use shared::preview_types::PreviewStatus;
use std::sync::Arc;

use crate::state::{PanelInner, PanelState};

#[derive(Clone, Debug, Default)]
pub struct LogDrawer {
    pub open: bool,
    pub lines: Vec<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LogDrawer {
    fn replace(&mut self, lines: Vec<String>) {
        self.lines = lines;
        self.last_fetched = Some(Utc::now());
        self.last_error = None;
    }
}

pub(crate) fn should_refresh(st: &PanelState) -> bool {
    st.drawer.open
        && st.session.status == PreviewStatus::Running
        && st.session.session_id.is_some()
}

impl PanelInner {
    pub(crate) async fn fetch_logs(self: &Arc<Self>, epoch: u64) {
        let Some(session_id) = self
            .with_epoch(epoch, |st| st.session.session_id.clone())
            .flatten()
        else {
            return;
        };
        let result = self.backend.get_logs(&session_id, self.config.log_limit).await;
        self.with_epoch(epoch, |st| match result {
            Ok(lines) => {
                let count = lines.len();
                st.drawer.replace(lines);
                self.emit(PreviewEvent::LogsUpdated { lines: count });
            }
            Err(e) => {
                tracing::warn!("fetching preview logs failed: {:#}", e);
                st.drawer.last_error = Some(e.to_string());
            }
        });
    }

    /// Error entry: the user always gets diagnostic context
    pub(crate) async fn fetch_logs_and_open(self: &Arc<Self>, epoch: u64) {
        let opened = self.with_epoch(epoch, |st| self.set_drawer_open(st, true));
        if opened.is_some() {
            self.fetch_logs(epoch).await;
        }
    }

    pub(crate) fn set_drawer_open(self: &Arc<Self>, st: &mut PanelState, open: bool) {
        st.drawer.open = open;
        self.sync_log_refresh_locked(st);
    }

    /// Start or stop the refresher so it runs exactly while it should
    pub(crate) fn sync_log_refresh_locked(self: &Arc<Self>, st: &PanelState) {
        let wanted = should_refresh(st);
        let epoch = st.epoch;
        let mut tasks = self.tasks.lock();
        let active = tasks
            .log_refresh
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false);

        if wanted && !active {
            let inner = Arc::clone(self);
            tasks.log_refresh = Some(tokio::spawn(async move {
                inner.run_log_refresh(epoch).await;
            }));
        } else if !wanted {
            if let Some(task) = tasks.log_refresh.take() {
                task.abort();
            }
        }
    }

    async fn run_log_refresh(self: Arc<Self>, epoch: u64) {
        let period = self.config.log_refresh_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let keep_going = {
                let st = self.state.lock();
                st.epoch == epoch && should_refresh(&st)
            };
            if !keep_going {
                break;
            }
            self.fetch_logs(epoch).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{running_report, FakeBackend, FakeProbe, TestPanel};
    use shared::preview_types::{PreviewStatus, SessionContext, StatusReport};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_refresh_only_while_open_and_running() {
        let backend = FakeBackend::new();
        backend.push_status(Ok(running_report(3000, "p1")));
        backend.set_logs(&["compiled", "ready"]);
        let t = TestPanel::new(backend.clone(), FakeProbe::new());

        t.panel.set_session(Some(SessionContext::new("s1").with_project("p1"))).await;
        assert_eq!(t.panel.status(), PreviewStatus::Running);
        assert_eq!(backend.count("logs"), 0);

        t.panel.view_logs().await.unwrap();
        assert_eq!(backend.count("logs"), 1);
        assert_eq!(t.panel.logs(), vec!["compiled".to_string(), "ready".to_string()]);
        assert!(t.panel.is_refreshing_logs());

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(backend.count("logs"), 2);
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(backend.count("logs"), 3);

        t.panel.close_logs();
        assert!(!t.panel.is_refreshing_logs());
        tokio::time::sleep(Duration::from_millis(9000)).await;
        assert_eq!(backend.count("logs"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stops_when_preview_stops() {
        let backend = FakeBackend::new();
        backend.push_status(Ok(running_report(3000, "p1")));
        let t = TestPanel::new(backend.clone(), FakeProbe::new());

        t.panel.set_session(Some(SessionContext::new("s1"))).await;
        t.panel.view_logs().await.unwrap();
        assert!(t.panel.is_refreshing_logs());

        t.panel.stop().await.unwrap();
        assert!(!t.panel.is_refreshing_logs());
        let fetched = backend.count("logs");
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(backend.count("logs"), fetched);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_refresh_when_opened_while_stopped() {
        let backend = FakeBackend::new();
        backend.push_status(Ok(StatusReport::default()));
        let t = TestPanel::new(backend.clone(), FakeProbe::new());

        t.panel.set_session(Some(SessionContext::new("s1"))).await;
        t.panel.view_logs().await.unwrap();
        assert_eq!(backend.count("logs"), 1);
        assert!(!t.panel.is_refreshing_logs());

        tokio::time::sleep(Duration::from_millis(7000)).await;
        assert_eq!(backend.count("logs"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_previous_lines() {
        let backend = FakeBackend::new();
        backend.push_status(Ok(StatusReport::default()));
        backend.set_logs(&["first"]);
        let t = TestPanel::new(backend.clone(), FakeProbe::new());

        t.panel.set_session(Some(SessionContext::new("s1"))).await;
        t.panel.view_logs().await.unwrap();
        backend.fail_logs("log store offline");
        t.panel.view_logs().await.unwrap();

        assert_eq!(t.panel.logs(), vec!["first".to_string()]);
        // Drawer failures never touch the lifecycle
        assert_eq!(t.panel.status(), PreviewStatus::Stopped);
        assert_eq!(t.panel.session().error, None);
    }
}
