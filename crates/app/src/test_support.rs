//! Scripted collaborators for controller tests.
//!
//! Each scripted response queue hands out its entries in order and then
//! keeps repeating the last one.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use services::{PreviewBackend, ReachabilityProbe};
use shared::events::PreviewEvent;
use shared::inspector::{ElementDescriptor, InspectorCommand};
use shared::preview_types::{
    ComplianceReport, ConflictAction, PreviewStatus, ServerPhase, StartOutcome, StatusReport,
};
use shared::settings::PreviewConfig;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::inspector::{FramePort, MessageBus};
use crate::preview_panel::PreviewPanel;

struct Script<T: Clone> {
    queue: VecDeque<T>,
    last: T,
}

impl<T: Clone> Script<T> {
    fn new(default: T) -> Self {
        Self {
            queue: VecDeque::new(),
            last: default,
        }
    }

    fn push(&mut self, value: T) {
        self.queue.push_back(value);
    }

    fn next(&mut self) -> T {
        if let Some(value) = self.queue.pop_front() {
            self.last = value;
        }
        self.last.clone()
    }
}

fn scripted<T>(result: std::result::Result<T, String>) -> Result<T> {
    result.map_err(|e| anyhow!(e))
}

pub fn running_report(port: u16, project: &str) -> StatusReport {
    StatusReport {
        running: true,
        status: ServerPhase::Running,
        url: Some(format!("http://localhost:{}", port)),
        port: Some(port),
        project_id: Some(project.to_string()),
        ..StatusReport::default()
    }
}

pub fn starting_report(url: &str) -> StatusReport {
    StatusReport {
        running: true,
        status: ServerPhase::Starting,
        url: Some(url.to_string()),
        port: url.rsplit(':').next().and_then(|p| p.parse().ok()),
        ..StatusReport::default()
    }
}

fn started_default() -> std::result::Result<StartOutcome, String> {
    Ok(StartOutcome::Started {
        url: Some("http://localhost:3000".into()),
        port: Some(3000),
    })
}

pub struct FakeBackend {
    compliance: Mutex<Script<std::result::Result<ComplianceReport, String>>>,
    status: Mutex<Script<std::result::Result<StatusReport, String>>>,
    start: Mutex<Script<std::result::Result<StartOutcome, String>>>,
    resolve: Mutex<Script<std::result::Result<StartOutcome, String>>>,
    stop: Mutex<std::result::Result<(), String>>,
    logs: Mutex<std::result::Result<Vec<String>, String>>,
    start_delay: Mutex<Option<Duration>>,
    resolve_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            compliance: Mutex::new(Script::new(Ok(ComplianceReport {
                can_preview: true,
                ..ComplianceReport::default()
            }))),
            status: Mutex::new(Script::new(Ok(StatusReport::default()))),
            start: Mutex::new(Script::new(started_default())),
            resolve: Mutex::new(Script::new(started_default())),
            stop: Mutex::new(Ok(())),
            logs: Mutex::new(Ok(Vec::new())),
            start_delay: Mutex::new(None),
            resolve_delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push_compliance(&self, result: std::result::Result<ComplianceReport, String>) {
        self.compliance.lock().push(result);
    }

    pub fn push_status(&self, result: std::result::Result<StatusReport, String>) {
        self.status.lock().push(result);
    }

    pub fn push_start(&self, result: std::result::Result<StartOutcome, String>) {
        self.start.lock().push(result);
    }

    pub fn push_resolve(&self, result: std::result::Result<StartOutcome, String>) {
        self.resolve.lock().push(result);
    }

    pub fn fail_stop(&self, message: &str) {
        *self.stop.lock() = Err(message.to_string());
    }

    pub fn set_logs(&self, lines: &[&str]) {
        *self.logs.lock() = Ok(lines.iter().map(|l| l.to_string()).collect());
    }

    pub fn fail_logs(&self, message: &str) {
        *self.logs.lock() = Err(message.to_string());
    }

    pub fn delay_start(&self, delay: Duration) {
        *self.start_delay.lock() = Some(delay);
    }

    pub fn delay_resolve(&self, delay: Duration) {
        *self.resolve_delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: impl Into<String>) {
        self.calls.lock().push(name.into());
    }
}

#[async_trait]
impl PreviewBackend for FakeBackend {
    async fn check_compliance(&self, _session_id: &str) -> Result<ComplianceReport> {
        self.record("compliance");
        let next = self.compliance.lock().next();
        scripted(next)
    }

    async fn get_status(&self, _session_id: &str) -> Result<StatusReport> {
        self.record("status");
        let next = self.status.lock().next();
        scripted(next)
    }

    async fn start(&self, _session_id: &str) -> Result<StartOutcome> {
        self.record("start");
        let next = self.start.lock().next();
        let delay = *self.start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted(next)
    }

    async fn resolve_conflict(
        &self,
        _session_id: &str,
        action: ConflictAction,
    ) -> Result<StartOutcome> {
        self.record(format!("resolve:{}", action.as_str()));
        let next = self.resolve.lock().next();
        let delay = *self.resolve_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted(next)
    }

    async fn stop(&self, _session_id: &str) -> Result<()> {
        self.record("stop");
        let result = self.stop.lock().clone();
        scripted(result)
    }

    async fn get_logs(&self, _session_id: &str, limit: usize) -> Result<Vec<String>> {
        self.record("logs");
        let result = self.logs.lock().clone();
        scripted(result).map(|lines| {
            let skip = lines.len().saturating_sub(limit);
            lines.into_iter().skip(skip).collect()
        })
    }
}

pub struct FakeProbe {
    answers: Mutex<Script<bool>>,
    calls: Mutex<usize>,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(Script::new(false)),
            calls: Mutex::new(0),
        })
    }

    pub fn push(&self, reachable: bool) {
        self.answers.lock().push(reachable);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ReachabilityProbe for FakeProbe {
    async fn probe(&self, url: &str) -> Result<()> {
        *self.calls.lock() += 1;
        let reachable = self.answers.lock().next();
        if reachable {
            Ok(())
        } else {
            Err(anyhow!("connection refused: {}", url))
        }
    }
}

#[derive(Default)]
pub struct RecordingFrame {
    sent: Mutex<Vec<InspectorCommand>>,
}

impl RecordingFrame {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<InspectorCommand> {
        self.sent.lock().clone()
    }
}

impl FramePort for RecordingFrame {
    fn post(&self, command: InspectorCommand) -> Result<()> {
        self.sent.lock().push(command);
        Ok(())
    }
}

/// Panel wired to fakes, with its event stream and picked elements captured
pub struct TestPanel {
    pub panel: PreviewPanel,
    events: mpsc::UnboundedReceiver<PreviewEvent>,
    inspected: Arc<Mutex<Vec<ElementDescriptor>>>,
}

impl TestPanel {
    pub fn new(backend: Arc<FakeBackend>, probe: Arc<FakeProbe>) -> Self {
        Self::build(backend, probe, None, None)
    }

    pub fn with_inspector(
        backend: Arc<FakeBackend>,
        probe: Arc<FakeProbe>,
        frame: Arc<RecordingFrame>,
        bus: Arc<MessageBus>,
    ) -> Self {
        Self::build(backend, probe, Some(frame), Some(bus))
    }

    fn build(
        backend: Arc<FakeBackend>,
        probe: Arc<FakeProbe>,
        frame: Option<Arc<RecordingFrame>>,
        bus: Option<Arc<MessageBus>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inspected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inspected);

        let mut builder = PreviewPanel::builder(backend, probe, PreviewConfig::default())
            .with_events(tx)
            .on_element_inspected(move |element| sink.lock().push(element));
        if let Some(frame) = frame {
            builder = builder.with_frame(frame);
        }
        if let Some(bus) = bus {
            builder = builder.with_message_bus(bus);
        }

        Self {
            panel: builder.build().unwrap(),
            events: rx,
            inspected,
        }
    }

    /// Every event emitted since the previous call
    pub fn events(&mut self) -> Vec<PreviewEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn statuses(&mut self) -> Vec<PreviewStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PreviewEvent::StatusChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    pub fn drain(&mut self) {
        self.events();
    }

    pub fn inspected(&self) -> Vec<ElementDescriptor> {
        self.inspected.lock().clone()
    }
}
