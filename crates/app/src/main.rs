use anyhow::{anyhow, Context, Result};
use app::PreviewPanel;
use services::{HttpPreviewBackend, HttpProbe};
use shared::events::PreviewEvent;
use shared::preview_types::{PreviewStatus, SessionContext};
use shared::settings::PreviewConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn session_from_env() -> Result<SessionContext> {
    let session_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PREVIEW_SESSION").ok())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("usage: preview <session-id> (or set PREVIEW_SESSION)"))?;

    let mut context = SessionContext::new(session_id);
    if let Ok(project) = std::env::var("PREVIEW_PROJECT") {
        context = context.with_project(project);
    }
    if let Ok(branch) = std::env::var("PREVIEW_BRANCH") {
        context = context.with_branch(branch);
    }
    Ok(context)
}

/// Wait until the lifecycle settles in a state worth reporting
async fn wait_for_outcome(events: &mut mpsc::UnboundedReceiver<PreviewEvent>, limit: Duration) {
    let settled = tokio::time::timeout(limit, async {
        while let Some(event) = events.recv().await {
            if event.is_terminal_status() {
                break;
            }
        }
    })
    .await;
    if settled.is_err() {
        tracing::warn!("preview did not settle within {:?}", limit);
    }
}

fn report(panel: &PreviewPanel, config: &PreviewConfig) {
    let view = panel.view();
    println!("status: {}", view.status);
    if let Some(framework) = &view.framework {
        println!("framework: {}", framework);
    }

    match view.status {
        PreviewStatus::Running => {
            if let Some(src) = &view.frame_src {
                println!("preview: {}{}", config.backend_url, src);
            }
            if let Some(url) = &view.url {
                println!("dev server: {}", url);
            }
        }
        PreviewStatus::Conflict => {
            if let Some(prompt) = &view.conflict {
                println!("{}", prompt.blocker);
                println!("  - {}", prompt.use_alternative_label());
                println!("  - {}", prompt.kill_label());
            }
        }
        _ => {
            if let Some(error) = &view.error {
                println!("error: {}", error);
            }
            for suggestion in &view.suggestions {
                println!("  - {}", suggestion);
            }
            if view.install_hint {
                println!("dependencies need to be installed first");
            }
            let logs = panel.logs();
            if !logs.is_empty() {
                println!("--- last {} log lines ---", logs.len());
                for line in logs {
                    println!("{}", line);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = PreviewConfig::load()?;
    let context = session_from_env()?;
    tracing::info!("previewing session {} via {}", context.session_id, config.backend_url);

    let backend = Arc::new(HttpPreviewBackend::new(&config)?);
    let probe = Arc::new(HttpProbe::new(config.probe_timeout())?);
    let (tx, mut events) = mpsc::unbounded_channel();
    let panel = PreviewPanel::builder(backend, probe, config.clone())
        .with_events(tx)
        .build()
        .context("building preview panel")?;

    panel.set_session(Some(context)).await;
    while events.try_recv().is_ok() {}
    let view = panel.view();
    if view.can_start && view.status != PreviewStatus::Unavailable {
        panel.start().await?;
    }
    if panel.status() == PreviewStatus::Starting {
        wait_for_outcome(&mut events, config.poll_timeout() + Duration::from_secs(5)).await;
    }

    report(&panel, &config);
    panel.shutdown();
    Ok(())
}
