use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mission_core::{GradePaths, GradeStore, MissionTracker, SessionDefinition};
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::bridge::{Interceptor, TRANSCRIPT};
use crate::cli::ServerConfig;
use crate::launch::LaunchSpec;
use crate::pty::SessionPty;
use crate::routes::{self, AppState};
use crate::session::Session;
use crate::telemetry::Telemetry;
use crate::terminal::TerminalHub;
use crate::workspace;

const SESSION_DRAIN: Duration = Duration::from_secs(2);

pub async fn run(config: ServerConfig, telemetry: &Telemetry) -> Result<()> {
    let definition = SessionDefinition::load(&config.config_path)
        .with_context(|| format!("failed to load {}", config.config_path.display()))?;
    let missions = definition
        .compile_missions()
        .context("mission configuration rejected")?;
    info!(
        missions = missions.len(),
        program = ?definition.program,
        "mission configuration loaded"
    );

    workspace::prepare(&config.workdir, &config.user, config.workdir_wait).await;

    let grades = GradeStore::new(GradePaths::for_workdir(&config.workdir), missions.len());
    match grades.prepare_dir() {
        Ok(()) => {
            if let Err(err) = telemetry.attach(grades.paths()) {
                warn!(error = %err, "failed to open log artifacts");
            }
        }
        Err(err) => warn!(error = %err, "grading directory unavailable"),
    }
    info!(target: TRANSCRIPT, "=== New Session Started ===");
    info!("=== Server Session Started ===");
    grades.init();

    let launch = LaunchSpec::login_session(&config.user, &config.workdir, &definition)?;
    let (pty, output, input) =
        SessionPty::open(&launch).context("failed to start session program")?;

    let interceptor = Interceptor::new(config.bridge).context("failed to build output cleaner")?;
    let session = Session::new(MissionTracker::new(missions), grades, interceptor);
    let (handle, session_task) = session.spawn();

    let terminal = TerminalHub::new(pty, input);
    let exited = Arc::new(Notify::new());
    let pump = terminal.spawn_pump(output, handle.clone(), Arc::clone(&exited));

    let state = Arc::new(AppState {
        session: handle,
        terminal: terminal.clone(),
    });
    let router = routes::router(state, config.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(listen_addr = %config.listen_addr, "checkpoint server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(exited))
        .await
        .context("server shutdown with error")?;

    info!("shutting down session");
    terminal.shutdown();
    drop(terminal);
    if tokio::time::timeout(SESSION_DRAIN, pump).await.is_err() {
        warn!("pty pump did not stop in time");
    }
    if tokio::time::timeout(SESSION_DRAIN, session_task).await.is_err() {
        warn!("session loop did not drain in time");
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(exited: Arc<Notify>) {
    tokio::select! {
        _ = signal::ctrl_c() => info!("interrupt received"),
        _ = exited.notified() => info!("session program exited; stopping server"),
    }
}
