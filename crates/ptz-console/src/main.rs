//! PTZ Console - Main Entry Point
//!
//! Reads operator commands from stdin, drives the active camera, and keeps a
//! scaled preview of the latest frame refreshed in the background.

mod commands;
mod settings;

use anyhow::Context;
use camera_registry::{load_cameras, ActivateOutcome, CameraRegistry};
use camera_session::CameraSession;
use clap::Parser;
use commands::{parse_command, ConsoleCommand, Control, MotionDefaults, HELP};
use frame_source::{StreamConnector, TestPatternConnector, VideoFrame};
use ptz_protocol::InquiryTopic;
use settings::{Args, ConsoleSettings};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::FmtSubscriber;

const PREVIEW_WIDTH: u32 = 300;
const PREVIEW_HEIGHT: u32 = 150;
const PREVIEW_REPORT_INTERVAL: Duration = Duration::from_secs(10);

fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = ConsoleSettings::load(&args).context("loading settings")?;
    init_logging(&settings.log_level);

    info!("=== PTZ Console v{} ===", env!("CARGO_PKG_VERSION"));

    // Signals are watched from here on, camera startup included
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let registry = Arc::new(CameraRegistry::new(settings.registry_settings(), stream_connector(&settings)));
    registry.load(load_cameras(&settings.cameras));

    let startup = async {
        registry.activate_first().await;
        report_focus_mode(&registry).await;
    };
    let started = tokio::select! {
        _ = &mut shutdown => false,
        _ = startup => true,
    };

    let result = if started {
        let preview = tokio::spawn(run_preview(registry.clone(), settings.display_interval()));
        let result = run_console(&registry, &settings, shutdown.as_mut()).await;
        preview.abort();
        result
    } else {
        info!("Shutdown signal received during startup");
        Ok(())
    };

    registry.shutdown().await;
    info!("Shutdown complete");
    result
}

fn stream_connector(settings: &ConsoleSettings) -> Arc<dyn StreamConnector> {
    if settings.test_pattern {
        return Arc::new(TestPatternConnector::default());
    }
    #[cfg(feature = "rtsp")]
    {
        Arc::new(frame_source::RtspConnector)
    }
    #[cfg(not(feature = "rtsp"))]
    {
        warn!("Built without the rtsp feature; previewing a test pattern");
        Arc::new(TestPatternConnector::default())
    }
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_console(
    registry: &CameraRegistry,
    settings: &ConsoleSettings,
    mut shutdown: Pin<&mut impl Future<Output = ()>>,
) -> anyhow::Result<()> {
    let defaults = MotionDefaults {
        pan_speed: settings.pan_speed,
        tilt_speed: settings.tilt_speed,
        hold: settings.hold(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!("Ready; type \"help\" for commands");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                return Ok(());
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("reading stdin")? else {
                    info!("stdin closed; running until Ctrl-C");
                    stdin_open = false;
                    continue;
                };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => return Ok(()),
                    Ok(Some(command)) => execute(registry, &defaults, command).await,
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }
}

async fn execute(registry: &CameraRegistry, defaults: &MotionDefaults, command: ConsoleCommand) {
    if let Some(control) = command.control(defaults) {
        match registry.session() {
            Some(session) => run_control(&session, control).await,
            None => warn!("No active camera"),
        }
        return;
    }

    match command {
        ConsoleCommand::Camera(index) => match registry.activate(index).await {
            Ok(ActivateOutcome::Activated) => {
                info!("Switched to camera {}", index + 1);
                report_focus_mode(registry).await;
            }
            Ok(ActivateOutcome::Unchanged) => debug!("Camera {} unchanged", index + 1),
            Err(e) => error!("Switching to camera {} failed: {}", index + 1, e),
        },
        ConsoleCommand::Snapshot(path) => match save_snapshot(registry, &path) {
            Ok(frame) => info!("Saved frame #{} ({}x{}) to {}", frame.sequence, frame.width, frame.height, path.display()),
            Err(e) => error!("Snapshot failed: {:#}", e),
        },
        ConsoleCommand::Status => report_status(registry),
        ConsoleCommand::Help => info!("\n{}", HELP),
        _ => {}
    }
}

/// Send the action; for momentary controls hold it, then always send the stop
async fn run_control(session: &CameraSession, control: Control) {
    if let Err(e) = session.send(control.action).await {
        error!("{:?} failed: {}", control.action, e);
    }

    let (Some(hold), Some(stop)) = (control.hold, control.action.stop_counterpart()) else {
        return;
    };
    tokio::time::sleep(hold).await;
    if let Err(e) = session.send(stop).await {
        error!("{:?} failed: {}", stop, e);
    }
}

/// Reflect the camera's actual auto-focus state
async fn report_focus_mode(registry: &CameraRegistry) {
    let Some(session) = registry.session() else {
        return;
    };
    match session.inquire(InquiryTopic::FocusMode).await {
        Ok(result) => match result.auto_focus() {
            Some(auto) => info!("Auto-focus is {}", if auto { "on" } else { "off" }),
            None => warn!("Camera sent an unrecognized focus mode {:02X?}", result.raw),
        },
        Err(e) => warn!("Focus mode inquiry failed: {}", e),
    }
}

fn save_snapshot(registry: &CameraRegistry, path: &Path) -> anyhow::Result<Arc<VideoFrame>> {
    let frame = registry
        .frame_source()
        .and_then(|source| source.latest_frame())
        .context("no frame available")?;
    let image = frame.to_image().context("frame buffer does not match its size")?;
    image.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(frame)
}

fn report_status(registry: &CameraRegistry) {
    let cameras = registry.endpoints();
    let Some(index) = registry.active_index() else {
        info!("{} camera(s) configured, none active", cameras.len());
        return;
    };

    let endpoint = registry.active_endpoint().map(|e| e.to_string()).unwrap_or_default();
    let session_open = registry.session().is_some_and(|s| s.is_open());
    let auto_focus = registry
        .session()
        .and_then(|s| s.last_inquiry(InquiryTopic::FocusMode))
        .and_then(|r| r.auto_focus());
    info!(
        "Camera {}/{}: {} control={} auto_focus={:?}",
        index + 1,
        cameras.len(),
        endpoint,
        if session_open { "open" } else { "closed" },
        auto_focus
    );
    if let Some(source) = registry.frame_source() {
        info!(
            "Preview {}: {} live={} frames={} skipped={}",
            source.url(),
            source.state(),
            source.is_live(),
            source.frames_published(),
            source.frames_skipped()
        );
    }
}

/// Poll the latest frame at the display cadence and scale new ones for display
async fn run_preview(registry: Arc<CameraRegistry>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut shown: Option<Arc<VideoFrame>> = None;
    let mut refreshed = 0u64;
    let mut last_report = Instant::now();

    loop {
        ticker.tick().await;

        let latest = registry.frame_source().and_then(|source| source.latest_frame());
        if let Some(frame) = latest {
            if !shown.as_ref().is_some_and(|s| Arc::ptr_eq(s, &frame)) {
                let thumbnail = frame.resize(PREVIEW_WIDTH, PREVIEW_HEIGHT);
                refreshed += 1;
                if let Some(center) = thumbnail.get_pixel(PREVIEW_WIDTH / 2, PREVIEW_HEIGHT / 2) {
                    trace!("Preview frame #{} center={:?}", frame.sequence, center);
                }
                shown = Some(frame);
            }
        }

        if last_report.elapsed() >= PREVIEW_REPORT_INTERVAL {
            info!("Preview refreshed {} times in the last {:?}", refreshed, PREVIEW_REPORT_INTERVAL);
            refreshed = 0;
            last_report = Instant::now();
        }
    }
}
