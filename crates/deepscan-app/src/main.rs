#![warn(missing_docs)]
//! # deepscan binary
//!
//! Command-line front end: scans image files against the analysis service,
//! renders the phase timeline and score gauge as they progress, and manages
//! the saved history.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use deepscan_app::{
    APP_VERSION, AppConfig, CompletedScan, ScanController, ScanError, UploadEvent, build_controller,
    build_gateway, open_store,
};
use deepscan_auth::{SessionModeGate, StoredSessionMode, record_sign_in, record_sign_out};
use deepscan_core::ImageFile;
use deepscan_store::HistoryStore;
use deepscan_ui::{SharedUi, StepState, UiState, snapshot};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const RENDER_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "deepscan", version = APP_VERSION, about = "Scan images for synthetic content")]
struct Cli {
    /// Analysis endpoint URL (overrides DEEPSCAN_ENDPOINT).
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Store file path (overrides DEEPSCAN_STORE).
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Request timeout in milliseconds (overrides DEEPSCAN_REQUEST_TIMEOUT_MS).
    #[arg(long = "timeout-ms", global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan an image. With several files only the first is scanned.
    Scan {
        /// Image files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Action to take once the scan completes.
        #[arg(long, value_enum)]
        action: Option<ScanAction>,
        /// Use canned demo verdicts instead of the remote service.
        #[arg(long)]
        offline: bool,
    },
    /// List saved scans, newest first.
    History,
    /// Print the session mode.
    Mode,
    /// Switch to secure mode for later runs.
    Login,
    /// Switch back to guest mode for later runs.
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScanAction {
    Back,
    Confirm,
    Save,
}

impl Cli {
    fn config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::from_env()?;
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        if let Some(millis) = self.timeout_ms {
            config.request_timeout = Some(Duration::from_millis(millis));
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.config()?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Command::Scan {
            files,
            action,
            offline,
        } => run_scan(&config, &files, action, offline).await,
        Command::History => print_history(&config),
        Command::Mode => {
            let store = open_store(&config);
            println!("{}", StoredSessionMode::load(store.as_ref()).mode().label());
            Ok(())
        }
        Command::Login => {
            record_sign_in(open_store(&config).as_ref())?;
            println!("Secure Mode");
            Ok(())
        }
        Command::Logout => {
            record_sign_out(open_store(&config).as_ref())?;
            println!("Guest Mode");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_scan(
    config: &AppConfig,
    paths: &[PathBuf],
    action: Option<ScanAction>,
    offline: bool,
) -> Result<()> {
    let files = paths
        .iter()
        .map(|path| {
            ImageFile::from_path(path).with_context(|| format!("cannot open {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let event = if files.len() == 1 {
        UploadEvent::Picked(files.into_iter().next())
    } else {
        UploadEvent::Dropped(files)
    };

    let controller = build_controller(config, open_store(config), build_gateway(config, offline)?);
    println!("{}", controller.snapshot().mode_label);

    let renderer = tokio::spawn(render_progress(controller.ui()));
    let outcome = controller.handle_upload(event).await;
    if outcome.is_ok() {
        wait_for_gauge(&controller.ui(), config.timings.gauge_tick).await;
    }
    renderer.abort();

    let scan = match outcome {
        Ok(scan) => scan,
        Err(error) => {
            println!("{}", controller.snapshot().status.text);
            return Err(error.into());
        }
    };
    print_result(&controller.snapshot(), &scan);

    match action {
        None => Ok(()),
        Some(ScanAction::Back) => {
            controller.back()?;
            println!("{}", controller.snapshot().status.text);
            Ok(())
        }
        Some(ScanAction::Confirm) => {
            controller.confirm()?;
            tokio::time::sleep(config.timings.confirm_delay + RENDER_INTERVAL).await;
            println!("{}", controller.snapshot().status.text);
            Ok(())
        }
        Some(ScanAction::Save) => save_result(&controller),
    }
}

fn save_result(controller: &ScanController) -> Result<()> {
    match controller.save() {
        Ok(entry) => {
            println!("{} ({})", controller.snapshot().status.text, entry.timestamp);
            Ok(())
        }
        Err(ScanError::PersistenceRefused) => {
            println!("{}", ScanError::PersistenceRefused);
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

async fn render_progress(ui: SharedUi) {
    let mut last_status = String::new();
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    loop {
        ticker.tick().await;
        let state = snapshot(&ui);
        if state.status.text != last_status {
            println!("{}", render_status(&state));
            last_status = state.status.text;
        }
    }
}

async fn wait_for_gauge(ui: &SharedUi, tick: Duration) {
    // The gauge never needs more than 100 steps.
    for _ in 0..=100 {
        let gauge = snapshot(ui).gauge;
        if gauge.displayed == gauge.target {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

fn render_status(state: &UiState) -> String {
    if !state.scanning || !state.timeline.visible {
        return state.status.text.clone();
    }

    let steps: String = state
        .timeline
        .step_states()
        .iter()
        .map(|step| match step {
            StepState::Done => '#',
            StepState::Active => '>',
            StepState::Pending => '.',
        })
        .collect();
    format!("[{steps}] {}", state.status.text)
}

fn print_result(state: &UiState, scan: &CompletedScan) {
    print!("{}", render_result(state, scan));
}

/// Result block; the score is the computed mean, not the animated gauge.
fn render_result(state: &UiState, scan: &CompletedScan) -> String {
    let mut out = format!("{}\nScore: {}%\n", state.status.text, scan.mean_score);
    for result in &scan.results {
        let line = match &result.status {
            Some(status) => format!("  {:<20} {} ({status})\n", result.provider, result.score),
            None => format!("  {:<20} {}\n", result.provider, result.score),
        };
        out.push_str(&line);
    }
    out
}

fn print_history(config: &AppConfig) -> Result<()> {
    let store = open_store(config);
    if !StoredSessionMode::load(store.as_ref()).mode().is_secure() {
        println!("History is available in Secure Mode");
        return Ok(());
    }

    let entries = HistoryStore::new(store).entries()?;
    if entries.is_empty() {
        println!("No saved scans");
    }
    for entry in entries {
        let summary: Vec<String> = entry
            .results
            .iter()
            .map(|result| format!("{} {}", result.provider, result.score))
            .collect();
        println!("{}  {}  {}", entry.timestamp, entry.image, summary.join(", "));
    }
    Ok(())
}
