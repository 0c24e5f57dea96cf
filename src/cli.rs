use crate::api::HttpRoutingApi;
use crate::dashboard::{DashboardController, ViewMode};
use crate::model::{DashboardConfig, RunCommand};
use crate::orchestrator::RunPhase;
use crate::text_summary::{self, TextSummary};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One line of CLI output. Data goes to stdout, notices and errors to stderr.
enum OutputLine {
    Data(String),
    Diagnostic(String),
}

type OutputTx = mpsc::UnboundedSender<OutputLine>;

/// Start the thread that owns both terminal streams.
///
/// Run output can arrive faster than the terminal drains it, so async tasks only push onto
/// the channel. The thread flushes and exits once every sender is dropped.
fn spawn_output_writer() -> (OutputTx, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::task::spawn_blocking(move || {
        let mut data = std::io::LineWriter::new(std::io::stdout().lock());
        let mut diagnostics = std::io::LineWriter::new(std::io::stderr().lock());

        while let Some(line) = rx.blocking_recv() {
            let written = match line {
                OutputLine::Data(text) => writeln!(data, "{text}"),
                OutputLine::Diagnostic(text) => writeln!(diagnostics, "{text}"),
            };
            // A closed pipe (e.g. `| head`) ends output for good.
            if written.is_err() {
                break;
            }
        }

        let _ = data.flush();
        let _ = diagnostics.flush();
    });
    (tx, handle)
}

/// How the process should exit once the selected mode is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure,
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "routing-dashboard",
    version,
    about = "Operator dashboard for the LLM routing backend"
)]
pub struct Cli {
    /// Base URL of the routing API [default: http://localhost:8000]
    #[arg(long)]
    pub base_url: Option<String>,

    /// JSON config file; flags given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Per-request timeout for non-streaming calls
    #[arg(long)]
    pub request_timeout: Option<humantime::Duration>,

    /// Settle delay before reloading data after a completed run
    #[arg(long)]
    pub reload_delay: Option<humantime::Duration>,

    /// Restrict the commands that may be started, e.g. `test,run-claude`
    #[arg(long, value_enum, value_delimiter = ',')]
    pub commands: Vec<RunCommand>,

    /// View to print
    #[arg(long, value_enum, default_value_t = ViewMode::Dashboard)]
    pub view: ViewMode,

    /// Prompt id to select (defaults to the first prompt)
    #[arg(long)]
    pub prompt: Option<i64>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Start a run and stream its output until it finishes
    #[arg(long, value_enum, conflicts_with_all = ["route", "update_weights", "check"])]
    pub run: Option<RunCommand>,

    /// After a lost connection, ask the backend how the run ended
    #[arg(long, requires = "run")]
    pub reconcile: bool,

    /// Re-route the selected prompt
    #[arg(long, conflicts_with_all = ["update_weights", "check"])]
    pub route: bool,

    /// Force a model when re-routing
    #[arg(long, requires = "route")]
    pub model: Option<String>,

    /// Ask the backend to update its routing weights
    #[arg(long, conflicts_with = "check")]
    pub update_weights: bool,

    /// Check API health and exit
    #[arg(long)]
    pub check: bool,
}

/// Build a `DashboardConfig`: defaults, then the config file, then flags.
pub fn build_config(args: &Cli) -> Result<DashboardConfig> {
    let mut cfg = match args.config.as_deref() {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => DashboardConfig::default(),
    };
    if let Some(url) = args.base_url.as_deref() {
        cfg.api.base_url = url.to_string();
    }
    if let Some(t) = args.request_timeout {
        cfg.api.request_timeout = Duration::from(t);
    }
    if let Some(d) = args.reload_delay {
        cfg.reload_delay = Duration::from(d);
    }
    if !args.commands.is_empty() {
        cfg.commands = args.commands.clone();
    }
    Ok(cfg)
}

pub async fn run(args: Cli) -> Result<Exit> {
    let cfg = build_config(&args)?;
    let api = HttpRoutingApi::new(&cfg.api).context("create API client")?;
    let mut dashboard = DashboardController::new(Arc::new(api), &cfg);
    let (out_tx, out_handle) = spawn_output_writer();

    let exit = if args.check {
        run_check(&args, &dashboard, &out_tx).await?
    } else if args.update_weights {
        run_update_weights(&args, &dashboard, &out_tx).await?
    } else if let Some(command) = args.run {
        run_system(&args, &mut dashboard, command, &out_tx).await?
    } else {
        load(&args, &mut dashboard, &out_tx).await;
        if args.route {
            run_route(&args, &mut dashboard, &out_tx).await?
        } else {
            emit_view(&args, &dashboard, &out_tx)?;
            Exit::Success
        }
    };

    drop(out_tx);
    let _ = out_handle.await;
    Ok(exit)
}

async fn load(args: &Cli, dashboard: &mut DashboardController, out_tx: &OutputTx) {
    dashboard.refresh().await;
    if let Some(id) = args.prompt {
        dashboard.select(id);
    }
    dashboard.set_mode(args.view);
    if let Some(notice) = dashboard.data_notice() {
        let _ = out_tx.send(OutputLine::Diagnostic(notice));
    }
}

fn emit_lines(summary: TextSummary, out_tx: &OutputTx) {
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Data(line));
    }
}

fn emit_json<T: Serialize>(value: &T, out_tx: &OutputTx) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    let _ = out_tx.send(OutputLine::Data(out));
    Ok(())
}

fn emit_view(args: &Cli, dashboard: &DashboardController, out_tx: &OutputTx) -> Result<()> {
    let view = dashboard.view();
    if args.json {
        emit_json(&view, out_tx)
    } else {
        emit_lines(text_summary::build_view_summary(&view), out_tx);
        Ok(())
    }
}

async fn run_check(args: &Cli, dashboard: &DashboardController, out_tx: &OutputTx) -> Result<Exit> {
    match dashboard.check().await {
        Ok(report) => {
            if args.json {
                emit_json(&report, out_tx)?;
            } else {
                emit_lines(text_summary::build_check_summary(&report), out_tx);
            }
            Ok(Exit::Success)
        }
        Err(e) => {
            let _ = out_tx.send(OutputLine::Diagnostic(format!("API not available: {e}")));
            Ok(Exit::Failure)
        }
    }
}

async fn run_update_weights(
    args: &Cli,
    dashboard: &DashboardController,
    out_tx: &OutputTx,
) -> Result<Exit> {
    match dashboard.update_weights().await {
        Ok(update) => {
            if args.json {
                emit_json(&update, out_tx)?;
            } else {
                emit_lines(text_summary::build_weights_summary(&update), out_tx);
            }
            Ok(Exit::Success)
        }
        Err(e) => {
            let _ = out_tx.send(OutputLine::Diagnostic(format!("Failed to update weights: {e}")));
            Ok(Exit::Failure)
        }
    }
}

async fn run_route(
    args: &Cli,
    dashboard: &mut DashboardController,
    out_tx: &OutputTx,
) -> Result<Exit> {
    match dashboard.route_selected(args.model.as_deref()).await {
        Ok(resp) => {
            if args.json {
                emit_json(&resp, out_tx)?;
            } else {
                emit_lines(text_summary::build_route_summary(&resp), out_tx);
                emit_view(args, dashboard, out_tx)?;
            }
            Ok(Exit::Success)
        }
        Err(e) => {
            let _ = out_tx.send(OutputLine::Diagnostic(format!("Failed to re-route prompt: {e}")));
            Ok(Exit::Failure)
        }
    }
}

async fn run_system(
    args: &Cli,
    dashboard: &mut DashboardController,
    command: RunCommand,
    out_tx: &OutputTx,
) -> Result<Exit> {
    load(args, dashboard, out_tx).await;
    let _ = out_tx.send(OutputLine::Diagnostic(format!(
        "Starting {} ({command})",
        command.label()
    )));
    dashboard
        .start_run(command)
        .await
        .with_context(|| format!("start {command}"))?;

    // Lines produced by the start itself, e.g. a failed start request.
    if !args.json {
        for line in dashboard.runs().state().output() {
            let _ = out_tx.send(OutputLine::Data(line.clone()));
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            update = dashboard.next_run_update() => {
                let Some(update) = update else { break };
                if !args.json {
                    for line in update.lines {
                        let _ = out_tx.send(OutputLine::Data(line));
                    }
                }
                if let Some(outcome) = update.reload {
                    tracing::debug!(?outcome, "post-run reload finished");
                }
                if update.phase == RunPhase::ConnectionLost && args.reconcile {
                    if let Ok(phase) = dashboard.reconcile_run().await {
                        if !args.json {
                            if let Some(line) = dashboard.runs().state().output().last() {
                                let _ = out_tx.send(OutputLine::Data(line.clone()));
                            }
                        }
                        tracing::info!(%phase, "reconciled after lost connection");
                    }
                }
            }
            _ = &mut ctrl_c => {
                let run_id = dashboard.runs().state().run_id().unwrap_or("-").to_string();
                let _ = out_tx.send(OutputLine::Diagnostic(format!(
                    "Interrupted; run {run_id} keeps going on the backend"
                )));
                return Ok(Exit::Failure);
            }
        }
    }

    let phase = dashboard.runs().state().phase();
    if args.json {
        emit_json(&dashboard.control_view(), out_tx)?;
    } else {
        emit_view(args, dashboard, out_tx)?;
    }
    Ok(match phase {
        RunPhase::Completed => Exit::Success,
        _ => Exit::Failure,
    })
}
