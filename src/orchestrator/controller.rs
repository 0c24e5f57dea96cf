//! Run lifecycle controller.
//!
//! Owns start/reconcile orchestration for backend runs and applies their output stream to a
//! single [`RunState`], strictly in arrival order.

use super::post_process::{schedule_reload, ReloadReport};
use super::state::{RunPhase, RunState};
use crate::api::{EventStream, RoutingApi};
use crate::error::{ApiError, RunError};
use crate::model::{DashboardConfig, RemoteRunStatus, RunCommand, RunEvent, RunOutcome};
use crate::store::{DataSource, LoadOutcome, ResultStore};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_BUFFER: usize = 256;

/// Forwarding task for one run's output stream.
///
/// Dropping the subscription aborts the task, which closes the underlying connection.
struct Subscription {
    rx: Receiver<Result<RunEvent, ApiError>>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn spawn(mut events: EventStream) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(async move {
            while let Some(item) = events.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Self { rx, task }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What one call to [`RunController::next_update`] changed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunUpdate {
    pub phase: RunPhase,
    /// Lines appended to the output log by this update.
    pub lines: Vec<String>,
    /// Set when a post-run reload finished, whichever run scheduled it.
    pub reload: Option<LoadOutcome>,
}

enum Incoming {
    Stream(Option<Result<RunEvent, ApiError>>),
    Reload(Option<ReloadReport>),
}

pub struct RunController {
    api: Arc<dyn RoutingApi>,
    store: Arc<ResultStore>,
    commands: Vec<RunCommand>,
    reload_delay: Duration,
    state: RunState,
    /// Bumped on every start; reload reports from older runs never touch the log.
    generation: u64,
    subscription: Option<Subscription>,
    report_tx: UnboundedSender<ReloadReport>,
    report_rx: UnboundedReceiver<ReloadReport>,
    reloads_in_flight: usize,
}

impl RunController {
    pub fn new(api: Arc<dyn RoutingApi>, store: Arc<ResultStore>, cfg: &DashboardConfig) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        Self {
            api,
            store,
            commands: cfg.commands.clone(),
            reload_delay: cfg.reload_delay,
            state: RunState::default(),
            generation: 0,
            subscription: None,
            report_tx,
            report_rx,
            reloads_in_flight: 0,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn commands(&self) -> &[RunCommand] {
        &self.commands
    }

    /// True while the stream is open or a post-run reload has not reported back.
    pub fn is_busy(&self) -> bool {
        self.subscription.is_some() || self.reloads_in_flight > 0
    }

    /// Validate `command` and reset to `Starting` with an empty log.
    pub fn begin(&mut self, command: RunCommand) -> Result<(), RunError> {
        if !self.commands.contains(&command) {
            return Err(RunError::CommandNotEnabled(command));
        }
        let phase = self.state.phase();
        if phase.is_active() {
            warn!(%command, %phase, "rejecting concurrent run");
            return Err(RunError::ConcurrentRunRejected { phase });
        }
        self.subscription = None;
        self.generation += 1;
        self.state = RunState::starting(command);
        info!(%command, generation = self.generation, "starting run");
        Ok(())
    }

    /// Issue the start request for a run in `Starting` and open its output stream.
    pub async fn launch(&mut self) -> RunPhase {
        let (Some(command), RunPhase::Starting) = (self.state.command(), self.state.phase()) else {
            return self.state.phase();
        };

        let run_id = match self.api.start_run(command).await {
            Ok(id) => id,
            Err(e) => {
                warn!(%command, "start request failed: {e}");
                self.state.fail(format!("Failed to start {command}: {e}"));
                return self.state.phase();
            }
        };

        match self.api.subscribe_output(&run_id).await {
            Ok(events) => {
                info!(%run_id, "streaming run output");
                self.state.streaming(run_id);
                self.subscription = Some(Subscription::spawn(events));
            }
            Err(e) => {
                warn!(%run_id, "could not open output stream: {e}");
                self.state.streaming(run_id);
                match e {
                    ApiError::Protocol { .. } => self.state.fail(e),
                    ApiError::Transport { .. } => self.state.lose_connection(e),
                }
            }
        }
        self.state.phase()
    }

    pub async fn start(&mut self, command: RunCommand) -> Result<RunPhase, RunError> {
        self.begin(command)?;
        Ok(self.launch().await)
    }

    /// Wait for the next stream event or reload report and apply it.
    ///
    /// Returns `None` once nothing is pending.
    pub async fn next_update(&mut self) -> Option<RunUpdate> {
        if !self.is_busy() {
            return None;
        }

        let incoming = {
            let subscription = &mut self.subscription;
            let reports = &mut self.report_rx;
            tokio::select! {
                item = async {
                    match subscription.as_mut() {
                        Some(sub) => sub.rx.recv().await,
                        None => futures::future::pending().await,
                    }
                } => Incoming::Stream(item),
                report = reports.recv() => Incoming::Reload(report),
            }
        };

        let before = self.state.output().len();
        let reload = match incoming {
            Incoming::Stream(item) => {
                self.on_stream_item(item);
                None
            }
            Incoming::Reload(Some(report)) => self.on_reload_report(report),
            Incoming::Reload(None) => None,
        };
        Some(RunUpdate {
            phase: self.state.phase(),
            lines: self.state.output()[before..].to_vec(),
            reload,
        })
    }

    /// Ask the backend how an interrupted run ended.
    ///
    /// Only meaningful after the stream was lost; a run still going on the backend leaves the
    /// state as it is.
    pub async fn reconcile(&mut self) -> Result<RunPhase, RunError> {
        if self.state.phase() != RunPhase::ConnectionLost {
            return Err(RunError::NothingToReconcile);
        }
        let Some(run_id) = self.state.run_id().map(str::to_owned) else {
            return Err(RunError::NothingToReconcile);
        };

        match self.api.run_status(&run_id).await {
            Ok(report) => match report.status {
                RemoteRunStatus::Completed => {
                    self.state.finish(RunOutcome::Completed, report.return_code);
                    self.schedule_reload();
                }
                RemoteRunStatus::Failed => {
                    self.state.finish(RunOutcome::Failed, report.return_code);
                }
                RemoteRunStatus::Running => {
                    self.state
                        .push(format!("Run {run_id} is still running on the backend"));
                }
            },
            Err(e) => self.state.push(format!("Status check failed: {e}")),
        }
        info!(%run_id, phase = %self.state.phase(), "reconciled run");
        Ok(self.state.phase())
    }

    fn on_stream_item(&mut self, item: Option<Result<RunEvent, ApiError>>) {
        match item {
            Some(Ok(event)) => self.state.apply(event),
            Some(Err(e @ ApiError::Protocol { .. })) => self.state.fail(e),
            Some(Err(e)) => self.state.lose_connection(e),
            None => self
                .state
                .lose_connection("stream ended before a final status"),
        }

        let phase = self.state.phase();
        if phase.is_terminal() {
            self.subscription = None;
            info!(%phase, "run finished");
            if phase == RunPhase::Completed {
                self.schedule_reload();
            }
        }
    }

    fn on_reload_report(&mut self, report: ReloadReport) -> Option<LoadOutcome> {
        match report {
            ReloadReport::Started { generation } => {
                if generation == self.generation {
                    self.state.push("Refreshing dashboard data...");
                }
                None
            }
            ReloadReport::Finished {
                generation,
                outcome,
            } => {
                self.reloads_in_flight = self.reloads_in_flight.saturating_sub(1);
                if generation == self.generation {
                    self.state.push(reload_line(&outcome));
                }
                Some(outcome)
            }
        }
    }

    fn schedule_reload(&mut self) {
        self.reloads_in_flight += 1;
        schedule_reload(
            self.store.clone(),
            self.reload_delay,
            self.generation,
            self.report_tx.clone(),
        );
    }
}

fn reload_line(outcome: &LoadOutcome) -> String {
    if !outcome.installed {
        return "Dashboard data refresh superseded by a newer load".into();
    }
    match &outcome.source {
        DataSource::Demo { reason } => {
            format!("Dashboard data refreshed with demo data (API not available: {reason})")
        }
        DataSource::Live | DataSource::Empty => "Dashboard data refreshed!".into(),
    }
}
