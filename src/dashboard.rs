//! Dashboard coordination.
//!
//! Routes view selection and operator actions to the store, the aggregator and the run
//! controller, and exposes read-only views for the presentation layer.

use crate::aggregator::ResultsReport;
use crate::api::RoutingApi;
use crate::error::{ActionError, ApiError, RunError};
use crate::model::{DashboardConfig, Prompt, RouteResponse, RoutingResult, RunCommand, WeightsUpdate};
use crate::orchestrator::{RunController, RunPhase, RunUpdate};
use crate::store::{DataSource, LoadOutcome, ResultStore, StoreSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Dashboard,
    Control,
    History,
}

/// What the prompt pane shows for the selected prompt id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SelectionView {
    Ready {
        prompt: Prompt,
        result: RoutingResult,
    },
    /// The prompt exists but has not been routed yet.
    NotRouted { prompt: Prompt },
    /// The selected id is not in the current data, e.g. after a reload.
    NoData { prompt_id: i64 },
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptRow {
    pub id: i64,
    pub text: String,
    pub chosen_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub notice: Option<String>,
    pub prompts: Vec<PromptRow>,
    pub selection: SelectionView,
    pub report: ResultsReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    pub run_id: String,
    pub started: String,
    pub prompts_count: u64,
    pub models_used: Vec<String>,
    pub avg_score: Option<f64>,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub notice: Option<String>,
    pub latest_run: Option<String>,
    pub total_runs: Option<u64>,
    pub runs: Vec<HistoryRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandRow {
    pub command: RunCommand,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlView {
    pub phase: RunPhase,
    pub command: Option<RunCommand>,
    pub run_id: Option<String>,
    pub return_code: Option<i32>,
    pub busy: bool,
    pub commands: Vec<CommandRow>,
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    Dashboard(DashboardView),
    Control(ControlView),
    History(HistoryView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub status: String,
    pub prompt_count: usize,
}

pub struct DashboardController {
    api: Arc<dyn RoutingApi>,
    store: Arc<ResultStore>,
    runs: RunController,
    mode: ViewMode,
    selected: Option<i64>,
}

impl DashboardController {
    pub fn new(api: Arc<dyn RoutingApi>, cfg: &DashboardConfig) -> Self {
        let store = Arc::new(ResultStore::new(api.clone()));
        let runs = RunController::new(api.clone(), store.clone(), cfg);
        Self {
            api,
            store,
            runs,
            mode: ViewMode::default(),
            selected: None,
        }
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn select(&mut self, prompt_id: i64) {
        self.selected = Some(prompt_id);
    }

    pub fn runs(&self) -> &RunController {
        &self.runs
    }

    /// Explicit selection, or the first prompt when nothing was picked.
    pub fn selected_id(&self) -> Option<i64> {
        self.selected
            .or_else(|| self.store.snapshot().data.prompts().first().map(|p| p.id))
    }

    pub async fn refresh(&self) -> LoadOutcome {
        self.store.load().await
    }

    pub fn selection(&self) -> SelectionView {
        selection_in(&self.store.snapshot(), self.selected_id())
    }

    /// Banner text when the data on screen is not live.
    pub fn data_notice(&self) -> Option<String> {
        notice_for(&self.store.snapshot())
    }

    pub fn view(&self) -> View {
        match self.mode {
            ViewMode::Dashboard => View::Dashboard(self.dashboard_view()),
            ViewMode::Control => View::Control(self.control_view()),
            ViewMode::History => View::History(self.history_view()),
        }
    }

    pub fn dashboard_view(&self) -> DashboardView {
        let snap = self.store.snapshot();
        let data = &snap.data;
        let prompts = data
            .prompts()
            .iter()
            .map(|p| PromptRow {
                id: p.id,
                text: p.text.clone(),
                chosen_model: data.result_for(p.id).map(|r| r.chosen_model.clone()),
            })
            .collect();
        DashboardView {
            notice: notice_for(&snap),
            prompts,
            selection: selection_in(&snap, self.selected_id()),
            report: ResultsReport::build(data.results()),
        }
    }

    pub fn history_view(&self) -> HistoryView {
        let snap = self.store.snapshot();
        HistoryView {
            notice: notice_for(&snap),
            latest_run: snap.latest_run.clone(),
            total_runs: snap.total_runs,
            runs: snap
                .runs
                .iter()
                .map(|r| HistoryRow {
                    run_id: r.run_id.clone(),
                    started: r.display_timestamp(),
                    prompts_count: r.prompts_count,
                    models_used: r.models_used.iter().cloned().collect(),
                    avg_score: r.avg_score,
                    total_cost: r.total_cost,
                })
                .collect(),
        }
    }

    pub fn control_view(&self) -> ControlView {
        let state = self.runs.state();
        ControlView {
            phase: state.phase(),
            command: state.command(),
            run_id: state.run_id().map(str::to_owned),
            return_code: state.return_code(),
            busy: self.runs.is_busy(),
            commands: self
                .runs
                .commands()
                .iter()
                .map(|c| CommandRow {
                    command: *c,
                    label: c.label(),
                })
                .collect(),
            output: state.output().to_vec(),
        }
    }

    pub async fn start_run(&mut self, command: RunCommand) -> Result<RunPhase, RunError> {
        self.runs.start(command).await
    }

    pub async fn next_run_update(&mut self) -> Option<RunUpdate> {
        self.runs.next_update().await
    }

    pub async fn reconcile_run(&mut self) -> Result<RunPhase, RunError> {
        self.runs.reconcile().await
    }

    /// Re-route the selected prompt, then reload everything.
    ///
    /// The response is returned for display; the visible result set changes only through
    /// the reload.
    pub async fn route_selected(&self, model: Option<&str>) -> Result<RouteResponse, ActionError> {
        let prompt_id = self.selected_id().ok_or(ActionError::NoPromptSelected)?;
        let response = self.api.route_prompt(prompt_id, model).await?;
        info!(prompt_id, model = %response.model, "prompt re-routed");
        self.store.load().await;
        Ok(response)
    }

    pub async fn update_weights(&self) -> Result<WeightsUpdate, ActionError> {
        let update = self.api.update_weights().await.map_err(|e| {
            warn!("weight update failed: {e}");
            e
        })?;
        Ok(update)
    }

    /// Backend health plus the number of prompts it serves.
    pub async fn check(&self) -> Result<CheckReport, ApiError> {
        let health = self.api.health().await?;
        let prompts = self.api.fetch_prompts().await?;
        Ok(CheckReport {
            status: health.status,
            prompt_count: prompts.len(),
        })
    }
}

fn selection_in(snap: &StoreSnapshot, selected: Option<i64>) -> SelectionView {
    let Some(id) = selected else {
        return SelectionView::Empty;
    };
    match (snap.data.prompt(id), snap.data.result_for(id)) {
        (Some(prompt), Some(result)) => SelectionView::Ready {
            prompt: prompt.clone(),
            result: result.clone(),
        },
        (Some(prompt), None) => SelectionView::NotRouted {
            prompt: prompt.clone(),
        },
        (None, _) => SelectionView::NoData { prompt_id: id },
    }
}

fn notice_for(snap: &StoreSnapshot) -> Option<String> {
    match &snap.source {
        DataSource::Demo { reason } => {
            Some(format!("Using demo data - API not available ({reason})"))
        }
        DataSource::Live | DataSource::Empty => None,
    }
}
