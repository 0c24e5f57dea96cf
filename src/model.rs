use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("routing-dashboard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api: ApiConfig,
    /// Commands the control view may start.
    pub commands: Vec<RunCommand>,
    /// Settle delay between a completed run and the data reload it triggers.
    #[serde(with = "humantime_serde")]
    pub reload_delay: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            commands: RunCommand::ALL.to_vec(),
            reload_delay: Duration::from_secs(1),
        }
    }
}

/// Orchestration commands understood by `POST /api/run-system`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum RunCommand {
    Run,
    Rerun,
    Test,
    RunGpt,
    RunClaude,
    RunMistral,
}

impl RunCommand {
    pub const ALL: [RunCommand; 6] = [
        RunCommand::Run,
        RunCommand::Rerun,
        RunCommand::Test,
        RunCommand::RunGpt,
        RunCommand::RunClaude,
        RunCommand::RunMistral,
    ];

    /// Value sent as `{"command": ...}`.
    pub fn wire_name(self) -> &'static str {
        match self {
            RunCommand::Run => "run",
            RunCommand::Rerun => "rerun",
            RunCommand::Test => "test",
            RunCommand::RunGpt => "run-gpt",
            RunCommand::RunClaude => "run-claude",
            RunCommand::RunMistral => "run-mistral",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RunCommand::Run => "Full Run (All Prompts)",
            RunCommand::Rerun => "Rerun (with Learning)",
            RunCommand::Test => "Quick Test (3 Prompts)",
            RunCommand::RunGpt => "GPT-4o Only",
            RunCommand::RunClaude => "Claude Only",
            RunCommand::RunMistral => "Mistral Only",
        }
    }
}

impl fmt::Display for RunCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: i64,
    #[serde(alias = "prompt")]
    pub text: String,
    #[serde(alias = "reference")]
    pub reference_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: String,
    /// Seconds.
    pub latency: f64,
    pub cost: f64,
    pub avg_score: f64,
    pub final_score: f64,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticOutput {
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub prompt_id: i64,
    pub chosen_model: String,
    pub model_scores: Vec<ModelScore>,
    pub critic_output: CriticOutput,
}

impl RoutingResult {
    /// Score entry of the chosen model, if the record is consistent.
    pub fn chosen_score(&self) -> Option<&ModelScore> {
        self.model_scores
            .iter()
            .find(|s| s.model == self.chosen_model)
    }

    pub fn is_well_formed(&self) -> bool {
        self.chosen_score().is_some()
    }
}

/// Prompts plus at most one routing result per prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    prompts: Vec<Prompt>,
    results: Vec<RoutingResult>,
}

impl ResultSet {
    pub fn new(prompts: Vec<Prompt>, results: Vec<RoutingResult>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut kept = Vec::with_capacity(results.len());
        for r in results {
            if seen.insert(r.prompt_id) {
                kept.push(r);
            } else {
                tracing::warn!(prompt_id = r.prompt_id, "dropping duplicate routing result");
            }
        }
        Self {
            prompts,
            results: kept,
        }
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn results(&self) -> &[RoutingResult] {
        &self.results
    }

    pub fn prompt(&self, id: i64) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    pub fn result_for(&self, prompt_id: i64) -> Option<&RoutingResult> {
        self.results.iter().find(|r| r.prompt_id == prompt_id)
    }
}

/// Backend-owned summary of one historical run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: String,
    pub prompts_count: u64,
    #[serde(default)]
    pub models_used: BTreeSet<String>,
    #[serde(default)]
    pub avg_score: Option<f64>,
    #[serde(default)]
    pub total_cost: f64,
}

impl RunSummary {
    /// Render the ISO-8601 timestamp for display; falls back to the raw string.
    pub fn display_timestamp(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        use time::macros::format_description;

        let out = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        if let Ok(ts) = time::OffsetDateTime::parse(&self.timestamp, &Rfc3339) {
            return ts.format(&out).unwrap_or_else(|_| self.timestamp.clone());
        }
        // The backend writes naive local timestamps (no offset, optional fraction).
        let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        let whole_seconds = self
            .timestamp
            .split_once('.')
            .map(|(head, _)| head)
            .unwrap_or(&self.timestamp);
        match time::PrimitiveDateTime::parse(whole_seconds, &naive) {
            Ok(ts) => ts.format(&out).unwrap_or_else(|_| self.timestamp.clone()),
            Err(_) => self.timestamp.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Failed,
}

/// One event from `GET /api/run-output/{run_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunEvent {
    Output {
        data: String,
    },
    Status {
        status: RunOutcome,
        #[serde(default)]
        return_code: Option<i32>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteRunStatus {
    Running,
    Completed,
    Failed,
}

/// `GET /api/run-status/{run_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusReport {
    pub run_id: String,
    pub status: RemoteRunStatus,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub return_code: Option<i32>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// `POST /api/route-prompt/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub model: String,
    pub answer: String,
    pub latency_ms: f64,
    pub tokens: u64,
    pub estimated_cost: f64,
    #[serde(default)]
    pub critic_score: Option<f64>,
    #[serde(default)]
    pub critic_rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsUpdate {
    pub message: String,
    #[serde(default)]
    pub weights: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}
