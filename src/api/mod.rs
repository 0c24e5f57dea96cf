//! Access to the routing backend.
//!
//! Everything the dashboard needs from the backend goes through [`RoutingApi`]; the HTTP
//! implementation lives in `http`, the event-stream framing in `sse`.

#[cfg(test)]
pub(crate) mod fakes;
mod http;
pub(crate) mod sse;

use crate::error::ApiError;
use crate::model::{
    HealthReport, Prompt, ResultSet, RouteResponse, RunCommand, RunEvent, RunStatusReport,
    RunSummary, WeightsUpdate,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use http::HttpRoutingApi;

/// Live output of one run, in delivery order.
pub type EventStream = BoxStream<'static, Result<RunEvent, ApiError>>;

/// Body of `GET /api/results`.
#[derive(Debug, Clone, Default)]
pub struct ResultsPayload {
    pub data: ResultSet,
    pub latest_run: Option<String>,
    pub total_runs: Option<u64>,
}

#[async_trait]
pub trait RoutingApi: Send + Sync {
    async fn fetch_results(&self) -> Result<ResultsPayload, ApiError>;

    async fn fetch_prompts(&self) -> Result<Vec<Prompt>, ApiError>;

    async fn fetch_runs(&self) -> Result<Vec<RunSummary>, ApiError>;

    async fn route_prompt(
        &self,
        prompt_id: i64,
        model: Option<&str>,
    ) -> Result<RouteResponse, ApiError>;

    async fn update_weights(&self) -> Result<WeightsUpdate, ApiError>;

    /// Ask the backend to start `command`; returns the run id to subscribe to.
    async fn start_run(&self, command: RunCommand) -> Result<String, ApiError>;

    async fn run_status(&self, run_id: &str) -> Result<RunStatusReport, ApiError>;

    async fn health(&self) -> Result<HealthReport, ApiError>;

    async fn subscribe_output(&self, run_id: &str) -> Result<EventStream, ApiError>;
}
