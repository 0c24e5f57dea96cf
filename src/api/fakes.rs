//! Scripted in-memory backend and a throwaway HTTP server (testing only).

use super::{EventStream, ResultsPayload, RoutingApi};
use crate::error::ApiError;
use crate::model::{
    HealthReport, Prompt, RouteResponse, RunCommand, RunEvent, RunStatusReport, RunSummary,
    WeightsUpdate,
};
use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Backend double with queued responses and a call log.
///
/// Unscripted calls fail with a protocol error so a test notices what it forgot.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    results: Mutex<VecDeque<(Duration, Result<ResultsPayload, ApiError>)>>,
    default_results: Mutex<Option<Result<ResultsPayload, ApiError>>>,
    runs: Mutex<Option<Result<Vec<RunSummary>, ApiError>>>,
    starts: Mutex<VecDeque<Result<String, ApiError>>>,
    streams: Mutex<HashMap<String, EventStream>>,
    subscribe_errors: Mutex<HashMap<String, ApiError>>,
    statuses: Mutex<VecDeque<Result<RunStatusReport, ApiError>>>,
    routes: Mutex<VecDeque<Result<RouteResponse, ApiError>>>,
    calls: Mutex<Vec<String>>,
}

fn unscripted<T>(what: &str) -> Result<T, ApiError> {
    Err(ApiError::protocol("fake://", format!("unscripted call: {what}")))
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every results call with `payload` unless a queued response is pending.
    pub fn with_results(self, payload: Result<ResultsPayload, ApiError>) -> Self {
        *self.default_results.lock().unwrap() = Some(payload);
        self
    }

    pub fn queue_results(&self, delay: Duration, payload: Result<ResultsPayload, ApiError>) {
        self.results.lock().unwrap().push_back((delay, payload));
    }

    pub fn with_runs(self, runs: Result<Vec<RunSummary>, ApiError>) -> Self {
        *self.runs.lock().unwrap() = Some(runs);
        self
    }

    pub fn queue_start(&self, response: Result<String, ApiError>) {
        self.starts.lock().unwrap().push_back(response);
    }

    /// Finite stream that ends after the given items.
    pub fn script_stream(&self, run_id: &str, items: Vec<Result<RunEvent, ApiError>>) {
        self.streams
            .lock()
            .unwrap()
            .insert(run_id.to_string(), futures::stream::iter(items).boxed());
    }

    /// Stream fed by the test; it ends when the returned sender is dropped.
    pub fn live_stream(&self, run_id: &str) -> fmpsc::UnboundedSender<Result<RunEvent, ApiError>> {
        let (tx, rx) = fmpsc::unbounded();
        self.streams
            .lock()
            .unwrap()
            .insert(run_id.to_string(), rx.boxed());
        tx
    }

    /// Make opening the output stream of `run_id` fail with `err`.
    pub fn fail_subscribe(&self, run_id: &str, err: ApiError) {
        self.subscribe_errors
            .lock()
            .unwrap()
            .insert(run_id.to_string(), err);
    }

    pub fn queue_status(&self, report: Result<RunStatusReport, ApiError>) {
        self.statuses.lock().unwrap().push_back(report);
    }

    pub fn queue_route(&self, response: Result<RouteResponse, ApiError>) {
        self.routes.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl RoutingApi for ScriptedApi {
    async fn fetch_results(&self) -> Result<ResultsPayload, ApiError> {
        self.record("results");
        let queued = self.results.lock().unwrap().pop_front();
        match queued {
            Some((delay, payload)) => {
                tokio::time::sleep(delay).await;
                payload
            }
            None => self
                .default_results
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| unscripted("results")),
        }
    }

    async fn fetch_prompts(&self) -> Result<Vec<Prompt>, ApiError> {
        self.record("prompts");
        match self.default_results.lock().unwrap().clone() {
            Some(Ok(payload)) => Ok(payload.data.prompts().to_vec()),
            Some(Err(e)) => Err(e),
            None => unscripted("prompts"),
        }
    }

    async fn fetch_runs(&self) -> Result<Vec<RunSummary>, ApiError> {
        self.record("runs");
        self.runs
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn route_prompt(
        &self,
        prompt_id: i64,
        model: Option<&str>,
    ) -> Result<RouteResponse, ApiError> {
        self.record(match model {
            Some(m) => format!("route {prompt_id} {m}"),
            None => format!("route {prompt_id}"),
        });
        let next = self.routes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("route-prompt"))
    }

    async fn update_weights(&self) -> Result<WeightsUpdate, ApiError> {
        self.record("update-weights");
        Ok(WeightsUpdate {
            message: "Weights updated successfully".into(),
            weights: serde_json::json!({"quality": 0.6}),
        })
    }

    async fn start_run(&self, command: RunCommand) -> Result<String, ApiError> {
        self.record(format!("start {command}"));
        let next = self.starts.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("run-system"))
    }

    async fn run_status(&self, run_id: &str) -> Result<RunStatusReport, ApiError> {
        self.record(format!("status {run_id}"));
        let next = self.statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("run-status"))
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        self.record("health");
        Ok(HealthReport {
            status: "healthy".into(),
            timestamp: None,
        })
    }

    async fn subscribe_output(&self, run_id: &str) -> Result<EventStream, ApiError> {
        self.record(format!("subscribe {run_id}"));
        if let Some(err) = self.subscribe_errors.lock().unwrap().remove(run_id) {
            return Err(err);
        }
        let stream = self.streams.lock().unwrap().remove(run_id);
        stream.map_or_else(|| unscripted("run-output"), Ok)
    }
}

/// Serve one canned HTTP response per connection for the rest of the test.
pub(crate) async fn stub_server(
    status: &'static str,
    content_type: &'static str,
    body: String,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut req = Vec::new();
                let mut buf = [0u8; 1024];
                while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => req.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = sock.write_all(head.as_bytes()).await;
                let _ = sock.write_all(body.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}
