use super::sse::{decode_event, SseDecoder};
use super::{EventStream, ResultsPayload, RoutingApi};
use crate::error::ApiError;
use crate::model::{
    ApiConfig, HealthReport, Prompt, ResultSet, RouteResponse, RoutingResult, RunCommand,
    RunEvent, RunStatusReport, RunSummary, WeightsUpdate,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Longest slice of an error body quoted back in a protocol error.
const MAX_ERROR_BODY: usize = 300;

#[derive(Deserialize)]
struct ResultsBody {
    prompts: Vec<Prompt>,
    results: Vec<RoutingResult>,
    #[serde(default)]
    latest_run: Option<String>,
    #[serde(default)]
    total_runs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PromptsBody {
    Wrapped { prompts: Vec<Prompt> },
    Bare(Vec<Prompt>),
}

#[derive(Deserialize)]
struct RunsBody {
    runs: Vec<RunSummary>,
}

#[derive(Deserialize)]
struct StartedRun {
    run_id: String,
}

#[derive(Deserialize)]
struct FastApiError {
    detail: serde_json::Value,
}

/// `RoutingApi` over HTTP+JSON.
#[derive(Debug, Clone)]
pub struct HttpRoutingApi {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpRoutingApi {
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        // No client-wide timeout: the output stream stays open for the whole run.
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.connect_timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            request_timeout: cfg.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ApiError::transport(&url, e))?;
        decode_json(&url, resp).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<T, ApiError> {
        debug!(%url, "POST");
        let resp = req
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ApiError::transport(url, e))?;
        decode_json(url, resp).await
    }
}

async fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<FastApiError>(&body) {
        Ok(FastApiError {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(FastApiError { detail }) => detail.to_string(),
        Err(_) => body.chars().take(MAX_ERROR_BODY).collect(),
    };
    Err(ApiError::protocol(url, format!("HTTP {status}: {detail}")))
}

async fn decode_json<T: DeserializeOwned>(url: &str, resp: reqwest::Response) -> Result<T, ApiError> {
    let resp = check_status(url, resp).await?;
    let bytes = resp.bytes().await.map_err(|e| ApiError::transport(url, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::protocol(url, format!("malformed response body: {e}")))
}

#[async_trait]
impl RoutingApi for HttpRoutingApi {
    async fn fetch_results(&self) -> Result<ResultsPayload, ApiError> {
        let body: ResultsBody = self.get_json("results").await?;
        Ok(ResultsPayload {
            data: ResultSet::new(body.prompts, body.results),
            latest_run: body.latest_run,
            total_runs: body.total_runs,
        })
    }

    async fn fetch_prompts(&self) -> Result<Vec<Prompt>, ApiError> {
        Ok(match self.get_json::<PromptsBody>("prompts").await? {
            PromptsBody::Wrapped { prompts } | PromptsBody::Bare(prompts) => prompts,
        })
    }

    async fn fetch_runs(&self) -> Result<Vec<RunSummary>, ApiError> {
        let body: RunsBody = self.get_json("runs").await?;
        Ok(body.runs)
    }

    async fn route_prompt(
        &self,
        prompt_id: i64,
        model: Option<&str>,
    ) -> Result<RouteResponse, ApiError> {
        let url = self.url(&format!("route-prompt/{prompt_id}"));
        let mut req = self.http.post(&url);
        if let Some(m) = model {
            req = req.query(&[("model", m)]);
        }
        self.post_json(req, &url).await
    }

    async fn update_weights(&self) -> Result<WeightsUpdate, ApiError> {
        let url = self.url("update-weights");
        self.post_json(self.http.post(&url), &url).await
    }

    async fn start_run(&self, command: RunCommand) -> Result<String, ApiError> {
        let url = self.url("run-system");
        let req = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "command": command.wire_name() }));
        let started: StartedRun = self.post_json(req, &url).await?;
        Ok(started.run_id)
    }

    async fn run_status(&self, run_id: &str) -> Result<RunStatusReport, ApiError> {
        self.get_json(&format!("run-status/{run_id}")).await
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        self.get_json("health").await
    }

    async fn subscribe_output(&self, run_id: &str) -> Result<EventStream, ApiError> {
        let url = self.url(&format!("run-output/{run_id}"));
        debug!(%url, "subscribing to run output");
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ApiError::transport(&url, e))?;
        let resp = check_status(&url, resp).await?;

        let body = Box::pin(resp.bytes_stream());
        let state = (body, SseDecoder::default(), VecDeque::new(), false);
        let events = futures::stream::unfold(state, move |(mut body, mut decoder, mut ready, mut done)| {
            let url = url.clone();
            async move {
                loop {
                    if let Some(item) = ready.pop_front() {
                        return Some((item, (body, decoder, ready, done)));
                    }
                    if done {
                        return None;
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            for payload in decoder.push(&chunk) {
                                ready.push_back(decode_event(&url, &payload));
                            }
                        }
                        Some(Err(e)) => {
                            ready.push_back(Err::<RunEvent, _>(ApiError::transport(&url, e)));
                            done = true;
                        }
                        None => {
                            if let Some(payload) = decoder.finish() {
                                ready.push_back(decode_event(&url, &payload));
                            }
                            done = true;
                        }
                    }
                }
            }
        });
        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fakes::stub_server;
    use crate::model::RunOutcome;
    use tokio::net::TcpListener;

    fn api(base_url: String) -> HttpRoutingApi {
        HttpRoutingApi::new(&ApiConfig {
            base_url,
            ..ApiConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn server_error_is_a_protocol_error_with_detail() {
        let base = stub_server(
            "500 Internal Server Error",
            "application/json",
            r#"{"detail":"database is locked"}"#.to_string(),
        )
        .await;
        let err = api(base).fetch_results().await.unwrap_err();
        match err {
            ApiError::Protocol { detail, .. } => {
                assert!(detail.contains("500"));
                assert!(detail.contains("database is locked"));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = api(format!("http://{addr}")).fetch_runs().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_protocol_error() {
        let base = stub_server("200 OK", "application/json", "{\"runs\": 3}".to_string()).await;
        let err = api(base).fetch_runs().await.unwrap_err();
        assert!(matches!(err, ApiError::Protocol { .. }));
    }

    #[tokio::test]
    async fn bare_prompt_list_is_accepted() {
        let base = stub_server(
            "200 OK",
            "application/json",
            r#"[{"id":1,"prompt":"q","reference":"a"}]"#.to_string(),
        )
        .await;
        let prompts = api(base).fetch_prompts().await.unwrap();
        assert_eq!(prompts[0].text, "q");
    }

    #[tokio::test]
    async fn output_stream_yields_events_in_order() {
        let body = [
            r#"data: {"type": "output", "data": "a"}"#,
            "",
            r#"data: {"type": "output", "data": "b"}"#,
            "",
            r#"data: {"type": "status", "status": "completed", "return_code": 0}"#,
            "",
            "",
        ]
        .join("\n");
        let base = stub_server("200 OK", "text/event-stream", body).await;
        let events: Vec<_> = api(base)
            .subscribe_output("api_run_1")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                Ok(RunEvent::Output { data: "a".into() }),
                Ok(RunEvent::Output { data: "b".into() }),
                Ok(RunEvent::Status {
                    status: RunOutcome::Completed,
                    return_code: Some(0)
                }),
            ]
        );
    }
}
