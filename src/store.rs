//! Current prompts, routing results and run history.
//!
//! The store hands out immutable snapshots; a load replaces the whole snapshot at once.

use crate::api::RoutingApi;
use crate::error::ApiError;
use crate::fixtures;
use crate::model::{ResultSet, RunSummary};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// Nothing loaded yet.
    Empty,
    Live,
    /// The backend was unavailable; the bundled fixtures are shown instead.
    Demo { reason: String },
}

#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub data: ResultSet,
    pub runs: Vec<RunSummary>,
    pub source: DataSource,
    pub latest_run: Option<String>,
    pub total_runs: Option<u64>,
    ticket: u64,
}

impl StoreSnapshot {
    fn empty() -> Self {
        Self {
            data: ResultSet::default(),
            runs: Vec::new(),
            source: DataSource::Empty,
            latest_run: None,
            total_runs: None,
            ticket: 0,
        }
    }
}

/// What a call to [`ResultStore::load`] ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub source: DataSource,
    /// False when a load that started later had already been installed.
    pub installed: bool,
}

pub struct ResultStore {
    api: Arc<dyn RoutingApi>,
    current: RwLock<Arc<StoreSnapshot>>,
    next_ticket: AtomicU64,
}

impl ResultStore {
    pub fn new(api: Arc<dyn RoutingApi>) -> Self {
        Self {
            api,
            current: RwLock::new(Arc::new(StoreSnapshot::empty())),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fetch results and run history, falling back to the demo dataset on any failure.
    ///
    /// Never fails. Concurrent loads are fine: a response is dropped if a load that started
    /// after it has already been installed.
    pub async fn load(&self) -> LoadOutcome {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        debug!(ticket, "loading dashboard data");

        let (results, runs) = futures::join!(self.api.fetch_results(), self.api.fetch_runs());
        let snapshot = match combine(results, runs) {
            Ok((payload, runs)) => StoreSnapshot {
                data: payload.data,
                runs,
                source: DataSource::Live,
                latest_run: payload.latest_run,
                total_runs: payload.total_runs,
                ticket,
            },
            Err(e) => {
                warn!("falling back to demo data: {e}");
                StoreSnapshot {
                    data: fixtures::demo_result_set(),
                    runs: Vec::new(),
                    source: DataSource::Demo {
                        reason: e.to_string(),
                    },
                    latest_run: None,
                    total_runs: None,
                    ticket,
                }
            }
        };

        let source = snapshot.source.clone();
        let installed = self.install(snapshot);
        LoadOutcome { source, installed }
    }

    fn install(&self, snapshot: StoreSnapshot) -> bool {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if current.ticket > snapshot.ticket {
            info!(
                stale = snapshot.ticket,
                installed = current.ticket,
                "discarding stale load"
            );
            return false;
        }
        *current = Arc::new(snapshot);
        true
    }
}

fn combine<A, B>(
    a: Result<A, ApiError>,
    b: Result<B, ApiError>,
) -> Result<(A, B), ApiError> {
    Ok((a?, b?))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aggregator::tests::{result, score};
    use crate::api::fakes::{stub_server, ScriptedApi};
    use crate::api::{HttpRoutingApi, ResultsPayload};
    use crate::model::{ApiConfig, Prompt};
    use std::time::Duration;

    pub(crate) fn live_payload(ids: &[i64]) -> ResultsPayload {
        let prompts = ids
            .iter()
            .map(|id| Prompt {
                id: *id,
                text: format!("prompt {id}"),
                reference_answer: format!("reference {id}"),
            })
            .collect();
        let results = ids
            .iter()
            .map(|id| result(*id, "claude", vec![score("claude", 0.8, 0.003, 8.2)]))
            .collect();
        ResultsPayload {
            data: ResultSet::new(prompts, results),
            latest_run: Some("api_run_1".into()),
            total_runs: Some(ids.len() as u64),
        }
    }

    #[tokio::test]
    async fn live_load_installs_backend_data() {
        let api = Arc::new(ScriptedApi::new().with_results(Ok(live_payload(&[1, 2, 3]))));
        let store = ResultStore::new(api);
        assert_eq!(store.snapshot().source, DataSource::Empty);

        let outcome = store.load().await;
        assert_eq!(outcome.source, DataSource::Live);
        assert!(outcome.installed);
        let snap = store.snapshot();
        assert_eq!(snap.data.prompts().len(), 3);
        assert_eq!(snap.latest_run.as_deref(), Some("api_run_1"));
    }

    #[tokio::test]
    async fn failed_history_fetch_also_falls_back() {
        let api = Arc::new(
            ScriptedApi::new()
                .with_results(Ok(live_payload(&[1])))
                .with_runs(Err(ApiError::transport("http://x/api/runs", "refused"))),
        );
        let store = ResultStore::new(api);
        let outcome = store.load().await;
        assert!(matches!(outcome.source, DataSource::Demo { .. }));
        assert!(matches!(store.snapshot().source, DataSource::Demo { .. }));
        assert_eq!(store.snapshot().data, fixtures::demo_result_set());
    }

    #[tokio::test]
    async fn http_500_installs_demo_data() {
        let base = stub_server(
            "500 Internal Server Error",
            "application/json",
            r#"{"detail":"boom"}"#.to_string(),
        )
        .await;
        let api = HttpRoutingApi::new(&ApiConfig {
            base_url: base,
            ..ApiConfig::default()
        })
        .unwrap();
        let store = ResultStore::new(Arc::new(api));

        let outcome = store.load().await;
        match &outcome.source {
            DataSource::Demo { reason } => assert!(reason.contains("500")),
            other => panic!("expected demo data, got {other:?}"),
        }
        let snap = store.snapshot();
        assert_eq!(snap.data.prompts().len(), 2);
        assert!(snap.runs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_does_not_overwrite_newer_one() {
        let api = Arc::new(ScriptedApi::new());
        api.queue_results(Duration::from_millis(500), Ok(live_payload(&[1])));
        api.queue_results(Duration::from_millis(10), Ok(live_payload(&[1, 2])));
        let store = ResultStore::new(api);

        let (first, second) = tokio::join!(store.load(), store.load());
        assert!(second.installed);
        assert!(!first.installed);
        assert_eq!(store.snapshot().data.prompts().len(), 2);
    }

    #[tokio::test]
    async fn later_load_replaces_earlier_one() {
        let api = Arc::new(ScriptedApi::new());
        api.queue_results(Duration::ZERO, Ok(live_payload(&[1])));
        api.queue_results(Duration::ZERO, Ok(live_payload(&[1, 2, 3, 4])));
        let store = ResultStore::new(api);

        assert!(store.load().await.installed);
        assert!(store.load().await.installed);
        assert_eq!(store.snapshot().data.prompts().len(), 4);
    }
}
