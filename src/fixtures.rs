//! Demo dataset shown when the backend cannot be reached.

use crate::model::{Prompt, ResultSet, RoutingResult};
use serde::Deserialize;

const DEMO_RESULTS: &str = include_str!("../assets/demo_results.json");

#[derive(Deserialize)]
struct DemoFile {
    prompts: Vec<Prompt>,
    results: Vec<RoutingResult>,
}

/// The bundled two-prompt dataset.
pub fn demo_result_set() -> ResultSet {
    match serde_json::from_str::<DemoFile>(DEMO_RESULTS) {
        Ok(f) => ResultSet::new(f.prompts, f.results),
        Err(e) => {
            tracing::error!("bundled demo dataset is unreadable: {e}");
            ResultSet::default()
        }
    }
}
