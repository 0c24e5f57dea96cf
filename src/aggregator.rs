//! Routing analytics.
//!
//! Pure functions over a slice of routing results. Nothing here holds state; the dashboard
//! re-evaluates them on every read. Ordering is always first-encountered in input order so
//! that ties resolve the same way on every call.

use crate::error::{DataIntegrityWarning, EmptyInputError, IntegrityIssue};
use crate::model::RoutingResult;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelShare {
    pub model: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPerformance {
    pub model: String,
    pub avg_latency: f64,
    pub avg_cost: f64,
    pub avg_final_score: f64,
    pub times_chosen: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leader {
    pub model: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryInsights {
    pub total_results: usize,
    pub most_chosen: Option<ModelShare>,
    pub best_average_score: Option<Leader>,
    pub fastest_average_latency: Option<Leader>,
}

/// Arithmetic mean; zero samples is an error, never NaN.
pub fn mean(values: &[f64]) -> Result<f64, EmptyInputError> {
    if values.is_empty() {
        return Err(EmptyInputError);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Share of results won by each chosen model, in first-seen order.
///
/// Malformed results (chosen model absent from their scores) are not counted, and the
/// percentages are relative to the well-formed results only.
pub fn model_distribution(results: &[RoutingResult]) -> Vec<ModelShare> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in results.iter().filter(|r| r.is_well_formed()) {
        let slot = counts.entry(r.chosen_model.as_str()).or_insert_with(|| {
            order.push(r.chosen_model.as_str());
            0
        });
        *slot += 1;
    }

    let total: usize = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }
    order
        .into_iter()
        .map(|model| {
            let count = counts[model];
            ModelShare {
                model: model.to_string(),
                count,
                percentage: 100.0 * count as f64 / total as f64,
            }
        })
        .collect()
}

#[derive(Default)]
struct Observations {
    latency: Vec<f64>,
    cost: Vec<f64>,
    final_score: Vec<f64>,
}

/// Mean latency, cost and final score per model over every score entry, plus how often each
/// model was the chosen one.
pub fn per_model_performance(results: &[RoutingResult]) -> Vec<ModelPerformance> {
    let mut order: Vec<&str> = Vec::new();
    let mut observed: HashMap<&str, Observations> = HashMap::new();
    for score in results.iter().flat_map(|r| r.model_scores.iter()) {
        let obs = observed.entry(score.model.as_str()).or_insert_with(|| {
            order.push(score.model.as_str());
            Observations::default()
        });
        obs.latency.push(score.latency);
        obs.cost.push(score.cost);
        obs.final_score.push(score.final_score);
    }

    let mut chosen: HashMap<&str, usize> = HashMap::new();
    for r in results.iter().filter(|r| r.is_well_formed()) {
        *chosen.entry(r.chosen_model.as_str()).or_default() += 1;
    }

    order
        .into_iter()
        .filter_map(|model| {
            let obs = &observed[model];
            Some(ModelPerformance {
                model: model.to_string(),
                avg_latency: mean(&obs.latency).ok()?,
                avg_cost: mean(&obs.cost).ok()?,
                avg_final_score: mean(&obs.final_score).ok()?,
                times_chosen: chosen.get(model).copied().unwrap_or(0),
            })
        })
        .collect()
}

/// Headline facts for the summary card. `None` for an empty result set.
pub fn summary_insights(results: &[RoutingResult]) -> Option<SummaryInsights> {
    if results.is_empty() {
        return None;
    }
    let distribution = model_distribution(results);
    let performance = per_model_performance(results);

    // Strict comparisons keep the earliest entry on ties.
    let most_chosen = distribution
        .iter()
        .fold(None::<&ModelShare>, |best, s| match best {
            Some(b) if b.count >= s.count => Some(b),
            _ => Some(s),
        })
        .cloned();
    let best_average_score = performance
        .iter()
        .fold(None::<&ModelPerformance>, |best, p| match best {
            Some(b) if b.avg_final_score >= p.avg_final_score => Some(b),
            _ => Some(p),
        })
        .map(|p| Leader {
            model: p.model.clone(),
            value: p.avg_final_score,
        });
    let fastest_average_latency = performance
        .iter()
        .fold(None::<&ModelPerformance>, |best, p| match best {
            Some(b) if b.avg_latency <= p.avg_latency => Some(b),
            _ => Some(p),
        })
        .map(|p| Leader {
            model: p.model.clone(),
            value: p.avg_latency,
        });

    Some(SummaryInsights {
        total_results: results.len(),
        most_chosen,
        best_average_score,
        fastest_average_latency,
    })
}

pub fn average_critic_score(results: &[RoutingResult]) -> Result<f64, EmptyInputError> {
    let scores: Vec<f64> = results.iter().map(|r| r.critic_output.score).collect();
    mean(&scores)
}

/// One warning per inconsistent record, plus range violations on individual values.
pub fn integrity_warnings(results: &[RoutingResult]) -> Vec<DataIntegrityWarning> {
    let mut out = Vec::new();
    for r in results {
        if r.model_scores.is_empty() {
            out.push(DataIntegrityWarning {
                prompt_id: r.prompt_id,
                issue: IntegrityIssue::EmptyModelScores,
            });
        } else if !r.is_well_formed() {
            out.push(DataIntegrityWarning {
                prompt_id: r.prompt_id,
                issue: IntegrityIssue::ChosenModelMissing {
                    chosen_model: r.chosen_model.clone(),
                },
            });
        }

        for s in &r.model_scores {
            let checks = [
                ("latency", s.latency, s.latency >= 0.0),
                ("cost", s.cost, s.cost >= 0.0),
                ("avg_score", s.avg_score, (0.0..=10.0).contains(&s.avg_score)),
                (
                    "final_score",
                    s.final_score,
                    (0.0..=10.0).contains(&s.final_score),
                ),
            ];
            for (field, value, ok) in checks {
                if !ok {
                    out.push(DataIntegrityWarning {
                        prompt_id: r.prompt_id,
                        issue: IntegrityIssue::ValueOutOfRange {
                            model: s.model.clone(),
                            field,
                            value,
                        },
                    });
                }
            }
        }
    }
    out
}

/// Everything the dashboard shows about a result set, computed in one pass of reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsReport {
    pub distribution: Vec<ModelShare>,
    pub performance: Vec<ModelPerformance>,
    pub insights: Option<SummaryInsights>,
    pub average_critic_score: Option<f64>,
    pub warnings: Vec<DataIntegrityWarning>,
}

impl ResultsReport {
    pub fn build(results: &[RoutingResult]) -> Self {
        Self {
            distribution: model_distribution(results),
            performance: per_model_performance(results),
            insights: summary_insights(results),
            average_critic_score: average_critic_score(results).ok(),
            warnings: integrity_warnings(results),
        }
    }
}
