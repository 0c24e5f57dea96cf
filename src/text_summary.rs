//! Text summary builder for CLI output.
//!
//! Formats the dashboard views as human-readable lines for text mode.

use crate::dashboard::{CheckReport, ControlView, DashboardView, HistoryView, SelectionView, View};
use crate::model::{RouteResponse, WeightsUpdate};

/// Longest prompt or answer excerpt shown on one line.
const EXCERPT_CHARS: usize = 80;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{cut}...")
}

pub(crate) fn build_view_summary(view: &View) -> TextSummary {
    match view {
        View::Dashboard(v) => build_dashboard_summary(v),
        View::Control(v) => build_control_summary(v),
        View::History(v) => build_history_summary(v),
    }
}

pub(crate) fn build_dashboard_summary(view: &DashboardView) -> TextSummary {
    let mut lines: Vec<String> = view.notice.iter().cloned().collect();

    lines.push(format!("Prompts: {}", view.prompts.len()));
    for p in &view.prompts {
        let chosen = p.chosen_model.as_deref().unwrap_or("-");
        lines.push(format!("  #{:<4} {:<10} {}", p.id, chosen, excerpt(&p.text)));
    }

    match &view.selection {
        SelectionView::Ready { prompt, result } => {
            lines.push(format!("Selected prompt #{}: {}", prompt.id, excerpt(&prompt.text)));
            lines.push(format!("  Chosen model: {}", result.chosen_model));
            for s in &result.model_scores {
                let mark = if s.model == result.chosen_model { "*" } else { " " };
                lines.push(format!(
                    " {mark} {:<10} score {:.1} latency {:.2}s cost ${:.4}",
                    s.model, s.final_score, s.latency, s.cost
                ));
            }
            lines.push(format!(
                "  Critic: {:.1}/10 {}",
                result.critic_output.score,
                excerpt(&result.critic_output.rationale)
            ));
        }
        SelectionView::NotRouted { prompt } => {
            lines.push(format!("Selected prompt #{}: not routed yet", prompt.id));
        }
        SelectionView::NoData { prompt_id } => {
            lines.push(format!("Selected prompt #{prompt_id}: no data for selection"));
        }
        SelectionView::Empty => lines.push("No prompts loaded".into()),
    }

    let report = &view.report;
    if !report.distribution.is_empty() {
        lines.push("Model distribution:".into());
        for share in &report.distribution {
            lines.push(format!(
                "  {:<10} {:>3} ({:.1}%)",
                share.model, share.count, share.percentage
            ));
        }
    }
    if !report.performance.is_empty() {
        lines.push("Model performance:".into());
        for m in &report.performance {
            lines.push(format!(
                "  {:<10} score {:.2} latency {:.2}s cost ${:.4} chosen {}",
                m.model, m.avg_final_score, m.avg_latency, m.avg_cost, m.times_chosen
            ));
        }
    }
    if let Some(insights) = &report.insights {
        lines.push(format!("Total results: {}", insights.total_results));
        if let Some(top) = &insights.most_chosen {
            lines.push(format!("Most chosen: {} ({:.1}%)", top.model, top.percentage));
        }
        if let Some(best) = &insights.best_average_score {
            lines.push(format!("Best average score: {} ({:.2})", best.model, best.value));
        }
        if let Some(fast) = &insights.fastest_average_latency {
            lines.push(format!("Fastest average latency: {} ({:.2}s)", fast.model, fast.value));
        }
    }
    if let Some(avg) = report.average_critic_score {
        lines.push(format!("Average critic score: {avg:.2}"));
    }
    for w in &report.warnings {
        lines.push(format!("Warning: {w}"));
    }

    TextSummary { lines }
}

pub(crate) fn build_history_summary(view: &HistoryView) -> TextSummary {
    let mut lines: Vec<String> = view.notice.iter().cloned().collect();
    if let Some(latest) = view.latest_run.as_deref() {
        lines.push(format!("Latest run: {latest}"));
    }
    lines.push(format!(
        "Runs: {}",
        view.total_runs.unwrap_or(view.runs.len() as u64)
    ));
    if view.runs.is_empty() {
        lines.push("No run history".into());
    }
    for r in &view.runs {
        let avg = r
            .avg_score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".into());
        lines.push(format!(
            "  {}  {}  prompts {}  avg {}  cost ${:.4}  [{}]",
            r.started,
            r.run_id,
            r.prompts_count,
            avg,
            r.total_cost,
            r.models_used.join(", ")
        ));
    }
    TextSummary { lines }
}

pub(crate) fn build_control_summary(view: &ControlView) -> TextSummary {
    let mut lines = Vec::new();
    let mut status = format!("Run status: {}", view.phase);
    if let Some(cmd) = view.command {
        status.push_str(&format!(" ({cmd})"));
    }
    if let Some(id) = view.run_id.as_deref() {
        status.push_str(&format!(" run {id}"));
    }
    lines.push(status);
    lines.push("Commands:".into());
    for c in &view.commands {
        lines.push(format!("  {:<12} {}", c.command, c.label));
    }
    if !view.output.is_empty() {
        lines.push("Output:".into());
        lines.extend(view.output.iter().cloned());
    }
    TextSummary { lines }
}

pub(crate) fn build_route_summary(resp: &RouteResponse) -> TextSummary {
    let mut lines = vec![
        format!("Routed to: {}", resp.model),
        format!(
            "Latency {:.0} ms, {} tokens, est. cost ${:.4}",
            resp.latency_ms, resp.tokens, resp.estimated_cost
        ),
    ];
    if let Some(score) = resp.critic_score {
        lines.push(format!("Critic score: {score:.1}/10"));
    }
    if let Some(rationale) = resp.critic_rationale.as_deref() {
        lines.push(format!("Critic: {}", excerpt(rationale)));
    }
    lines.push(format!("Answer: {}", excerpt(&resp.answer)));
    TextSummary { lines }
}

pub(crate) fn build_weights_summary(update: &WeightsUpdate) -> TextSummary {
    let mut lines = vec![update.message.clone()];
    if let Some(map) = update.weights.as_object() {
        for (k, v) in map {
            lines.push(format!("  {k}: {v}"));
        }
    }
    TextSummary { lines }
}

pub(crate) fn build_check_summary(report: &CheckReport) -> TextSummary {
    TextSummary {
        lines: vec![
            format!("API status: {}", report.status),
            format!("Prompts available: {}", report.prompt_count),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ResultsReport;
    use crate::dashboard::PromptRow;
    use crate::fixtures::demo_result_set;

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n  b"), "a b");
        let long = "x".repeat(100);
        let out = excerpt(&long);
        assert_eq!(out.chars().count(), EXCERPT_CHARS + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn dashboard_summary_lists_selection_and_stats() {
        let data = demo_result_set();
        let prompt = data.prompts()[0].clone();
        let result = data.result_for(prompt.id).unwrap().clone();
        let view = DashboardView {
            notice: None,
            prompts: vec![PromptRow {
                id: prompt.id,
                text: prompt.text.clone(),
                chosen_model: Some(result.chosen_model.clone()),
            }],
            selection: SelectionView::Ready { prompt, result },
            report: ResultsReport::build(data.results()),
        };
        let lines = build_dashboard_summary(&view).lines;
        assert_eq!(lines[0], "Prompts: 1");
        assert!(lines.iter().any(|l| l == "  Chosen model: claude"));
        assert!(lines.iter().any(|l| l.starts_with("Model distribution:")));
        assert!(lines.iter().any(|l| l.starts_with("Average critic score:")));
        assert!(!lines.iter().any(|l| l.starts_with("Warning:")));
    }

    #[test]
    fn missing_selection_is_spelled_out() {
        let view = DashboardView {
            notice: None,
            prompts: vec![],
            selection: SelectionView::NoData { prompt_id: 9 },
            report: ResultsReport::build(&[]),
        };
        let lines = build_dashboard_summary(&view).lines;
        assert!(lines.contains(&"Selected prompt #9: no data for selection".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("Total results")));
    }

    #[test]
    fn demo_notice_leads_dashboard_and_history() {
        let notice = "Using demo data - API not available (connection refused)".to_string();
        let dashboard = DashboardView {
            notice: Some(notice.clone()),
            prompts: vec![],
            selection: SelectionView::Empty,
            report: ResultsReport::build(&[]),
        };
        let lines = build_dashboard_summary(&dashboard).lines;
        assert_eq!(lines[0], notice);
        assert_eq!(lines[1], "Prompts: 0");

        let history = HistoryView {
            notice: Some(notice.clone()),
            latest_run: None,
            total_runs: None,
            runs: vec![],
        };
        let lines = build_history_summary(&history).lines;
        assert_eq!(lines, [notice, "Runs: 0".into(), "No run history".into()]);
    }
}
