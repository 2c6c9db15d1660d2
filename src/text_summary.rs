//! Text summary builder for headless output.
//!
//! Formats the run result into human-readable lines for text mode.

use crate::engine::PipelineRun;
use crate::viewmodel::{self, ResultsView};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a completed pipeline run.
pub(crate) fn build_text_summary(run: &PipelineRun, all_issues: bool) -> TextSummary {
    let mut lines = Vec::new();

    let info = &run.analysis.dataset_info;
    let name = info.filename.as_deref().unwrap_or("dataset");
    lines.push(format!(
        "Dataset: {name} - {} rows x {} columns ({:.1} KB)",
        info.rows, info.columns, info.size_kb
    ));
    let q = &info.quality_score;
    lines.push(format!(
        "Quality: overall {:.1} (completeness {:.1}, uniqueness {:.1}, consistency {:.1}, accuracy {:.1})",
        q.overall, q.completeness, q.uniqueness, q.consistency, q.accuracy
    ));

    lines.push(format!("Issues detected: {}", run.analysis.issues.len()));
    if all_issues {
        for issue in &run.analysis.issues {
            lines.push(format!("  {}", viewmodel::issue_line(issue)));
        }
    } else {
        let view = viewmodel::compact_issues(&run.analysis.issues);
        for issue in view.visible {
            lines.push(format!("  {}", viewmodel::issue_line(issue)));
        }
        if let Some(more) = viewmodel::more_indicator(view.hidden) {
            lines.push(format!("  {more}"));
        }
    }

    let results = ResultsView::assemble(info, &run.pass.result, &run.pass.report);
    lines.push(format!(
        "Cleaning: {:.1} -> {:.1} ({}), {} issues resolved in {:.0} ms",
        results.quality_before,
        results.quality_after,
        viewmodel::format_delta(results.quality_delta),
        results.issues_resolved,
        results.processing_time_ms
    ));

    if !results.operations.is_empty() {
        lines.push("Operations applied:".to_string());
        for (i, op) in results.operations.iter().enumerate() {
            lines.push(format!(
                "  {}. {} - {} ({}, {} rows)",
                i + 1,
                op.column,
                op.description,
                op.applied_by,
                op.rows_affected
            ));
        }
    }

    let preview = viewmodel::preview_rows(&run.pass.result.cleaned_data);
    if !preview.is_empty() {
        lines.push(format!(
            "Cleaned preview (showing {} of {} rows):",
            preview.len(),
            run.pass.result.cleaned_data.len()
        ));
        lines.push(format!("  {}", info.column_names.join(" | ")));
        for row in preview {
            let cells: Vec<String> = info
                .column_names
                .iter()
                .map(|c| match row.get(c) {
                    Some(v) => viewmodel::cell_text(v),
                    None => "N/A".to_string(),
                })
                .collect();
            lines.push(format!("  {}", cells.join(" | ")));
        }
    }

    if let Some(artifact) = &run.artifact {
        lines.push(format!("Saved: {}", artifact.path.display()));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{issue, ScriptedEngine};
    use crate::engine::{CleaningPass, PipelineRun};
    use crate::model::Severity;

    fn happy_run() -> PipelineRun {
        let engine = ScriptedEngine::happy();
        PipelineRun {
            analysis: engine.analysis.clone(),
            pass: CleaningPass {
                result: engine.cleaning.clone(),
                report: engine.report.clone(),
            },
            artifact: None,
        }
    }

    #[test]
    fn summary_reports_the_quality_improvement() {
        let summary = build_text_summary(&happy_run(), false);
        assert!(summary
            .lines
            .iter()
            .any(|l| l.contains("65.0 -> 88.0 (+23.0)")));
        assert!(summary
            .lines
            .iter()
            .any(|l| l.contains("3 issues resolved in 420 ms")));
    }

    #[test]
    fn compact_summary_truncates_long_issue_lists() {
        let mut run = happy_run();
        run.analysis.issues = (0..8)
            .map(|i| issue(&format!("col{i}"), "outliers", Severity::Low, 2.0))
            .collect();

        let summary = build_text_summary(&run, false);
        let issue_lines = summary
            .lines
            .iter()
            .filter(|l| l.contains("outliers"))
            .count();
        assert_eq!(issue_lines, 5);
        assert!(summary.lines.iter().any(|l| l.contains("+3 more issues")));

        let full = build_text_summary(&run, true);
        let issue_lines = full.lines.iter().filter(|l| l.contains("outliers")).count();
        assert_eq!(issue_lines, 8);
    }
}
