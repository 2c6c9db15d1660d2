//! View-model assembly: pure functions from raw engine payloads to
//! presentation-ready aggregates. Nothing here mutates a response.

use crate::model::{
    CleaningResult, DatasetInfo, Issue, QualityValue, Report, ReportOperation, Row,
};
use serde::Serialize;
use std::path::PathBuf;

/// Issues shown in the compact list; the rest are counted, not dropped.
pub const COMPACT_ISSUE_LIMIT: usize = 5;

/// Rows rendered from any row sequence. Display cap only; the underlying
/// data is untouched.
pub const PREVIEW_ROW_CAP: usize = 10;

/// Collapse either quality shape to the engine-defined overall scalar.
/// Sub-scores are never summed or averaged client-side.
pub fn normalize(value: &QualityValue) -> f64 {
    match value {
        QualityValue::Scalar(v) => *v,
        QualityValue::Breakdown(score) => score.overall,
    }
}

pub fn quality_delta(before: &QualityValue, after: &QualityValue) -> f64 {
    normalize(after) - normalize(before)
}

/// Signed one-decimal delta, e.g. `+23.0`.
pub fn format_delta(delta: f64) -> String {
    format!("{delta:+.1}")
}

/// Compact issue list: the first issues in engine order, plus how many are
/// hidden behind the "show all" affordance.
pub struct IssueListView<'a> {
    pub visible: &'a [Issue],
    pub hidden: usize,
}

pub fn compact_issues(issues: &[Issue]) -> IssueListView<'_> {
    let shown = issues.len().min(COMPACT_ISSUE_LIMIT);
    IssueListView {
        visible: &issues[..shown],
        hidden: issues.len() - shown,
    }
}

/// "+N more issues" indicator, absent when nothing is hidden.
pub fn more_indicator(hidden: usize) -> Option<String> {
    (hidden > 0).then(|| format!("+{hidden} more issues"))
}

/// Display slice of a row sequence, capped at `PREVIEW_ROW_CAP`.
pub fn preview_rows(rows: &[Row]) -> &[Row] {
    &rows[..rows.len().min(PREVIEW_ROW_CAP)]
}

/// Render one cell for tabular display.
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "N/A".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One-line rendering of an issue for lists.
pub fn issue_line(issue: &Issue) -> String {
    format!(
        "[{}] {}: {} ({:.1}% affected) - {}",
        issue.severity.label(),
        issue.column,
        issue.issue_type,
        issue.affected_percentage,
        issue.suggested_fix,
    )
}

/// Presentation aggregate for the results screen, merging the clean result
/// with the report. The analysis-time issue list is deliberately not
/// consulted; the report is ground truth after cleaning.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsView {
    pub rows: u64,
    pub columns: u64,
    pub quality_before: f64,
    pub quality_after: f64,
    pub quality_delta: f64,
    pub issues_resolved: u64,
    pub processing_time_ms: f64,
    pub operations: Vec<ReportOperation>,
}

impl ResultsView {
    pub fn assemble(info: &DatasetInfo, result: &CleaningResult, report: &Report) -> Self {
        let before = normalize(&result.quality_before);
        let after = normalize(&result.quality_after);
        ResultsView {
            rows: info.rows,
            columns: info.columns,
            quality_before: before,
            quality_after: after,
            quality_delta: after - before,
            issues_resolved: result.issues_resolved,
            processing_time_ms: result.processing_time_ms,
            operations: report.operations.clone(),
        }
    }
}

/// Machine-readable summary of one headless run, for `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub timestamp_utc: String,
    pub base_url: String,
    pub session_id: String,
    pub dataset: DatasetInfo,
    pub issues_detected: usize,
    pub issues: Vec<Issue>,
    #[serde(flatten)]
    pub results: ResultsView,
    pub artifact_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{issue, quality, row};
    use crate::model::{QualityScore, Severity};

    #[test]
    fn normalize_treats_scalar_and_breakdown_alike() {
        assert_eq!(normalize(&QualityValue::Scalar(72.0)), 72.0);
        let breakdown = QualityValue::Breakdown(QualityScore {
            overall: 72.0,
            completeness: 10.0,
            uniqueness: 20.0,
            consistency: 30.0,
            accuracy: 40.0,
        });
        // Sub-scores do not feed the overall; only the engine's value does.
        assert_eq!(normalize(&breakdown), 72.0);
    }

    #[test]
    fn delta_is_after_minus_before_across_shapes() {
        let before = QualityValue::Breakdown(quality(65.0));
        let after = QualityValue::Scalar(88.0);
        let delta = quality_delta(&before, &after);
        assert_eq!(delta, 23.0);
        assert_eq!(format_delta(delta), "+23.0");
        assert_eq!(format_delta(-4.26), "-4.3");
    }

    fn issues(n: usize) -> Vec<Issue> {
        (0..n)
            .map(|i| issue(&format!("col{i}"), "missing_values", Severity::Low, 1.0))
            .collect()
    }

    #[test]
    fn eight_issues_show_five_plus_three_more() {
        let all = issues(8);
        let view = compact_issues(&all);
        assert_eq!(view.visible.len(), 5);
        assert_eq!(view.visible[0].column, "col0");
        assert_eq!(view.hidden, 3);
        assert_eq!(more_indicator(view.hidden).unwrap(), "+3 more issues");
    }

    #[test]
    fn three_issues_show_all_with_no_indicator() {
        let all = issues(3);
        let view = compact_issues(&all);
        assert_eq!(view.visible.len(), 3);
        assert_eq!(view.hidden, 0);
        assert!(more_indicator(view.hidden).is_none());
    }

    #[test]
    fn preview_caps_at_ten_rows_without_padding() {
        let many: Vec<Row> = (0..25).map(|i| row(&[("id", &i.to_string())])).collect();
        assert_eq!(preview_rows(&many).len(), 10);
        // Cap is display-only; the source is untouched.
        assert_eq!(many.len(), 25);

        let few: Vec<Row> = (0..3).map(|i| row(&[("id", &i.to_string())])).collect();
        assert_eq!(preview_rows(&few).len(), 3);
    }

    #[test]
    fn cell_text_renders_nulls_and_numbers() {
        assert_eq!(cell_text(&serde_json::Value::Null), "N/A");
        assert_eq!(cell_text(&serde_json::json!("Ada")), "Ada");
        assert_eq!(cell_text(&serde_json::json!(42)), "42");
    }

    #[test]
    fn results_view_merges_result_and_report() {
        use crate::model::{CleaningResult, DatasetInfo, Report, ReportOperation};

        let info = DatasetInfo {
            rows: 100,
            columns: 5,
            size_kb: 12.5,
            column_names: vec!["a".into()],
            quality_score: quality(65.0),
            filename: None,
            dtypes: Default::default(),
        };
        let result = CleaningResult {
            session_id: None,
            quality_before: QualityValue::Scalar(65.0),
            quality_after: QualityValue::Breakdown(quality(88.0)),
            issues_resolved: 3,
            processing_time_ms: 420.0,
            cleaned_data: Vec::new(),
        };
        let report = Report {
            operations: vec![ReportOperation {
                column: "age".into(),
                description: "Imputed missing values".into(),
                applied_by: "auto".into(),
                rows_affected: 12,
                operation: None,
                technical_details: None,
            }],
            summary: None,
        };

        let view = ResultsView::assemble(&info, &result, &report);
        assert_eq!(view.quality_before, 65.0);
        assert_eq!(view.quality_after, 88.0);
        assert_eq!(view.quality_delta, 23.0);
        assert_eq!(view.issues_resolved, 3);
        assert_eq!(view.processing_time_ms, 420.0);
        assert_eq!(view.operations.len(), 1);
        assert_eq!(view.rows, 100);
    }
}
