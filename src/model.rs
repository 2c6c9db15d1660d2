use crate::session::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// One record of tabular data as the engine serializes it.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
    pub export_format: ExportFormat,
    pub output_dir: Option<PathBuf>,
    pub download: bool,
    pub preview_limit: u32,
}

/// 0-100 dataset health rating along four axes plus an engine-weighted overall.
///
/// `overall` is engine-defined; it is never recomputed from the sub-scores
/// client-side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall: f64,
    pub completeness: f64,
    pub uniqueness: f64,
    pub consistency: f64,
    pub accuracy: f64,
}

/// Shape of `quality_before`/`quality_after` in clean responses: some engine
/// versions send the full breakdown, others just the overall scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualityValue {
    Breakdown(QualityScore),
    Scalar(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub rows: u64,
    pub columns: u64,
    pub size_kb: f64,
    pub column_names: Vec<String>,
    pub quality_score: QualityScore,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub dtypes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Remedial action the engine suggests for one issue. The tag set is
/// engine-defined, so extra keys ride along untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedOperation {
    pub operation: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// A detected data-quality problem on one column, snapshotted at analysis
/// time. Issues are never mutated after upload; post-clean views read the
/// report instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub column: String,
    pub issue_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub affected_count: Option<u64>,
    pub affected_percentage: f64,
    pub suggested_fix: String,
    pub recommended_operation: RecommendedOperation,
}

/// `POST /upload` response: session id plus the matched analysis pair
/// (dataset info and issues always come from the same analyze call).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub session_id: String,
    pub dataset_info: DatasetInfo,
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub preview_data: Vec<Row>,
}

/// One cleaning operation submitted via `POST /configure`. Ignored by the
/// engine when `auto_clean` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub column: String,
    pub operation_type: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "applied_by_user")]
    pub applied_by: String,
    #[serde(default)]
    pub rows_affected: u64,
    #[serde(default)]
    pub description: String,
}

fn applied_by_user() -> String {
    "user".to_string()
}

/// `POST /configure` ack. The shape is not otherwise consumed, so every
/// field is lenient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub operations_count: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningResult {
    #[serde(default)]
    pub session_id: Option<String>,
    pub quality_before: QualityValue,
    pub quality_after: QualityValue,
    pub issues_resolved: u64,
    pub processing_time_ms: f64,
    #[serde(default)]
    pub cleaned_data: Vec<Row>,
}

/// One cleaning action actually applied, as reported after cleaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOperation {
    pub column: String,
    pub description: String,
    pub applied_by: String,
    pub rows_affected: u64,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub technical_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub total_operations: u64,
    #[serde(default)]
    pub issues_resolved: u64,
    #[serde(default)]
    pub quality_improvement: f64,
    #[serde(default)]
    pub processing_time_ms: f64,
    #[serde(default)]
    pub before_score: f64,
    #[serde(default)]
    pub after_score: f64,
}

/// `GET /report/{session_id}` response. Operations are in application order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub operations: Vec<ReportOperation>,
    #[serde(default)]
    pub summary: Option<ReportSummary>,
}

/// `GET /preview/{session_id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub total_rows: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    /// Path segment for `POST /download/{session_id}/{format}`.
    pub fn as_path_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "excel",
        }
    }

    /// Default artifact filename for this format.
    pub fn artifact_name(self) -> &'static str {
        match self {
            ExportFormat::Csv => "cleaned_data.csv",
            ExportFormat::Excel => "cleaned_data.xlsx",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            other => Err(format!("unknown format '{other}' (use csv or excel)")),
        }
    }
}

/// Pipeline steps, in execution order. Used for progress display only; the
/// session stage machine lives in `session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStep {
    Upload,
    Configure,
    Clean,
    Report,
    Download,
    Preview,
}

impl PipelineStep {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStep::Upload => "Upload",
            PipelineStep::Configure => "Configure",
            PipelineStep::Clean => "Clean",
            PipelineStep::Report => "Report",
            PipelineStep::Download => "Download",
            PipelineStep::Preview => "Preview",
        }
    }
}

/// Events emitted by the pipeline and consumed by presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    StepStarted {
        step: PipelineStep,
    },
    Uploaded {
        // Box to keep PipelineEvent small; the analysis payload is large.
        analysis: Box<AnalysisResponse>,
    },
    Configured {
        operations_count: u64,
    },
    Cleaned {
        result: Box<CleaningResult>,
    },
    Reported {
        report: Box<Report>,
    },
    Downloaded {
        path: PathBuf,
        bytes: u64,
    },
    PreviewLoaded {
        rows: Vec<Row>,
        total_rows: u64,
    },
    StageChanged {
        stage: Stage,
    },
    StepFailed {
        step: PipelineStep,
        message: String,
    },
    Info(InfoEvent),
}

/// Structured info events rendered by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    UsingEngine { base_url: String },
    StaleResponseDiscarded { session_id: String },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::UsingEngine { base_url } => {
                format!("Using cleaning engine at {base_url}")
            }
            InfoEvent::StaleResponseDiscarded { session_id } => {
                format!("Discarded a late response for replaced session {session_id}")
            }
        }
    }
}
