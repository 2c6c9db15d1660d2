use crate::model::{AnalysisResponse, CleaningResult, PipelineEvent, PipelineStep, Row};
use crate::session::Stage;
use crate::viewmodel::ResultsView;
use std::path::PathBuf;

pub const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Display state derived from pipeline events. Owned by the UI thread only;
/// the session store stays with the controller.
pub struct UiState {
    pub stage: Stage,
    pub busy: bool,
    pub current_step: Option<PipelineStep>,
    pub info: String,
    pub last_error: Option<String>,
    pub analysis: Option<AnalysisResponse>,
    pub results: Option<ResultsView>,
    pub cleaned_preview: Vec<Row>,
    pub preview_total: u64,
    pub show_all_issues: bool,
    pub last_artifact: Option<PathBuf>,
    pub spinner: usize,
    // Clean result parked until the report arrives and both can be merged.
    pending_result: Option<CleaningResult>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            stage: Stage::Empty,
            busy: false,
            current_step: None,
            info: String::new(),
            last_error: None,
            analysis: None,
            results: None,
            cleaned_preview: Vec::new(),
            preview_total: 0,
            show_all_issues: false,
            last_artifact: None,
            spinner: 0,
            pending_result: None,
        }
    }
}

impl UiState {
    /// Fold one pipeline event into the display state.
    pub fn apply_event(&mut self, ev: PipelineEvent) {
        match ev {
            PipelineEvent::StepStarted { step } => {
                self.busy = true;
                self.current_step = Some(step);
                self.last_error = None;
                self.info = format!("{}...", step.label());
            }
            PipelineEvent::Uploaded { analysis } => {
                self.analysis = Some(*analysis);
            }
            PipelineEvent::Configured { operations_count } => {
                self.info = format!("Configured {operations_count} automatic operation(s)");
            }
            PipelineEvent::Cleaned { result } => {
                self.cleaned_preview = result.cleaned_data.clone();
                self.preview_total = result.cleaned_data.len() as u64;
                self.pending_result = Some(*result);
            }
            PipelineEvent::Reported { report } => {
                if let (Some(analysis), Some(result)) = (&self.analysis, &self.pending_result) {
                    self.results = Some(ResultsView::assemble(
                        &analysis.dataset_info,
                        result,
                        &report,
                    ));
                }
            }
            PipelineEvent::Downloaded { path, bytes } => {
                self.busy = false;
                self.current_step = None;
                self.info = format!("Saved: {} ({bytes} bytes)", path.display());
                self.last_artifact = Some(path);
            }
            PipelineEvent::PreviewLoaded { rows, total_rows } => {
                self.busy = false;
                self.current_step = None;
                self.info = format!("Preview refreshed: {} of {total_rows} row(s)", rows.len());
                self.cleaned_preview = rows;
                self.preview_total = total_rows;
            }
            PipelineEvent::StageChanged { stage } => {
                self.stage = stage;
                self.busy = stage == Stage::Cleaning;
                if !self.busy {
                    self.current_step = None;
                }
                if stage == Stage::Empty {
                    self.clear_session_view();
                }
            }
            PipelineEvent::StepFailed { step, message } => {
                self.busy = false;
                self.current_step = None;
                self.last_error = Some(format!("{} failed: {message}", step.label()));
            }
            PipelineEvent::Info(info) => {
                self.info = info.to_message();
            }
        }
    }

    /// Advance the busy spinner. Called on every render tick.
    pub fn tick(&mut self) {
        if self.busy {
            self.spinner = (self.spinner + 1) % SPINNER.len();
        }
    }

    pub fn spinner_frame(&self) -> &'static str {
        SPINNER[self.spinner]
    }

    fn clear_session_view(&mut self) {
        self.analysis = None;
        self.results = None;
        self.pending_result = None;
        self.cleaned_preview = Vec::new();
        self.preview_total = 0;
        self.show_all_issues = false;
        self.last_artifact = None;
        self.last_error = None;
    }
}
