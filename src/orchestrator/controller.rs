//! Session command controller.
//!
//! Drives the single live session through the pipeline in response to UI
//! commands. One operation may be outstanding at a time: a duplicate trigger
//! while busy is a no-op, not a queued request. Start-over is the only
//! command accepted while busy; the outstanding request then runs to
//! settlement and its response is discarded because its generation no longer
//! matches the live session.

use crate::engine::{self, CleaningBackend, CleaningPass};
use crate::error::SweepError;
use crate::export::{self, SavedArtifact};
use crate::intake;
use crate::model::{
    AnalysisResponse, ExportFormat, InfoEvent, PipelineEvent, PipelineStep, PreviewResponse,
    RunConfig,
};
use crate::session::{SessionStore, Stage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers to drive the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Manually selected file; rejection surfaces a validation error.
    Upload(PathBuf),
    /// Drag-dropped item; rejection is silently ignored.
    DropUpload(PathBuf),
    AutoClean,
    Download(ExportFormat),
    RefreshPreview,
    Reset,
    Quit,
}

/// Settled result of the one outstanding operation.
enum TaskOutcome {
    Uploaded(Result<AnalysisResponse, SweepError>),
    Cleaned(Result<CleaningPass, SweepError>),
    Downloaded(Result<SavedArtifact, SweepError>),
    Previewed(Result<PreviewResponse, SweepError>),
}

/// Handle for the outstanding operation, tagged with the generation it was
/// started under so a post-reset completion can be recognized as stale.
struct InFlight {
    generation: u64,
    step: PipelineStep,
    session_id: Option<String>,
    handle: Option<tokio::task::JoinHandle<TaskOutcome>>,
}

/// Run the command loop until `Quit`. Returns the final session store.
pub(crate) async fn run_controller<B>(
    backend: Arc<B>,
    cfg: RunConfig,
    event_tx: UnboundedSender<PipelineEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> SessionStore
where
    B: CleaningBackend + 'static,
{
    let mut store = SessionStore::new();
    let mut in_flight: Option<InFlight> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Upload(path)) => {
                        if in_flight.is_some() {
                            continue;
                        }
                        match intake::submit_selected(&path, None) {
                            Ok(path) => {
                                in_flight = Some(start_upload(
                                    &backend, &mut store, path, &event_tx,
                                ));
                            }
                            Err(err) => {
                                let _ = event_tx.send(PipelineEvent::StepFailed {
                                    step: PipelineStep::Upload,
                                    message: err.to_string(),
                                });
                            }
                        }
                    }
                    Some(UiCommand::DropUpload(path)) => {
                        if in_flight.is_some() {
                            continue;
                        }
                        if let Some(path) = intake::submit_dropped(&path, None) {
                            in_flight = Some(start_upload(
                                &backend, &mut store, path, &event_tx,
                            ));
                        }
                    }
                    Some(UiCommand::AutoClean) => {
                        if in_flight.is_some() {
                            continue;
                        }
                        match store.begin_cleaning() {
                            Ok(session_id) => {
                                let _ = event_tx.send(PipelineEvent::StageChanged {
                                    stage: store.stage(),
                                });
                                let backend = backend.clone();
                                let tx = event_tx.clone();
                                let id = session_id.clone();
                                in_flight = Some(InFlight {
                                    generation: store.generation(),
                                    step: PipelineStep::Clean,
                                    session_id: Some(session_id),
                                    handle: Some(tokio::spawn(async move {
                                        TaskOutcome::Cleaned(
                                            engine::run_cleaning_pass(&*backend, &id, &tx).await,
                                        )
                                    })),
                                });
                            }
                            Err(err) => {
                                let _ = event_tx.send(PipelineEvent::StepFailed {
                                    step: PipelineStep::Clean,
                                    message: err.to_string(),
                                });
                            }
                        }
                    }
                    Some(UiCommand::Download(format)) => {
                        if in_flight.is_some() {
                            continue;
                        }
                        match store.export_session_id() {
                            Ok(session_id) => {
                                let _ = event_tx.send(PipelineEvent::StepStarted {
                                    step: PipelineStep::Download,
                                });
                                let backend = backend.clone();
                                let id = session_id.clone();
                                let output_dir = cfg.output_dir.clone();
                                in_flight = Some(InFlight {
                                    generation: store.generation(),
                                    step: PipelineStep::Download,
                                    session_id: Some(session_id),
                                    handle: Some(tokio::spawn(async move {
                                        TaskOutcome::Downloaded(
                                            export::download_artifact(
                                                &*backend,
                                                &id,
                                                format,
                                                output_dir.as_deref(),
                                            )
                                            .await,
                                        )
                                    })),
                                });
                            }
                            Err(err) => {
                                let _ = event_tx.send(PipelineEvent::StepFailed {
                                    step: PipelineStep::Download,
                                    message: err.to_string(),
                                });
                            }
                        }
                    }
                    Some(UiCommand::RefreshPreview) => {
                        if in_flight.is_some() {
                            continue;
                        }
                        match store.export_session_id() {
                            Ok(session_id) => {
                                let _ = event_tx.send(PipelineEvent::StepStarted {
                                    step: PipelineStep::Preview,
                                });
                                let backend = backend.clone();
                                let id = session_id.clone();
                                let limit = cfg.preview_limit;
                                in_flight = Some(InFlight {
                                    generation: store.generation(),
                                    step: PipelineStep::Preview,
                                    session_id: Some(session_id),
                                    handle: Some(tokio::spawn(async move {
                                        TaskOutcome::Previewed(backend.preview(&id, limit).await)
                                    })),
                                });
                            }
                            Err(err) => {
                                let _ = event_tx.send(PipelineEvent::StepFailed {
                                    step: PipelineStep::Preview,
                                    message: err.to_string(),
                                });
                            }
                        }
                    }
                    Some(UiCommand::Reset) => {
                        // Allowed even with a call outstanding; no cancellation,
                        // the late response is discarded by generation check.
                        store.reset();
                        let _ = event_tx.send(PipelineEvent::StageChanged {
                            stage: Stage::Empty,
                        });
                    }
                    Some(UiCommand::Quit) | None => break,
                }
            }
            // The JoinHandle stays inside InFlight until this branch wins;
            // taking it earlier would drop it when another branch is chosen
            // and completion would never be observed.
            maybe_done = async {
                if let Some(flight) = &mut in_flight {
                    if let Some(h) = flight.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    let flight = in_flight.take().expect("completed task was in flight");
                    match join_res {
                        Ok(outcome) => {
                            if flight.generation != store.generation() {
                                let _ = event_tx.send(PipelineEvent::Info(
                                    match flight.session_id {
                                        Some(session_id) => {
                                            InfoEvent::StaleResponseDiscarded { session_id }
                                        }
                                        None => InfoEvent::Message(
                                            "Discarded a late upload response after start-over"
                                                .into(),
                                        ),
                                    },
                                ));
                            } else {
                                apply_outcome(&mut store, outcome, &event_tx);
                            }
                        }
                        Err(join_err) => {
                            let _ = event_tx.send(PipelineEvent::StepFailed {
                                step: flight.step,
                                message: format!("background task failed: {join_err}"),
                            });
                        }
                    }
                }
            }
        }
    }

    store
}

/// Spawn the upload task. Re-upload from a non-empty session is the reset
/// edge: the former session is discarded outright, never merged.
fn start_upload<B>(
    backend: &Arc<B>,
    store: &mut SessionStore,
    path: PathBuf,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> InFlight
where
    B: CleaningBackend + 'static,
{
    if store.stage() != Stage::Empty {
        store.reset();
        let _ = event_tx.send(PipelineEvent::StageChanged {
            stage: Stage::Empty,
        });
    }
    let _ = event_tx.send(PipelineEvent::StepStarted {
        step: PipelineStep::Upload,
    });
    let backend = backend.clone();
    InFlight {
        generation: store.generation(),
        step: PipelineStep::Upload,
        session_id: None,
        handle: Some(tokio::spawn(async move {
            TaskOutcome::Uploaded(backend.upload(&path).await)
        })),
    }
}

/// Fold a settled, non-stale outcome into the store and notify the UI.
fn apply_outcome(
    store: &mut SessionStore,
    outcome: TaskOutcome,
    event_tx: &UnboundedSender<PipelineEvent>,
) {
    match outcome {
        TaskOutcome::Uploaded(Ok(analysis)) => match store.begin_analyzed(analysis.clone()) {
            Ok(()) => {
                let _ = event_tx.send(PipelineEvent::Uploaded {
                    analysis: Box::new(analysis),
                });
                let _ = event_tx.send(PipelineEvent::StageChanged {
                    stage: store.stage(),
                });
            }
            Err(err) => {
                let _ = event_tx.send(PipelineEvent::StepFailed {
                    step: PipelineStep::Upload,
                    message: err.to_string(),
                });
            }
        },
        TaskOutcome::Uploaded(Err(err)) => {
            // Stage stays Empty; the user may retry or pick another file.
            let _ = event_tx.send(PipelineEvent::StepFailed {
                step: PipelineStep::Upload,
                message: err.to_string(),
            });
        }
        TaskOutcome::Cleaned(Ok(pass)) => {
            match store.complete_cleaning(pass.result, pass.report) {
                Ok(()) => {
                    let _ = event_tx.send(PipelineEvent::StageChanged {
                        stage: store.stage(),
                    });
                }
                Err(err) => {
                    let _ = event_tx.send(PipelineEvent::StepFailed {
                        step: PipelineStep::Report,
                        message: err.to_string(),
                    });
                }
            }
        }
        TaskOutcome::Cleaned(Err(err)) => {
            // Rollback to the last good stage; the session id and the
            // analysis snapshot survive.
            store.rollback_cleaning();
            let _ = event_tx.send(PipelineEvent::StepFailed {
                step: PipelineStep::Clean,
                message: err.to_string(),
            });
            let _ = event_tx.send(PipelineEvent::StageChanged {
                stage: store.stage(),
            });
        }
        TaskOutcome::Downloaded(Ok(saved)) => {
            let _ = event_tx.send(PipelineEvent::Downloaded {
                path: saved.path,
                bytes: saved.bytes,
            });
        }
        TaskOutcome::Downloaded(Err(err)) => {
            // Export failure never moves the stage off Completed.
            let _ = event_tx.send(PipelineEvent::StepFailed {
                step: PipelineStep::Download,
                message: err.to_string(),
            });
        }
        TaskOutcome::Previewed(Ok(preview)) => {
            let _ = event_tx.send(PipelineEvent::PreviewLoaded {
                rows: preview.data,
                total_rows: preview.total_rows,
            });
        }
        TaskOutcome::Previewed(Err(err)) => {
            let _ = event_tx.send(PipelineEvent::StepFailed {
                step: PipelineStep::Preview,
                message: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{scratch_dir, ScriptedEngine};
    use crate::viewmodel::{format_delta, ResultsView};
    use bytes::Bytes;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::sync::Notify;

    struct Harness {
        cmd_tx: UnboundedSender<UiCommand>,
        event_rx: UnboundedReceiver<PipelineEvent>,
        controller: tokio::task::JoinHandle<SessionStore>,
        dir: PathBuf,
    }

    impl Harness {
        fn spawn(engine: Arc<ScriptedEngine>, tag: &str) -> Self {
            let dir = scratch_dir(tag);
            let cfg = RunConfig {
                base_url: "http://localhost:8000/api".into(),
                request_timeout: Duration::from_secs(30),
                user_agent: "datasweep-cli/test".into(),
                export_format: ExportFormat::Csv,
                output_dir: Some(dir.clone()),
                download: true,
                preview_limit: 100,
            };
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let controller = tokio::spawn(run_controller(engine, cfg, event_tx, cmd_rx));
            Harness {
                cmd_tx,
                event_rx,
                controller,
                dir,
            }
        }

        fn send(&self, cmd: UiCommand) {
            self.cmd_tx.send(cmd).unwrap();
        }

        async fn wait_for<F>(&mut self, what: &str, pred: F) -> PipelineEvent
        where
            F: Fn(&PipelineEvent) -> bool,
        {
            loop {
                let ev = tokio::time::timeout(Duration::from_secs(5), self.event_rx.recv())
                    .await
                    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
                    .expect("event channel closed");
                if pred(&ev) {
                    return ev;
                }
            }
        }

        async fn finish(self) -> SessionStore {
            self.send(UiCommand::Quit);
            let store = self.controller.await.unwrap();
            std::fs::remove_dir_all(self.dir).ok();
            store
        }
    }

    fn stage_changed(stage: Stage) -> impl Fn(&PipelineEvent) -> bool {
        move |ev| matches!(ev, PipelineEvent::StageChanged { stage: s } if *s == stage)
    }

    fn step_failed(step: PipelineStep) -> impl Fn(&PipelineEvent) -> bool {
        move |ev| matches!(ev, PipelineEvent::StepFailed { step: s, .. } if *s == step)
    }

    #[tokio::test]
    async fn end_to_end_auto_clean_scenario() {
        let engine = Arc::new(ScriptedEngine::happy());
        let mut h = Harness::spawn(engine.clone(), "e2e");

        h.send(UiCommand::Upload(PathBuf::from("people.csv")));
        let uploaded = h
            .wait_for("upload", |ev| matches!(ev, PipelineEvent::Uploaded { .. }))
            .await;
        if let PipelineEvent::Uploaded { analysis } = uploaded {
            assert_eq!(analysis.dataset_info.rows, 100);
            assert_eq!(analysis.dataset_info.columns, 5);
            assert_eq!(analysis.dataset_info.quality_score.overall, 65.0);
            assert_eq!(analysis.issues.len(), 3);
        }
        h.wait_for("analyzed stage", stage_changed(Stage::Analyzed))
            .await;

        h.send(UiCommand::AutoClean);
        h.wait_for("completed stage", stage_changed(Stage::Completed))
            .await;

        h.send(UiCommand::Download(ExportFormat::Csv));
        let downloaded = h
            .wait_for("download", |ev| {
                matches!(ev, PipelineEvent::Downloaded { .. })
            })
            .await;
        if let PipelineEvent::Downloaded { bytes, .. } = downloaded {
            assert_eq!(bytes, 14);
        }

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Completed);
        let session = store.session().unwrap();
        let view = ResultsView::assemble(
            &session.dataset_info,
            session.cleaning_result.as_ref().unwrap(),
            session.report.as_ref().unwrap(),
        );
        assert_eq!(view.quality_before, 65.0);
        assert_eq!(view.quality_after, 88.0);
        assert_eq!(format_delta(view.quality_delta), "+23.0");
        assert_eq!(view.issues_resolved, 3);
        assert_eq!(view.processing_time_ms, 420.0);
        assert_eq!(view.operations.len(), 3);
        // The analysis-time issue snapshot is untouched by cleaning.
        assert_eq!(session.issues.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_auto_clean_while_busy_is_a_no_op() {
        let gate = Arc::new(Notify::new());
        let mut engine = ScriptedEngine::happy();
        engine.clean_gate = Some(gate.clone());
        let engine = Arc::new(engine);
        let mut h = Harness::spawn(engine.clone(), "dup");

        h.send(UiCommand::Upload(PathBuf::from("people.csv")));
        h.wait_for("analyzed stage", stage_changed(Stage::Analyzed))
            .await;

        h.send(UiCommand::AutoClean);
        h.wait_for("clean started", |ev| {
            matches!(
                ev,
                PipelineEvent::StepStarted {
                    step: PipelineStep::Clean
                }
            )
        })
        .await;

        // Second trigger with one outstanding: no second request.
        h.send(UiCommand::AutoClean);
        gate.notify_one();
        h.wait_for("completed stage", stage_changed(Stage::Completed))
            .await;

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Completed);
        assert_eq!(engine.clean_call_count(), 1);
        let configures = engine.calls().iter().filter(|c| **c == "configure").count();
        assert_eq!(configures, 1);
    }

    #[tokio::test]
    async fn reset_during_outstanding_clean_discards_the_late_response() {
        let gate = Arc::new(Notify::new());
        let mut engine = ScriptedEngine::happy();
        engine.clean_gate = Some(gate.clone());
        let engine = Arc::new(engine);
        let mut h = Harness::spawn(engine, "stale");

        h.send(UiCommand::Upload(PathBuf::from("people.csv")));
        h.wait_for("analyzed stage", stage_changed(Stage::Analyzed))
            .await;
        h.send(UiCommand::AutoClean);
        h.wait_for("clean started", |ev| {
            matches!(
                ev,
                PipelineEvent::StepStarted {
                    step: PipelineStep::Clean
                }
            )
        })
        .await;

        // Start over while the clean call is outstanding.
        h.send(UiCommand::Reset);
        h.wait_for("empty stage", stage_changed(Stage::Empty)).await;

        // Let the outstanding call settle; its result must not touch the
        // new session.
        gate.notify_one();
        h.wait_for("stale discard", |ev| {
            matches!(
                ev,
                PipelineEvent::Info(InfoEvent::StaleResponseDiscarded { .. })
            )
        })
        .await;

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Empty);
        assert!(store.session().is_none());
    }

    #[tokio::test]
    async fn failed_clean_rolls_back_to_analyzed() {
        let mut engine = ScriptedEngine::happy();
        engine.fail_clean = true;
        let mut h = Harness::spawn(Arc::new(engine), "rollback");

        h.send(UiCommand::Upload(PathBuf::from("people.csv")));
        h.wait_for("analyzed stage", stage_changed(Stage::Analyzed))
            .await;
        h.send(UiCommand::AutoClean);

        let failed = h
            .wait_for("clean failure", step_failed(PipelineStep::Clean))
            .await;
        if let PipelineEvent::StepFailed { message, .. } = failed {
            // Server detail is surfaced to the user.
            assert!(message.contains("engine exploded"));
        }
        h.wait_for("back to analyzed", stage_changed(Stage::Analyzed))
            .await;

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Analyzed);
        assert_eq!(store.session_id(), Some("sess-1"));
    }

    #[tokio::test]
    async fn empty_export_fails_distinctly_and_keeps_completed() {
        let mut engine = ScriptedEngine::happy();
        engine.artifact = Bytes::new();
        let mut h = Harness::spawn(Arc::new(engine), "empty-dl");

        h.send(UiCommand::Upload(PathBuf::from("people.csv")));
        h.wait_for("analyzed stage", stage_changed(Stage::Analyzed))
            .await;
        h.send(UiCommand::AutoClean);
        h.wait_for("completed stage", stage_changed(Stage::Completed))
            .await;

        h.send(UiCommand::Download(ExportFormat::Csv));
        let failed = h
            .wait_for("download failure", step_failed(PipelineStep::Download))
            .await;
        if let PipelineEvent::StepFailed { message, .. } = failed {
            assert_eq!(message, "export returned an empty file");
        }

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Completed);
    }

    #[tokio::test]
    async fn dropped_pdf_never_reaches_the_transport() {
        let engine = Arc::new(ScriptedEngine::happy());
        let h = Harness::spawn(engine.clone(), "drop-pdf");

        h.send(UiCommand::DropUpload(PathBuf::from("report.pdf")));
        let store = h.finish().await;

        assert_eq!(store.stage(), Stage::Empty);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn selected_pdf_surfaces_a_validation_error() {
        let engine = Arc::new(ScriptedEngine::happy());
        let mut h = Harness::spawn(engine.clone(), "select-pdf");

        h.send(UiCommand::Upload(PathBuf::from("report.pdf")));
        let failed = h
            .wait_for("validation failure", step_failed(PipelineStep::Upload))
            .await;
        if let PipelineEvent::StepFailed { message, .. } = failed {
            assert!(message.contains("unsupported file"));
        }

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Empty);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn re_upload_is_a_reset_edge() {
        let engine = Arc::new(ScriptedEngine::happy());
        let mut h = Harness::spawn(engine.clone(), "re-upload");

        h.send(UiCommand::Upload(PathBuf::from("people.csv")));
        h.wait_for("analyzed stage", stage_changed(Stage::Analyzed))
            .await;

        // "Upload different file" discards the current session outright.
        h.send(UiCommand::Upload(PathBuf::from("other.csv")));
        h.wait_for("reset to empty", stage_changed(Stage::Empty))
            .await;
        h.wait_for("re-analyzed", stage_changed(Stage::Analyzed))
            .await;

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Analyzed);
        assert_eq!(store.generation(), 1);
        let uploads = engine.calls().iter().filter(|c| **c == "upload").count();
        assert_eq!(uploads, 2);
    }

    #[tokio::test]
    async fn failed_upload_leaves_the_session_empty() {
        let mut engine = ScriptedEngine::happy();
        engine.fail_upload = true;
        let mut h = Harness::spawn(Arc::new(engine), "upload-fail");

        h.send(UiCommand::Upload(PathBuf::from("people.csv")));
        h.wait_for("upload failure", step_failed(PipelineStep::Upload))
            .await;

        let store = h.finish().await;
        assert_eq!(store.stage(), Stage::Empty);
        assert!(store.session().is_none());
    }
}
