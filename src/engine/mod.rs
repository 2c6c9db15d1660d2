//! Pipeline driver for the cleaning workflow.
//!
//! `CleaningBackend` is the seam to the remote engine: the real
//! `EngineClient` implements it over HTTP, tests script it. The driver owns
//! the ordering guarantees: configure, clean, and report run strictly in
//! sequence, each only after the previous call succeeded.

mod client;

pub use client::EngineClient;

use crate::error::SweepError;
use crate::export::{self, SavedArtifact};
use crate::intake;
use crate::model::{
    AnalysisResponse, CleaningResult, ConfigureAck, ExportFormat, OperationSpec, PipelineEvent,
    PipelineStep, PreviewResponse, Report, RunConfig,
};
use crate::session::SessionStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;

/// Remote operations of the cleaning engine, one per endpoint.
#[async_trait]
pub trait CleaningBackend: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<AnalysisResponse, SweepError>;
    async fn configure(
        &self,
        session_id: &str,
        auto_clean: bool,
        operations: &[OperationSpec],
    ) -> Result<ConfigureAck, SweepError>;
    async fn clean(&self, session_id: &str) -> Result<CleaningResult, SweepError>;
    async fn report(&self, session_id: &str) -> Result<Report, SweepError>;
    async fn preview(&self, session_id: &str, limit: u32) -> Result<PreviewResponse, SweepError>;
    async fn download(&self, session_id: &str, format: ExportFormat) -> Result<Bytes, SweepError>;
}

#[async_trait]
impl CleaningBackend for EngineClient {
    async fn upload(&self, path: &Path) -> Result<AnalysisResponse, SweepError> {
        EngineClient::upload(self, path).await
    }

    async fn configure(
        &self,
        session_id: &str,
        auto_clean: bool,
        operations: &[OperationSpec],
    ) -> Result<ConfigureAck, SweepError> {
        EngineClient::configure(self, session_id, auto_clean, operations).await
    }

    async fn clean(&self, session_id: &str) -> Result<CleaningResult, SweepError> {
        EngineClient::clean(self, session_id).await
    }

    async fn report(&self, session_id: &str) -> Result<Report, SweepError> {
        EngineClient::report(self, session_id).await
    }

    async fn preview(&self, session_id: &str, limit: u32) -> Result<PreviewResponse, SweepError> {
        EngineClient::preview(self, session_id, limit).await
    }

    async fn download(&self, session_id: &str, format: ExportFormat) -> Result<Bytes, SweepError> {
        EngineClient::download(self, session_id, format).await
    }
}

/// Everything a completed configure+clean+report pass produced.
#[derive(Debug, Clone)]
pub struct CleaningPass {
    pub result: CleaningResult,
    pub report: Report,
}

/// Run the auto-clean pass for one session: configure, then clean, then
/// report, each gated on the previous success. No parallel fan-out, no
/// internal retries.
pub async fn run_cleaning_pass(
    backend: &dyn CleaningBackend,
    session_id: &str,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<CleaningPass, SweepError> {
    let _ = event_tx.send(PipelineEvent::StepStarted {
        step: PipelineStep::Configure,
    });
    let ack = backend.configure(session_id, true, &[]).await?;
    let _ = event_tx.send(PipelineEvent::Configured {
        operations_count: ack.operations_count.unwrap_or(0),
    });

    let _ = event_tx.send(PipelineEvent::StepStarted {
        step: PipelineStep::Clean,
    });
    let result = backend.clean(session_id).await?;
    let _ = event_tx.send(PipelineEvent::Cleaned {
        result: Box::new(result.clone()),
    });

    let _ = event_tx.send(PipelineEvent::StepStarted {
        step: PipelineStep::Report,
    });
    let report = backend.report(session_id).await?;
    let _ = event_tx.send(PipelineEvent::Reported {
        report: Box::new(report.clone()),
    });

    Ok(CleaningPass { result, report })
}

/// Result of one headless end-to-end run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub analysis: AnalysisResponse,
    pub pass: CleaningPass,
    pub artifact: Option<SavedArtifact>,
}

/// Headless end-to-end pipeline: intake, upload, auto-clean pass, download.
/// All stage transitions go through the store so the transition table stays
/// the single source of truth.
pub async fn run_full_pipeline(
    backend: &dyn CleaningBackend,
    store: &mut SessionStore,
    file: &Path,
    cfg: &RunConfig,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<PipelineRun, SweepError> {
    let path = intake::submit_selected(file, None)?;

    let _ = event_tx.send(PipelineEvent::StepStarted {
        step: PipelineStep::Upload,
    });
    let analysis = backend.upload(&path).await?;
    store.begin_analyzed(analysis.clone())?;
    let _ = event_tx.send(PipelineEvent::Uploaded {
        analysis: Box::new(analysis.clone()),
    });
    let _ = event_tx.send(PipelineEvent::StageChanged {
        stage: store.stage(),
    });

    let session_id = store.begin_cleaning()?;
    let _ = event_tx.send(PipelineEvent::StageChanged {
        stage: store.stage(),
    });
    let pass = match run_cleaning_pass(backend, &session_id, event_tx).await {
        Ok(pass) => pass,
        Err(err) => {
            store.rollback_cleaning();
            let _ = event_tx.send(PipelineEvent::StageChanged {
                stage: store.stage(),
            });
            return Err(err);
        }
    };
    store.complete_cleaning(pass.result.clone(), pass.report.clone())?;
    let _ = event_tx.send(PipelineEvent::StageChanged {
        stage: store.stage(),
    });

    let artifact = if cfg.download {
        let _ = event_tx.send(PipelineEvent::StepStarted {
            step: PipelineStep::Download,
        });
        let session_id = store.export_session_id()?;
        let saved = export::download_artifact(
            backend,
            &session_id,
            cfg.export_format,
            cfg.output_dir.as_deref(),
        )
        .await?;
        let _ = event_tx.send(PipelineEvent::Downloaded {
            path: saved.path.clone(),
            bytes: saved.bytes,
        });
        Some(saved)
    } else {
        None
    };

    Ok(PipelineRun {
        analysis,
        pass,
        artifact,
    })
}


#[cfg(test)]
mod tests {
    use super::testutil::{drain_events, scratch_dir, ScriptedEngine};
    use super::*;
    use crate::session::Stage;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_cfg(dir: std::path::PathBuf) -> RunConfig {
        RunConfig {
            base_url: "http://localhost:8000/api".into(),
            request_timeout: Duration::from_secs(30),
            user_agent: "datasweep-cli/test".into(),
            export_format: ExportFormat::Csv,
            output_dir: Some(dir),
            download: true,
            preview_limit: 100,
        }
    }

    #[tokio::test]
    async fn cleaning_pass_is_strictly_sequential() {
        let engine = ScriptedEngine::happy();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let pass = run_cleaning_pass(&engine, "sess-1", &tx).await.unwrap();
        assert_eq!(engine.calls(), vec!["configure", "clean", "report"]);
        assert_eq!(pass.result.issues_resolved, 3);
        assert_eq!(pass.report.operations.len(), 3);

        let events = drain_events(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Configured { operations_count: 3 })));
    }

    #[tokio::test]
    async fn failed_clean_stops_the_pass_before_report() {
        let mut engine = ScriptedEngine::happy();
        engine.fail_clean = true;
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = run_cleaning_pass(&engine, "sess-1", &tx).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(engine.calls(), vec!["configure", "clean"]);
    }

    #[tokio::test]
    async fn full_pipeline_completes_and_saves_the_artifact() {
        let engine = ScriptedEngine::happy();
        let dir = scratch_dir("pipeline");
        let cfg = test_cfg(dir.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut store = SessionStore::new();

        let run = run_full_pipeline(
            &engine,
            &mut store,
            std::path::Path::new("people.csv"),
            &cfg,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(store.stage(), Stage::Completed);
        assert_eq!(run.analysis.session_id, "sess-1");
        let saved = run.artifact.unwrap();
        assert_eq!(saved.bytes, 14);
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"id,name\n1,Ada\n");

        let events = drain_events(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::StageChanged { stage: Stage::Completed })));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn failed_clean_rolls_the_stage_back_to_analyzed() {
        let mut engine = ScriptedEngine::happy();
        engine.fail_clean = true;
        let dir = scratch_dir("rollback");
        let cfg = test_cfg(dir.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut store = SessionStore::new();

        let err = run_full_pipeline(
            &engine,
            &mut store,
            std::path::Path::new("people.csv"),
            &cfg,
            &tx,
        )
        .await
        .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(store.stage(), Stage::Analyzed);
        assert_eq!(store.session_id(), Some("sess-1"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn rejected_file_never_reaches_the_backend() {
        let engine = ScriptedEngine::happy();
        let dir = scratch_dir("reject");
        let cfg = test_cfg(dir.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut store = SessionStore::new();

        let err = run_full_pipeline(
            &engine,
            &mut store,
            std::path::Path::new("report.pdf"),
            &cfg,
            &tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SweepError::Validation(_)));
        assert!(engine.calls().is_empty());
        assert_eq!(store.stage(), Stage::Empty);

        std::fs::remove_dir_all(dir).ok();
    }
}
