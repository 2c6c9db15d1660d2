//! Session lifecycle state machine.
//!
//! Exactly one session is live at a time. The store owns the stage and the
//! engine-assigned session id, and every transition goes through it; UI
//! layers send commands and consume events, they never mutate stage state.

use crate::error::SweepError;
use crate::model::{AnalysisResponse, CleaningResult, DatasetInfo, Issue, Report};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of the live session in the pipeline.
///
/// Stages only move forward; the single backward edge is `reset`, which
/// replaces the session wholesale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    Empty,
    Analyzed,
    Cleaning,
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Empty => "Empty",
            Stage::Analyzed => "Analyzed",
            Stage::Cleaning => "Cleaning",
            Stage::Completed => "Completed",
        };
        f.write_str(s)
    }
}

/// The one in-flight client-side record for a dataset.
///
/// `id` is minted by the engine on upload and threaded back verbatim on every
/// later call. `issues` is the analysis-time snapshot and is never
/// reconciled against the post-clean report.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub dataset_info: DatasetInfo,
    pub issues: Vec<Issue>,
    pub cleaning_result: Option<CleaningResult>,
    pub report: Option<Report>,
}

/// Owned store for the single live session.
///
/// `generation` increments on every reset so responses that raced a reset can
/// be recognized as stale and discarded instead of mutating the new session.
#[derive(Debug, Default)]
pub struct SessionStore {
    stage: Stage,
    session: Option<Session>,
    generation: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// Empty -> Analyzed, on a successful upload.
    ///
    /// Dataset info and issues are stored together as the matched pair from
    /// one analyze call.
    pub fn begin_analyzed(&mut self, analysis: AnalysisResponse) -> Result<(), SweepError> {
        if self.stage != Stage::Empty {
            return Err(SweepError::Sequence("upload requires an empty session"));
        }
        // Preview rows travel to presentation via the upload event; the
        // store keeps only what later pipeline stages need.
        self.session = Some(Session {
            id: analysis.session_id,
            dataset_info: analysis.dataset_info,
            issues: analysis.issues,
            cleaning_result: None,
            report: None,
        });
        self.stage = Stage::Analyzed;
        Ok(())
    }

    /// Analyzed -> Cleaning. Returns the session id for the pipeline calls.
    pub fn begin_cleaning(&mut self) -> Result<String, SweepError> {
        if self.stage != Stage::Analyzed {
            return Err(SweepError::Sequence("cleaning requires an analyzed session"));
        }
        let id = self
            .session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(SweepError::Sequence("no session id for cleaning"))?;
        self.stage = Stage::Cleaning;
        Ok(id)
    }

    /// Cleaning -> Completed, once configure, clean, and report have all
    /// succeeded for the same session id.
    pub fn complete_cleaning(
        &mut self,
        result: CleaningResult,
        report: Report,
    ) -> Result<(), SweepError> {
        if self.stage != Stage::Cleaning {
            return Err(SweepError::Sequence(
                "completion requires an in-progress cleaning",
            ));
        }
        let session = self
            .session
            .as_mut()
            .ok_or(SweepError::Sequence("no session to complete"))?;
        session.cleaning_result = Some(result);
        session.report = Some(report);
        self.stage = Stage::Completed;
        Ok(())
    }

    /// Cleaning -> Analyzed, after any of configure/clean/report failed.
    ///
    /// The session id and the analysis snapshot are preserved; no partial
    /// result is kept.
    pub fn rollback_cleaning(&mut self) {
        if self.stage == Stage::Cleaning {
            self.stage = Stage::Analyzed;
        }
    }

    /// Session id for an export request. Export never changes the stage but
    /// is only reachable from Completed.
    pub fn export_session_id(&self) -> Result<String, SweepError> {
        if self.stage != Stage::Completed {
            return Err(SweepError::Sequence("export requires a completed session"));
        }
        self.session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(SweepError::Sequence("no session id for export"))
    }

    /// Start-over edge, allowed from any stage. Discards the former session
    /// entirely and bumps the generation so late responses are recognizable.
    pub fn reset(&mut self) {
        self.stage = Stage::Empty;
        self.session = None;
        self.generation += 1;
    }
}
