//! Export trigger: fetch the cleaned-data artifact and materialize it as a
//! local file.
//!
//! A zero-length body is a distinct failure from a transport error because
//! the HTTP layer may report 200 with an empty payload. Writes go through a
//! temporary file that is removed on every failure path.

use crate::engine::CleaningBackend;
use crate::error::SweepError;
use crate::model::ExportFormat;
use std::path::{Path, PathBuf};

/// A cleaned-data artifact saved to disk.
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Request the artifact for a completed session and save it.
///
/// Export never changes the session stage and may run any number of times.
pub async fn download_artifact(
    backend: &dyn CleaningBackend,
    session_id: &str,
    format: ExportFormat,
    output_dir: Option<&Path>,
) -> Result<SavedArtifact, SweepError> {
    let body = backend.download(session_id, format).await?;
    if body.is_empty() {
        return Err(SweepError::EmptyArtifact);
    }

    let dir = resolve_output_dir(output_dir)?;
    let path = artifact_path(&dir, format);
    write_artifact(&path, &body)?;

    Ok(SavedArtifact {
        path,
        bytes: body.len() as u64,
    })
}

/// Explicit directory, else the platform download dir, else the cwd.
fn resolve_output_dir(explicit: Option<&Path>) -> Result<PathBuf, SweepError> {
    if let Some(dir) = explicit {
        std::fs::create_dir_all(dir)?;
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = dirs::download_dir() {
        return Ok(dir);
    }
    Ok(std::env::current_dir()?)
}

/// Default artifact name, de-clashed with a timestamp when it already exists.
fn artifact_path(dir: &Path, format: ExportFormat) -> PathBuf {
    let default = dir.join(format.artifact_name());
    if !default.exists() {
        return default;
    }
    let stamp = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
        .replace(':', "-")
        .replace('T', "_");
    let name = format.artifact_name();
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, "dat"));
    dir.join(format!("{stem}-{stamp}.{ext}"))
}

/// Write through a `.part` temp file and rename into place. The temp file is
/// removed on any failure, including failure after partial setup.
fn write_artifact(path: &Path, body: &[u8]) -> Result<(), SweepError> {
    let tmp = path.with_extension("part");
    let result = std::fs::write(&tmp, body).and_then(|_| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result.map_err(SweepError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{scratch_dir, ScriptedEngine};
    use crate::session::{SessionStore, Stage};
    use bytes::Bytes;

    #[tokio::test]
    async fn empty_body_is_an_empty_artifact_error() {
        let mut engine = ScriptedEngine::happy();
        engine.artifact = Bytes::new();
        let dir = scratch_dir("empty");

        let err = download_artifact(&engine, "sess-1", ExportFormat::Csv, Some(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::EmptyArtifact));
        // Nothing was written, partial or otherwise.
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn empty_artifact_leaves_the_stage_untouched() {
        let mut engine = ScriptedEngine::happy();
        engine.artifact = Bytes::new();
        let dir = scratch_dir("empty-stage");

        let mut store = SessionStore::new();
        store.begin_analyzed(engine.analysis.clone()).unwrap();
        store.begin_cleaning().unwrap();
        store
            .complete_cleaning(engine.cleaning.clone(), engine.report.clone())
            .unwrap();

        let session_id = store.export_session_id().unwrap();
        let err = download_artifact(&engine, &session_id, ExportFormat::Csv, Some(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::EmptyArtifact));
        assert_eq!(store.stage(), Stage::Completed);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn artifact_is_saved_with_the_format_name() {
        let engine = ScriptedEngine::happy();
        let dir = scratch_dir("save");

        let saved = download_artifact(&engine, "sess-1", ExportFormat::Csv, Some(&dir))
            .await
            .unwrap();
        assert_eq!(saved.path, dir.join("cleaned_data.csv"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"id,name\n1,Ada\n");
        // No leftover temp file.
        assert!(!dir.join("cleaned_data.part").exists());

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn repeat_exports_do_not_clobber_an_existing_artifact() {
        let engine = ScriptedEngine::happy();
        let dir = scratch_dir("repeat");

        let first = download_artifact(&engine, "sess-1", ExportFormat::Excel, Some(&dir))
            .await
            .unwrap();
        let second = download_artifact(&engine, "sess-1", ExportFormat::Excel, Some(&dir))
            .await
            .unwrap();
        assert_eq!(first.path, dir.join("cleaned_data.xlsx"));
        assert_ne!(first.path, second.path);
        assert!(second.path.exists());

        std::fs::remove_dir_all(dir).ok();
    }
}
