//! Upload intake: client-side validation before a file reaches the
//! transport client.
//!
//! Both submission paths (drag-drop and manual selection) share one
//! `accepts` predicate so they are behaviorally identical. Only the failure
//! handling differs: a rejected drop is silently ignored, a rejected manual
//! selection surfaces a validation error. Size limits are advisory copy
//! only; the engine enforces them authoritatively.

use crate::error::SweepError;
use std::path::{Path, PathBuf};

/// Extensions the engine can parse.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// MIME types a drag-drop source may report instead of an extension.
pub const ACCEPTED_MIME_TYPES: [&str; 3] = [
    "text/csv",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

/// Advisory upload ceiling shown to the user. Not enforced client-side.
pub const ADVISORY_MAX_SIZE_MB: u64 = 50;

/// Advisory copy for upload prompts.
pub fn advisory_note() -> String {
    format!("CSV, XLSX, XLS, max {ADVISORY_MAX_SIZE_MB} MB")
}

/// Whether a candidate file may be forwarded to the engine, by extension or
/// reported MIME type.
pub fn accepts(path: &Path, mime: Option<&str>) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_ascii_lowercase();
        if ACCEPTED_EXTENSIONS.iter().any(|a| *a == ext) {
            return true;
        }
    }
    if let Some(mime) = mime {
        return ACCEPTED_MIME_TYPES.iter().any(|a| *a == mime);
    }
    false
}

/// Drag-drop path: a rejected item is silently ignored, not an error.
pub fn submit_dropped(path: &Path, mime: Option<&str>) -> Option<PathBuf> {
    accepts(path, mime).then(|| path.to_path_buf())
}

/// Manual-selection path: the user named this file explicitly, so a
/// rejection is surfaced.
pub fn submit_selected(path: &Path, mime: Option<&str>) -> Result<PathBuf, SweepError> {
    if accepts(path, mime) {
        Ok(path.to_path_buf())
    } else {
        Err(SweepError::Validation(path.display().to_string()))
    }
}
