//! Store path resolution.
//!
//! A configured store path is one of:
//! - `%DOCUMENTS%/rest`: under the user's documents folder
//! - an absolute path, used as-is
//! - anything else, relative to the application directory

use std::path::{Path, PathBuf};

use cellmirror_core::{ConfigError, MirrorResult, DOCUMENTS_PREFIX};

/// Resolve `raw` against the given documents and application directories.
pub fn resolve_store_path(
    raw: &str,
    documents_dir: Option<&Path>,
    app_dir: &Path,
) -> MirrorResult<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::MissingRequired {
            field: "store_path".to_string(),
        }
        .into());
    }

    if let Some(rest) = strip_documents_prefix(raw) {
        let documents = documents_dir.ok_or_else(|| ConfigError::InvalidValue {
            field: "store_path".to_string(),
            value: raw.to_string(),
            reason: "no documents folder on this system".to_string(),
        })?;
        let rest = rest.trim_start_matches(['/', '\\']);
        return Ok(documents.join(rest));
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(app_dir.join(path))
    }
}

/// Resolve against the real documents folder and the executable's directory.
pub fn resolve_store_path_for_host(raw: &str) -> MirrorResult<PathBuf> {
    let documents = dirs::document_dir();
    resolve_store_path(raw, documents.as_deref(), &application_dir())
}

/// Directory of the running executable, else the working directory.
pub fn application_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn strip_documents_prefix(raw: &str) -> Option<&str> {
    let head = raw.get(..DOCUMENTS_PREFIX.len())?;
    if head.eq_ignore_ascii_case(DOCUMENTS_PREFIX) {
        raw.get(DOCUMENTS_PREFIX.len()..)
    } else {
        None
    }
}
