use crate::models::{VmxError, VmxFile};
use crate::services::planner::ChangePlan;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::Write;
use thiserror::Error;

/// Errors from applying a change plan
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Persist {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Reload(#[from] VmxError),

    #[error("Verification failed for {path}: {key} is {found:?}, expected {expected:?}")]
    Verification {
        path: Utf8PathBuf,
        key: String,
        expected: String,
        found: Option<String>,
    },
}

/// Outcome of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub changes_applied: usize,
    pub backup: Option<Utf8PathBuf>,
}

/// Sibling backup path: `<file>.bak`
pub fn backup_path(file: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.bak", file))
}

/// Applies change plans to files on disk
#[derive(Debug, Clone)]
pub struct Writer {
    backup: bool,
}

impl Writer {
    pub fn new(backup: bool) -> Self {
        Self { backup }
    }

    /// Apply `plan` to `file` and persist the result atomically.
    ///
    /// The original is copied to `<file>.bak` first when backups are enabled;
    /// the backup is left in place if anything later fails. After the write the
    /// file is read back and every planned key must hold its new value.
    pub fn apply(&self, file: &VmxFile, plan: &ChangePlan) -> Result<WriteReport, WriteError> {
        let path = file.path();

        let backup = if self.backup {
            let target = backup_path(path);
            fs::copy(path, &target).map_err(|source| WriteError::Backup {
                path: target.clone(),
                source,
            })?;
            tracing::debug!("Backed up {} to {}", path, target);
            Some(target)
        } else {
            None
        };

        let mut updated = file.clone();
        for change in plan.iter() {
            updated.set(&change.key, &change.new_value);
        }

        let lines = updated.lines();
        persist_atomically(path, |out| {
            for line in lines {
                out.write_all(line)?;
            }
            Ok(())
        })?;

        verify(path, plan)?;

        tracing::info!("Applied {} change(s) to {}", plan.len(), path);
        Ok(WriteReport {
            changes_applied: plan.len(),
            backup,
        })
    }
}

/// Write a file through a sibling temp file and rename it over `path`.
///
/// `fill` produces the complete new content. If it fails, or anything before
/// the rename fails, the temp file is discarded and `path` keeps its old
/// content. Readers see either the old file or the new one, never a mixture.
pub fn persist_atomically<F>(path: &Utf8Path, fill: F) -> Result<(), WriteError>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let persist_error = |source| WriteError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(persist_error)?;

    fill(temp.as_file_mut()).map_err(persist_error)?;
    temp.as_file().sync_all().map_err(persist_error)?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(persist_error)?;
    }

    temp.persist(path).map_err(|e| persist_error(e.error))?;
    Ok(())
}

fn verify(path: &Utf8Path, plan: &ChangePlan) -> Result<(), WriteError> {
    let written = VmxFile::load(path)?;
    for change in plan.iter() {
        let found = written.get(&change.key);
        if found.as_deref() != Some(change.new_value.as_str()) {
            tracing::error!("Post-write check failed for {} in {}", change.key, path);
            return Err(WriteError::Verification {
                path: path.to_path_buf(),
                key: change.key.clone(),
                expected: change.new_value.clone(),
                found,
            });
        }
    }
    Ok(())
}
