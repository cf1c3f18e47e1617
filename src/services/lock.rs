use crate::services::process::ProcessTable;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Ownership state of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock artifact
    Free,
    /// Lock artifact present and an engine process is running
    ActiveExternal,
    /// Lock artifact present but no engine process is running
    Stale,
}

/// Errors while removing a stale lock
#[derive(Error, Debug)]
#[error("Failed to remove lock {path}: {source}")]
pub struct LockError {
    pub path: Utf8PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Sibling lock artifact path: `<file>.lck`
pub fn lock_path(file: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.lck", file))
}

/// Decides whether a configuration file is owned by a running engine.
///
/// A lock is only classified [`LockState::Stale`] when the process table
/// positively reports no engine running. If the query itself fails the lock
/// is treated as live: a missed cleanup is recoverable, editing the file of
/// a running machine is not.
pub struct LockInspector<P> {
    processes: P,
    engine_names: Vec<String>,
}

impl<P: ProcessTable> LockInspector<P> {
    pub fn new(processes: P, engine_names: Vec<String>) -> Self {
        Self {
            processes,
            engine_names,
        }
    }

    pub fn inspect(&self, file: &Utf8Path) -> LockState {
        let lock = lock_path(file);
        if !lock.exists() {
            return LockState::Free;
        }

        match self.processes.running(&self.engine_names) {
            Ok(running) if running.is_empty() => {
                tracing::info!("Lock {} has no running engine process", lock);
                LockState::Stale
            }
            Ok(running) => {
                tracing::info!(
                    "Lock {} is held; {} engine process(es) running",
                    lock,
                    running.len()
                );
                LockState::ActiveExternal
            }
            Err(e) => {
                tracing::warn!("Process query failed for {}, treating lock as active: {}", lock, e);
                LockState::ActiveExternal
            }
        }
    }

    /// Remove a stale lock artifact (file or directory).
    pub fn remove_stale_lock(&self, file: &Utf8Path) -> Result<(), LockError> {
        let lock = lock_path(file);
        let result = if lock.is_dir() {
            fs::remove_dir_all(&lock)
        } else {
            fs::remove_file(&lock)
        };
        result.map_err(|source| LockError {
            path: lock.clone(),
            source,
        })?;

        tracing::info!("Removed stale lock {}", lock);
        Ok(())
    }

    /// The process table this inspector queries.
    pub fn processes(&self) -> &P {
        &self.processes
    }

    pub fn engine_names(&self) -> &[String] {
        &self.engine_names
    }
}
