//! Services module - business logic for inspecting and remediating `.vmx` files.
//!
//! Everything here is independent of the console layer so it can be driven by
//! tests or by the interactive [`RunController`](crate::ui::RunController).
//!
//! # Components
//!
//! - [`PolicyEngine`]: ordered, first-match-wins guest OS rules for the
//!   recommended adapter type and the optional hardware pin.
//! - [`LockInspector`]: classifies a file as free, held by a running engine,
//!   or carrying a stale lock, using a [`ProcessTable`].
//! - [`ChangePlanner`]: diffs a loaded file against the policy and produces a
//!   [`ChangePlan`] without touching the file.
//! - [`Writer`]: applies a plan, optionally backing the file up first, and
//!   replaces the file atomically.
//! - [`discover`]: finds candidate files under a root directory.
//!
//! # Flow
//!
//! For each discovered file: lock check, load, classify, plan, approve, write.
//! A failure in one file never stops the run; see [`crate::ui::controller`].

pub mod discovery;
pub mod lock;
pub mod planner;
pub mod policy;
pub mod process;
pub mod writer;

pub use discovery::discover;
pub use lock::{LockError, LockInspector, LockState, lock_path};
pub use planner::{ChangePlan, ChangePlanner, PendingChange};
pub use policy::{HardwarePin, PolicyEngine, Rule};
pub use process::{ProcessError, ProcessTable, RunningProcess, SystemProcessTable};
pub use writer::{WriteError, WriteReport, Writer, backup_path, persist_atomically};
