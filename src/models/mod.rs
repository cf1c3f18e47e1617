//! Data models for vmxtune.
//!
//! - [`VmxFile`]: a configuration file as an ordered sequence of raw lines with
//!   key lookup, replace and append (the line store)
//! - [`Settings`]: user settings loaded from `vmxtune.yaml`
//! - [`AdapterType`]: virtual network adapter families
//! - [`RunSummary`]: per-run outcome counters

pub mod config;
pub mod run_summary;
pub mod vmx_file;

pub use config::{AdapterType, Settings};
pub use run_summary::{FileOutcome, RunSummary, SkipReason};
pub use vmx_file::{GUEST_OS_KEY, UNKNOWN_GUEST_OS, VmxError, VmxFile};
