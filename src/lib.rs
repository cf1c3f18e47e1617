// vmxtune - policy-driven remediation of VMware .vmx configuration files
//
// This is the library crate containing the core business logic and data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{AdapterType, FileOutcome, RunSummary, Settings, VmxFile};
pub use state::{ApprovalController, ApprovalState};
pub use ui::{RunController, RunOptions};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
