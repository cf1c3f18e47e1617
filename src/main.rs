//! vmxtune - guest-aware remediation of virtual machine configuration files
//!
//! Main entry point for the console application.
//!
//! # Overview
//!
//! This binary scans a directory tree for `.vmx` files and brings each one in
//! line with the adapter, hardware pinning and time sync policy for its guest
//! OS. It initializes:
//! - Logging infrastructure (daily file rotation, console output in debug mode)
//! - Configuration loading ([`ConfigManager`])
//! - The system process table used for lock checks
//! - The console run controller ([`RunController`])
//!
//! # Execution Flow
//!
//! 1. Parse command-line arguments
//! 2. Load `vmxtune Data/vmxtune.yaml` (defaults if missing), apply flags
//! 3. Initialize logging → logs/vmxtune.<date> (debug level from `debug_mode`)
//! 4. Process every file under the root, one at a time
//! 5. Print and log the run summary
//!
//! Per-file failures are reported in the summary and do not change the exit
//! status; an invalid root or unusable configuration does.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use std::time::Duration;
use vmxtune::services::SystemProcessTable;
use vmxtune::ui::StdConsole;
use vmxtune::{APP_NAME, ConfigManager, RunController, RunOptions, Settings, VERSION};

/// Apply guest-OS-aware network adapter, hardware pinning and time sync
/// settings to virtual machine configuration files.
#[derive(Parser, Debug)]
#[command(name = "vmxtune", version, about)]
struct Args {
    /// Directory to scan for configuration files
    #[arg(required_unless_present = "init_config")]
    root: Option<Utf8PathBuf>,

    /// Only scan the root directory itself
    #[arg(long)]
    no_recursive: bool,

    /// Do not write `<file>.bak` before modifying a file
    #[arg(long)]
    no_backup: bool,

    /// Approve every change plan without prompting
    #[arg(short = 'y', long)]
    yes: bool,

    /// Show planned changes without prompting, removing locks or writing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Skip the check for running virtualization engine instances
    #[arg(long)]
    no_guard: bool,

    /// Directory holding vmxtune.yaml
    #[arg(long, default_value = "vmxtune Data")]
    config_dir: Utf8PathBuf,

    /// Write a default settings file and exit
    #[arg(long)]
    init_config: bool,

    /// Debug logging, mirrored to stderr
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Command-line flags take precedence over the settings file.
    fn apply_to(&self, settings: &mut Settings) {
        if self.no_recursive {
            settings.recursive = false;
        }
        if self.no_backup {
            settings.backup = false;
        }
        if self.no_guard {
            settings.guard_running_instances = false;
        }
        if self.debug {
            settings.debug_mode = true;
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            approve_all: self.yes,
            dry_run: self.dry_run,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new(&args.config_dir)?;

    if args.init_config {
        if config_manager.init_settings()? {
            println!("Wrote default settings to {}", config_manager.settings_path());
        } else {
            println!(
                "Settings file already exists: {}",
                config_manager.settings_path()
            );
        }
        return Ok(());
    }

    // Settings come first: `debug_mode` in the file selects the log level
    let mut settings = config_manager.load_settings()?;
    args.apply_to(&mut settings);

    // Held until exit so buffered log lines are flushed
    let _guard = vmxtune::logging::setup_logging(
        "logs",
        "vmxtune",
        settings.debug_mode,
        settings.debug_mode,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Settings loaded from {}", config_manager.settings_path());
    tracing::debug!("Effective settings: {:?}", settings);

    let Some(root) = args.root.as_deref() else {
        anyhow::bail!("No root directory given");
    };

    let processes =
        SystemProcessTable::new(Duration::from_secs(settings.process_query_timeout_secs))
            .context("Failed to start process query runtime")?;

    let mut controller =
        RunController::new(settings, processes, StdConsole::new(), args.run_options());
    let summary = controller.run(root)?;

    if summary.failed > 0 {
        tracing::warn!("{} file(s) failed; see log for details", summary.failed);
    }

    tracing::info!("Run complete in {:.2}s", summary.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from(["vmxtune", "vms", "--no-recursive", "--no-backup", "--no-guard"]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        assert!(!settings.recursive);
        assert!(!settings.backup);
        assert!(!settings.guard_running_instances);
        assert_eq!(args.root.as_deref().map(|p| p.as_str()), Some("vms"));
        assert_eq!(args.config_dir.as_str(), "vmxtune Data");
    }

    #[test]
    fn test_debug_mode_from_file_or_flag() {
        let from_file = Settings {
            debug_mode: true,
            ..Settings::default()
        };
        let mut settings = from_file.clone();
        Args::parse_from(["vmxtune", "vms"]).apply_to(&mut settings);
        assert!(settings.debug_mode, "flags must not clear debug_mode from the file");

        let mut settings = Settings::default();
        Args::parse_from(["vmxtune", "vms", "--debug"]).apply_to(&mut settings);
        assert!(settings.debug_mode);

        let mut settings = Settings::default();
        Args::parse_from(["vmxtune", "vms"]).apply_to(&mut settings);
        assert!(!settings.debug_mode);
    }

    #[test]
    fn test_run_options_from_flags() {
        let args = Args::parse_from(["vmxtune", "vms", "--yes", "--dry-run"]);
        assert_eq!(
            args.run_options(),
            RunOptions {
                approve_all: true,
                dry_run: true
            }
        );
    }

    #[test]
    fn test_root_optional_with_init_config() {
        assert!(Args::try_parse_from(["vmxtune", "--init-config"]).is_ok());
        assert!(Args::try_parse_from(["vmxtune"]).is_err());
    }
}
