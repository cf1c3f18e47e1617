// Run Controller - drives one remediation run over a directory tree
//
// This module contains the RunController which coordinates between:
// - Console (operator prompts and output)
// - LockInspector (is a file in use?)
// - ChangePlanner (what should change?)
// - ApprovalController (may it change?)
// - Writer (apply and persist)
//
// Files are processed strictly one after another. Every per-file failure is
// converted into an outcome at the file boundary; only an invalid root aborts.

use crate::models::{FileOutcome, RunSummary, Settings, SkipReason, VmxFile};
use crate::services::{
    ChangePlan, ChangePlanner, LockInspector, LockState, PolicyEngine, ProcessTable, Writer,
    backup_path, discover, lock_path,
};
use crate::state::{Answer, ApprovalController, Verdict};
use crate::ui::console::{Console, confirm};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

const APPROVAL_PROMPT: &str = "Apply these changes? [y]es / [N]o / [a]ll / [q]uit: ";

/// Errors that abort a whole run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Root path does not exist or is not a directory: {0}")]
    InvalidRoot(Utf8PathBuf),
}

/// Per-run switches that do not come from the settings file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Start in AutoApproveAll
    pub approve_all: bool,
    /// Plan and display only; never prompt, remove locks or write
    pub dry_run: bool,
}

/// Console controller for a remediation run
///
/// # Example
/// ```ignore
/// let processes = SystemProcessTable::new(Duration::from_secs(10))?;
/// let mut controller = RunController::new(settings, processes, StdConsole::new(), RunOptions::default());
/// let summary = controller.run(Utf8Path::new("D:/VMs"))?;
/// ```
pub struct RunController<P, C> {
    settings: Settings,
    inspector: LockInspector<P>,
    planner: ChangePlanner,
    writer: Writer,
    approval: ApprovalController,
    console: C,
    options: RunOptions,
}

impl<P: ProcessTable, C: Console> RunController<P, C> {
    pub fn new(settings: Settings, processes: P, console: C, options: RunOptions) -> Self {
        let policy = PolicyEngine::new(settings.baseline_adapter);
        let planner = ChangePlanner::new(policy, &settings);
        let inspector = LockInspector::new(processes, settings.engine_processes.clone());
        let writer = Writer::new(settings.backup);
        let approval = ApprovalController::new(options.approve_all);

        Self {
            settings,
            inspector,
            planner,
            writer,
            approval,
            console,
            options,
        }
    }

    /// Process every configuration file under `root`.
    pub fn run(&mut self, root: &Utf8Path) -> Result<RunSummary, RunError> {
        if !root.is_dir() {
            tracing::error!("Invalid root path: {}", root);
            return Err(RunError::InvalidRoot(root.to_path_buf()));
        }

        tracing::info!(
            "Starting run: root={}, recursive={}, backup={}, dry_run={}, approve_all={}",
            root,
            self.settings.recursive,
            self.settings.backup,
            self.options.dry_run,
            self.options.approve_all
        );

        if self.settings.guard_running_instances && !self.options.dry_run {
            self.guard_running_instances();
        }

        let files = discover(root, &self.settings.extension, self.settings.recursive);
        let total = files.len();
        let mut summary = RunSummary::new();

        for (index, path) in files.iter().enumerate() {
            self.console
                .say(&format!("[{}/{}] {}", index + 1, total, path));

            let outcome = self.process_file(path);
            self.report(&outcome);
            summary.record(path, &outcome);

            if self.approval.is_quitting() {
                tracing::info!(
                    "Operator quit; {} file(s) left unvisited",
                    total - index - 1
                );
                break;
            }
        }

        self.console.say(&format!("Done: {}", summary.summary()));
        summary.log_summary();
        Ok(summary)
    }

    /// Lock gate, load, plan, approve, write, for a single file.
    pub fn process_file(&mut self, path: &Utf8Path) -> FileOutcome {
        match self.inspector.inspect(path) {
            LockState::Free => {}
            LockState::ActiveExternal => {
                tracing::info!("Skipping {}: in use by a running instance", path);
                return FileOutcome::Skipped(SkipReason::LockConflict);
            }
            LockState::Stale if self.options.dry_run => {
                self.console
                    .say(&format!("  stale lock present: {}", lock_path(path)));
            }
            LockState::Stale => {
                let question = format!("  Stale lock {} found. Remove it?", lock_path(path));
                let remove = confirm(&mut self.console, &question).unwrap_or_else(|e| {
                    tracing::warn!("Failed to read answer, keeping lock: {}", e);
                    false
                });
                if !remove {
                    tracing::info!("Keeping stale lock for {}", path);
                    return FileOutcome::Skipped(SkipReason::StaleLockKept);
                }
                if let Err(e) = self.inspector.remove_stale_lock(path) {
                    tracing::error!("{}", e);
                    return FileOutcome::Failed(e.to_string());
                }
            }
        }

        let file = match VmxFile::load(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("{}", e);
                return FileOutcome::Failed(e.to_string());
            }
        };

        let plan = self.planner.plan(&file);
        if plan.is_empty() {
            return FileOutcome::Unchanged;
        }

        self.show_plan(&file, &plan);

        if self.options.dry_run {
            return FileOutcome::Planned {
                changes: plan.len(),
            };
        }

        match self.decide() {
            Verdict::Apply => match self.writer.apply(&file, &plan) {
                Ok(report) => FileOutcome::Optimized {
                    changes: report.changes_applied,
                },
                Err(e) => {
                    tracing::error!("{}", e);
                    let backup = backup_path(path);
                    if self.settings.backup && backup.exists() {
                        tracing::warn!("Original kept at {} for manual recovery", backup);
                    }
                    FileOutcome::Failed(e.to_string())
                }
            },
            Verdict::Discard => FileOutcome::Skipped(SkipReason::Declined),
            Verdict::Stop => FileOutcome::Skipped(SkipReason::Quit),
        }
    }

    fn decide(&mut self) -> Verdict {
        if !self.approval.needs_prompt() {
            let verdict = self.approval.auto_verdict();
            tracing::debug!("Auto verdict: {}", verdict);
            return verdict;
        }

        let input = self.console.ask(APPROVAL_PROMPT).unwrap_or_else(|e| {
            tracing::warn!("Failed to read answer, declining: {}", e);
            String::new()
        });
        self.approval.answer(Answer::parse(&input))
    }

    fn show_plan(&mut self, file: &VmxFile, plan: &ChangePlan) {
        self.console.say(&format!(
            "  guest OS {}: {} change(s)",
            file.guest_os(),
            plan.len()
        ));
        for change in plan.iter() {
            self.console.say(&format!("    {}", change));
        }
    }

    fn report(&mut self, outcome: &FileOutcome) {
        let line = match outcome {
            FileOutcome::Optimized { changes } => format!("  optimized ({} change(s))", changes),
            FileOutcome::Unchanged => "  already compliant".to_string(),
            FileOutcome::Planned { changes } => format!("  {} change(s) pending (dry run)", changes),
            FileOutcome::Skipped(reason) => format!("  skipped: {}", reason),
            FileOutcome::Failed(reason) => format!("  FAILED: {}", reason),
        };
        self.console.say(&line);
    }

    /// Offer to terminate running engine instances before scanning.
    ///
    /// Declining is safe: files owned by running instances are still protected
    /// by the lock check.
    fn guard_running_instances(&mut self) {
        let running = match self
            .inspector
            .processes()
            .running(self.inspector.engine_names())
        {
            Ok(running) => running,
            Err(e) => {
                tracing::warn!("Could not list running instances: {}", e);
                return;
            }
        };

        if running.is_empty() {
            tracing::debug!("No running engine instances");
            return;
        }

        self.console.say(&format!(
            "{} virtualization engine process(es) running:",
            running.len()
        ));
        for process in &running {
            self.console
                .say(&format!("  {} (pid {})", process.name, process.pid));
        }

        let terminate = confirm(&mut self.console, "Terminate them before scanning?")
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to read answer, leaving processes running: {}", e);
                false
            });
        if !terminate {
            tracing::info!("Leaving {} engine process(es) running", running.len());
            return;
        }

        for process in &running {
            if let Err(e) = self.inspector.processes().terminate(process) {
                tracing::error!("Failed to terminate pid {}: {}", process.pid, e);
                self.console
                    .say(&format!("  could not terminate pid {}: {}", process.pid, e));
            }
        }
    }

    pub fn approval(&self) -> &ApprovalController {
        &self.approval
    }

    pub fn console(&self) -> &C {
        &self.console
    }
}
