//! Process-table collaborator.
//!
//! The lock inspector and the pre-run guard only need two things from the OS:
//! which engine processes are running, and a way to stop one. [`ProcessTable`]
//! is the seam; [`SystemProcessTable`] is the real implementation, which asks
//! `tasklist`/`ps` and runs `taskkill`/`kill` as subprocesses.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// A running process as reported by the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: u32,
    pub name: String,
}

/// Errors from process-table queries
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {elapsed:?}")]
    Timeout {
        program: &'static str,
        elapsed: Duration,
    },

    #[error("{program} exited with code {code}")]
    Failed { program: &'static str, code: i32 },

    #[error("Failed to create process query runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Access to running processes
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable {
    /// Running processes whose name matches one of `names`.
    fn running(&self, names: &[String]) -> Result<Vec<RunningProcess>, ProcessError>;

    /// Ask a process to stop.
    fn terminate(&self, process: &RunningProcess) -> Result<(), ProcessError>;
}

/// Compare process names case-insensitively, ignoring a trailing `.exe`.
pub fn process_name_matches(actual: &str, wanted: &str) -> bool {
    fn normalize(name: &str) -> String {
        let lower = name.trim().to_ascii_lowercase();
        // `ps -o comm=` may report a full path on some platforms
        let base = lower.rsplit(['/', '\\']).next().unwrap_or(&lower).to_string();
        base.strip_suffix(".exe").map(str::to_string).unwrap_or(base)
    }
    normalize(actual) == normalize(wanted)
}

/// Parse `tasklist /FO CSV /NH` output: `"image","pid",...`
pub fn parse_tasklist_csv(output: &str) -> Vec<RunningProcess> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split("\",\"");
            let name = fields.next()?.trim().trim_start_matches('"');
            let pid = fields.next()?.trim_end_matches('"').parse().ok()?;
            Some(RunningProcess {
                pid,
                name: name.to_string(),
            })
        })
        .collect()
}

/// Parse `ps -A -o pid= -o comm=` output: `<pid> <command>`
pub fn parse_ps_output(output: &str) -> Vec<RunningProcess> {
    output
        .lines()
        .filter_map(|line| {
            let (pid, name) = line.trim().split_once(char::is_whitespace)?;
            Some(RunningProcess {
                pid: pid.parse().ok()?,
                name: name.trim().to_string(),
            })
        })
        .collect()
}

/// Process table backed by the operating system's own tools
pub struct SystemProcessTable {
    runtime: tokio::runtime::Runtime,
    query_timeout: Duration,
}

impl SystemProcessTable {
    /// Create a process table whose subprocess calls are bounded by `query_timeout`.
    pub fn new(query_timeout: Duration) -> Result<Self, ProcessError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ProcessError::Runtime)?;

        Ok(Self {
            runtime,
            query_timeout,
        })
    }

    async fn run(&self, program: &'static str, args: &[String]) -> Result<Output, ProcessError> {
        tracing::debug!("Executing: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = timeout(self.query_timeout, child)
            .await
            .map_err(|_| {
                tracing::warn!("{} timed out after {:?}", program, self.query_timeout);
                ProcessError::Timeout {
                    program,
                    elapsed: self.query_timeout,
                }
            })?
            .map_err(|source| ProcessError::Spawn { program, source })?;

        if !output.status.success() {
            return Err(ProcessError::Failed {
                program,
                code: output.status.code().unwrap_or(-1),
            });
        }

        Ok(output)
    }

    async fn list(&self) -> Result<Vec<RunningProcess>, ProcessError> {
        if cfg!(target_os = "windows") {
            let args = ["/FO", "CSV", "/NH"].map(String::from);
            let output = self.run("tasklist", &args).await?;
            Ok(parse_tasklist_csv(&String::from_utf8_lossy(&output.stdout)))
        } else {
            let args = ["-A", "-o", "pid=", "-o", "comm="].map(String::from);
            let output = self.run("ps", &args).await?;
            Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
        }
    }
}

impl ProcessTable for SystemProcessTable {
    fn running(&self, names: &[String]) -> Result<Vec<RunningProcess>, ProcessError> {
        let all = self.runtime.block_on(self.list())?;
        Ok(all
            .into_iter()
            .filter(|process| {
                names
                    .iter()
                    .any(|wanted| process_name_matches(&process.name, wanted))
            })
            .collect())
    }

    fn terminate(&self, process: &RunningProcess) -> Result<(), ProcessError> {
        tracing::info!("Terminating {} (pid {})", process.name, process.pid);
        let pid = process.pid.to_string();
        if cfg!(target_os = "windows") {
            let args = ["/PID".to_string(), pid, "/F".to_string()];
            self.runtime.block_on(self.run("taskkill", &args))?;
        } else {
            let args = ["-TERM".to_string(), pid];
            self.runtime.block_on(self.run("kill", &args))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name_matching() {
        assert!(process_name_matches("vmware-vmx.exe", "vmware-vmx"));
        assert!(process_name_matches("VMware.EXE", "vmware"));
        assert!(process_name_matches("/usr/lib/vmware/bin/vmware-vmx", "vmware-vmx"));
        assert!(!process_name_matches("vmware-tray.exe", "vmware"));
        assert!(!process_name_matches("vmware-vmx", "vmware"));
    }

    #[test]
    fn test_parse_tasklist_csv() {
        let output = "\"System Idle Process\",\"0\",\"Services\",\"0\",\"8 K\"\r\n\
                      \"vmware-vmx.exe\",\"4242\",\"Console\",\"1\",\"120,000 K\"\r\n";
        let processes = parse_tasklist_csv(output);
        assert_eq!(processes.len(), 2);
        assert_eq!(
            processes[1],
            RunningProcess {
                pid: 4242,
                name: "vmware-vmx.exe".to_string()
            }
        );
    }

    #[test]
    fn test_parse_ps_output() {
        let output = "    1 init\n  812 vmware-vmx\nbogus\n";
        let processes = parse_ps_output(output);
        assert_eq!(processes.len(), 2);
        assert_eq!(processes[1].pid, 812);
        assert_eq!(processes[1].name, "vmware-vmx");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let table = SystemProcessTable::new(Duration::from_secs(5)).unwrap();
        let result = tokio_test::block_on(table.run("vmxtune-no-such-program", &[]));
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_query_times_out() {
        let table = SystemProcessTable::new(Duration::from_millis(100)).unwrap();
        let result = tokio_test::block_on(table.run("sleep", &["5".to_string()]));
        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
    }

    #[test]
    fn test_system_table_filters_by_name() {
        // No engine named like this exists; the query itself must still work.
        let table = SystemProcessTable::new(Duration::from_secs(10)).unwrap();
        if let Ok(found) = table.running(&["definitely-not-a-real-engine".to_string()]) {
            assert!(found.is_empty());
        }
    }
}
