//! Summary of one backup or restore invocation

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Backup => write!(f, "backup"),
            Operation::Restore => write!(f, "restore"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One logical unit that did not make it into the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// `engine/name`
    pub target: String,
    /// `None` when the whole target failed before any unit ran
    pub unit: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub operation: Operation,
    /// `engine/target/unit` for every unit that was staged or restored
    pub succeeded: Vec<String>,
    pub failures: Vec<UnitFailure>,
    /// A step that failed for the whole run (preflight, snapshot, retention)
    pub run_failure: Option<String>,
    pub cancelled: bool,
    pub snapshot_id: Option<String>,
    pub duration: Duration,
    pub log_path: Option<PathBuf>,
}

impl RunReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            succeeded: Vec::new(),
            failures: Vec::new(),
            run_failure: None,
            cancelled: false,
            snapshot_id: None,
            duration: Duration::ZERO,
            log_path: None,
        }
    }

    pub fn record_success(&mut self, target: &str, unit: &str) {
        self.succeeded.push(format!("{}/{}", target, unit));
    }

    pub fn record_failure(&mut self, target: &str, unit: Option<&str>, error: impl fmt::Display) {
        self.failures.push(UnitFailure {
            target: target.to_string(),
            unit: unit.map(str::to_string),
            error: error.to_string(),
        });
    }

    pub fn status(&self) -> RunStatus {
        if self.run_failure.is_some() {
            return RunStatus::Failed;
        }
        if !self.failures.is_empty() && self.succeeded.is_empty() {
            return RunStatus::Failed;
        }
        if !self.failures.is_empty() || self.cancelled {
            return RunStatus::Partial;
        }
        RunStatus::Success
    }

    /// 0 only for a fully successful run
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            RunStatus::Success => 0,
            _ => 1,
        }
    }

    /// Failed target ids, each once, in the order they failed
    pub fn failed_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for failure in &self.failures {
            if !targets.contains(&failure.target) {
                targets.push(failure.target.clone());
            }
        }
        targets
    }

    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} {}: {} succeeded, {} failed in {}",
            self.operation,
            self.status(),
            self.succeeded.len(),
            self.failures.len(),
            format_duration(self.duration.as_secs())
        );
        let failed = self.failed_targets();
        if !failed.is_empty() {
            line.push_str(&format!(" (failed: {})", failed.join(", ")));
        }
        if let Some(ref failure) = self.run_failure {
            line.push_str(&format!("; {}", failure));
        }
        if self.cancelled {
            line.push_str("; cancelled");
        }
        line
    }
}

/// Format duration in human-readable form
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, secs)
        }
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
