//! Structured run record, one JSON line per run on the `audit` target

use crate::orchestrator::RunSummary;
use chrono::Utc;
use pibackup_common::{BackupTask, PipelineState, RunOutcome};

/// Audit log entry for a finished run
#[derive(Debug, serde::Serialize)]
struct RunRecord<'a> {
    timestamp: String,
    user_id: u32,
    process_id: u32,
    device: &'a str,
    source_device: &'a str,
    image: String,
    outcome: &'a RunOutcome,
    state: PipelineState,
    elapsed_secs: u64,
    artifact: Option<String>,
    artifact_size: Option<u64>,
}

impl<'a> RunRecord<'a> {
    fn new(task: &'a BackupTask, summary: &'a RunSummary) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            user_id: nix::unistd::getuid().as_raw(),
            process_id: std::process::id(),
            device: &task.device_name,
            source_device: &task.source_device,
            image: task.image_path().display().to_string(),
            outcome: &summary.outcome,
            state: summary.state,
            elapsed_secs: summary.elapsed.as_secs(),
            artifact: summary.artifact.as_ref().map(|p| p.display().to_string()),
            artifact_size: summary.artifact_size,
        }
    }

    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Log the record as JSON for easy parsing
    fn log(&self) {
        if let Some(json) = self.to_json() {
            log::info!(target: "audit", "{json}");
        } else {
            // Fallback to unstructured if serialization fails
            log::info!(
                target: "audit",
                "device={} outcome={} state={} elapsed={}s",
                self.device,
                self.outcome.as_str(),
                self.state,
                self.elapsed_secs
            );
        }
    }
}

/// Log the audit record for a finished run
pub fn log_run(task: &BackupTask, summary: &RunSummary) {
    RunRecord::new(task, summary).log();
}
