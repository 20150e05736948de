//! Pipeline steps, run outcomes and orchestrator states

use serde::Serialize;

/// One of the two external commands a run executes
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Imaging,
    Compression,
}

impl Step {
    /// Label used in notification text ("Backup process started.")
    pub fn label(&self) -> &'static str {
        match self {
            Step::Imaging => "Backup",
            Step::Compression => "Compression",
        }
    }
}

/// Tagged result of a step or of the whole pipeline
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    ImagingFailed { reason: String },
    CompressionFailed { reason: String },
    TimedOut { step: Step },
    Stalled,
    Interrupted { step: Step },
    UnexpectedError { step: Step, message: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    /// Step whose artifact is partial, `None` on success
    ///
    /// Stalls are only detected while imaging.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            RunOutcome::Success => None,
            RunOutcome::ImagingFailed { .. } | RunOutcome::Stalled => Some(Step::Imaging),
            RunOutcome::CompressionFailed { .. } => Some(Step::Compression),
            RunOutcome::TimedOut { step }
            | RunOutcome::Interrupted { step }
            | RunOutcome::UnexpectedError { step, .. } => Some(*step),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::ImagingFailed { .. } => "imaging_failed",
            RunOutcome::CompressionFailed { .. } => "compression_failed",
            RunOutcome::TimedOut { .. } => "timed_out",
            RunOutcome::Stalled => "stalled",
            RunOutcome::Interrupted { .. } => "interrupted",
            RunOutcome::UnexpectedError { .. } => "unexpected_error",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::ImagingFailed { reason } => write!(f, "imaging failed: {reason}"),
            RunOutcome::CompressionFailed { reason } => write!(f, "compression failed: {reason}"),
            RunOutcome::TimedOut { step } => write!(f, "{} process timed out", step.label()),
            RunOutcome::Stalled => write!(f, "Backup process stalled"),
            RunOutcome::Interrupted { step } => {
                write!(f, "{} process stopped by signal", step.label())
            }
            RunOutcome::UnexpectedError { message, .. } => {
                write!(f, "unexpected error: {message}")
            }
        }
    }
}

/// Orchestrator state machine
///
/// `Done` and `Aborted` are terminal. A run that failed but cleaned up
/// normally ends in `Done`; interrupts and lock contention end in `Aborted`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Locked,
    Imaging,
    Compressing,
    Cleaning,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Locked => "locked",
            PipelineState::Imaging => "imaging",
            PipelineState::Compressing => "compressing",
            PipelineState::Cleaning => "cleaning",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
