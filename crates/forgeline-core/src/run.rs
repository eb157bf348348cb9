use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::{RunOptions, Specification};
use crate::types::{ArtifactType, RunStatus};

/// Immutable record of one run's submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub run_id: String,
    pub specification: Specification,
    pub options: RunOptions,
    pub output_dir: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// The fixed stage weights, summing to 100, used to accrue `RunState::progress`.
pub mod stage_weight {
    pub const ARCHITECTURE: u32 = 20;
    pub const CODE: u32 = 40;
    pub const TEST: u32 = 15;
    pub const QUALITY: u32 = 15;
    pub const BUILD: u32 = 10;
}

/// The orchestrator's mutable view of a run. Single-writer (the
/// orchestrator); readers receive a cloned snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    pub progress: u32,
    pub current_stage: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifact_counts: HashMap<String, u32>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunState {
    /// Construct the initial, `pending` state for a newly submitted run.
    pub fn pending(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Pending,
            progress: 0,
            current_stage: "pending".to_string(),
            started_at: None,
            completed_at: None,
            artifact_counts: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Move progress forward by `weight`, clamped so it never decreases
    /// and never exceeds 100.
    pub fn advance_progress(&mut self, weight: u32) {
        self.progress = (self.progress + weight).min(100);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn bump_artifact_count(&mut self, artifact_type: ArtifactType) {
        *self
            .artifact_counts
            .entry(artifact_type.dir_name().to_string())
            .or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_progress_clamps_to_100() {
        let mut state = RunState::pending("r1");
        state.advance_progress(60);
        state.advance_progress(60);
        assert_eq!(state.progress, 100);
    }

    #[test]
    fn advance_progress_never_decreases() {
        let mut state = RunState::pending("r1");
        state.advance_progress(50);
        let before = state.progress;
        state.advance_progress(0);
        assert_eq!(state.progress, before);
    }
}
