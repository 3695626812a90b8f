//! Lane run state machine
//!
//! Lane states: PENDING → PACKAGING → UPLOADING → {SUCCEEDED | FAILED | CANCELLED}
//! with PACKAGING → SUCCEEDED directly for lanes that do not upload.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version for lane_state.json
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const STATE_SCHEMA_ID: &str = "shiplane/lane_state@1";

/// Global sequence counter for ordering state updates within a process
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Lane state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaneState {
    /// Plan written, nothing executed yet
    Pending,
    /// Signing setup and build steps are running
    Packaging,
    /// Artifact verified, upload step is running
    Uploading,
    /// Lane completed successfully
    Succeeded,
    /// Lane failed
    Failed,
    /// Lane was cancelled
    Cancelled,
}

impl LaneState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: LaneState) -> bool {
        match (self, target) {
            // From PENDING
            (LaneState::Pending, LaneState::Packaging) => true,
            (LaneState::Pending, LaneState::Failed) => true, // Can fail before the first step
            (LaneState::Pending, LaneState::Cancelled) => true,

            // From PACKAGING
            (LaneState::Packaging, LaneState::Uploading) => true,
            (LaneState::Packaging, LaneState::Succeeded) => true, // Lanes without upload
            (LaneState::Packaging, LaneState::Failed) => true,
            (LaneState::Packaging, LaneState::Cancelled) => true,

            // From UPLOADING
            (LaneState::Uploading, LaneState::Succeeded) => true,
            (LaneState::Uploading, LaneState::Failed) => true,
            (LaneState::Uploading, LaneState::Cancelled) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }

    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LaneState::Succeeded | LaneState::Failed | LaneState::Cancelled
        )
    }
}

/// Lane state artifact data (lane_state.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneStateData {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// App the lane belongs to
    pub app: String,

    /// Lane being run
    pub lane: String,

    /// Variant being built
    pub variant: String,

    /// Current state
    pub state: LaneState,

    /// When the run was created
    pub created_at: DateTime<Utc>,

    /// When the state was last updated
    pub updated_at: DateTime<Utc>,

    /// Monotonic sequence counter for ordering
    pub seq: u64,
}

/// Errors for lane state operations
#[derive(Debug, thiserror::Error)]
pub enum LaneStateError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: LaneState, to: LaneState },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LaneStateData {
    /// Create a new run in PENDING state
    pub fn new(run_id: String, app: String, lane: String, variant: String) -> Self {
        let now = Utc::now();
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            schema_id: STATE_SCHEMA_ID.to_string(),
            run_id,
            app,
            lane,
            variant,
            state: LaneState::Pending,
            created_at: now,
            updated_at: now,
            seq: next_seq(),
        }
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: LaneState) -> Result<(), LaneStateError> {
        if !self.state.can_transition_to(new_state) {
            return Err(LaneStateError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        self.state = new_state;
        self.updated_at = Utc::now();
        self.seq = next_seq();

        Ok(())
    }

    /// Begin packaging (PENDING → PACKAGING)
    pub fn begin_packaging(&mut self) -> Result<(), LaneStateError> {
        self.transition(LaneState::Packaging)
    }

    /// Begin uploading (PACKAGING → UPLOADING)
    pub fn begin_uploading(&mut self) -> Result<(), LaneStateError> {
        self.transition(LaneState::Uploading)
    }

    /// Mark the lane as succeeded
    pub fn succeed(&mut self) -> Result<(), LaneStateError> {
        self.transition(LaneState::Succeeded)
    }

    /// Mark the lane as failed
    pub fn fail(&mut self) -> Result<(), LaneStateError> {
        self.transition(LaneState::Failed)
    }

    /// Mark the lane as cancelled
    pub fn cancel(&mut self) -> Result<(), LaneStateError> {
        self.transition(LaneState::Cancelled)
    }

    /// Check if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> Result<(), LaneStateError> {
        let json = self.to_json()?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, LaneStateError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    /// Write to the run directory as lane_state.json
    pub fn write_to_run_dir(&self, run_dir: &Path) -> Result<(), LaneStateError> {
        let path = run_dir.join("lane_state.json");
        self.write_to_file(&path)
    }
}
