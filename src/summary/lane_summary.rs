//! Lane summary (lane_summary.json)

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::failure::{ExitCode, ExitCodeAggregator, FailureKind, Status};
use crate::action::ActionKind;

/// Schema version for lane_summary.json
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for lane_summary.json
pub const SUMMARY_SCHEMA_ID: &str = "shiplane/lane_summary@1";

/// Outcome of one plan step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    /// Position in the plan (1-based)
    pub index: usize,

    /// The action this step invoked
    pub action: ActionKind,

    /// Step status
    pub status: Status,

    /// Failure kind (when status is failed or cancelled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    /// The external tool's own exit code (when available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_exit_code: Option<i32>,

    /// Wall-clock step duration in milliseconds
    pub duration_ms: u64,

    /// Human-readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Log file the step streamed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
}

impl StepSummary {
    /// A step that completed successfully
    pub fn success(index: usize, action: ActionKind, duration_ms: u64, log: Option<PathBuf>) -> Self {
        Self {
            index,
            action,
            status: Status::Success,
            failure_kind: None,
            tool_exit_code: Some(0),
            duration_ms,
            message: None,
            log,
        }
    }

    /// A step that failed
    pub fn failure(
        index: usize,
        action: ActionKind,
        failure_kind: FailureKind,
        message: String,
        tool_exit_code: Option<i32>,
        duration_ms: u64,
        log: Option<PathBuf>,
    ) -> Self {
        Self {
            index,
            action,
            status: Status::Failed,
            failure_kind: Some(failure_kind),
            tool_exit_code,
            duration_ms,
            message: Some(message),
            log,
        }
    }

    /// A step never executed because an earlier abort-policy step failed
    pub fn skipped(index: usize, action: ActionKind) -> Self {
        Self {
            index,
            action,
            status: Status::Skipped,
            failure_kind: None,
            tool_exit_code: None,
            duration_ms: 0,
            message: None,
            log: None,
        }
    }

    /// A step stopped by cancellation
    pub fn cancelled(index: usize, action: ActionKind) -> Self {
        Self {
            index,
            action,
            status: Status::Cancelled,
            failure_kind: Some(FailureKind::Cancelled),
            tool_exit_code: None,
            duration_ms: 0,
            message: None,
            log: None,
        }
    }

    /// Stable exit code this step contributes to aggregation
    pub fn exit_code(&self) -> ExitCode {
        self.failure_kind
            .map(|k| k.exit_code())
            .unwrap_or(ExitCode::Success)
    }
}

/// The exported application bundle, hashed for the record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

impl ArtifactRecord {
    /// Hash an artifact file on disk
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        let mut size_bytes: u64 = 0;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size_bytes += n as u64;
        }
        Ok(Self {
            path: path.to_path_buf(),
            sha256: hex::encode(hasher.finalize()),
            size_bytes,
        })
    }
}

/// Lane summary (lane_summary.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSummary {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// App the lane belongs to
    pub app: String,

    /// Lane that ran
    pub lane: String,

    /// Variant the lane built
    pub variant: String,

    /// When the summary was created
    pub created_at: DateTime<Utc>,

    /// Lane status
    pub status: Status,

    /// Failure kind (when status is not success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    /// Stable exit code
    pub exit_code: i32,

    /// Wall-clock lane duration in milliseconds
    pub duration_ms: u64,

    /// Step counts
    pub steps_total: usize,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub steps_skipped: usize,
    pub steps_cancelled: usize,

    /// The exported artifact (when the build step succeeded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRecord>,

    /// SHA-256 digest of the inventory file the run used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<String>,

    /// Human-readable summary
    pub human_summary: String,

    /// Per-step outcomes, in plan order
    pub steps: Vec<StepSummary>,
}

impl LaneSummary {
    /// Aggregate step outcomes into the lane summary
    pub fn from_steps(
        run_id: String,
        app: String,
        lane: String,
        variant: String,
        steps: Vec<StepSummary>,
        duration_ms: u64,
    ) -> Self {
        let mut agg = ExitCodeAggregator::new();
        for step in &steps {
            agg.add(step.status, step.exit_code());
        }
        let status = agg.status();
        let exit_code = agg.exit_code();

        let failure_kind = match status {
            Status::Cancelled => Some(FailureKind::Cancelled),
            Status::Failed => steps
                .iter()
                .find(|s| s.status == Status::Failed)
                .and_then(|s| s.failure_kind),
            _ => None,
        };

        let steps_succeeded = steps.iter().filter(|s| s.status == Status::Success).count();
        let steps_failed = steps.iter().filter(|s| s.status == Status::Failed).count();
        let steps_skipped = steps.iter().filter(|s| s.status == Status::Skipped).count();
        let steps_cancelled = steps.iter().filter(|s| s.status == Status::Cancelled).count();

        let human_summary =
            Self::generate_human_summary(&lane, status, failure_kind, steps_succeeded, steps.len());

        Self {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            app,
            lane,
            variant,
            created_at: Utc::now(),
            status,
            failure_kind,
            exit_code: exit_code.as_i32(),
            duration_ms,
            steps_total: steps.len(),
            steps_succeeded,
            steps_failed,
            steps_skipped,
            steps_cancelled,
            artifact: None,
            config_digest: None,
            human_summary,
            steps,
        }
    }

    /// Attach the exported artifact record
    pub fn with_artifact(mut self, artifact: ArtifactRecord) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Attach the inventory digest
    pub fn with_config_digest(mut self, digest: String) -> Self {
        self.config_digest = Some(digest);
        self
    }

    fn generate_human_summary(
        lane: &str,
        status: Status,
        failure_kind: Option<FailureKind>,
        succeeded: usize,
        total: usize,
    ) -> String {
        match status {
            Status::Success => {
                format!("Lane '{lane}' succeeded: {succeeded}/{total} steps passed")
            }
            Status::Cancelled => {
                format!("Lane '{lane}' cancelled: {succeeded}/{total} steps passed")
            }
            _ => {
                let reason = failure_kind
                    .map(|k| k.description())
                    .unwrap_or("failure");
                format!("Lane '{lane}' failed: {reason} ({succeeded}/{total} steps passed)")
            }
        }
    }

    /// Typed exit code, when the stored integer is a known code
    pub fn exit_code_enum(&self) -> Option<ExitCode> {
        ExitCode::from_i32(self.exit_code)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file with atomic write-then-rename
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {e}")))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load from file
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_steps() -> Vec<StepSummary> {
        vec![
            StepSummary::success(1, ActionKind::CreateKeychain, 10, None),
            StepSummary::success(2, ActionKind::ImportCertificate, 10, None),
            StepSummary::success(3, ActionKind::BuildApp, 100, None),
            StepSummary::success(4, ActionKind::DeleteKeychain, 5, None),
        ]
    }

    #[test]
    fn test_success_aggregation() {
        let summary = LaneSummary::from_steps(
            "run-1".into(),
            "gymdata".into(),
            "developer-release".into(),
            "staging".into(),
            success_steps(),
            125,
        );

        assert_eq!(summary.status, Status::Success);
        assert_eq!(summary.exit_code, 0);
        assert_eq!(summary.steps_total, 4);
        assert_eq!(summary.steps_succeeded, 4);
        assert!(summary.failure_kind.is_none());
        assert_eq!(
            summary.human_summary,
            "Lane 'developer-release' succeeded: 4/4 steps passed"
        );
    }

    #[test]
    fn test_failure_aggregation_first_failure_wins() {
        let steps = vec![
            StepSummary::success(1, ActionKind::CreateKeychain, 10, None),
            StepSummary::failure(
                2,
                ActionKind::ImportCertificate,
                FailureKind::Certificate,
                "import_certificate failed with exit code 1".into(),
                Some(1),
                20,
                None,
            ),
            StepSummary::skipped(3, ActionKind::BuildApp),
            StepSummary::failure(
                4,
                ActionKind::DeleteKeychain,
                FailureKind::Cleanup,
                "delete_keychain failed with exit code 1".into(),
                Some(1),
                5,
                None,
            ),
        ];

        let summary = LaneSummary::from_steps(
            "run-1".into(),
            "gymdata".into(),
            "qa-release".into(),
            "production".into(),
            steps,
            35,
        );

        assert_eq!(summary.status, Status::Failed);
        assert_eq!(summary.exit_code, ExitCode::CertificateFailed.as_i32());
        assert_eq!(summary.failure_kind, Some(FailureKind::Certificate));
        assert_eq!(summary.steps_failed, 2);
        assert_eq!(summary.steps_skipped, 1);
        assert!(summary.human_summary.contains("Certificate import failed"));
    }

    #[test]
    fn test_cancelled_aggregation() {
        let steps = vec![
            StepSummary::success(1, ActionKind::CreateKeychain, 10, None),
            StepSummary::cancelled(2, ActionKind::BuildApp),
            StepSummary::success(3, ActionKind::DeleteKeychain, 5, None),
        ];

        let summary = LaneSummary::from_steps(
            "run-1".into(),
            "gymdata".into(),
            "developer-release".into(),
            "staging".into(),
            steps,
            15,
        );

        assert_eq!(summary.status, Status::Cancelled);
        assert_eq!(summary.exit_code, ExitCode::Cancelled.as_i32());
        assert_eq!(summary.steps_cancelled, 1);
    }

    #[test]
    fn test_artifact_record_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App.ipa");
        fs::write(&path, b"test").unwrap();

        let record = ArtifactRecord::from_file(&path).unwrap();
        assert_eq!(record.size_bytes, 4);
        assert_eq!(
            record.sha256,
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lane_summary.json");

        let summary = LaneSummary::from_steps(
            "run-1".into(),
            "gymdata".into(),
            "developer-release".into(),
            "staging".into(),
            success_steps(),
            125,
        )
        .with_config_digest("abc123".into());

        summary.write_to_file(&path).unwrap();
        assert!(!dir.path().join("lane_summary.json.tmp").exists());

        let loaded = LaneSummary::from_file(&path).unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.status, Status::Success);
        assert_eq!(loaded.config_digest.as_deref(), Some("abc123"));
        assert_eq!(loaded.steps.len(), 4);
    }

    #[test]
    fn test_exit_code_enum() {
        let summary = LaneSummary::from_steps(
            "run-1".into(),
            "a".into(),
            "l".into(),
            "v".into(),
            vec![StepSummary::failure(
                1,
                ActionKind::BuildApp,
                FailureKind::Build,
                "boom".into(),
                Some(65),
                10,
                None,
            )],
            10,
        );
        assert_eq!(summary.exit_code_enum(), Some(ExitCode::BuildFailed));
    }
}
