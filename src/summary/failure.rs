//! Failure taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;

/// Step/lane status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Completed successfully
    Success,
    /// Failed during execution
    Failed,
    /// Not executed because an earlier abort-policy step failed
    Skipped,
    /// Cancelled by signal
    Cancelled,
}

impl Status {
    /// Check if this is a terminal failure state
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed | Status::Cancelled)
    }
}

/// Failure kind, categorizing the step or phase that caused a lane to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Inventory load, validation, or lane selection failed
    Config,
    /// Required environment variables missing
    Environment,
    /// Keychain setup (stale delete or create) failed
    Keychain,
    /// Certificate import failed
    Certificate,
    /// Provisioning profile update failed
    Provisioning,
    /// Test or build/export failed, or the artifact is missing
    Build,
    /// Crash-report upload failed
    Upload,
    /// Lane cancelled by signal
    Cancelled,
    /// Cleanup keychain delete failed after an otherwise-green run
    Cleanup,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::Config => ExitCode::Config,
            FailureKind::Environment => ExitCode::Environment,
            FailureKind::Keychain => ExitCode::KeychainFailed,
            FailureKind::Certificate => ExitCode::CertificateFailed,
            FailureKind::Provisioning => ExitCode::ProvisioningFailed,
            FailureKind::Build => ExitCode::BuildFailed,
            FailureKind::Upload => ExitCode::UploadFailed,
            FailureKind::Cancelled => ExitCode::Cancelled,
            FailureKind::Cleanup => ExitCode::CleanupFailed,
        }
    }

    /// Failure kind for a failed action invocation. The keychain delete
    /// classifies differently depending on whether it ran as setup or as
    /// the end-of-lane cleanup.
    pub fn for_action(action: ActionKind, is_cleanup: bool) -> Self {
        match action {
            ActionKind::DeleteKeychain => {
                if is_cleanup {
                    FailureKind::Cleanup
                } else {
                    FailureKind::Keychain
                }
            }
            ActionKind::CreateKeychain => FailureKind::Keychain,
            ActionKind::ImportCertificate => FailureKind::Certificate,
            ActionKind::UpdateProjectProvisioning => FailureKind::Provisioning,
            ActionKind::RunTests | ActionKind::BuildApp => FailureKind::Build,
            ActionKind::Crashlytics => FailureKind::Upload,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::Config => "Configuration invalid",
            FailureKind::Environment => "Required environment missing",
            FailureKind::Keychain => "Keychain setup failed",
            FailureKind::Certificate => "Certificate import failed",
            FailureKind::Provisioning => "Provisioning update failed",
            FailureKind::Build => "Build failed",
            FailureKind::Upload => "Upload failed",
            FailureKind::Cancelled => "Lane cancelled",
            FailureKind::Cleanup => "Keychain cleanup failed",
        }
    }
}

/// Stable exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful lane run
    Success = 0,
    /// Configuration error
    Config = 10,
    /// Missing environment
    Environment = 20,
    /// Keychain setup step failed
    KeychainFailed = 30,
    /// Certificate import step failed
    CertificateFailed = 40,
    /// Provisioning update step failed
    ProvisioningFailed = 50,
    /// Test or build/export step failed
    BuildFailed = 60,
    /// Upload step failed
    UploadFailed = 70,
    /// Lane cancelled
    Cancelled = 80,
    /// Cleanup failed after an otherwise-green run
    CleanupFailed = 90,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Create from integer value
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            10 => Some(ExitCode::Config),
            20 => Some(ExitCode::Environment),
            30 => Some(ExitCode::KeychainFailed),
            40 => Some(ExitCode::CertificateFailed),
            50 => Some(ExitCode::ProvisioningFailed),
            60 => Some(ExitCode::BuildFailed),
            70 => Some(ExitCode::UploadFailed),
            80 => Some(ExitCode::Cancelled),
            90 => Some(ExitCode::CleanupFailed),
            _ => None,
        }
    }

    /// Check if this exit code indicates success
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Success
    }
}

/// Helper for aggregating step outcomes into the lane's status and exit code.
/// Cancellation outranks failures; otherwise the first failure wins, which
/// keeps a late cleanup failure from masking the step that broke the run.
pub struct ExitCodeAggregator {
    has_cancelled: bool,
    first_failure_code: Option<ExitCode>,
}

impl ExitCodeAggregator {
    /// Create a new aggregator
    pub fn new() -> Self {
        Self {
            has_cancelled: false,
            first_failure_code: None,
        }
    }

    /// Add a step's status and exit code to the aggregation
    pub fn add(&mut self, status: Status, exit_code: ExitCode) {
        match status {
            Status::Cancelled => {
                self.has_cancelled = true;
            }
            Status::Failed => {
                if self.first_failure_code.is_none() {
                    self.first_failure_code = Some(exit_code);
                }
            }
            Status::Success | Status::Skipped => {}
        }
    }

    /// Get the aggregated status
    pub fn status(&self) -> Status {
        if self.has_cancelled {
            Status::Cancelled
        } else if self.first_failure_code.is_some() {
            Status::Failed
        } else {
            Status::Success
        }
    }

    /// Get the aggregated exit code
    pub fn exit_code(&self) -> ExitCode {
        if self.has_cancelled {
            ExitCode::Cancelled
        } else if let Some(code) = self.first_failure_code {
            code
        } else {
            ExitCode::Success
        }
    }
}

impl Default for ExitCodeAggregator {
    fn default() -> Self {
        Self::new()
    }
}
