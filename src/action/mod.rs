//! External automation tool actions
//!
//! The lane runner performs no codesigning, building, or uploading itself;
//! every step invokes a named, pre-built action of the external automation
//! tool and trusts its success/failure reporting. This module defines the
//! action vocabulary, the parameterized call shape, and the [`ActionRunner`]
//! seam the lane executor drives.
//!
//! Non-secret parameters travel as `key:value` arguments. Secret parameters
//! never touch argv; runners inject them into the child environment as
//! `SHIPLANE_SECRET_<KEY>` variables.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::secret::Secret;

pub mod mock;
pub mod process;

/// Environment variable prefix runners use for secret parameters
pub const SECRET_ENV_PREFIX: &str = "SHIPLANE_SECRET_";

/// Actions of the external automation tool this runner invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DeleteKeychain,
    CreateKeychain,
    ImportCertificate,
    UpdateProjectProvisioning,
    RunTests,
    BuildApp,
    Crashlytics,
}

impl ActionKind {
    /// Action name in the external tool's vocabulary
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::DeleteKeychain => "delete_keychain",
            ActionKind::CreateKeychain => "create_keychain",
            ActionKind::ImportCertificate => "import_certificate",
            ActionKind::UpdateProjectProvisioning => "update_project_provisioning",
            ActionKind::RunTests => "run_tests",
            ActionKind::BuildApp => "build_app",
            ActionKind::Crashlytics => "crashlytics",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parameterized invocation of an external action
#[derive(Debug, Clone, Serialize)]
pub struct ActionCall {
    /// The action to invoke
    pub action: ActionKind,

    /// Ordered non-secret parameters, visible in argv and logs
    pub params: Vec<(String, String)>,

    /// Secret parameters; serialization shows the redaction placeholder
    pub secrets: Vec<(String, Secret)>,
}

impl ActionCall {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            params: Vec::new(),
            secrets: Vec::new(),
        }
    }

    /// Append a non-secret parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Append a secret parameter
    pub fn secret(mut self, key: impl Into<String>, value: Secret) -> Self {
        self.secrets.push((key.into(), value));
        self
    }

    /// Look up a non-secret parameter by key
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a secret parameter by key
    pub fn get_secret(&self, key: &str) -> Option<&Secret> {
        self.secrets.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// The `key:value` arguments handed to the external tool
    pub fn rendered_args(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect()
    }

    /// One-line rendering for logs; secret values show as `[REDACTED]`
    pub fn describe(&self) -> String {
        let mut parts = vec![self.action.as_str().to_string()];
        for (k, v) in &self.params {
            parts.push(format!("{k}:{v}"));
        }
        for (k, v) in &self.secrets {
            parts.push(format!("{k}:{v}"));
        }
        parts.join(" ")
    }
}

impl fmt::Display for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Successful completion of an action
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The tool's exit code (0 on this path)
    pub exit_code: i32,

    /// Wall-clock duration of the invocation
    pub duration_ms: u64,

    /// Log file the invocation streamed to, when one exists
    pub log_path: Option<PathBuf>,
}

/// Errors from invoking an action
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{action} failed to start: {source}")]
    Spawn {
        action: ActionKind,
        source: std::io::Error,
    },

    #[error("{action} failed with {status}")]
    Failed {
        action: ActionKind,
        /// Human rendering, e.g. "exit code 65" or "signal SIGKILL"
        status: String,
        exit_code: Option<i32>,
        log_path: Option<PathBuf>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seam between the lane executor and the external automation tool
pub trait ActionRunner {
    fn run(&self, call: &ActionCall) -> Result<ActionOutcome, ActionError>;
}
