//! Lane plan: the ordered, typed step list a run executes
//!
//! Each step carries the action call and a declared failure policy, so the
//! executor can skip remaining work after a failure while still running
//! cleanup steps. The plan is assembled up front and written to the run
//! directory as lane_plan.json with secrets redacted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action::{ActionCall, ActionKind};
use crate::inventory::LaneSelection;
use crate::keychain::{self, KeychainSpec};
use crate::settings::LaneEnv;

/// Schema version for lane_plan.json
pub const PLAN_SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const PLAN_SCHEMA_ID: &str = "shiplane/lane_plan@1";

/// What the executor does with the rest of the plan when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepPolicy {
    /// Failure aborts the lane; later abort-policy steps are skipped
    Abort,
    /// Step runs even after an earlier failure or cancellation (cleanup)
    AlwaysRun,
}

impl fmt::Display for StepPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPolicy::Abort => write!(f, "abort"),
            StepPolicy::AlwaysRun => write!(f, "always"),
        }
    }
}

/// One planned action invocation
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    /// Position in the plan (1-based)
    pub index: usize,

    /// Failure policy
    pub policy: StepPolicy,

    /// The action call, with parameters and secrets
    pub call: ActionCall,
}

impl PlanStep {
    /// Whether this step is cleanup that runs regardless of earlier failures
    pub fn is_cleanup(&self) -> bool {
        self.policy == StepPolicy::AlwaysRun
    }
}

/// Errors building a plan
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Lane '{0}' uploads but no upload credentials were resolved")]
    MissingUploadCredentials(String),
}

/// The full ordered plan for one lane run (lane_plan.json)
///
/// Serialized as a record only: secrets are redacted on the way out, so the
/// file cannot be loaded back into a runnable plan.
#[derive(Debug, Clone, Serialize)]
pub struct LanePlan {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// When the plan was built
    pub created_at: DateTime<Utc>,

    /// App the lane belongs to
    pub app: String,

    /// Lane being run
    pub lane: String,

    /// Variant being built
    pub variant: String,

    /// External tool command the steps are dispatched to
    pub tool: String,

    /// Where the exported bundle lands
    pub artifact_path: PathBuf,

    /// Ordered steps
    pub steps: Vec<PlanStep>,
}

impl LanePlan {
    /// Assemble the plan for a selected lane.
    ///
    /// The keychain password is generated fresh for the run and shared
    /// between the create and import steps. A leading delete step is added
    /// only when a keychain file from an earlier run is still on disk.
    pub fn build(
        selection: &LaneSelection<'_>,
        env: &LaneEnv,
        output_dir: &Path,
        run_id: &str,
        tool: &str,
    ) -> Result<Self, PlanError> {
        let app = selection.app;
        let lane = selection.lane;
        let variant = selection.variant;

        let keychain = KeychainSpec::for_product(&env.keychain_dir, &app.product_name);
        let keychain_password = keychain::generate_password();
        let artifact_name = format!("{}.ipa", app.product_name);
        let artifact_path = output_dir.join(&artifact_name);

        let mut steps: Vec<(StepPolicy, ActionCall)> = Vec::new();

        // A keychain file left behind by an earlier run blocks create_keychain
        if keychain.file_exists() {
            steps.push((
                StepPolicy::Abort,
                ActionCall::new(ActionKind::DeleteKeychain).param("name", &keychain.name),
            ));
        }

        steps.push((
            StepPolicy::Abort,
            ActionCall::new(ActionKind::CreateKeychain)
                .param("name", &keychain.name)
                .secret("password", keychain_password.clone())
                .param("default_keychain", "false")
                .param("unlock", "true")
                .param("timeout", keychain.lock_timeout_seconds.to_string())
                .param("lock_when_sleeps", keychain.lock_when_sleeps.to_string()),
        ));

        steps.push((
            StepPolicy::Abort,
            ActionCall::new(ActionKind::ImportCertificate)
                .param("keychain_name", &keychain.name)
                .secret("keychain_password", keychain_password)
                .param(
                    "certificate_path",
                    env.certificate_path(&variant.certificate).display().to_string(),
                )
                .secret("certificate_password", env.certificate_password.clone()),
        ));

        steps.push((
            StepPolicy::Abort,
            ActionCall::new(ActionKind::UpdateProjectProvisioning)
                .param("xcodeproj", &app.project)
                .param(
                    "profile",
                    env.profile_path(&variant.provisioning_profile).display().to_string(),
                )
                .param("target_filter", format!("^{}$", regex_lite::escape(&app.target)))
                .param("build_configuration", &variant.build_configuration),
        ));

        if lane.run_tests {
            let mut tests = ActionCall::new(ActionKind::RunTests);
            tests = match &app.workspace {
                Some(workspace) => tests.param("workspace", workspace),
                None => tests.param("project", &app.project),
            };
            tests = tests.param("scheme", &app.scheme);
            if !app.devices.is_empty() {
                tests = tests.param("devices", app.devices.join(","));
            }
            steps.push((StepPolicy::Abort, tests));
        }

        let mut build = ActionCall::new(ActionKind::BuildApp);
        build = match &app.workspace {
            Some(workspace) => build.param("workspace", workspace),
            None => build.param("project", &app.project),
        };
        build = build
            .param("scheme", &app.scheme)
            .param("clean", "true")
            .param("output_directory", output_dir.display().to_string())
            .param("output_name", &artifact_name)
            .param("configuration", &variant.build_configuration)
            .param("silent", "true")
            .param("export_method", &variant.export_method)
            .param("signing_style", "manual")
            .param(
                "provisioning_profiles",
                format!("{}=>{}", variant.app_identifier, variant.provisioning_profile),
            );
        if let Some(sdk) = &app.sdk {
            build = build.param("sdk", sdk);
        }
        steps.push((StepPolicy::Abort, build));

        if lane.upload {
            let creds = env
                .upload
                .as_ref()
                .ok_or_else(|| PlanError::MissingUploadCredentials(lane.name.clone()))?;
            steps.push((
                StepPolicy::Abort,
                ActionCall::new(ActionKind::Crashlytics)
                    .param("ipa_path", artifact_path.display().to_string())
                    .secret("api_token", creds.api_token.clone())
                    .secret("build_secret", creds.build_secret.clone()),
            ));
        }

        // Cleanup runs whatever happened earlier
        steps.push((
            StepPolicy::AlwaysRun,
            ActionCall::new(ActionKind::DeleteKeychain).param("name", &keychain.name),
        ));

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(i, (policy, call))| PlanStep {
                index: i + 1,
                policy,
                call,
            })
            .collect();

        Ok(Self {
            schema_version: PLAN_SCHEMA_VERSION,
            schema_id: PLAN_SCHEMA_ID.to_string(),
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            app: app.name.clone(),
            lane: lane.name.clone(),
            variant: variant.name.clone(),
            tool: tool.to_string(),
            artifact_path,
            steps,
        })
    }

    /// Whether the plan includes an upload step
    pub fn has_upload(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.call.action == ActionKind::Crashlytics)
    }

    /// Serialize to JSON (secrets redacted)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to the run directory as lane_plan.json (write-then-rename)
    pub fn write_to_run_dir(&self, run_dir: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {e}")))?;

        let path = run_dir.join("lane_plan.json");
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

impl fmt::Display for LanePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Lane '{}' (app '{}', variant '{}'), {} steps:",
            self.lane,
            self.app,
            self.variant,
            self.steps.len()
        )?;
        for step in &self.steps {
            writeln!(f, "  {:>2}. [{}] {}", step.index, step.policy, step.call.describe())?;
        }
        Ok(())
    }
}
