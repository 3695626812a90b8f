//! Environment-sourced run settings
//!
//! Resolves the signing directory, keychain directory, and secrets a lane
//! run needs from process environment variables. Resolution is all-or-
//! nothing: every missing variable is collected and reported in one error
//! before any external action is invoked. Secrets have no configuration-
//! file representation; the environment is their only source.

use std::path::PathBuf;

use crate::secret::Secret;

/// Directory holding the `.p12` certificate and `.mobileprovision` files
pub const ENV_CODESIGNING_PATH: &str = "CODESIGNING_PATH";

/// Directory the build keychain file lives in
pub const ENV_KEYCHAIN_DIR: &str = "KEYCHAIN_DEFAULT_PATH";

/// Password protecting the `.p12` certificate
pub const ENV_CERTIFICATE_PASSWORD: &str = "CERTIFICATE_PASSWORD";

/// Crash-reporting service API token
pub const ENV_CRASHLYTICS_API_KEY: &str = "CRASHLYTICS_API_KEY";

/// Crash-reporting service build secret
pub const ENV_CRASHLYTICS_BUILD_SECRET: &str = "CRASHLYTICS_BUILD_SECRET";

/// Errors from resolving run settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),
}

/// Environment facts one lane run needs
#[derive(Debug, Clone)]
pub struct LaneEnv {
    /// Directory holding signing inputs
    pub codesigning_path: PathBuf,

    /// Directory the keychain file is created in
    pub keychain_dir: PathBuf,

    /// Password for the certificate import
    pub certificate_password: Secret,

    /// Upload credentials, resolved only for lanes that upload
    pub upload: Option<UploadCredentials>,
}

/// Credentials for the crash-report upload action
#[derive(Debug, Clone)]
pub struct UploadCredentials {
    pub api_token: Secret,
    pub build_secret: Secret,
}

impl LaneEnv {
    /// Resolve from the process environment
    pub fn from_env(needs_upload: bool) -> Result<Self, SettingsError> {
        Self::resolve(needs_upload, |name| std::env::var(name).ok())
    }

    /// Resolve via an arbitrary lookup. Variables that are absent, or empty
    /// after sanitization, count as missing.
    pub fn resolve<F>(needs_upload: bool, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing: Vec<String> = Vec::new();
        let mut require = |name: &'static str| -> String {
            match lookup(name).map(|raw| sanitize_env_value(&raw)) {
                Some(value) if !value.is_empty() => value,
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let codesigning_path = require(ENV_CODESIGNING_PATH);
        let keychain_dir = require(ENV_KEYCHAIN_DIR);
        let certificate_password = require(ENV_CERTIFICATE_PASSWORD);

        let upload = if needs_upload {
            let api_token = require(ENV_CRASHLYTICS_API_KEY);
            let build_secret = require(ENV_CRASHLYTICS_BUILD_SECRET);
            Some(UploadCredentials {
                api_token: Secret::new(api_token),
                build_secret: Secret::new(build_secret),
            })
        } else {
            None
        };

        if !missing.is_empty() {
            return Err(SettingsError::Missing(missing));
        }

        Ok(Self {
            codesigning_path: PathBuf::from(codesigning_path),
            keychain_dir: PathBuf::from(keychain_dir),
            certificate_password: Secret::new(certificate_password),
            upload,
        })
    }

    /// Path of the certificate file for a variant
    pub fn certificate_path(&self, certificate: &str) -> PathBuf {
        self.codesigning_path.join(format!("{certificate}.p12"))
    }

    /// Path of the provisioning profile file for a variant
    pub fn profile_path(&self, profile: &str) -> PathBuf {
        self.codesigning_path.join(format!("{profile}.mobileprovision"))
    }
}

/// Trim whitespace and strip double quotes from a raw environment value.
/// CI credential stores frequently hand values over wrapped in quotes.
pub fn sanitize_env_value(raw: &str) -> String {
    raw.trim().replace('"', "")
}
