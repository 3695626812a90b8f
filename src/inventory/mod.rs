//! Release Inventory Configuration
//!
//! Parses and validates the release inventory file (`shiplane.toml` by
//! default). Each app entry describes one Xcode project plus the named
//! signing variants and release lanes defined for it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default inventory file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "shiplane.toml";

/// Export methods the external build action accepts
pub const EXPORT_METHODS: &[&str] = &["app-store", "ad-hoc", "enterprise", "development"];

/// Release inventory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInventory {
    /// Schema version for forward compatibility
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// External automation tool invocation settings
    #[serde(default)]
    pub runner: RunnerSettings,

    /// List of apps
    #[serde(default, rename = "app")]
    pub apps: Vec<AppEntry>,
}

fn default_schema_version() -> u32 {
    1
}

/// How to invoke the external automation tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Tool binary (default: "fastlane")
    #[serde(default = "default_runner_bin")]
    pub bin: String,

    /// Arguments inserted before the action invocation (e.g. ["exec", "fastlane"]
    /// when `bin` is a wrapper like bundle)
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_runner_bin() -> String {
    "fastlane".to_string()
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            bin: default_runner_bin(),
            args: Vec::new(),
        }
    }
}

/// A single app entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    /// Unique identifier for this app (must be unique across inventory)
    pub name: String,

    /// Xcode project file, used when applying provisioning profiles
    pub project: String,

    /// Xcode workspace file; builds use it when present, otherwise the project
    pub workspace: Option<String>,

    /// Shared scheme to build
    pub scheme: String,

    /// Target the provisioning profile is applied to (matched by exact name)
    pub target: String,

    /// Product name; also names the exported `.ipa` and the build keychain
    pub product_name: String,

    /// SDK identifier handed to the build action (e.g. "iOS 10.0")
    pub sdk: Option<String>,

    /// Simulator devices for the optional test step
    #[serde(default)]
    pub devices: Vec<String>,

    /// Signing/build variants defined for this app
    #[serde(default, rename = "variant")]
    pub variants: Vec<VariantEntry>,

    /// Release lanes defined for this app
    #[serde(default, rename = "lane")]
    pub lanes: Vec<LaneEntry>,
}

/// One build variant's signing/build parameters.
///
/// The `app_identifier` must match the provisioning profile's entitled
/// bundle ID for packaging to succeed; that binding is enforced by the
/// external tool, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantEntry {
    /// Unique name within the app (e.g. "staging")
    pub name: String,

    /// Xcode build configuration name
    pub build_configuration: String,

    /// Certificate file stem; resolved to `<signing dir>/<certificate>.p12`
    pub certificate: String,

    /// Profile file stem; resolved to `<signing dir>/<profile>.mobileprovision`
    pub provisioning_profile: String,

    /// App bundle identifier
    pub app_identifier: String,

    /// Distribution channel for export (see [`EXPORT_METHODS`])
    pub export_method: String,
}

/// A named, invokable release workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneEntry {
    /// Unique name within the app (e.g. "developer-release")
    pub name: String,

    /// Human-readable description, surfaced by `shiplane lanes`
    pub description: String,

    /// Name of the variant this lane builds
    pub variant: String,

    /// Upload the exported artifact to the crash-reporting service (default: true)
    #[serde(default = "default_upload")]
    pub upload: bool,

    /// Run the device test step before building (default: false)
    #[serde(default)]
    pub run_tests: bool,
}

fn default_upload() -> bool {
    true
}

/// Errors that can occur when loading, validating, or selecting from the inventory
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Failed to read inventory file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Inventory file not found: {0}")]
    NotFound(PathBuf),

    #[error("No apps configured")]
    Empty,

    #[error("Duplicate app name: '{0}'")]
    DuplicateApp(String),

    #[error("App '{app}': duplicate variant name: '{variant}'")]
    DuplicateVariant { app: String, variant: String },

    #[error("App '{app}': duplicate lane name: '{lane}'")]
    DuplicateLane { app: String, lane: String },

    #[error("App '{app}': missing required field '{field}'")]
    MissingField { app: String, field: String },

    #[error("App '{app}': invalid value for '{field}': {reason}")]
    InvalidValue {
        app: String,
        field: String,
        reason: String,
    },

    #[error("App '{app}': lane '{lane}' references unknown variant '{variant}'")]
    UnknownVariant {
        app: String,
        lane: String,
        variant: String,
    },

    #[error("Unknown app '{name}' (configured: {})", known.join(", "))]
    UnknownApp { name: String, known: Vec<String> },

    #[error("App '{app}': unknown lane '{name}' (configured: {})", known.join(", "))]
    UnknownLane {
        app: String,
        name: String,
        known: Vec<String>,
    },

    #[error("Lane '{lane}' is defined by multiple apps ({}); pass --app to disambiguate", apps.join(", "))]
    AmbiguousLane { lane: String, apps: Vec<String> },

    #[error("No configured app defines lane '{0}'")]
    LaneNotFound(String),
}

/// The (app, lane, variant) triple a run operates on
#[derive(Debug, Clone, Copy)]
pub struct LaneSelection<'a> {
    pub app: &'a AppEntry,
    pub lane: &'a LaneEntry,
    pub variant: &'a VariantEntry,
}

impl ReleaseInventory {
    /// Default inventory file path (working directory)
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load the inventory from a specific path
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        if !path.exists() {
            return Err(InventoryError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse the inventory from a TOML string
    pub fn parse(content: &str) -> Result<Self, InventoryError> {
        let inventory: ReleaseInventory = toml::from_str(content)?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Validate the inventory
    fn validate(&self) -> Result<(), InventoryError> {
        if self.apps.is_empty() {
            return Err(InventoryError::Empty);
        }

        // Check for duplicate app names
        let mut seen_names = HashSet::new();
        for app in &self.apps {
            if !seen_names.insert(&app.name) {
                return Err(InventoryError::DuplicateApp(app.name.clone()));
            }
        }

        // Validate each app
        for app in &self.apps {
            app.validate()?;
        }

        Ok(())
    }

    /// Get an app by name
    pub fn get(&self, name: &str) -> Option<&AppEntry> {
        self.apps.iter().find(|a| a.name == name)
    }

    /// Names of all configured apps
    pub fn app_names(&self) -> Vec<&str> {
        self.apps.iter().map(|a| a.name.as_str()).collect()
    }

    /// Resolve a lane invocation to its (app, lane, variant) triple.
    ///
    /// When `app` is `None` the lane name must be defined by exactly one
    /// configured app.
    pub fn select(&self, app: Option<&str>, lane: &str) -> Result<LaneSelection<'_>, InventoryError> {
        if self.apps.is_empty() {
            return Err(InventoryError::Empty);
        }

        let app_entry = match app {
            Some(name) => self.get(name).ok_or_else(|| InventoryError::UnknownApp {
                name: name.to_string(),
                known: self.app_names().iter().map(|s| s.to_string()).collect(),
            })?,
            None => {
                let candidates: Vec<&AppEntry> =
                    self.apps.iter().filter(|a| a.lane(lane).is_some()).collect();
                match candidates.len() {
                    1 => candidates[0],
                    0 => {
                        // Fall through to the per-app lookup for a listing of
                        // known lanes when there is a single app.
                        if self.apps.len() == 1 {
                            &self.apps[0]
                        } else {
                            return Err(InventoryError::LaneNotFound(lane.to_string()));
                        }
                    }
                    _ => {
                        return Err(InventoryError::AmbiguousLane {
                            lane: lane.to_string(),
                            apps: candidates.iter().map(|a| a.name.clone()).collect(),
                        })
                    }
                }
            }
        };

        let lane_entry = app_entry
            .lane(lane)
            .ok_or_else(|| InventoryError::UnknownLane {
                app: app_entry.name.clone(),
                name: lane.to_string(),
                known: app_entry.lanes.iter().map(|l| l.name.clone()).collect(),
            })?;

        let variant = app_entry
            .variant(&lane_entry.variant)
            .ok_or_else(|| InventoryError::UnknownVariant {
                app: app_entry.name.clone(),
                lane: lane_entry.name.clone(),
                variant: lane_entry.variant.clone(),
            })?;

        Ok(LaneSelection {
            app: app_entry,
            lane: lane_entry,
            variant,
        })
    }

    /// Check if the inventory has no apps
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Number of configured apps
    pub fn len(&self) -> usize {
        self.apps.len()
    }
}

impl AppEntry {
    /// Validate the app entry
    fn validate(&self) -> Result<(), InventoryError> {
        if self.name.is_empty() {
            return Err(InventoryError::MissingField {
                app: "(unnamed)".to_string(),
                field: "name".to_string(),
            });
        }

        if !is_valid_name(&self.name) {
            return Err(InventoryError::InvalidValue {
                app: self.name.clone(),
                field: "name".to_string(),
                reason: "name must contain only alphanumeric characters, dashes, and underscores"
                    .to_string(),
            });
        }

        for (field, value) in [
            ("project", &self.project),
            ("scheme", &self.scheme),
            ("target", &self.target),
            ("product_name", &self.product_name),
        ] {
            if value.is_empty() {
                return Err(InventoryError::MissingField {
                    app: self.name.clone(),
                    field: field.to_string(),
                });
            }
        }

        if let Some(workspace) = &self.workspace {
            if workspace.is_empty() {
                return Err(InventoryError::InvalidValue {
                    app: self.name.clone(),
                    field: "workspace".to_string(),
                    reason: "workspace cannot be empty when present".to_string(),
                });
            }
        }

        // Check for duplicate variant and lane names
        let mut seen_variants = HashSet::new();
        for variant in &self.variants {
            if !seen_variants.insert(&variant.name) {
                return Err(InventoryError::DuplicateVariant {
                    app: self.name.clone(),
                    variant: variant.name.clone(),
                });
            }
        }
        let mut seen_lanes = HashSet::new();
        for lane in &self.lanes {
            if !seen_lanes.insert(&lane.name) {
                return Err(InventoryError::DuplicateLane {
                    app: self.name.clone(),
                    lane: lane.name.clone(),
                });
            }
        }

        for variant in &self.variants {
            variant.validate(&self.name)?;
        }

        for lane in &self.lanes {
            lane.validate(&self.name)?;

            // Lane must reference a defined variant
            if self.variant(&lane.variant).is_none() {
                return Err(InventoryError::UnknownVariant {
                    app: self.name.clone(),
                    lane: lane.name.clone(),
                    variant: lane.variant.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get a variant by name
    pub fn variant(&self, name: &str) -> Option<&VariantEntry> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Get a lane by name
    pub fn lane(&self, name: &str) -> Option<&LaneEntry> {
        self.lanes.iter().find(|l| l.name == name)
    }

    /// The container handed to the build action: the workspace when present,
    /// otherwise the project file
    pub fn build_container(&self) -> &str {
        self.workspace.as_deref().unwrap_or(&self.project)
    }

    /// Variants no lane references (configuration drift, reported by verify)
    pub fn unreferenced_variants(&self) -> Vec<&VariantEntry> {
        self.variants
            .iter()
            .filter(|v| !self.lanes.iter().any(|l| l.variant == v.name))
            .collect()
    }
}

impl VariantEntry {
    /// Validate the variant entry
    fn validate(&self, app: &str) -> Result<(), InventoryError> {
        if self.name.is_empty() {
            return Err(InventoryError::MissingField {
                app: app.to_string(),
                field: "variant.name".to_string(),
            });
        }

        if !is_valid_name(&self.name) {
            return Err(InventoryError::InvalidValue {
                app: app.to_string(),
                field: format!("variant '{}': name", self.name),
                reason: "name must contain only alphanumeric characters, dashes, and underscores"
                    .to_string(),
            });
        }

        for (field, value) in [
            ("build_configuration", &self.build_configuration),
            ("certificate", &self.certificate),
            ("provisioning_profile", &self.provisioning_profile),
            ("app_identifier", &self.app_identifier),
        ] {
            if value.is_empty() {
                return Err(InventoryError::MissingField {
                    app: app.to_string(),
                    field: format!("variant '{}': {}", self.name, field),
                });
            }
        }

        if !EXPORT_METHODS.contains(&self.export_method.as_str()) {
            return Err(InventoryError::InvalidValue {
                app: app.to_string(),
                field: format!("variant '{}': export_method", self.name),
                reason: format!(
                    "'{}' is not one of: {}",
                    self.export_method,
                    EXPORT_METHODS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LaneEntry {
    /// Validate the lane entry
    fn validate(&self, app: &str) -> Result<(), InventoryError> {
        if self.name.is_empty() {
            return Err(InventoryError::MissingField {
                app: app.to_string(),
                field: "lane.name".to_string(),
            });
        }

        if !is_valid_name(&self.name) {
            return Err(InventoryError::InvalidValue {
                app: app.to_string(),
                field: format!("lane '{}': name", self.name),
                reason: "name must contain only alphanumeric characters, dashes, and underscores"
                    .to_string(),
            });
        }

        if self.description.is_empty() {
            return Err(InventoryError::MissingField {
                app: app.to_string(),
                field: format!("lane '{}': description", self.name),
            });
        }

        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

impl Default for ReleaseInventory {
    fn default() -> Self {
        Self {
            schema_version: 1,
            runner: RunnerSettings::default(),
            apps: Vec::new(),
        }
    }
}
