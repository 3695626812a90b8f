//! Inventory validation tests
//!
//! Parsing, validation, and lane selection for the release inventory file,
//! plus the binding from a selected variant through to the planned steps.

use std::path::Path;

use shiplane::action::ActionKind;
use shiplane::inventory::{InventoryError, ReleaseInventory};
use shiplane::plan::LanePlan;
use shiplane::settings::LaneEnv;

const SAMPLE_INVENTORY: &str = r#"
schema_version = 1

[[app]]
name = "gymdata"
project = "JenkinsExample.xcodeproj"
workspace = "JenkinsExample.xcworkspace"
scheme = "JenkinsExample"
target = "JenkinsExample"
product_name = "JenkinsExample"
sdk = "iOS 10.0"
devices = ["iPhone 8", "iPad Air"]

[[app.variant]]
name = "staging"
build_configuration = "Staging"
certificate = "ios_distribution"
provisioning_profile = "GymData_Dist"
app_identifier = "com.seasia.gymData"
export_method = "development"

[[app.variant]]
name = "production"
build_configuration = "Production"
certificate = "ios_distribution"
provisioning_profile = "GymData_Dist"
app_identifier = "com.seasia.gymData"
export_method = "development"

[[app.lane]]
name = "developer-release"
description = "Create a developer release"
variant = "staging"

[[app.lane]]
name = "qa-release"
description = "Create a weekly release"
variant = "production"
"#;

fn test_env(with_upload: bool) -> LaneEnv {
    LaneEnv::resolve(with_upload, |name| match name {
        "CODESIGNING_PATH" => Some("/signing".to_string()),
        "KEYCHAIN_DEFAULT_PATH" => Some("/keychains".to_string()),
        "CERTIFICATE_PASSWORD" => Some("cert-pass".to_string()),
        "CRASHLYTICS_API_KEY" => Some("token".to_string()),
        "CRASHLYTICS_BUILD_SECRET" => Some("secret".to_string()),
        _ => None,
    })
    .unwrap()
}

// =============================================================================
// Parsing and defaults
// =============================================================================

#[test]
fn test_sample_inventory_parses() {
    let inventory = ReleaseInventory::parse(SAMPLE_INVENTORY).unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory.runner.bin, "fastlane");

    let app = &inventory.apps[0];
    assert_eq!(app.name, "gymdata");
    assert_eq!(app.build_container(), "JenkinsExample.xcworkspace");
    assert_eq!(app.variants.len(), 2);
    assert_eq!(app.lanes.len(), 2);
    assert_eq!(app.lanes[0].description, "Create a developer release");
}

#[test]
fn test_defaults_for_optional_fields() {
    let inventory = ReleaseInventory::parse(
        r#"
[[app]]
name = "minimal"
project = "App.xcodeproj"
scheme = "App"
target = "App"
product_name = "App"

[[app.variant]]
name = "release"
build_configuration = "Release"
certificate = "dist"
provisioning_profile = "profile"
app_identifier = "com.example.app"
export_method = "app-store"

[[app.lane]]
name = "ship"
description = "Ship it"
variant = "release"
"#,
    )
    .unwrap();

    let app = &inventory.apps[0];
    // No workspace: builds fall back to the project file
    assert_eq!(app.build_container(), "App.xcodeproj");
    assert!(app.sdk.is_none());
    assert!(app.devices.is_empty());

    let lane = &app.lanes[0];
    assert!(lane.upload);
    assert!(!lane.run_tests);
}

#[test]
fn test_empty_inventory_rejected() {
    let err = ReleaseInventory::parse("schema_version = 1\n").unwrap_err();
    assert!(matches!(err, InventoryError::Empty));
}

#[test]
fn test_custom_runner_invocation() {
    let inventory = ReleaseInventory::parse(
        r#"
[runner]
bin = "bundle"
args = ["exec", "fastlane"]

[[app]]
name = "app"
project = "App.xcodeproj"
scheme = "App"
target = "App"
product_name = "App"

[[app.variant]]
name = "release"
build_configuration = "Release"
certificate = "dist"
provisioning_profile = "profile"
app_identifier = "com.example.app"
export_method = "app-store"

[[app.lane]]
name = "ship"
description = "Ship it"
variant = "release"
"#,
    )
    .unwrap();
    assert_eq!(inventory.runner.bin, "bundle");
    assert_eq!(inventory.runner.args, vec!["exec", "fastlane"]);
}

// =============================================================================
// Validation failures
// =============================================================================

#[test]
fn test_empty_scheme_rejected() {
    let toml = SAMPLE_INVENTORY.replace("scheme = \"JenkinsExample\"", "scheme = \"\"");
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    assert!(matches!(
        err,
        InventoryError::MissingField { ref field, .. } if field == "scheme"
    ));
}

#[test]
fn test_empty_workspace_rejected() {
    let toml = SAMPLE_INVENTORY.replace(
        "workspace = \"JenkinsExample.xcworkspace\"",
        "workspace = \"\"",
    );
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InvalidValue { ref field, .. } if field == "workspace"
    ));
}

#[test]
fn test_invalid_app_name_rejected() {
    let toml = SAMPLE_INVENTORY.replace("name = \"gymdata\"", "name = \"gym data!\"");
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InvalidValue { ref field, .. } if field == "name"
    ));
}

#[test]
fn test_unknown_export_method_rejected() {
    let toml = SAMPLE_INVENTORY.replace(
        "export_method = \"development\"",
        "export_method = \"sideload\"",
    );
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    match err {
        InventoryError::InvalidValue { field, reason, .. } => {
            assert!(field.contains("export_method"));
            assert!(reason.contains("app-store"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_dangling_variant_reference_rejected() {
    let toml = SAMPLE_INVENTORY.replace(
        "variant = \"production\"",
        "variant = \"nightly\"",
    );
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    match err {
        InventoryError::UnknownVariant { lane, variant, .. } => {
            assert_eq!(lane, "qa-release");
            assert_eq!(variant, "nightly");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_variant_rejected() {
    let toml = SAMPLE_INVENTORY.replace("name = \"production\"", "name = \"staging\"");
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    assert!(matches!(
        err,
        InventoryError::DuplicateVariant { ref variant, .. } if variant == "staging"
    ));
}

#[test]
fn test_duplicate_lane_rejected() {
    let toml = SAMPLE_INVENTORY.replace(
        "name = \"qa-release\"",
        "name = \"developer-release\"",
    );
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    assert!(matches!(
        err,
        InventoryError::DuplicateLane { ref lane, .. } if lane == "developer-release"
    ));
}

#[test]
fn test_duplicate_app_rejected() {
    let duplicated = format!("{SAMPLE_INVENTORY}\n{}", {
        // Second app block with the same name
        SAMPLE_INVENTORY
            .lines()
            .skip_while(|l| !l.starts_with("[[app]]"))
            .collect::<Vec<_>>()
            .join("\n")
    });
    let err = ReleaseInventory::parse(&duplicated).unwrap_err();
    assert!(matches!(
        err,
        InventoryError::DuplicateApp(ref name) if name == "gymdata"
    ));
}

#[test]
fn test_missing_lane_description_rejected() {
    let toml = SAMPLE_INVENTORY.replace(
        "description = \"Create a weekly release\"",
        "description = \"\"",
    );
    let err = ReleaseInventory::parse(&toml).unwrap_err();
    assert!(matches!(
        err,
        InventoryError::MissingField { ref field, .. } if field.contains("description")
    ));
}

// =============================================================================
// Lane selection
// =============================================================================

#[test]
fn test_select_lane_binds_variant() {
    let inventory = ReleaseInventory::parse(SAMPLE_INVENTORY).unwrap();
    let selection = inventory.select(None, "qa-release").unwrap();
    assert_eq!(selection.app.name, "gymdata");
    assert_eq!(selection.lane.name, "qa-release");
    assert_eq!(selection.variant.name, "production");
    assert_eq!(selection.variant.build_configuration, "Production");
}

#[test]
fn test_select_unknown_lane_lists_known() {
    let inventory = ReleaseInventory::parse(SAMPLE_INVENTORY).unwrap();
    let err = inventory.select(Some("gymdata"), "nightly").unwrap_err();
    match err {
        InventoryError::UnknownLane { name, known, .. } => {
            assert_eq!(name, "nightly");
            assert_eq!(known, vec!["developer-release", "qa-release"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_select_unknown_app_lists_known() {
    let inventory = ReleaseInventory::parse(SAMPLE_INVENTORY).unwrap();
    let err = inventory
        .select(Some("fitness"), "developer-release")
        .unwrap_err();
    match err {
        InventoryError::UnknownApp { name, known } => {
            assert_eq!(name, "fitness");
            assert_eq!(known, vec!["gymdata"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_ambiguous_lane_requires_app_qualifier() {
    let second = SAMPLE_INVENTORY.replace("name = \"gymdata\"", "name = \"fitness\"");
    let combined = format!(
        "{SAMPLE_INVENTORY}\n{}",
        second
            .lines()
            .skip_while(|l| !l.starts_with("[[app]]"))
            .collect::<Vec<_>>()
            .join("\n")
    );
    let inventory = ReleaseInventory::parse(&combined).unwrap();

    let err = inventory.select(None, "developer-release").unwrap_err();
    match err {
        InventoryError::AmbiguousLane { lane, apps } => {
            assert_eq!(lane, "developer-release");
            assert_eq!(apps, vec!["gymdata", "fitness"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Naming the app disambiguates
    let selection = inventory
        .select(Some("fitness"), "developer-release")
        .unwrap();
    assert_eq!(selection.app.name, "fitness");
}

#[test]
fn test_unreferenced_variants_reported() {
    let toml = SAMPLE_INVENTORY.replace(
        "variant = \"production\"",
        "variant = \"staging\"",
    );
    let inventory = ReleaseInventory::parse(&toml).unwrap();
    let unreferenced = inventory.apps[0].unreferenced_variants();
    assert_eq!(unreferenced.len(), 1);
    assert_eq!(unreferenced[0].name, "production");
}

// =============================================================================
// Inventory values flow into the plan
// =============================================================================

#[test]
fn test_variant_binding_flows_into_plan() {
    let inventory = ReleaseInventory::parse(SAMPLE_INVENTORY).unwrap();
    let selection = inventory.select(None, "qa-release").unwrap();
    let env = test_env(true);
    let plan =
        LanePlan::build(&selection, &env, Path::new("/out"), "run-bind", "fastlane").unwrap();

    let provisioning = plan
        .steps
        .iter()
        .find(|s| s.call.action == ActionKind::UpdateProjectProvisioning)
        .unwrap();
    assert_eq!(
        provisioning.call.get_param("build_configuration"),
        Some("Production")
    );
    assert_eq!(
        provisioning.call.get_param("target_filter"),
        Some("^JenkinsExample$")
    );

    let build = plan
        .steps
        .iter()
        .find(|s| s.call.action == ActionKind::BuildApp)
        .unwrap();
    assert_eq!(build.call.get_param("configuration"), Some("Production"));
    assert_eq!(
        build.call.get_param("workspace"),
        Some("JenkinsExample.xcworkspace")
    );
    assert_eq!(build.call.get_param("sdk"), Some("iOS 10.0"));
}
