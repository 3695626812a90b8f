//! Mock action runner
//!
//! Records every invocation in order, injects configurable failures per
//! action kind, and simulates the build action's exported artifact so the
//! executor's verification behaves as in a real run. Backs the lane
//! lifecycle tests; nothing is spawned.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::{ActionCall, ActionError, ActionKind, ActionOutcome, ActionRunner};

/// Failure configuration for one action kind
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Status string the injected failure reports
    pub status: String,

    /// Exit code attached to the failure
    pub exit_code: Option<i32>,

    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Fail every invocation with the given exit code
    pub fn exit(code: i32) -> Self {
        Self {
            status: format!("exit code {code}"),
            exit_code: Some(code),
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<ActionCall>,
    configs: HashMap<ActionKind, FailureConfig>,
    call_counts: HashMap<ActionKind, u32>,
}

/// Recording mock implementation of [`ActionRunner`]
pub struct MockActionRunner {
    state: Mutex<MockState>,
    create_artifacts: bool,
}

impl MockActionRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            create_artifacts: true,
        }
    }

    /// A runner whose build action does not produce the artifact file,
    /// for exercising the missing-artifact path
    pub fn without_artifacts() -> Self {
        Self {
            create_artifacts: false,
            ..Self::new()
        }
    }

    /// Inject a failure for an action kind
    pub fn fail_with(&self, kind: ActionKind, config: FailureConfig) {
        let mut state = self.state.lock().unwrap();
        state.configs.insert(kind, config);
        state.call_counts.insert(kind, 0);
    }

    /// Clear all failure injections
    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.configs.clear();
        state.call_counts.clear();
    }

    /// All recorded calls, in invocation order
    pub fn calls(&self) -> Vec<ActionCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded action kinds, in invocation order
    pub fn kinds(&self) -> Vec<ActionKind> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|c| c.action)
            .collect()
    }

    /// How many times an action kind was invoked
    pub fn count(&self, kind: ActionKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.action == kind)
            .count()
    }

    fn simulate_build_artifact(call: &ActionCall) {
        let (Some(dir), Some(name)) = (
            call.get_param("output_directory"),
            call.get_param("output_name"),
        ) else {
            return;
        };
        let path = Path::new(dir).join(name);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, b"mock ipa");
    }
}

impl Default for MockActionRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRunner for MockActionRunner {
    fn run(&self, call: &ActionCall) -> Result<ActionOutcome, ActionError> {
        let injected = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call.clone());

            match state.configs.get(&call.action).cloned() {
                Some(config) => {
                    let count = state.call_counts.entry(call.action).or_insert(0);
                    *count += 1;
                    match config.fail_count {
                        Some(limit) if *count > limit => None,
                        _ => Some(config),
                    }
                }
                None => None,
            }
        };

        if let Some(config) = injected {
            return Err(ActionError::Failed {
                action: call.action,
                status: config.status,
                exit_code: config.exit_code,
                log_path: None,
            });
        }

        if call.action == ActionKind::BuildApp && self.create_artifacts {
            Self::simulate_build_artifact(call);
        }

        Ok(ActionOutcome {
            exit_code: 0,
            duration_ms: 1,
            log_path: None,
        })
    }
}
