//! Subprocess-backed action runner
//!
//! Invokes the external automation tool as `<bin> [args..] run <action>
//! key:value ...`. The child environment is drop-by-default: only
//! allowlisted variables pass through, plus the call's secret parameters
//! as `SHIPLANE_SECRET_<KEY>` variables. stdout/stderr stream to a
//! per-action log file in the run directory.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;

use super::{ActionCall, ActionError, ActionOutcome, ActionRunner, SECRET_ENV_PREFIX};
use crate::inventory::RunnerSettings;

/// Environment variable allowlist: drop-by-default, pass only known-safe vars
pub const ENV_ALLOWLIST: &[&str] = &[
    "HOME",
    "PATH",
    "TMPDIR",
    "DEVELOPER_DIR",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TERM",
    "USER",
    "LOGNAME",
    "GEM_HOME",
    "GEM_PATH",
];

/// Poll interval while waiting on the child process
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Runs actions by spawning the configured external tool
pub struct ProcessActionRunner {
    bin: String,
    prefix_args: Vec<String>,
    log_dir: PathBuf,
    working_dir: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl ProcessActionRunner {
    pub fn new(runner: &RunnerSettings, log_dir: &Path, working_dir: &Path) -> Self {
        Self {
            bin: runner.bin.clone(),
            prefix_args: runner.args.clone(),
            log_dir: log_dir.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag; a set flag kills the running child
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Child environment: allowlisted variables plus the call's secrets
    fn build_environment(&self, call: &ActionCall) -> HashMap<String, String> {
        let mut env = HashMap::new();

        for key in ENV_ALLOWLIST {
            if let Ok(value) = std::env::var(key) {
                env.insert(key.to_string(), value);
            }
        }

        for (key, secret) in &call.secrets {
            let name = format!("{SECRET_ENV_PREFIX}{}", key.to_uppercase());
            env.insert(name, secret.reveal().to_string());
        }

        env
    }
}

impl ActionRunner for ProcessActionRunner {
    fn run(&self, call: &ActionCall) -> Result<ActionOutcome, ActionError> {
        let started = Instant::now();

        fs::create_dir_all(&self.log_dir)?;
        let log_path = self.log_dir.join(format!("{}.log", call.action.as_str()));

        let mut args: Vec<String> = self.prefix_args.clone();
        args.push("run".to_string());
        args.push(call.action.as_str().to_string());
        args.extend(call.rendered_args());

        let log_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let log_file = Arc::new(Mutex::new(log_file));

        {
            let mut f = log_file.lock().map_err(|_| poisoned_log_error())?;
            writeln!(f, "=== {} ===", call.action)?;
            writeln!(f, "command: {} {}", self.bin, args.join(" "))?;
            writeln!(f, "started_at: {}", Utc::now().to_rfc3339())?;
        }

        let env = self.build_environment(call);

        let mut child = Command::new(&self.bin)
            .args(&args)
            .current_dir(&self.working_dir)
            .env_clear()
            .envs(&env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ActionError::Spawn {
                action: call.action,
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let log_clone = Arc::clone(&log_file);
        let stdout_handle = std::thread::spawn(move || {
            if let Some(stdout) = stdout {
                let reader = BufReader::new(stdout);
                for line in reader.lines().map_while(Result::ok) {
                    if let Ok(mut f) = log_clone.lock() {
                        let _ = writeln!(f, "{line}");
                    }
                }
            }
        });

        let log_clone = Arc::clone(&log_file);
        let stderr_handle = std::thread::spawn(move || {
            if let Some(stderr) = stderr {
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    if let Ok(mut f) = log_clone.lock() {
                        let _ = writeln!(f, "[stderr] {line}");
                    }
                }
            }
        });

        // Wait with cancellation polling; a cancelled run kills the child
        let status = loop {
            if self.cancel.load(Ordering::SeqCst) {
                let _ = child.kill();
                let status = child.wait()?;
                break status;
            }

            match child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(WAIT_POLL),
            }
        };

        let _ = stdout_handle.join();
        let _ = stderr_handle.join();

        {
            let mut f = log_file.lock().map_err(|_| poisoned_log_error())?;
            writeln!(f, "=== exit: {} ===", describe_status(&status))?;
            writeln!(f, "ended_at: {}", Utc::now().to_rfc3339())?;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let cancelled = self.cancel.load(Ordering::SeqCst);

        if status.success() && !cancelled {
            tracing::debug!(action = %call.action, duration_ms, "action completed");
            Ok(ActionOutcome {
                exit_code: 0,
                duration_ms,
                log_path: Some(log_path),
            })
        } else {
            let (status, exit_code) = if cancelled {
                ("cancelled".to_string(), None)
            } else {
                (describe_status(&status), status.code())
            };
            Err(ActionError::Failed {
                action: call.action,
                status,
                exit_code,
                log_path: Some(log_path),
            })
        }
    }
}

fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {signal}");
        }
    }

    "unknown status".to_string()
}

fn poisoned_log_error() -> ActionError {
    ActionError::Io(std::io::Error::other("log file lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::secret::Secret;

    #[cfg(unix)]
    fn write_stub(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tool.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    fn stub_runner(dir: &Path, body: &str) -> ProcessActionRunner {
        let bin = write_stub(dir, body);
        let settings = RunnerSettings {
            bin: bin.to_string_lossy().to_string(),
            args: Vec::new(),
        };
        ProcessActionRunner::new(&settings, &dir.join("logs"), dir)
    }

    #[cfg(unix)]
    #[test]
    fn test_invocation_shape_and_secret_env() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record.txt");
        let runner = stub_runner(
            dir.path(),
            &format!(
                "echo \"$@\" > {record}\necho \"secret=$SHIPLANE_SECRET_PASSWORD\" >> {record}",
                record = record.display()
            ),
        );

        let call = ActionCall::new(ActionKind::CreateKeychain)
            .param("name", "App.keychain")
            .param("timeout", "3600")
            .secret("password", Secret::new("hunter2"));

        let outcome = runner.run(&call).unwrap();
        assert_eq!(outcome.exit_code, 0);

        let recorded = fs::read_to_string(&record).unwrap();
        assert!(recorded.contains("run create_keychain name:App.keychain timeout:3600"));
        assert!(recorded.contains("secret=hunter2"));
        // The secret must not appear in argv
        assert!(!recorded.lines().next().unwrap().contains("hunter2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_log_file_written_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let runner = stub_runner(dir.path(), "echo building");

        let call = ActionCall::new(ActionKind::BuildApp)
            .param("scheme", "App")
            .secret("password", Secret::new("hunter2"));
        let outcome = runner.run(&call).unwrap();

        let log_path = outcome.log_path.unwrap();
        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("=== build_app ==="));
        assert!(log.contains("run build_app scheme:App"));
        assert!(log.contains("building"));
        assert!(log.contains("exit code 0"));
        assert!(!log.contains("hunter2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_maps_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = stub_runner(dir.path(), "echo boom >&2\nexit 65");

        let call = ActionCall::new(ActionKind::BuildApp).param("scheme", "App");
        let err = runner.run(&call).unwrap_err();
        match err {
            ActionError::Failed {
                action,
                exit_code,
                status,
                ..
            } => {
                assert_eq!(action, ActionKind::BuildApp);
                assert_eq!(exit_code, Some(65));
                assert!(status.contains("65"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_environment_is_drop_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("env.txt");
        let runner = stub_runner(
            dir.path(),
            &format!("env > {record}", record = record.display()),
        );

        std::env::set_var("SHIPLANE_TEST_LEAK_CANARY", "leaked");
        let call = ActionCall::new(ActionKind::DeleteKeychain).param("name", "App.keychain");
        runner.run(&call).unwrap();
        std::env::remove_var("SHIPLANE_TEST_LEAK_CANARY");

        let env_dump = fs::read_to_string(&record).unwrap();
        assert!(!env_dump.contains("SHIPLANE_TEST_LEAK_CANARY"));
        assert!(env_dump.contains("PATH="));
    }

    #[cfg(unix)]
    #[test]
    fn test_preset_cancel_flag_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = Arc::new(AtomicBool::new(true));
        let runner = stub_runner(dir.path(), "sleep 30").with_cancel_flag(cancel);

        let call = ActionCall::new(ActionKind::BuildApp).param("scheme", "App");
        let started = Instant::now();
        let result = runner.run(&call);
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RunnerSettings {
            bin: dir
                .path()
                .join("does-not-exist")
                .to_string_lossy()
                .to_string(),
            args: Vec::new(),
        };
        let runner = ProcessActionRunner::new(&settings, &dir.path().join("logs"), dir.path());

        let call = ActionCall::new(ActionKind::CreateKeychain).param("name", "App.keychain");
        let err = runner.run(&call).unwrap_err();
        assert!(matches!(err, ActionError::Spawn { .. }));
    }
}
