//! Build keychain naming and lifecycle parameters
//!
//! The ephemeral keychain holding the signing certificate for the duration
//! of one lane run. Name and on-disk path derive deterministically from
//! the product name; the password protecting it is random per run and
//! never persisted.

use std::path::{Path, PathBuf};

use rand::{distributions::Alphanumeric, Rng};

use crate::secret::Secret;

/// Suffix the OS credential store appends to keychain files on disk
pub const KEYCHAIN_FILE_SUFFIX: &str = "-db";

/// Auto-lock timeout handed to the keychain-creation action
pub const KEYCHAIN_LOCK_TIMEOUT_SECONDS: u32 = 3600;

/// Length of the generated per-run keychain password
const PASSWORD_LENGTH: usize = 32;

/// Naming and lifecycle parameters for one run's build keychain
#[derive(Debug, Clone)]
pub struct KeychainSpec {
    /// Keychain name handed to the external actions (`<product>.keychain`)
    pub name: String,

    /// On-disk file path (`<dir>/<product>.keychain-db`), used for the
    /// stale-keychain existence check
    pub path: PathBuf,

    /// Auto-lock timeout in seconds
    pub lock_timeout_seconds: u32,

    /// Lock the keychain when the machine sleeps
    pub lock_when_sleeps: bool,
}

impl KeychainSpec {
    /// Deterministic spec for a product name
    pub fn for_product(keychain_dir: &Path, product_name: &str) -> Self {
        let name = format!("{product_name}.keychain");
        let path = keychain_dir.join(format!("{name}{KEYCHAIN_FILE_SUFFIX}"));
        Self {
            name,
            path,
            lock_timeout_seconds: KEYCHAIN_LOCK_TIMEOUT_SECONDS,
            lock_when_sleeps: true,
        }
    }

    /// Whether a keychain file already exists at the computed path
    pub fn file_exists(&self) -> bool {
        self.path.exists()
    }
}

/// Generate a random per-run keychain password
pub fn generate_password() -> Secret {
    let value: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect();
    Secret::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_path() {
        let spec = KeychainSpec::for_product(Path::new("/tmp"), "JenkinsExample");
        assert_eq!(spec.name, "JenkinsExample.keychain");
        assert_eq!(spec.path, PathBuf::from("/tmp/JenkinsExample.keychain-db"));
    }

    #[test]
    fn test_default_lifecycle_parameters() {
        let spec = KeychainSpec::for_product(Path::new("/tmp"), "App");
        assert_eq!(spec.lock_timeout_seconds, 3600);
        assert!(spec.lock_when_sleeps);
    }

    #[test]
    fn test_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let spec = KeychainSpec::for_product(dir.path(), "App");
        assert!(!spec.file_exists());

        std::fs::write(&spec.path, b"keychain").unwrap();
        assert!(spec.file_exists());
    }

    #[test]
    fn test_generated_password_shape() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.reveal().len(), PASSWORD_LENGTH);
        assert!(a.reveal().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.reveal(), b.reveal());
    }
}
