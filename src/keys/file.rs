//! File backend for the key store with atomic writes.
//!
//! Layout under the key directory:
//! - `private_key.pem` - PKCS#8, optionally password-encrypted
//! - `public_key.pem` - PKCS#1 public key
//!
//! A write stages both files as temp files, then renames them into place.
//! On Unix the private temp file is created with mode 0600.

use crate::KeywardenError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File name of the private half.
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";

/// File name of the public half.
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// PEM text read back from disk.
#[derive(Debug)]
pub struct StoredKeyPair {
    /// Contents of `private_key.pem`.
    pub private_pem: String,
    /// Contents of `public_key.pem`, if present.
    pub public_pem: Option<String>,
}

/// Paths of a persisted key pair.
#[derive(Debug, Clone)]
pub struct KeyFiles {
    dir: PathBuf,
}

impl KeyFiles {
    /// Key files under `dir`. Nothing is touched on disk until a write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The key directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `private_key.pem`.
    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    /// Path of `public_key.pem`.
    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }

    /// Read both PEM files.
    ///
    /// The private key is mandatory; a missing public file is tolerated since
    /// it can always be derived from the private half.
    pub fn read(&self) -> Result<StoredKeyPair, KeywardenError> {
        let private_path = self.private_key_path();
        if !private_path.exists() {
            return Err(KeywardenError::KeyNotFound(format!(
                "{} does not exist",
                private_path.display()
            )));
        }

        let private_pem = fs::read_to_string(&private_path)
            .map_err(|e| KeywardenError::KeyIO(format!("Failed to read private key: {}", e)))?;

        let public_path = self.public_key_path();
        let public_pem = if public_path.exists() {
            Some(
                fs::read_to_string(&public_path).map_err(|e| {
                    KeywardenError::KeyIO(format!("Failed to read public key: {}", e))
                })?,
            )
        } else {
            tracing::warn!(path = %public_path.display(), "Public key file missing; deriving from private key");
            None
        };

        Ok(StoredKeyPair {
            private_pem,
            public_pem,
        })
    }

    /// Write both PEM files, creating the directory if absent.
    ///
    /// Both halves are staged as temp files before either live file is
    /// replaced. If staging fails nothing on disk changes; if the second
    /// rename fails the previous public file is put back, so the directory
    /// never holds halves of two different pairs.
    pub fn write(&self, private_pem: &str, public_pem: &str) -> Result<(), KeywardenError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| KeywardenError::KeyIO(format!("Failed to create key dir: {}", e)))?;

        let private_path = self.private_key_path();
        let public_path = self.public_key_path();
        let private_temp = temp_path(&private_path);
        let public_temp = temp_path(&public_path);

        let staged = stage(&private_temp, private_pem, true)
            .and_then(|_| stage(&public_temp, public_pem, false));
        if let Err(e) = staged {
            discard(&private_temp);
            discard(&public_temp);
            return Err(e);
        }

        let previous_public = match fs::read_to_string(&public_path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                discard(&private_temp);
                discard(&public_temp);
                return Err(KeywardenError::KeyIO(format!("Failed to read public key: {}", e)));
            }
        };

        if let Err(e) = fs::rename(&public_temp, &public_path) {
            discard(&private_temp);
            discard(&public_temp);
            return Err(KeywardenError::KeyIO(format!("Failed to rename public key file: {}", e)));
        }

        if let Err(e) = fs::rename(&private_temp, &private_path) {
            discard(&private_temp);
            self.restore_public(previous_public.as_deref());
            return Err(KeywardenError::KeyIO(format!("Failed to rename private key file: {}", e)));
        }

        Ok(())
    }

    fn restore_public(&self, previous: Option<&str>) {
        let public_path = self.public_key_path();
        let restored = match previous {
            Some(contents) => {
                let temp = temp_path(&public_path);
                stage(&temp, contents, false).and_then(|_| {
                    fs::rename(&temp, &public_path).map_err(|e| {
                        discard(&temp);
                        KeywardenError::KeyIO(e.to_string())
                    })
                })
            }
            None => fs::remove_file(&public_path).map_err(|e| KeywardenError::KeyIO(e.to_string())),
        };
        match restored {
            Ok(()) => tracing::warn!(dir = %self.dir.display(), "Key write rolled back"),
            Err(e) => tracing::error!(
                dir = %self.dir.display(),
                error = %e,
                "Could not roll back public key after failed write; key directory is inconsistent"
            ),
        }
    }
}

fn temp_path(target: &Path) -> PathBuf {
    target.with_extension("pem.tmp")
}

/// Write `contents` to a fresh temp file and flush it to disk. A stale temp
/// file from an interrupted write is removed first so the new file is always
/// created with the permissions chosen here.
fn stage(path: &Path, contents: &str, private: bool) -> Result<(), KeywardenError> {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed stale temp file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(KeywardenError::KeyIO(format!(
                "Failed to clear temp file {}: {}",
                path.display(),
                e
            )))
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    if private {
        owner_only(&mut options);
    }

    let mut file = options
        .open(path)
        .map_err(|e| KeywardenError::KeyIO(format!("Failed to write temp file: {}", e)))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| KeywardenError::KeyIO(format!("Failed to write temp file: {}", e)))
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "Temp file left behind"),
    }
}

/// Create with mode 0600 so the private key is never readable by others,
/// not even between creation and rename.
#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;

    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only(_options: &mut OpenOptions) {
    tracing::debug!("Owner-only permissions not applied on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_is_key_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        assert!(matches!(files.read(), Err(KeywardenError::KeyNotFound(_))));
    }

    #[test]
    fn test_write_creates_directory_and_roundtrips() {
        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path().join("nested").join("keys"));

        files.write("PRIVATE", "PUBLIC").unwrap();

        let stored = files.read().unwrap();
        assert_eq!(stored.private_pem, "PRIVATE");
        assert_eq!(stored.public_pem.as_deref(), Some("PUBLIC"));
    }

    #[test]
    fn test_missing_public_file_is_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        files.write("PRIVATE", "PUBLIC").unwrap();
        fs::remove_file(files.public_key_path()).unwrap();

        let stored = files.read().unwrap();
        assert!(stored.public_pem.is_none());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        files.write("ONE", "ONE-PUB").unwrap();
        files.write("TWO", "TWO-PUB").unwrap();

        assert_eq!(files.read().unwrap().private_pem, "TWO");
        let leftovers = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        files.write("PRIVATE", "PUBLIC").unwrap();

        let mode = fs::metadata(files.private_key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_failed_staging_leaves_existing_pair() {
        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        files.write("OLD", "OLD-PUB").unwrap();
        fs::create_dir(temp_dir.path().join("public_key.pem.tmp")).unwrap();

        assert!(matches!(files.write("NEW", "NEW-PUB"), Err(KeywardenError::KeyIO(_))));

        let stored = files.read().unwrap();
        assert_eq!(stored.private_pem, "OLD");
        assert_eq!(stored.public_pem.as_deref(), Some("OLD-PUB"));
        assert!(!temp_dir.path().join("private_key.pem.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_private_rename_restores_public() {
        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        fs::write(files.public_key_path(), "OLD-PUB").unwrap();
        fs::create_dir(files.private_key_path()).unwrap();
        fs::write(files.private_key_path().join("occupied"), "x").unwrap();

        assert!(matches!(files.write("NEW", "NEW-PUB"), Err(KeywardenError::KeyIO(_))));

        assert_eq!(fs::read_to_string(files.public_key_path()).unwrap(), "OLD-PUB");
        assert!(!temp_dir.path().join("private_key.pem.tmp").exists());
        assert!(!temp_dir.path().join("public_key.pem.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_private_rename_removes_new_public() {
        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        fs::create_dir(files.private_key_path()).unwrap();
        fs::write(files.private_key_path().join("occupied"), "x").unwrap();

        assert!(files.write("NEW", "NEW-PUB").is_err());
        assert!(!files.public_key_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_private_temp_does_not_leak_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let files = KeyFiles::new(temp_dir.path());
        let stale = temp_dir.path().join("private_key.pem.tmp");
        fs::write(&stale, "half-written").unwrap();
        fs::set_permissions(&stale, fs::Permissions::from_mode(0o644)).unwrap();

        files.write("PRIVATE", "PUBLIC").unwrap();

        let mode = fs::metadata(files.private_key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(files.read().unwrap().private_pem, "PRIVATE");
        assert!(!stale.exists());
    }
}
