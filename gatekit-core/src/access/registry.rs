//! Load, mutate and atomically replace the proxy's access document.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::document::{AccessClientEntry, AccessConfigDocument};
use crate::config::DeploymentConfig;
use crate::error::GateKitResult;
use crate::storage::{AccessLock, StorageError, StorageResult};

/// Owner of the on-disk access document between load and save.
///
/// [`load`](Self::load) and [`save`](Self::save) are unguarded primitives.
/// Anything that mutates the document goes through
/// [`update`](Self::update), which holds the [`AccessLock`] for the whole
/// load, mutate, save sequence.
#[derive(Debug)]
pub struct AccessConfigRegistry {
    path: PathBuf,
    protocol: String,
    inbound_port: u16,
    lock: AccessLock,
}

impl AccessConfigRegistry {
    /// Creates a registry for the document described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened.
    pub fn new(config: &DeploymentConfig) -> GateKitResult<Self> {
        let lock = AccessLock::open(&config.storage.access_lock_path())?;
        Ok(Self {
            path: config.storage.access_document_path(),
            protocol: config.managed_protocol.clone(),
            inbound_port: config.inbound_port,
            lock,
        })
    }

    /// Returns the document location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the protocol identifying the managed inbound.
    #[must_use]
    pub fn managed_protocol(&self) -> &str {
        &self.protocol
    }

    /// Reads the document, materializing and persisting the default one if
    /// the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Io`](crate::GateKitError::Io) on read or
    /// write failures and [`GateKitError::Config`](crate::GateKitError::Config)
    /// if the file is not a JSON object.
    pub fn load(&self) -> GateKitResult<AccessConfigDocument> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => AccessConfigDocument::from_json_str(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let document =
                    AccessConfigDocument::default_for(&self.protocol, self.inbound_port);
                self.save(&document)?;
                log::info!(
                    "materialized default access document at {}",
                    self.path.display()
                );
                Ok(document)
            }
            Err(err) => Err(StorageError::io(
                format!("failed to read access document {}", self.path.display()),
                err,
            )
            .into()),
        }
    }

    /// Replaces the document on disk without ever exposing a partial file.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Io`](crate::GateKitError::Io) if any step of
    /// the temp-write-then-rename sequence fails; the previous file is left
    /// in place.
    pub fn save(&self, document: &AccessConfigDocument) -> GateKitResult<()> {
        let text = document.to_json_pretty()?;
        write_atomic(&self.path, text.as_bytes())?;
        Ok(())
    }

    /// Returns the managed inbound's client list.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`](crate::GateKitError::Config) if zero
    /// or several managed inbounds exist.
    pub fn locate_managed_clients(
        &self,
        document: &AccessConfigDocument,
    ) -> GateKitResult<Vec<AccessClientEntry>> {
        document.managed_clients(&self.protocol)
    }

    /// Returns `document` with the client appended unless its id is present.
    ///
    /// # Errors
    ///
    /// See [`locate_managed_clients`](Self::locate_managed_clients).
    pub fn add_client(
        &self,
        document: &AccessConfigDocument,
        id: &str,
        label: &str,
    ) -> GateKitResult<AccessConfigDocument> {
        document.with_client(&self.protocol, id, label)
    }

    /// Returns `document` without any entry whose id is `id`.
    ///
    /// # Errors
    ///
    /// See [`locate_managed_clients`](Self::locate_managed_clients).
    pub fn remove_client(
        &self,
        document: &AccessConfigDocument,
        id: &str,
    ) -> GateKitResult<AccessConfigDocument> {
        document.without_client(&self.protocol, id)
    }

    /// Runs `mutate` against the current document under the access lock and
    /// saves the result if it differs. Returns the document now on disk.
    ///
    /// # Errors
    ///
    /// Propagates lock, load, mutation and save failures. Nothing is written
    /// when `mutate` fails.
    pub fn update<F>(&self, mutate: F) -> GateKitResult<AccessConfigDocument>
    where
        F: FnOnce(&Self, &AccessConfigDocument) -> GateKitResult<AccessConfigDocument>,
    {
        let _guard = self.lock.lock()?;
        let current = self.load()?;
        let next = mutate(self, &current)?;
        if next == current {
            log::debug!("access document unchanged, skipping write");
        } else {
            self.save(&next)?;
        }
        Ok(next)
    }

    /// Locked `load → add_client → save`.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub fn grant(&self, id: &str, label: &str) -> GateKitResult<AccessConfigDocument> {
        self.update(|registry, document| registry.add_client(document, id, label))
    }

    /// Locked `load → remove_client → save`.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub fn withdraw(&self, id: &str) -> GateKitResult<AccessConfigDocument> {
        self.update(|registry, document| registry.remove_client(document, id))
    }
}

/// Writes `bytes` to a uniquely named temp file next to `path`, syncs it and
/// renames it over `path`. Readers see either the old or the new content.
fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|err| {
        StorageError::io(format!("failed to create {}", dir.display()), err)
    })?;
    let file_name = path
        .file_name()
        .map_or_else(|| "access".into(), |name| name.to_string_lossy());
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let result = write_and_rename(&tmp_path, path, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result?;
    sync_dir(&dir)
}

fn write_and_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp_path)
        .map_err(|err| {
            StorageError::io(format!("failed to create {}", tmp_path.display()), err)
        })?;
    file.write_all(bytes).map_err(|err| {
        StorageError::io(format!("failed to write {}", tmp_path.display()), err)
    })?;
    file.sync_all().map_err(|err| {
        StorageError::io(format!("failed to sync {}", tmp_path.display()), err)
    })?;
    drop(file);
    fs::rename(tmp_path, path).map_err(|err| {
        StorageError::io(format!("failed to replace {}", path.display()), err)
    })
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> StorageResult<()> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|err| StorageError::io(format!("failed to sync {}", dir.display()), err))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateKitError;

    fn registry_in(dir: &Path) -> AccessConfigRegistry {
        AccessConfigRegistry::new(&DeploymentConfig::with_root(dir)).expect("registry")
    }

    #[test]
    fn test_load_materializes_and_persists_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        assert!(!registry.path().exists());

        let document = registry.load().expect("load");
        assert!(registry.path().exists());
        assert!(registry
            .locate_managed_clients(&document)
            .expect("clients")
            .is_empty());
        assert_eq!(registry.load().expect("reload"), document);
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        let document = registry.load().expect("load");
        let document = registry.add_client(&document, "abc", "tg_1").expect("add");
        registry.save(&document).expect("save");

        let parent = registry.path().parent().expect("parent");
        let leftovers: Vec<_> = fs::read_dir(parent)
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(registry.load().expect("reload"), document);
    }

    #[test]
    fn test_grant_and_withdraw_are_idempotent_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());

        let once = registry.grant("abc", "tg_1").expect("grant");
        let bytes_once = fs::read(registry.path()).expect("read");
        let twice = registry.grant("abc", "tg_1").expect("grant again");
        assert_eq!(once, twice);
        assert_eq!(fs::read(registry.path()).expect("read"), bytes_once);

        let removed = registry.withdraw("abc").expect("withdraw");
        assert_eq!(registry.withdraw("abc").expect("withdraw again"), removed);
        assert!(registry
            .locate_managed_clients(&removed)
            .expect("clients")
            .is_empty());
    }

    #[test]
    fn test_failed_mutation_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        registry.grant("abc", "tg_1").expect("grant");
        let before = fs::read(registry.path()).expect("read");

        let err = registry
            .update(|_, _| Err(GateKitError::Validation("rejected".to_string())))
            .expect_err("mutation fails");
        assert!(matches!(err, GateKitError::Validation(_)));
        assert_eq!(fs::read(registry.path()).expect("read"), before);
    }

    #[test]
    fn test_invalid_document_is_config_error_and_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        fs::create_dir_all(registry.path().parent().expect("parent")).expect("mkdir");
        fs::write(registry.path(), "{\"inbounds\": [").expect("write garbage");

        let err = registry.grant("abc", "tg_1").expect_err("garbage");
        assert!(matches!(err, GateKitError::Config(_)));
        assert_eq!(
            fs::read_to_string(registry.path()).expect("read"),
            "{\"inbounds\": ["
        );
    }

    #[test]
    fn test_failed_rename_keeps_previous_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        let document = registry.load().expect("load");

        // A directory squatting on the target path makes the rename fail.
        let blocked = dir.path().join("blocked.json");
        fs::create_dir_all(blocked.join("occupied")).expect("mkdir");
        let err = write_atomic(&blocked, b"{}").expect_err("rename onto directory");
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(blocked.join("occupied").is_dir());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(registry.load().expect("reload"), document);
    }
}
