//! Storage path helpers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const GATEKIT_DIRNAME: &str = "gatekit";
const SUBSCRIPTIONS_FILENAME: &str = "subscriptions.sqlite";
const ACCESS_DIRNAME: &str = "access";
const ACCESS_DOCUMENT_FILENAME: &str = "config.json";
const ACCESS_LOCK_FILENAME: &str = "access.lock";

/// Paths for gatekit artifacts under `<root>/gatekit`.
///
/// The database and access document locations can be overridden
/// individually; the proxy usually dictates where its configuration lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePaths {
    root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscriptions_db: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_document: Option<PathBuf>,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            subscriptions_db: None,
            access_document: None,
        }
    }

    /// Moves the root, keeping any explicit file overrides.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Overrides the subscription database location.
    #[must_use]
    pub fn with_subscriptions_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.subscriptions_db = Some(path.into());
        self
    }

    /// Overrides the access document location.
    #[must_use]
    pub fn with_access_document(mut self, path: impl Into<PathBuf>) -> Self {
        self.access_document = Some(path.into());
        self
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the gatekit storage directory.
    #[must_use]
    pub fn gatekit_dir(&self) -> PathBuf {
        self.root.join(GATEKIT_DIRNAME)
    }

    /// Returns the path to the subscription database.
    #[must_use]
    pub fn subscriptions_db_path(&self) -> PathBuf {
        self.subscriptions_db
            .clone()
            .unwrap_or_else(|| self.gatekit_dir().join(SUBSCRIPTIONS_FILENAME))
    }

    /// Returns the path to the proxy's access document.
    #[must_use]
    pub fn access_document_path(&self) -> PathBuf {
        self.access_document.clone().unwrap_or_else(|| {
            self.gatekit_dir()
                .join(ACCESS_DIRNAME)
                .join(ACCESS_DOCUMENT_FILENAME)
        })
    }

    /// Returns the path to the lock file guarding the access document.
    ///
    /// The lock sits next to the document so that every writer of the same
    /// document agrees on it, whichever root they were started with.
    #[must_use]
    pub fn access_lock_path(&self) -> PathBuf {
        let document = self.access_document_path();
        document.parent().map_or_else(
            || PathBuf::from(ACCESS_LOCK_FILENAME),
            |dir| dir.join(ACCESS_LOCK_FILENAME),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::StoragePaths;
    use std::path::PathBuf;

    #[test]
    fn test_default_layout() {
        let root = PathBuf::from("/tmp/gatekit-paths");
        let paths = StoragePaths::new(&root);
        let gatekit = root.join("gatekit");

        assert_eq!(paths.gatekit_dir(), gatekit);
        assert_eq!(
            paths.subscriptions_db_path(),
            gatekit.join("subscriptions.sqlite")
        );
        assert_eq!(
            paths.access_document_path(),
            gatekit.join("access").join("config.json")
        );
        assert_eq!(
            paths.access_lock_path(),
            gatekit.join("access").join("access.lock")
        );
    }

    #[test]
    fn test_overrides_move_lock_with_document() {
        let paths = StoragePaths::new("/tmp/gatekit-paths")
            .with_subscriptions_db("/var/lib/gatekit/xray.db")
            .with_access_document("/etc/xray/config.json");

        assert_eq!(
            paths.subscriptions_db_path(),
            PathBuf::from("/var/lib/gatekit/xray.db")
        );
        assert_eq!(
            paths.access_document_path(),
            PathBuf::from("/etc/xray/config.json")
        );
        assert_eq!(
            paths.access_lock_path(),
            PathBuf::from("/etc/xray/access.lock")
        );
    }
}
