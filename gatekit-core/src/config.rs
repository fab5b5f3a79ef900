use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GateKitError, GateKitResult};
use crate::storage::StoragePaths;

const DEFAULT_PUBLIC_HOST: &str = "vpn.example.com";
const DEFAULT_PUBLIC_PORT: u16 = 443;
const DEFAULT_PROFILE_TAG: &str = "NixVPN";
const DEFAULT_INBOUND_PORT: u16 = 443;
const DEFAULT_MANAGED_PROTOCOL: &str = "vless";

/// Deployment-level settings, built once at process start and shared by
/// reference with the engine and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Host embedded in connection URIs.
    pub public_host: String,
    /// Port embedded in connection URIs.
    pub public_port: u16,
    /// Prefix of the URI fragment, `#<profile_tag>-<label>`.
    pub profile_tag: String,
    /// Listening port written into a freshly materialized access document.
    pub inbound_port: u16,
    /// Protocol value identifying the managed inbound.
    pub managed_protocol: String,
    /// Where the database, document and lock live.
    pub storage: StoragePaths,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            public_host: DEFAULT_PUBLIC_HOST.to_string(),
            public_port: DEFAULT_PUBLIC_PORT,
            profile_tag: DEFAULT_PROFILE_TAG.to_string(),
            inbound_port: DEFAULT_INBOUND_PORT,
            managed_protocol: DEFAULT_MANAGED_PROTOCOL.to_string(),
            storage: StoragePaths::new(PathBuf::from(".")),
        }
    }
}

impl DeploymentConfig {
    /// Default settings with storage rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            storage: StoragePaths::new(root),
            ..Self::default()
        }
    }

    /// Reads settings from a JSON file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] if the file cannot be read or parsed,
    /// or if the settings fail [`validate`](Self::validate).
    pub fn from_json_file(path: &Path) -> GateKitResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            GateKitError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            GateKitError::Config(format!("invalid settings in {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] on an empty host, tag or protocol.
    pub fn validate(&self) -> GateKitResult<()> {
        if self.public_host.trim().is_empty() {
            return Err(GateKitError::Config("public_host must not be empty".to_string()));
        }
        if self.profile_tag.trim().is_empty() {
            return Err(GateKitError::Config("profile_tag must not be empty".to_string()));
        }
        if self.managed_protocol.trim().is_empty() {
            return Err(GateKitError::Config(
                "managed_protocol must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = DeploymentConfig::default();
        assert_eq!(config.public_host, "vpn.example.com");
        assert_eq!(config.public_port, 443);
        assert_eq!(config.profile_tag, "NixVPN");
        assert_eq!(config.managed_protocol, "vless");
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_from_json_file_fills_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"public_host": "edge.example.net", "public_port": 8443,
                "storage": {{"root": "/srv/gatekit"}}}}"#
        )
        .expect("write settings");

        let config = DeploymentConfig::from_json_file(file.path()).expect("parse");
        assert_eq!(config.public_host, "edge.example.net");
        assert_eq!(config.public_port, 8443);
        assert_eq!(config.profile_tag, "NixVPN");
        assert_eq!(config.storage.root(), Path::new("/srv/gatekit"));
    }

    #[test]
    fn test_from_json_file_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"public_hostname": "typo"}}"#).expect("write settings");
        let err = DeploymentConfig::from_json_file(file.path()).expect_err("unknown key");
        assert!(matches!(err, GateKitError::Config(_)));
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let config = DeploymentConfig {
            public_host: "  ".to_string(),
            ..DeploymentConfig::default()
        };
        assert!(matches!(config.validate(), Err(GateKitError::Config(_))));
    }
}
