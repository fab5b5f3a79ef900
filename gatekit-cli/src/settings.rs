//! Turns command-line and environment input into one `DeploymentConfig`.

use std::path::PathBuf;

use clap::Args;
use eyre::WrapErr;
use gatekit_core::DeploymentConfig;

/// Deployment options shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct DeploymentArgs {
    /// JSON settings file; flags and environment override its values
    #[arg(long, global = true, env = "GATEKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory for the database, access document and lock
    #[arg(long, global = true, env = "GATEKIT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Public host embedded in connection URIs
    #[arg(long, global = true, env = "XRAY_PUBLIC_HOST")]
    pub host: Option<String>,

    /// Public port embedded in connection URIs
    #[arg(long, global = true, env = "XRAY_PUBLIC_PORT")]
    pub port: Option<u16>,

    /// Profile tag prefixed to the URI fragment
    #[arg(long, global = true, env = "XRAY_PROFILE_TAG")]
    pub profile_tag: Option<String>,

    /// Listening port written into a freshly created access document
    #[arg(long, global = true, env = "XRAY_INBOUND_PORT")]
    pub inbound_port: Option<u16>,

    /// Subscription database path
    #[arg(long, global = true, env = "XRAY_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Proxy access document path
    #[arg(long, global = true, env = "XRAY_CONFIG_PATH")]
    pub access_config: Option<PathBuf>,
}

impl DeploymentArgs {
    /// Resolves the effective configuration: file (or defaults), then
    /// explicit flags and environment variables on top.
    pub fn resolve(&self) -> eyre::Result<DeploymentConfig> {
        let mut config = match &self.config {
            Some(path) => DeploymentConfig::from_json_file(path)
                .wrap_err_with(|| format!("loading settings from {}", path.display()))?,
            None => DeploymentConfig::with_root(default_data_dir()),
        };

        if let Some(dir) = &self.data_dir {
            config.storage = config.storage.clone().with_root(dir.clone());
        }
        if let Some(host) = &self.host {
            config.public_host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.public_port = port;
        }
        if let Some(tag) = &self.profile_tag {
            config.profile_tag.clone_from(tag);
        }
        if let Some(port) = self.inbound_port {
            config.inbound_port = port;
        }
        if let Some(path) = &self.db_path {
            config.storage = config.storage.clone().with_subscriptions_db(path.clone());
        }
        if let Some(path) = &self.access_config {
            config.storage = config.storage.clone().with_access_document(path.clone());
        }

        config.validate().wrap_err("invalid deployment settings")?;
        Ok(config)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."))
}
