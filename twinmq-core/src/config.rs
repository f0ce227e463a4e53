use crate::cluster::ClusterRole;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read the configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to parse the configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// configuration settings as they are laid out in the config file
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadClusterConfig {
    /// Primary (active) cluster
    pub primary: ClusterEndpoint,
    /// Secondary (passive) cluster
    pub secondary: ClusterEndpoint,
    /// Credentials shared by both clusters
    pub credentials: Credentials,
    /// Virtual host used on both clusters
    pub virtual_host: String,
    /// Worker threads for the transport connections, 0 or missing means one per CPU
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    /// Broker URI of the cluster
    #[serde(default)]
    pub address: String,
    /// Whether messages may be published to this cluster
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Read-only snapshot of the dual-cluster deployment, loaded once before a
/// publisher is constructed.
///
/// "At least one cluster enabled" is not checked here; the
/// publisher rejects each publish while both flags are off.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub primary_address: String,
    pub secondary_address: String,
    pub username: String,
    pub password: String,
    pub virtual_host: String,
    pub worker_threads: usize,
    pub primary_enabled: bool,
    pub secondary_enabled: bool,
}

impl ClusterConfig {
    /// Loads and validates the configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let load_config: LoadClusterConfig = serde_yaml::from_str(content)?;
        load_config.try_into()
    }

    pub fn is_enabled(&self, role: ClusterRole) -> bool {
        match role {
            ClusterRole::Primary => self.primary_enabled,
            ClusterRole::Secondary => self.secondary_enabled,
        }
    }

    pub fn address(&self, role: ClusterRole) -> &str {
        match role {
            ClusterRole::Primary => &self.primary_address,
            ClusterRole::Secondary => &self.secondary_address,
        }
    }

    /// Enabled roles in precedence order.
    pub fn enabled_roles(&self) -> Vec<ClusterRole> {
        ClusterRole::ALL
            .into_iter()
            .filter(|role| self.is_enabled(*role))
            .collect()
    }
}

impl Debug for ClusterConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("primary_address", &self.primary_address)
            .field("secondary_address", &self.secondary_address)
            .field("username", &self.username)
            .field("password", &"***")
            .field("virtual_host", &self.virtual_host)
            .field("worker_threads", &self.worker_threads)
            .field("primary_enabled", &self.primary_enabled)
            .field("secondary_enabled", &self.secondary_enabled)
            .finish()
    }
}

/// Implementing the TryFrom trait to transform LoadClusterConfig into ClusterConfig
impl TryFrom<LoadClusterConfig> for ClusterConfig {
    type Error = ConfigError;

    fn try_from(config: LoadClusterConfig) -> Result<Self> {
        if config.primary.enabled && config.primary.address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "primary cluster is enabled but has no address".to_string(),
            ));
        }
        if config.secondary.enabled && config.secondary.address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "secondary cluster is enabled but has no address".to_string(),
            ));
        }

        let worker_threads = match config.worker_threads {
            Some(threads) if threads > 0 => threads,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };

        Ok(ClusterConfig {
            primary_address: config.primary.address,
            secondary_address: config.secondary.address,
            username: config.credentials.username,
            password: config.credentials.password,
            virtual_host: config.virtual_host,
            worker_threads,
            primary_enabled: config.primary.enabled,
            secondary_enabled: config.secondary.enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
primary:
  address: "amqp://10.0.0.1:5672"
  enabled: true
secondary:
  address: "amqp://10.0.0.2:5672"
  enabled: false
credentials:
  username: "publisher"
  password: "s3cret"
virtual_host: "/orders"
worker_threads: 4
"#;

    #[test]
    fn load_from_yaml() {
        let config = ClusterConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.address(ClusterRole::Primary), "amqp://10.0.0.1:5672");
        assert_eq!(config.address(ClusterRole::Secondary), "amqp://10.0.0.2:5672");
        assert_eq!(config.virtual_host, "/orders");
        assert_eq!(config.worker_threads, 4);
        assert!(config.is_enabled(ClusterRole::Primary));
        assert!(!config.is_enabled(ClusterRole::Secondary));
        assert_eq!(config.enabled_roles(), vec![ClusterRole::Primary]);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = ClusterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.username, "publisher");
        assert_eq!(config.password, "s3cret");
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = ClusterConfig::from_file("/definitely/not/here.yml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn both_disabled_still_loads() {
        let yaml = CONFIG.replace("enabled: true", "enabled: false");
        let config = ClusterConfig::from_yaml(&yaml).unwrap();
        assert!(config.enabled_roles().is_empty());
    }

    #[test]
    fn enabled_cluster_requires_address() {
        let yaml = CONFIG.replace("\"amqp://10.0.0.1:5672\"", "\"\"");
        let result = ClusterConfig::from_yaml(&yaml);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn worker_threads_default_to_cpu_count() {
        let yaml = CONFIG.replace("worker_threads: 4", "worker_threads: 0");
        let config = ClusterConfig::from_yaml(&yaml).unwrap();
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn debug_redacts_password() {
        let config = ClusterConfig::from_yaml(CONFIG).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("***"));
    }
}
