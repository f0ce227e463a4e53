pub mod cluster;
pub mod config;
pub mod message;

pub use cluster::ClusterRole;
pub use config::{ClusterConfig, ConfigError, LoadClusterConfig};
pub use message::{BasicProperties, PendingMessage, QueueDeclareOptions};
