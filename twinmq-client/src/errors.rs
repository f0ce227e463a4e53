use thiserror::Error;
use twinmq_core::{ClusterRole, ConfigError};

pub type Result<T> = std::result::Result<T, TwinError>;

/// Errors raised by the public publisher API.
#[derive(Debug, Error)]
pub enum TwinError {
    #[error("neither the primary nor the secondary cluster is enabled")]
    NoClusterEnabled,

    #[error("unable to initialize the {role} channel: {source}")]
    Initialization {
        role: ClusterRole,
        #[source]
        source: TransportError,
    },

    #[error("publish of sequence {sequence} on the {role} channel failed: {source}")]
    Publish {
        role: ClusterRole,
        sequence: u64,
        #[source]
        source: TransportError,
    },

    #[error("sequence number {sequence} of the {role} channel is already recorded in the confirm ledger")]
    DuplicateSequence { role: ClusterRole, sequence: u64 },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unable to build the publisher: {0}")]
    Builder(String),
}

impl TwinError {
    /// The cluster the failure is attached to, if any.
    pub fn role(&self) -> Option<ClusterRole> {
        match self {
            TwinError::Initialization { role, .. }
            | TwinError::Publish { role, .. }
            | TwinError::DuplicateSequence { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Returns the transport error wrapped by this error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            TwinError::Initialization { source, .. } | TwinError::Publish { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Errors reported by a transport implementation at the connection boundary.
///
/// Cloneable so a failed channel slot can hand the original cause to every
/// later caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}
