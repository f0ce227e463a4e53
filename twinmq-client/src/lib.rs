//! twinmq-client
//!
//! twinmq-client -- publishes messages to a primary or a secondary broker
//! cluster and tracks them until the broker confirms them.

pub mod errors;
pub use errors::{TransportError, TwinError};

mod transport;
pub use transport::{
    BrokerChannel, BrokerConnection, ChannelConfirmListener, ConfirmListener, ConnectionProvider,
    TransportResult,
};

mod confirm_ledger;
pub use confirm_ledger::ConfirmLedger;

mod channel_manager;
pub use channel_manager::{ChannelManager, ChannelState, PublishingChannel};

mod publisher;
pub use publisher::{PublishReceipt, Publisher, PublisherBuilder, PublisherOptions};

mod client_metrics;
pub use client_metrics::describe_metrics;

pub mod memory_transport;
pub use memory_transport::{MemoryConnectionProvider, PublishedMessage};

pub use twinmq_core::{
    BasicProperties, ClusterConfig, ClusterRole, PendingMessage, QueueDeclareOptions,
};
