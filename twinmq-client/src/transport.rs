use crate::errors::TransportError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use twinmq_core::{BasicProperties, ClusterConfig, ClusterRole, QueueDeclareOptions};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Opens transport connections to a named cluster.
///
/// Implementations read the address, credentials, virtual host and worker
/// thread count for `role` from the config snapshot. They must not retry
/// internally; a failure is surfaced to the publisher as is.
#[async_trait]
pub trait ConnectionProvider: Debug + Send + Sync {
    async fn create_connection(
        &self,
        role: ClusterRole,
        config: &ClusterConfig,
    ) -> TransportResult<Arc<dyn BrokerConnection>>;
}

/// A live transport connection to one broker cluster.
#[async_trait]
pub trait BrokerConnection: Debug + Send + Sync {
    async fn create_channel(&self, channel_number: u16) -> TransportResult<Box<dyn BrokerChannel>>;
}

/// A logical channel on a broker connection.
///
/// The sequence counter follows the publisher-confirm model: once
/// `confirm_select` has been called the first publish gets sequence 1 and
/// every publish attempt moves the counter forward by one, whether the write
/// succeeded or not.
#[async_trait]
pub trait BrokerChannel: Debug + Send + Sync {
    async fn queue_declare(&self, queue: &str, options: QueueDeclareOptions) -> TransportResult<()>;

    async fn basic_qos(&self, prefetch_count: u16) -> TransportResult<()>;

    fn add_confirm_listener(&self, listener: Arc<dyn ChannelConfirmListener>);

    async fn confirm_select(&self) -> TransportResult<()>;

    /// Sequence number the next publish on this channel will carry.
    fn next_publish_seq_no(&self) -> u64;

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: BasicProperties,
        body: &[u8],
    ) -> TransportResult<()>;
}

/// Confirm callback registered on a single broker channel.
///
/// Sequence numbers are scoped to the channel the callback is registered on.
pub trait ChannelConfirmListener: Debug + Send + Sync {
    fn handle_ack(&self, sequence: u64, multiple: bool);

    fn handle_nack(&self, sequence: u64, multiple: bool);
}

/// Receives publisher confirms from the broker.
///
/// Called on transport-managed threads, independently of the publishing
/// tasks. `role` names the channel the confirm came from; sequence numbers
/// of the two channels overlap. With `multiple` set the event covers every
/// outstanding sequence of that channel up to and including `sequence`.
/// Implementations typically hold the publisher's
/// [`ConfirmLedger`](crate::ConfirmLedger) and call `resolve_up_to` on it.
pub trait ConfirmListener: Debug + Send + Sync {
    fn handle_ack(&self, role: ClusterRole, sequence: u64, multiple: bool);

    fn handle_nack(&self, role: ClusterRole, sequence: u64, multiple: bool);
}

/// Forwards the confirms of one channel to a [`ConfirmListener`], tagged
/// with the channel's cluster role.
#[derive(Debug)]
pub(crate) struct RoleConfirmListener {
    role: ClusterRole,
    listener: Arc<dyn ConfirmListener>,
}

impl RoleConfirmListener {
    pub(crate) fn new(role: ClusterRole, listener: Arc<dyn ConfirmListener>) -> Self {
        RoleConfirmListener { role, listener }
    }
}

impl ChannelConfirmListener for RoleConfirmListener {
    fn handle_ack(&self, sequence: u64, multiple: bool) {
        self.listener.handle_ack(self.role, sequence, multiple);
    }

    fn handle_nack(&self, sequence: u64, multiple: bool) {
        self.listener.handle_nack(self.role, sequence, multiple);
    }
}
