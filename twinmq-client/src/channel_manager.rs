use crate::{
    client_metrics::{
        CHANNELS_CREATED_TOTAL, PUBLISH_FAILURES_TOTAL, PUBLISH_LATENCY_MS, PUBLISH_TOTAL,
    },
    confirm_ledger::ConfirmLedger,
    errors::{Result, TransportError, TwinError},
    transport::{
        BrokerChannel, BrokerConnection, ConfirmListener, ConnectionProvider, RoleConfirmListener,
    },
    PublisherOptions,
};

use metrics::{counter, histogram};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use twinmq_core::{ClusterConfig, ClusterRole, PendingMessage, QueueDeclareOptions};

/// Lifecycle of the publishing channel of one cluster role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal: the setup error is replayed to every later caller.
    Failed,
}

#[derive(Debug, Clone)]
enum ChannelStatus {
    Uninitialized,
    Initializing,
    Ready(Arc<PublishingChannel>),
    Failed(TransportError),
}

impl ChannelStatus {
    fn state(&self) -> ChannelState {
        match self {
            ChannelStatus::Uninitialized => ChannelState::Uninitialized,
            ChannelStatus::Initializing => ChannelState::Initializing,
            ChannelStatus::Ready(_) => ChannelState::Ready,
            ChannelStatus::Failed(_) => ChannelState::Failed,
        }
    }
}

// One memoization slot per cluster role. `init_lock` serializes the
// check-then-create sequence, `status` can be read at any time.
#[derive(Debug)]
struct RoleSlot {
    status: RwLock<ChannelStatus>,
    init_lock: Mutex<()>,
}

impl RoleSlot {
    fn new() -> Self {
        RoleSlot {
            status: RwLock::new(ChannelStatus::Uninitialized),
            init_lock: Mutex::new(()),
        }
    }

    fn status(&self) -> ChannelStatus {
        self.status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_status(&self, status: ChannelStatus) {
        *self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = status;
    }
}

/// Creates, memoizes and hands out exactly one publishing channel per
/// cluster role.
#[derive(Debug)]
pub struct ChannelManager {
    config: Arc<ClusterConfig>,
    provider: Arc<dyn ConnectionProvider>,
    confirm_listener: Arc<dyn ConfirmListener>,
    queue: String,
    options: PublisherOptions,
    primary: RoleSlot,
    secondary: RoleSlot,
}

impl ChannelManager {
    pub(crate) fn new(
        config: Arc<ClusterConfig>,
        provider: Arc<dyn ConnectionProvider>,
        confirm_listener: Arc<dyn ConfirmListener>,
        queue: String,
        options: PublisherOptions,
    ) -> Self {
        ChannelManager {
            config,
            provider,
            confirm_listener,
            queue,
            options,
            primary: RoleSlot::new(),
            secondary: RoleSlot::new(),
        }
    }

    fn slot(&self, role: ClusterRole) -> &RoleSlot {
        match role {
            ClusterRole::Primary => &self.primary,
            ClusterRole::Secondary => &self.secondary,
        }
    }

    /// Current lifecycle state of the channel for `role`.
    pub fn state(&self, role: ClusterRole) -> ChannelState {
        self.slot(role).status().state()
    }

    /// Returns the channel for `role`, creating it on first use.
    ///
    /// Concurrent first callers wait on the role's init lock, so the channel
    /// is created once. A failed setup is terminal for the role and is
    /// returned again on every later call, without retrying.
    pub async fn get_channel(&self, role: ClusterRole) -> Result<Arc<PublishingChannel>> {
        let slot = self.slot(role);

        if let Some(result) = Self::settled(role, slot.status()) {
            return result;
        }

        let _init = slot.init_lock.lock().await;

        // another task may have finished the setup while we were waiting
        if let Some(result) = Self::settled(role, slot.status()) {
            return result;
        }

        slot.set_status(ChannelStatus::Initializing);

        match self.create_channel(role).await {
            Ok(channel) => {
                let channel = Arc::new(channel);
                slot.set_status(ChannelStatus::Ready(channel.clone()));
                Ok(channel)
            }
            Err(source) => {
                error!(cluster = %role, queue = %self.queue, error = %source, "unable to create publishing channel");
                slot.set_status(ChannelStatus::Failed(source.clone()));
                Err(TwinError::Initialization { role, source })
            }
        }
    }

    fn settled(
        role: ClusterRole,
        status: ChannelStatus,
    ) -> Option<Result<Arc<PublishingChannel>>> {
        match status {
            ChannelStatus::Ready(channel) => Some(Ok(channel)),
            ChannelStatus::Failed(source) => Some(Err(TwinError::Initialization { role, source })),
            ChannelStatus::Uninitialized | ChannelStatus::Initializing => None,
        }
    }

    /// Creates the channels of every enabled role, stopping at the first failure.
    pub(crate) async fn init_enabled(&self) -> Result<()> {
        for role in self.config.enabled_roles() {
            self.get_channel(role).await?;
        }
        Ok(())
    }

    async fn create_channel(&self, role: ClusterRole) -> std::result::Result<PublishingChannel, TransportError> {
        info!(
            cluster = %role,
            address = %self.config.address(role),
            queue = %self.queue,
            "creating publishing channel"
        );

        let connection = self
            .provider
            .create_connection(role, self.config.as_ref())
            .await?;

        let channel = connection.create_channel(self.options.channel_number).await?;

        channel
            .queue_declare(&self.queue, QueueDeclareOptions::default())
            .await?;
        channel.basic_qos(self.options.prefetch_count).await?;
        channel.add_confirm_listener(Arc::new(RoleConfirmListener::new(
            role,
            self.confirm_listener.clone(),
        )));
        channel.confirm_select().await?;

        counter!(CHANNELS_CREATED_TOTAL.name, "cluster" => role.tag()).increment(1);

        Ok(PublishingChannel {
            role,
            queue: self.queue.clone(),
            channel,
            _connection: connection,
            publish_lock: Mutex::new(()),
        })
    }
}

/// A confirm-mode broker channel bound to one queue of one cluster.
#[derive(Debug)]
pub struct PublishingChannel {
    role: ClusterRole,
    queue: String,
    channel: Box<dyn BrokerChannel>,
    // keeps the transport connection open for as long as the channel lives
    _connection: Arc<dyn BrokerConnection>,
    // guards sequence reservation + ledger insert + wire send
    publish_lock: Mutex<()>,
}

impl PublishingChannel {
    pub fn role(&self) -> ClusterRole {
        self.role
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn next_publish_seq_no(&self) -> u64 {
        self.channel.next_publish_seq_no()
    }

    /// Records `message` in the ledger under the channel's next sequence
    /// number, then writes it to the queue.
    ///
    /// Both steps run under the channel's publish lock, so the ledger entry is
    /// visible before the broker can confirm it. If the write fails, or the
    /// returned future is dropped before the write completes, the entry is
    /// removed before the lock is released.
    pub(crate) async fn publish(&self, ledger: &ConfirmLedger, message: PendingMessage) -> Result<u64> {
        let _publishing = self.publish_lock.lock().await;
        let started = Instant::now();

        let sequence = self.channel.next_publish_seq_no();
        let properties = message.properties();
        let body = message.body.clone();

        ledger.record(self.role, sequence, message)?;
        let entry = UnsentEntry {
            ledger,
            role: self.role,
            sequence,
            armed: true,
        };

        if let Err(source) = self
            .channel
            .basic_publish("", &self.queue, properties, &body)
            .await
        {
            entry.roll_back();
            counter!(PUBLISH_FAILURES_TOTAL.name, "cluster" => self.role.tag()).increment(1);
            error!(cluster = %self.role, queue = %self.queue, sequence, error = %source, "publish failed, ledger entry rolled back");
            return Err(TwinError::Publish {
                role: self.role,
                sequence,
                source,
            });
        }
        entry.disarm();

        counter!(PUBLISH_TOTAL.name, "cluster" => self.role.tag()).increment(1);
        histogram!(PUBLISH_LATENCY_MS.name, "cluster" => self.role.tag())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(cluster = %self.role, queue = %self.queue, sequence, "message published");

        Ok(sequence)
    }
}

// Ledger entry of a message whose write has not completed. Dropping it while
// armed removes the entry.
struct UnsentEntry<'a> {
    ledger: &'a ConfirmLedger,
    role: ClusterRole,
    sequence: u64,
    armed: bool,
}

impl UnsentEntry<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }

    fn roll_back(mut self) {
        self.ledger.remove(self.role, self.sequence);
        self.armed = false;
    }
}

impl Drop for UnsentEntry<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.ledger.remove(self.role, self.sequence).is_some() {
            warn!(cluster = %self.role, sequence = self.sequence, "publish did not complete, ledger entry removed");
        }
    }
}
