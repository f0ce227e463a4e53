use crate::{
    errors::TransportError,
    transport::{
        BrokerChannel, BrokerConnection, ChannelConfirmListener, ConnectionProvider, TransportResult,
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use twinmq_core::{BasicProperties, ClusterConfig, ClusterRole, QueueDeclareOptions};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A message as it reached the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel_number: u16,
    pub sequence: u64,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Vec<u8>,
}

/// State of one simulated broker cluster.
#[derive(Debug, Default)]
struct MemoryCluster {
    connections_opened: AtomicUsize,
    fail_connect: AtomicBool,
    fail_channel: AtomicBool,
    fail_publish: AtomicBool,
    auto_ack: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    publish_delay: Mutex<Option<Duration>>,
    declared_queues: Mutex<Vec<(String, QueueDeclareOptions)>>,
    prefetch_count: Mutex<Option<u16>>,
    published: Mutex<Vec<PublishedMessage>>,
    listeners: Mutex<Vec<Arc<dyn ChannelConfirmListener>>>,
}

impl MemoryCluster {
    fn listeners(&self) -> Vec<Arc<dyn ChannelConfirmListener>> {
        lock(&self.listeners).clone()
    }
}

/// MemoryConnectionProvider simulates both broker clusters in process and
/// implements the ConnectionProvider trait.
/// SHOULD BE USED ONLY FOR TESTING PURPOSES
///
/// Every hook (`set_*`) and inspection method is keyed by cluster role.
/// Confirms are delivered to the listeners registered on the cluster's
/// channels with [`ack`](Self::ack) and [`nack`](Self::nack), or right after
/// each publish when auto-ack is on.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionProvider {
    clusters: Arc<DashMap<ClusterRole, Arc<MemoryCluster>>>,
}

impl MemoryConnectionProvider {
    pub fn new() -> Self {
        MemoryConnectionProvider::default()
    }

    fn cluster(&self, role: ClusterRole) -> Arc<MemoryCluster> {
        self.clusters
            .entry(role)
            .or_insert_with(|| Arc::new(MemoryCluster::default()))
            .value()
            .clone()
    }

    /// Makes every new connection to `role` fail.
    pub fn set_connect_failure(&self, role: ClusterRole, fail: bool) {
        self.cluster(role).fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes every channel creation on `role` fail.
    pub fn set_channel_failure(&self, role: ClusterRole, fail: bool) {
        self.cluster(role).fail_channel.store(fail, Ordering::SeqCst);
    }

    /// Makes every publish on `role` fail as if the channel was closed.
    pub fn set_publish_failure(&self, role: ClusterRole, fail: bool) {
        self.cluster(role).fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Acks every message on `role` as soon as it is published.
    pub fn set_auto_ack(&self, role: ClusterRole, auto_ack: bool) {
        self.cluster(role).auto_ack.store(auto_ack, Ordering::SeqCst);
    }

    /// Slows down connection setup on `role`.
    pub fn set_connect_delay(&self, role: ClusterRole, delay: Duration) {
        *lock(&self.cluster(role).connect_delay) = Some(delay);
    }

    /// Slows down every publish on `role`, before the write reaches the broker.
    pub fn set_publish_delay(&self, role: ClusterRole, delay: Duration) {
        *lock(&self.cluster(role).publish_delay) = Some(delay);
    }

    pub fn connections_opened(&self, role: ClusterRole) -> usize {
        self.cluster(role).connections_opened.load(Ordering::SeqCst)
    }

    pub fn published(&self, role: ClusterRole) -> Vec<PublishedMessage> {
        lock(&self.cluster(role).published).clone()
    }

    pub fn declared_queues(&self, role: ClusterRole) -> Vec<(String, QueueDeclareOptions)> {
        lock(&self.cluster(role).declared_queues).clone()
    }

    pub fn prefetch_count(&self, role: ClusterRole) -> Option<u16> {
        *lock(&self.cluster(role).prefetch_count)
    }

    pub fn listener_count(&self, role: ClusterRole) -> usize {
        lock(&self.cluster(role).listeners).len()
    }

    /// Delivers an ack from `role` to its confirm listeners.
    pub fn ack(&self, role: ClusterRole, sequence: u64, multiple: bool) {
        for listener in self.cluster(role).listeners() {
            listener.handle_ack(sequence, multiple);
        }
    }

    /// Delivers a nack from `role` to its confirm listeners.
    pub fn nack(&self, role: ClusterRole, sequence: u64, multiple: bool) {
        for listener in self.cluster(role).listeners() {
            listener.handle_nack(sequence, multiple);
        }
    }
}

#[async_trait]
impl ConnectionProvider for MemoryConnectionProvider {
    async fn create_connection(
        &self,
        role: ClusterRole,
        config: &ClusterConfig,
    ) -> TransportResult<Arc<dyn BrokerConnection>> {
        let cluster = self.cluster(role);

        let delay = *lock(&cluster.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        cluster.connections_opened.fetch_add(1, Ordering::SeqCst);

        if cluster.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connection(format!(
                "{} cluster at {} refused the connection",
                role,
                config.address(role)
            )));
        }

        Ok(Arc::new(MemoryConnection { cluster }))
    }
}

#[derive(Debug)]
struct MemoryConnection {
    cluster: Arc<MemoryCluster>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn create_channel(&self, channel_number: u16) -> TransportResult<Box<dyn BrokerChannel>> {
        if self.cluster.fail_channel.load(Ordering::SeqCst) {
            return Err(TransportError::Channel(format!(
                "unable to open channel {}",
                channel_number
            )));
        }

        Ok(Box::new(MemoryChannel {
            cluster: self.cluster.clone(),
            channel_number,
            confirm_mode: AtomicBool::new(false),
            next_sequence: AtomicU64::new(1),
        }))
    }
}

#[derive(Debug)]
struct MemoryChannel {
    cluster: Arc<MemoryCluster>,
    channel_number: u16,
    confirm_mode: AtomicBool,
    next_sequence: AtomicU64,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn queue_declare(&self, queue: &str, options: QueueDeclareOptions) -> TransportResult<()> {
        lock(&self.cluster.declared_queues).push((queue.to_string(), options));
        Ok(())
    }

    async fn basic_qos(&self, prefetch_count: u16) -> TransportResult<()> {
        *lock(&self.cluster.prefetch_count) = Some(prefetch_count);
        Ok(())
    }

    fn add_confirm_listener(&self, listener: Arc<dyn ChannelConfirmListener>) {
        lock(&self.cluster.listeners).push(listener);
    }

    async fn confirm_select(&self) -> TransportResult<()> {
        self.confirm_mode.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn next_publish_seq_no(&self) -> u64 {
        if self.confirm_mode.load(Ordering::SeqCst) {
            self.next_sequence.load(Ordering::SeqCst)
        } else {
            0
        }
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: BasicProperties,
        body: &[u8],
    ) -> TransportResult<()> {
        // let other publishing tasks run, as a real socket write would
        tokio::task::yield_now().await;

        let delay = *lock(&self.cluster.publish_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let sequence = if self.confirm_mode.load(Ordering::SeqCst) {
            self.next_sequence.fetch_add(1, Ordering::SeqCst)
        } else {
            0
        };

        if self.cluster.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed(format!(
                "channel {} closed by broker",
                self.channel_number
            )));
        }

        lock(&self.cluster.published).push(PublishedMessage {
            channel_number: self.channel_number,
            sequence,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            properties,
            body: body.to_vec(),
        });

        if sequence > 0 && self.cluster.auto_ack.load(Ordering::SeqCst) {
            for listener in self.cluster.listeners() {
                listener.handle_ack(sequence, false);
            }
        }

        Ok(())
    }
}
