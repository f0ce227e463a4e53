#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use twinmq_client::{
    ClusterConfig, ClusterRole, ConfirmLedger, ConfirmListener, MemoryConnectionProvider,
    PendingMessage, Publisher, PublisherOptions,
};

pub const QUEUE: &str = "order-created";

pub fn cluster_config(primary_enabled: bool, secondary_enabled: bool) -> ClusterConfig {
    ClusterConfig {
        primary_address: "amqp://10.0.0.1:5672".to_string(),
        secondary_address: "amqp://10.0.0.2:5672".to_string(),
        username: "publisher".to_string(),
        password: "publisher".to_string(),
        virtual_host: "/".to_string(),
        worker_threads: 2,
        primary_enabled,
        secondary_enabled,
    }
}

/// Confirm listener that settles the ledger and remembers what it saw.
#[derive(Debug)]
pub struct RecordingListener {
    ledger: Arc<ConfirmLedger>,
    pub acked: Mutex<Vec<(u64, PendingMessage)>>,
    pub nacked: Mutex<Vec<(u64, PendingMessage)>>,
}

impl RecordingListener {
    pub fn new(ledger: Arc<ConfirmLedger>) -> Self {
        RecordingListener {
            ledger,
            acked: Mutex::new(Vec::new()),
            nacked: Mutex::new(Vec::new()),
        }
    }

    pub fn acked_sequences(&self) -> Vec<u64> {
        self.acked.lock().unwrap().iter().map(|(seq, _)| *seq).collect()
    }

    pub fn nacked_sequences(&self) -> Vec<u64> {
        self.nacked.lock().unwrap().iter().map(|(seq, _)| *seq).collect()
    }
}

impl ConfirmListener for RecordingListener {
    fn handle_ack(&self, role: ClusterRole, sequence: u64, multiple: bool) {
        let settled = self.ledger.resolve_up_to(role, sequence, multiple);
        self.acked.lock().unwrap().extend(settled);
    }

    fn handle_nack(&self, role: ClusterRole, sequence: u64, multiple: bool) {
        let settled = self.ledger.resolve_up_to(role, sequence, multiple);
        self.nacked.lock().unwrap().extend(settled);
    }
}

pub struct Fixture {
    pub provider: MemoryConnectionProvider,
    pub ledger: Arc<ConfirmLedger>,
    pub listener: Arc<RecordingListener>,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture::with_provider(MemoryConnectionProvider::new())
    }

    /// A fixture with its own ledger and listener on an existing set of clusters.
    pub fn with_provider(provider: MemoryConnectionProvider) -> Self {
        let ledger = Arc::new(ConfirmLedger::new());
        let listener = Arc::new(RecordingListener::new(ledger.clone()));
        Fixture {
            provider,
            ledger,
            listener,
        }
    }

    pub async fn publisher(
        &self,
        config: ClusterConfig,
        options: PublisherOptions,
    ) -> twinmq_client::errors::Result<Publisher> {
        Publisher::builder()
            .with_app_id("trading")
            .with_queue(QUEUE)
            .with_config(config)
            .with_connection_provider(Arc::new(self.provider.clone()))
            .with_confirm_listener(self.listener.clone())
            .with_ledger(self.ledger.clone())
            .with_options(options)
            .build()
            .await
    }
}
