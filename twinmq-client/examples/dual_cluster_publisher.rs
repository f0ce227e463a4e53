use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use twinmq_client::{
    ClusterConfig, ClusterRole, ConfirmLedger, ConfirmListener, MemoryConnectionProvider,
    Publisher,
};

/// Settles the ledger on every confirm and reports rejected messages.
#[derive(Debug)]
struct LoggingListener {
    ledger: Arc<ConfirmLedger>,
}

impl LoggingListener {
    fn new() -> Arc<Self> {
        Arc::new(LoggingListener {
            ledger: Arc::new(ConfirmLedger::new()),
        })
    }
}

impl ConfirmListener for LoggingListener {
    fn handle_ack(&self, role: ClusterRole, sequence: u64, multiple: bool) {
        for (seq, message) in self.ledger.resolve_up_to(role, sequence, multiple) {
            info!(cluster = %role, seq, msg_id = %message.message_id, "confirmed");
        }
    }

    fn handle_nack(&self, role: ClusterRole, sequence: u64, multiple: bool) {
        for (seq, message) in self.ledger.resolve_up_to(role, sequence, multiple) {
            warn!(cluster = %role, seq, msg_id = %message.message_id, "rejected by broker");
        }
    }
}

/// Publishes a few messages against the in-memory clusters, then fails the
/// primary over to the secondary by switching the enable flags.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,twinmq_client=debug")
        .init();

    let config = ClusterConfig::from_yaml(
        r#"
primary:
  address: "amqp://127.0.0.1:5672"
  enabled: true
secondary:
  address: "amqp://127.0.0.1:5673"
  enabled: false
credentials:
  username: "guest"
  password: "guest"
virtual_host: "/"
worker_threads: 2
"#,
    )?;

    let provider = MemoryConnectionProvider::new();
    let listener = LoggingListener::new();

    let publisher = Publisher::builder()
        .with_app_id("trading")
        .with_queue("order-created")
        .with_config(config.clone())
        .with_connection_provider(Arc::new(provider.clone()))
        .with_confirm_listener(listener.clone())
        .with_ledger(listener.ledger.clone())
        .build()
        .await?;

    for i in 1..=5 {
        let receipt = publisher
            .publish(format!("order #{}", i), format!("biz-{}", i), format!("msg-{}", i))
            .await?;
        info!(cluster = %receipt.role, seq = receipt.sequence, "sent");
    }
    info!(outstanding = listener.ledger.len(), "before confirms");

    // the broker confirms the first four in one go, rejects the fifth
    provider.ack(ClusterRole::Primary, 4, true);
    provider.nack(ClusterRole::Primary, 5, false);
    info!(outstanding = listener.ledger.len(), "after confirms");

    sleep(Duration::from_millis(100)).await;

    let failover = ClusterConfig {
        primary_enabled: false,
        secondary_enabled: true,
        ..config
    };
    // the standby publisher records into its own ledger
    let standby_listener = LoggingListener::new();
    let standby = Publisher::builder()
        .with_app_id("trading")
        .with_queue("order-created")
        .with_config(failover)
        .with_connection_provider(Arc::new(provider.clone()))
        .with_confirm_listener(standby_listener.clone())
        .with_ledger(standby_listener.ledger.clone())
        .build()
        .await?;

    provider.set_auto_ack(ClusterRole::Secondary, true);
    let receipt = standby.publish("order #6", "biz-6", "msg-6").await?;
    info!(
        cluster = %receipt.role,
        seq = receipt.sequence,
        outstanding = standby_listener.ledger.len(),
        "sent after failover"
    );

    Ok(())
}
