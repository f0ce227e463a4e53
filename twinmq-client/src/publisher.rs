use crate::{
    channel_manager::{ChannelManager, ChannelState, PublishingChannel},
    confirm_ledger::ConfirmLedger,
    errors::{Result, TwinError},
    transport::{ConfirmListener, ConnectionProvider},
};

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use twinmq_core::{ClusterConfig, ClusterRole, PendingMessage};

/// Publishes messages to one of two broker clusters and tracks every message
/// until the broker confirms it.
///
/// The primary cluster is used whenever it is enabled, the secondary only
/// when the primary is disabled. The choice is made again on every publish;
/// there is no stickiness and no load splitting.
///
/// Confirms are not awaited by [`Publisher::publish`]. They arrive on the
/// injected [`ConfirmListener`] tagged with the cluster role, which settles
/// entries through the [`ConfirmLedger`] returned by [`Publisher::ledger`].
/// The ledger belongs to this publisher until it is dropped.
#[derive(Debug)]
pub struct Publisher {
    app_id: String,
    queue: String,
    config: Arc<ClusterConfig>,
    channels: ChannelManager,
    ledger: Arc<ConfirmLedger>,
    confirm_listener: Arc<dyn ConfirmListener>,
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.ledger.detach();
    }
}

/// Outcome of a successful publish: which cluster got the message and the
/// channel sequence number the broker will confirm it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub role: ClusterRole,
    pub sequence: u64,
}

impl Publisher {
    /// Initializes a new `PublisherBuilder` instance.
    pub fn builder() -> PublisherBuilder {
        PublisherBuilder::default()
    }

    /// Picks the cluster a message goes to: primary when enabled, otherwise
    /// secondary, and an error when neither is.
    pub fn select_role(config: &ClusterConfig) -> Result<ClusterRole> {
        if config.primary_enabled {
            Ok(ClusterRole::Primary)
        } else if config.secondary_enabled {
            Ok(ClusterRole::Secondary)
        } else {
            Err(TwinError::NoClusterEnabled)
        }
    }

    /// Sends a message to the queue on the selected cluster.
    ///
    /// The message is recorded in the confirm ledger under the channel's next
    /// sequence number before it is written, and carries
    /// `message-id = client_message_id`, `correlation-id = message_id` and the
    /// cluster role tag as its `type`. Returns once the write returns.
    ///
    /// # Returns
    ///
    /// - `Ok(PublishReceipt)`: the cluster used and the sequence number recorded.
    /// - `Err(TwinError::NoClusterEnabled)`: both clusters are disabled; nothing was recorded or sent.
    /// - `Err(TwinError::Initialization)`: the channel for the selected cluster could not be created.
    /// - `Err(TwinError::Publish)`: the write failed; the ledger entry has already been removed.
    /// - `Err(TwinError::DuplicateSequence)`: the ledger already holds the sequence; nothing was sent.
    pub async fn publish(
        &self,
        body: impl Into<Vec<u8>>,
        client_message_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Result<PublishReceipt> {
        let role = Self::select_role(&self.config)?;
        let channel = self.channels.get_channel(role).await?;

        let message = PendingMessage::new(
            self.queue.clone(),
            message_id,
            client_message_id,
            body.into(),
            role,
        );
        debug!(app_id = %self.app_id, cluster = %role, message = %message, "publishing message");

        let sequence = channel.publish(&self.ledger, message).await?;

        Ok(PublishReceipt { role, sequence })
    }

    /// Returns the channel for `role`, creating it if needed.
    pub async fn channel(&self, role: ClusterRole) -> Result<Arc<PublishingChannel>> {
        self.channels.get_channel(role).await
    }

    pub fn channel_state(&self, role: ClusterRole) -> ChannelState {
        self.channels.state(role)
    }

    /// The ledger of published, not yet confirmed messages.
    pub fn ledger(&self) -> Arc<ConfirmLedger> {
        self.ledger.clone()
    }

    pub fn confirm_listener(&self) -> Arc<dyn ConfirmListener> {
        self.confirm_listener.clone()
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

/// A builder for configuring and creating a `Publisher` instance.
///
/// The connection provider, confirm listener, cluster config and queue are
/// required. When no ledger is supplied the publisher creates its own; pass
/// one in when the confirm listener has to be built before the publisher.
/// A ledger serves one publisher at a time, so a ledger still attached to a
/// live publisher is rejected by `build`.
#[derive(Debug, Default)]
pub struct PublisherBuilder {
    app_id: Option<String>,
    queue: Option<String>,
    config: Option<ClusterConfig>,
    provider: Option<Arc<dyn ConnectionProvider>>,
    confirm_listener: Option<Arc<dyn ConfirmListener>>,
    ledger: Option<Arc<ConfirmLedger>>,
    options: PublisherOptions,
}

impl PublisherBuilder {
    /// Sets the application id, used to name the publisher in logs.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Sets the business code, which is the name of the queue messages are sent to. This is a required field.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_config(mut self, config: ClusterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads the cluster configuration from a YAML file.
    pub fn with_config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = Some(ClusterConfig::from_file(path)?);
        Ok(self)
    }

    pub fn with_connection_provider(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_confirm_listener(mut self, listener: Arc<dyn ConfirmListener>) -> Self {
        self.confirm_listener = Some(listener);
        self
    }

    /// Sets the ledger the publisher records into. It must not be in use by
    /// another publisher.
    pub fn with_ledger(mut self, ledger: Arc<ConfirmLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_options(mut self, options: PublisherOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates the `Publisher`.
    ///
    /// Unless lazy channels were requested, the channel of every enabled
    /// cluster is created here and any failure aborts the build: an enabled
    /// cluster that can't be reached must not silently stop receiving messages.
    pub async fn build(self) -> Result<Publisher> {
        let queue = self
            .queue
            .ok_or_else(|| TwinError::Builder("queue is required to build a Publisher".into()))?;
        let config = self.config.ok_or_else(|| {
            TwinError::Builder("cluster config is required to build a Publisher".into())
        })?;
        let provider = self.provider.ok_or_else(|| {
            TwinError::Builder("connection provider is required to build a Publisher".into())
        })?;
        let confirm_listener = self.confirm_listener.ok_or_else(|| {
            TwinError::Builder("confirm listener is required to build a Publisher".into())
        })?;
        let app_id = self.app_id.unwrap_or_else(|| queue.clone());
        let ledger = self.ledger.unwrap_or_default();

        if !ledger.attach() {
            return Err(TwinError::Builder(
                "the confirm ledger is already in use by another Publisher".into(),
            ));
        }

        let config = Arc::new(config);
        let channels = ChannelManager::new(
            config.clone(),
            provider,
            confirm_listener.clone(),
            queue.clone(),
            self.options.clone(),
        );

        // from here on dropping the publisher releases the ledger
        let publisher = Publisher {
            app_id,
            queue,
            config,
            channels,
            ledger,
            confirm_listener,
        };

        if self.options.eager_init {
            publisher.channels.init_enabled().await?;
        }

        info!(
            app_id = %publisher.app_id,
            queue = %publisher.queue,
            primary_enabled = publisher.config.primary_enabled,
            secondary_enabled = publisher.config.secondary_enabled,
            "publisher ready"
        );

        Ok(publisher)
    }
}

/// Configuration options for publishers
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    // create the channels of the enabled clusters while building the publisher
    pub eager_init: bool,
    // channel number requested on every new connection
    pub channel_number: u16,
    // QoS prefetch count set on every channel
    pub prefetch_count: u16,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        PublisherOptions {
            eager_init: true,
            channel_number: 20,
            prefetch_count: 1,
        }
    }
}

impl PublisherOptions {
    /// Options that defer channel creation to the first publish on each cluster.
    pub fn lazy() -> Self {
        PublisherOptions {
            eager_init: false,
            ..Default::default()
        }
    }
}
