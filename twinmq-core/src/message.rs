use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cluster::ClusterRole;

// PendingMessage is what the confirm ledger keeps for every message put on the wire
// and not yet settled by the broker. A confirm listener uses it to tell which
// message an ack or nack refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    // the queue the message was routed to
    pub queue: String,
    // message id assigned by the caller's messaging service, sent as the correlation id
    pub message_id: String,
    // id assigned by the business client, sent as the message-id property
    pub client_message_id: String,
    // the actual payload of the message
    pub body: Vec<u8>,
    // the cluster the message was routed to
    pub role: ClusterRole,
    // timestamp (ms since epoch) taken right before the message was recorded
    pub published_at: u64,
}

impl PendingMessage {
    pub fn new(
        queue: impl Into<String>,
        message_id: impl Into<String>,
        client_message_id: impl Into<String>,
        body: Vec<u8>,
        role: ClusterRole,
    ) -> Self {
        let published_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        PendingMessage {
            queue: queue.into(),
            message_id: message_id.into(),
            client_message_id: client_message_id.into(),
            body,
            role,
            published_at,
        }
    }

    /// The correlation id the message was published with.
    pub fn correlation_id(&self) -> &str {
        &self.message_id
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// The properties this message is sent with.
    pub fn properties(&self) -> BasicProperties {
        BasicProperties {
            message_id: Some(self.client_message_id.clone()),
            correlation_id: Some(self.message_id.clone()),
            kind: Some(self.role.tag().to_string()),
        }
    }
}

impl Display for PendingMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queue:_{}_msg:_{}_client_msg:_{}_cluster:_{}",
            self.queue, self.message_id, self.client_message_id, self.role,
        )
    }
}

/// Message properties put on the wire with every publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicProperties {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    /// The `type` property, carries the cluster role tag
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Flags used when declaring the single target queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDeclareOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl Default for QueueDeclareOptions {
    // durable, shared and kept around when the last consumer leaves
    fn default() -> Self {
        QueueDeclareOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}
