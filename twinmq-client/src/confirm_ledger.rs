use crate::{
    client_metrics::{CONFIRMS_RESOLVED_TOTAL, LEDGER_OUTSTANDING},
    errors::{Result, TwinError},
};

use metrics::{counter, gauge};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use twinmq_core::{ClusterRole, PendingMessage};

/// Ordered record of the messages put on the wire and not yet confirmed.
///
/// Sequence numbers are only unique within one channel, so entries are keyed
/// by the cluster role of the channel and the sequence number it assigned.
/// A confirm from one cluster never settles an entry of the other.
///
/// Written by the publishing tasks and scanned/drained by the confirm
/// listener on transport threads, so every access goes through one lock.
/// The inspection methods return point-in-time views only.
///
/// A ledger belongs to a single publisher; the builder refuses a ledger
/// that is already attached to another live publisher.
#[derive(Debug, Default)]
pub struct ConfirmLedger {
    entries: Mutex<BTreeMap<(ClusterRole, u64), PendingMessage>>,
    attached: AtomicBool,
}

impl ConfirmLedger {
    pub fn new() -> Self {
        ConfirmLedger::default()
    }

    // a panic while holding the lock can't leave the map half-updated
    fn entries(&self) -> MutexGuard<'_, BTreeMap<(ClusterRole, u64), PendingMessage>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the ledger as owned by a publisher. Returns false if it already is.
    pub(crate) fn attach(&self) -> bool {
        self.attached
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    /// Whether a live publisher currently owns this ledger.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Records a pending message under the `role` channel's `sequence`.
    ///
    /// Sequence numbers must never collide within a channel: an existing
    /// entry is kept and the call fails with [`TwinError::DuplicateSequence`].
    pub fn record(&self, role: ClusterRole, sequence: u64, message: PendingMessage) -> Result<()> {
        let queue = message.queue.clone();
        {
            let mut entries = self.entries();
            if entries.contains_key(&(role, sequence)) {
                return Err(TwinError::DuplicateSequence { role, sequence });
            }
            entries.insert((role, sequence), message);
        }
        gauge!(LEDGER_OUTSTANDING.name, "cluster" => role.tag(), "queue" => queue).increment(1.0);
        Ok(())
    }

    /// Settles the entries of the `role` channel covered by a broker confirm.
    ///
    /// With `multiple` set every entry of that channel `<= sequence` is
    /// removed, otherwise only the exact match. Removed entries are returned
    /// in ascending order; an empty result means a late or duplicate
    /// confirmation.
    pub fn resolve_up_to(
        &self,
        role: ClusterRole,
        sequence: u64,
        multiple: bool,
    ) -> Vec<(u64, PendingMessage)> {
        let settled: Vec<(u64, PendingMessage)> = {
            let mut entries = self.entries();
            if multiple {
                let keys: Vec<(ClusterRole, u64)> = entries
                    .range((role, 0)..=(role, sequence))
                    .map(|(key, _)| *key)
                    .collect();
                keys.into_iter()
                    .filter_map(|key| entries.remove(&key).map(|message| (key.1, message)))
                    .collect()
            } else {
                entries
                    .remove(&(role, sequence))
                    .map(|message| (sequence, message))
                    .into_iter()
                    .collect()
            }
        };

        if settled.is_empty() {
            debug!(
                cluster = %role,
                sequence,
                multiple, "late or duplicate confirmation, nothing left to settle"
            );
        } else {
            for (_, message) in &settled {
                gauge!(LEDGER_OUTSTANDING.name, "cluster" => role.tag(), "queue" => message.queue.clone())
                    .decrement(1.0);
            }
            counter!(CONFIRMS_RESOLVED_TOTAL.name, "cluster" => role.tag())
                .increment(settled.len() as u64);
        }

        settled
    }

    /// Removes a single entry, returning it if it was present.
    pub fn remove(&self, role: ClusterRole, sequence: u64) -> Option<PendingMessage> {
        let removed = self.entries().remove(&(role, sequence));
        if let Some(message) = &removed {
            gauge!(LEDGER_OUTSTANDING.name, "cluster" => role.tag(), "queue" => message.queue.clone())
                .decrement(1.0);
        }
        removed
    }

    pub fn get(&self, role: ClusterRole, sequence: u64) -> Option<PendingMessage> {
        self.entries().get(&(role, sequence)).cloned()
    }

    pub fn contains(&self, role: ClusterRole, sequence: u64) -> bool {
        self.entries().contains_key(&(role, sequence))
    }

    /// Number of outstanding (unconfirmed) messages across both channels.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Number of outstanding messages published on the `role` channel.
    pub fn outstanding(&self, role: ClusterRole) -> usize {
        self.entries()
            .range((role, 0)..=(role, u64::MAX))
            .count()
    }

    /// Lowest outstanding sequence number of the `role` channel.
    pub fn first_sequence(&self, role: ClusterRole) -> Option<u64> {
        self.entries()
            .range((role, 0)..=(role, u64::MAX))
            .next()
            .map(|((_, seq), _)| *seq)
    }

    /// Outstanding sequence numbers of the `role` channel in ascending order.
    pub fn sequences(&self, role: ClusterRole) -> Vec<u64> {
        self.entries()
            .range((role, 0)..=(role, u64::MAX))
            .map(|((_, seq), _)| *seq)
            .collect()
    }
}
