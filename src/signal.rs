use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Record;

const CHANNEL_CAPACITY: usize = 256;

/// Per-resource broadcast of committed records. This is the outbound hook a
/// notification collaborator subscribes to for promotions and approvals.
/// Fire-and-forget: delivery problems never affect the mutation that
/// produced the record.
pub struct SignalHub {
    channels: DashMap<Ulid, broadcast::Sender<Record>>,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to committed records for a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<Record> {
        let sender = self
            .channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a record. No-op if nobody is listening.
    pub fn send(&self, resource_id: Ulid, record: &Record) {
        if let Some(sender) = self.channels.get(&resource_id) {
            let _ = sender.send(record.clone());
        }
    }

    /// Remove a channel (e.g. when a resource is deleted).
    pub fn remove(&self, resource_id: &Ulid) {
        self.channels.remove(resource_id);
    }
}
