//! Replication channel contract
//!
//! Replication is fire-and-forget. The channel decides how (and whether)
//! snapshots reach other replicas; the core only guards against duplicates
//! through version freshness.

use lockstep_core::{ObjectId, ReplicaId, SyncSnapshot};
use parking_lot::Mutex;

/// Outbound side of snapshot replication
pub trait ReplicationChannel: Send + Sync {
    /// Broadcast a freshly mutated snapshot to every replica
    fn broadcast(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot);

    /// Resend the current snapshot unchanged for replicas that just joined
    fn push_full_state(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot) {
        self.broadcast(object, sender, snapshot);
    }
}

impl<T: ReplicationChannel + ?Sized> ReplicationChannel for std::sync::Arc<T> {
    fn broadcast(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot) {
        (**self).broadcast(object, sender, snapshot)
    }

    fn push_full_state(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot) {
        (**self).push_full_state(object, sender, snapshot)
    }
}

/// Kind of outbound send recorded by [`RecordingChannel`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendKind {
    Broadcast,
    FullState,
}

/// One recorded send
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SentSnapshot {
    pub kind: SendKind,
    pub object: ObjectId,
    pub sender: ReplicaId,
    pub snapshot: SyncSnapshot,
}

/// Channel that keeps every send in memory, for hosts that forward
/// snapshots themselves and for tests.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentSnapshot>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        RecordingChannel::default()
    }

    /// Take every recorded send, oldest first
    pub fn drain(&self) -> Vec<SentSnapshot> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    pub fn last(&self) -> Option<SentSnapshot> {
        self.sent.lock().last().copied()
    }
}

impl ReplicationChannel for RecordingChannel {
    fn broadcast(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot) {
        self.sent.lock().push(SentSnapshot {
            kind: SendKind::Broadcast,
            object,
            sender,
            snapshot: *snapshot,
        });
    }

    fn push_full_state(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot) {
        self.sent.lock().push(SentSnapshot {
            kind: SendKind::FullState,
            object,
            sender,
            snapshot: *snapshot,
        });
    }
}
