//! Replica - one host's view of a synchronized timeline object
//!
//! Wires a [`SyncPlayer`] to the wire format: snapshots the player commits
//! are encoded into an outbound queue, datagrams handed to [`Replica::ingest`]
//! are decoded into an inbound queue, and [`Replica::tick`] drains the inbound
//! queue before running the player's own per-frame update.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use lockstep_core::{LockstepResult, ObjectId, ReplicaId, SyncSnapshot};
use lockstep_state::{
    ApplyOutcome, OwnershipArbiter, PlaybackEngine, ReplicationChannel, SyncPlayer,
};
use lockstep_time::NetworkClock;
use lockstep_wire::{FrameKind, SyncFrame};

use crate::ReplicaConfig;

#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub ticks: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    pub frames_dropped: u64,
    pub decode_failures: u64,
    pub foreign_frames: u64,
    pub snapshots_applied: u64,
    pub duplicates_ignored: u64,
    pub stale_ignored: u64,
    pub join_requests_served: u64,
    pub last_tick_duration: Duration,
}

/// Replication channel that encodes every send into a bounded queue of
/// datagrams. The oldest datagram is dropped when the queue is full.
#[derive(Debug)]
pub struct FrameOutbox {
    queue: Mutex<VecDeque<Bytes>>,
    capacity: usize,
}

impl FrameOutbox {
    pub fn new(capacity: usize) -> Self {
        FrameOutbox {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, frame: &SyncFrame) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            warn!(
                object = %frame.object_id,
                capacity = self.capacity,
                "outbound queue full, dropped oldest frame"
            );
        }
        queue.push_back(frame.encode());
    }

    pub fn pop(&self) -> Option<Bytes> {
        self.queue.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<Bytes> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl ReplicationChannel for FrameOutbox {
    fn broadcast(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot) {
        self.push(&SyncFrame::snapshot(object, sender, *snapshot));
    }

    fn push_full_state(&self, object: ObjectId, sender: ReplicaId, snapshot: &SyncSnapshot) {
        self.push(&SyncFrame::full_state(object, sender, *snapshot));
    }
}

/// One replica of one timeline object
pub struct Replica<E> {
    id: ReplicaId,
    object: ObjectId,
    config: ReplicaConfig,
    player: SyncPlayer<E>,
    outbox: Arc<FrameOutbox>,
    clock: Arc<dyn NetworkClock>,
    incoming: VecDeque<SyncFrame>,
    stats: RuntimeStats,
}

impl<E: PlaybackEngine> Replica<E> {
    pub fn new(
        id: ReplicaId,
        object: ObjectId,
        config: ReplicaConfig,
        clock: Arc<dyn NetworkClock>,
        arbiter: Arc<dyn OwnershipArbiter>,
    ) -> Self {
        let outbox = Arc::new(FrameOutbox::new(config.max_outbound_buffer));
        let player = SyncPlayer::new(
            id,
            object,
            config.player.clone(),
            Arc::clone(&clock),
            arbiter,
            outbox.clone(),
        );

        Replica {
            id,
            object,
            config,
            player,
            outbox,
            clock,
            incoming: VecDeque::new(),
            stats: RuntimeStats::default(),
        }
    }

    pub fn attach_engine(&mut self, engine: E) {
        self.player.attach_engine(engine);
    }

    /// Start the player. A replica that does not own the object also asks
    /// the owner for the current state.
    pub fn start(&mut self) {
        self.player.start();
        if !self.player.is_owner() {
            self.outbox
                .push(&SyncFrame::join_request(self.object, self.id));
            info!(object = %self.object, replica = %self.id, "join request queued");
        }
    }

    /// Decode one datagram and queue it for the next tick
    pub fn ingest(&mut self, data: &[u8]) -> LockstepResult<()> {
        match SyncFrame::parse(data) {
            Ok(frame) => {
                self.ingest_frame(frame);
                Ok(())
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                Err(e)
            }
        }
    }

    /// Queue an already decoded frame. Frames beyond the inbound limit are dropped.
    pub fn ingest_frame(&mut self, frame: SyncFrame) {
        if self.incoming.len() >= self.config.max_inbound_buffer {
            self.stats.frames_dropped += 1;
            debug!(object = %self.object, "inbound queue full, frame dropped");
            return;
        }
        self.incoming.push_back(frame);
        self.stats.frames_in += 1;
    }

    /// Next encoded datagram to send, if any
    pub fn pop_outgoing(&mut self) -> Option<Bytes> {
        let bytes = self.outbox.pop();
        if bytes.is_some() {
            self.stats.frames_out += 1;
        }
        bytes
    }

    pub fn drain_outgoing(&mut self) -> Vec<Bytes> {
        let frames = self.outbox.drain();
        self.stats.frames_out += frames.len() as u64;
        frames
    }

    /// Process queued frames, then run the player's per-frame update
    pub fn tick(&mut self) {
        let start = Instant::now();
        self.stats.ticks += 1;

        let now = self.clock.now();

        while let Some(frame) = self.incoming.pop_front() {
            if frame.object_id != self.object || frame.sender == self.id {
                self.stats.foreign_frames += 1;
                continue;
            }

            match frame.kind {
                FrameKind::Snapshot | FrameKind::FullState => {
                    match self.player.on_snapshot_received(&frame.snapshot, now) {
                        ApplyOutcome::Applied => self.stats.snapshots_applied += 1,
                        ApplyOutcome::Duplicate => self.stats.duplicates_ignored += 1,
                        ApplyOutcome::Stale => self.stats.stale_ignored += 1,
                        ApplyOutcome::IgnoredAsOwner | ApplyOutcome::Uninitialized => {}
                    }
                }
                FrameKind::JoinRequest => {
                    if self.player.announce() {
                        self.stats.join_requests_served += 1;
                        debug!(
                            object = %self.object,
                            joiner = %frame.sender,
                            "answered join request"
                        );
                    }
                }
            }
        }

        self.player.tick(now);
        self.stats.last_tick_duration = start.elapsed();
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn object_id(&self) -> ObjectId {
        self.object
    }

    pub fn player(&self) -> &SyncPlayer<E> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut SyncPlayer<E> {
        &mut self.player
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }
}
