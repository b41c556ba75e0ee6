//! Sync player - owner/follower state machine for one timeline object
//!
//! The owner mutates the snapshot, bumps its version, broadcasts it and
//! applies it to its own engine in the same call. Followers apply received
//! snapshots once per version and otherwise only re-derive a display time.
//!
//! Every operation is a silent no-op until the player is initialized, which
//! requires an attached engine. Out-of-range inputs are clamped.

use std::sync::Arc;

use lockstep_core::{NetworkTime, ObjectId, ReplicaId, ReplicaRole, SyncSnapshot, WrapMode};
use lockstep_time::{clamp_to_timeline, reached_end, reconcile, sanitize_duration, NetworkClock};
use tracing::{debug, info, trace};

use crate::{FreshnessPolicy, OwnershipArbiter, PlaybackEngine, ReplicationChannel};

/// Player configuration
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Display framerate handed to UI collaborators; unused by sync itself
    pub framerate: f64,
    /// Engine wrap mode while the snapshot is not looping
    pub base_wrap_mode: WrapMode,
    /// Snapshot freshness check for followers
    pub freshness: FreshnessPolicy,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            framerate: 60.0,
            base_wrap_mode: WrapMode::ClampAtEnd,
            freshness: FreshnessPolicy::Changed,
        }
    }
}

impl PlayerConfig {
    /// Strict followers: never step back to an older version
    pub fn strict() -> Self {
        PlayerConfig {
            freshness: FreshnessPolicy::Newer,
            ..PlayerConfig::default()
        }
    }
}

/// Per-replica, non-replicated apply state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LocalApplyState {
    /// Version of the last snapshot applied from the network
    pub last_applied_version: Option<u32>,
    /// An operator is scrubbing a local preview
    pub external_control: bool,
}

/// Result of handing a received snapshot to the player
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Engine re-seated from the new snapshot
    Applied,
    /// Same version as the last applied one
    Duplicate,
    /// Rejected by the freshness policy
    Stale,
    /// This replica owns the object; its own state is authoritative
    IgnoredAsOwner,
    /// No engine yet; the snapshot is held for start-up
    Uninitialized,
}

/// Synchronized player for one timeline object on one replica
pub struct SyncPlayer<E> {
    replica: ReplicaId,
    object: ObjectId,
    config: PlayerConfig,
    engine: Option<E>,
    clock: Arc<dyn NetworkClock>,
    arbiter: Arc<dyn OwnershipArbiter>,
    channel: Arc<dyn ReplicationChannel>,
    snapshot: SyncSnapshot,
    local: LocalApplyState,
    duration: f64,
    initialized: bool,
    /// A snapshot received before the engine was attached, not yet applied
    held: bool,
    display_time: f64,
}

impl<E: PlaybackEngine> SyncPlayer<E> {
    pub fn new(
        replica: ReplicaId,
        object: ObjectId,
        config: PlayerConfig,
        clock: Arc<dyn NetworkClock>,
        arbiter: Arc<dyn OwnershipArbiter>,
        channel: Arc<dyn ReplicationChannel>,
    ) -> Self {
        SyncPlayer {
            replica,
            object,
            config,
            engine: None,
            clock,
            arbiter,
            channel,
            snapshot: SyncSnapshot::new(),
            local: LocalApplyState::default(),
            duration: 0.0,
            initialized: false,
            held: false,
            display_time: 0.0,
        }
    }

    /// Attach the engine this player drives
    pub fn attach_engine(&mut self, engine: E) {
        self.engine = Some(engine);
    }

    /// Detach the engine; every operation becomes a no-op until reattached
    pub fn detach_engine(&mut self) -> Option<E> {
        self.engine.take()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica
    }

    pub fn object_id(&self) -> ObjectId {
        self.object
    }

    /// Initialize from the engine on first use. Returns whether the player
    /// is usable (initialized and engine present). A snapshot held from
    /// before the engine was attached is applied here.
    pub fn ensure_initialized(&mut self) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };
        if !self.initialized {
            self.duration = sanitize_duration(engine.duration());
            engine.set_wrap_mode(self.config.base_wrap_mode);
            self.initialized = true;

            debug!(
                object = %self.object,
                replica = %self.replica,
                duration = self.duration,
                "player initialized"
            );
        }
        if self.held {
            self.apply_held_snapshot();
        }
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current role, asked from the arbiter every time
    pub fn role(&self) -> ReplicaRole {
        ReplicaRole::from_ownership(self.arbiter.is_owner(self.replica, self.object))
    }

    pub fn is_owner(&self) -> bool {
        self.role().is_owner()
    }

    /// Bring the player up. An owner authors the initial snapshot (paused at
    /// zero); a follower seats its engine from whatever snapshot it holds,
    /// unless one was already applied from the network.
    pub fn start(&mut self) {
        if !self.ensure_initialized() {
            return;
        }

        let now = self.clock.now();
        if self.is_owner() {
            self.snapshot.set_anchor(now, 0.0);
            self.snapshot.is_playing = false;
            self.snapshot.is_loop = false;
            self.commit("start");
            self.apply_owner_state();
        } else if self.local.last_applied_version.is_none() {
            self.apply_snapshot_to_engine(now);
        }
        self.display_time = reconcile(&self.snapshot, self.duration, now);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Timeline length; 0 until an engine is available
    pub fn duration(&self) -> f64 {
        if self.initialized {
            self.duration
        } else {
            self.engine
                .as_ref()
                .map_or(0.0, |e| sanitize_duration(e.duration()))
        }
    }

    /// Engine cursor position, not the snapshot's
    pub fn current_time(&self) -> f64 {
        self.engine.as_ref().map_or(0.0, |e| e.time())
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot.is_playing
    }

    pub fn is_loop(&self) -> bool {
        self.snapshot.is_loop
    }

    pub fn framerate(&self) -> f64 {
        self.config.framerate
    }

    pub fn snapshot(&self) -> &SyncSnapshot {
        &self.snapshot
    }

    pub fn local_state(&self) -> LocalApplyState {
        self.local
    }

    /// Reconciled position as of the last tick, for progress displays
    pub fn display_time(&self) -> f64 {
        self.display_time
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Mutations (owner authority, requested on demand)
    // ------------------------------------------------------------------

    /// Freeze or resume at the engine's current position
    pub fn toggle_play_pause(&mut self) -> bool {
        if !self.ensure_initialized() {
            return false;
        }
        self.take_ownership();

        let current = clamp_to_timeline(self.current_time(), self.duration);
        let now = self.clock.now();

        self.snapshot.is_playing = !self.snapshot.is_playing;
        self.snapshot.set_anchor(now, current);
        self.commit(if self.snapshot.is_playing { "play" } else { "pause" });
        self.apply_owner_state();
        true
    }

    /// Pause and rewind to zero
    pub fn stop(&mut self) -> bool {
        if !self.ensure_initialized() {
            return false;
        }
        self.take_ownership();

        let now = self.clock.now();
        self.snapshot.is_playing = false;
        self.snapshot.set_anchor(now, 0.0);
        self.commit("stop");

        if let Some(engine) = self.engine.as_mut() {
            engine.pause();
            engine.set_time(0.0);
            engine.evaluate();
        }
        true
    }

    /// Flip looping; anchors are left alone
    pub fn toggle_loop(&mut self) -> bool {
        if !self.ensure_initialized() {
            return false;
        }
        self.take_ownership();

        self.snapshot.is_loop = !self.snapshot.is_loop;
        self.commit("toggle_loop");

        let mode = self.snapshot.wrap_mode(self.config.base_wrap_mode);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_wrap_mode(mode);
        }
        true
    }

    /// Move to `t` (clamped); play state is kept
    pub fn seek(&mut self, t: f64) -> bool {
        if !self.ensure_initialized() {
            return false;
        }
        self.take_ownership();

        let t = clamp_to_timeline(t, self.duration);
        let now = self.clock.now();
        self.snapshot.set_anchor(now, t);
        self.commit("seek");

        let run = self.snapshot.is_playing && !self.local.external_control;
        if let Some(engine) = self.engine.as_mut() {
            engine.set_time(t);
            engine.evaluate();
            if run {
                engine.play();
            } else {
                engine.pause();
            }
        }
        true
    }

    /// Re-broadcast under a new version so every follower re-applies
    pub fn resync(&mut self) -> bool {
        if !self.ensure_initialized() {
            return false;
        }
        self.take_ownership();

        self.commit("resync");
        // an operator preview in progress keeps the engine where it is
        if !self.local.external_control {
            let now = self.clock.now();
            self.apply_snapshot_to_engine(now);
        }
        true
    }

    /// Push the current snapshot unchanged for late joiners. Owner only;
    /// the version is not bumped, so replicas that already applied it ignore it.
    pub fn announce(&mut self) -> bool {
        if !self.ensure_initialized() || !self.is_owner() {
            return false;
        }
        self.channel
            .push_full_state(self.object, self.replica, &self.snapshot);
        info!(
            object = %self.object,
            replica = %self.replica,
            version = self.snapshot.version,
            "full state pushed"
        );
        true
    }

    // ------------------------------------------------------------------
    // External control overlay (local only, never replicated)
    // ------------------------------------------------------------------

    /// Suspend or restore automatic play/pause driving while an operator
    /// scrubs a preview. The snapshot is not touched.
    pub fn set_external_control(&mut self, active: bool) {
        self.local.external_control = active;

        if !self.ensure_initialized() {
            return;
        }

        if active {
            if let Some(engine) = self.engine.as_mut() {
                engine.pause();
                engine.evaluate();
            }
        } else if self.is_owner() {
            let playing = self.snapshot.is_playing;
            if let Some(engine) = self.engine.as_mut() {
                if playing {
                    engine.play();
                } else {
                    engine.pause();
                }
            }
        } else {
            // a follower rejoins the shared timeline where it should be now
            let now = self.clock.now();
            self.apply_snapshot_to_engine(now);
        }

        debug!(object = %self.object, replica = %self.replica, active, "external control");
    }

    /// Scrub the owner's engine to `t` (clamped) without committing it
    pub fn preview_local_time(&mut self, t: f64) -> bool {
        if !self.ensure_initialized() || !self.is_owner() {
            return false;
        }

        let t = clamp_to_timeline(t, self.duration);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_time(t);
            engine.evaluate();
        }
        true
    }

    // ------------------------------------------------------------------
    // Host loop entry points
    // ------------------------------------------------------------------

    /// Per-frame update. Re-derives the display time and, on the owner,
    /// performs the automatic end-of-timeline pause.
    pub fn tick(&mut self, now: NetworkTime) {
        if !self.ensure_initialized() {
            return;
        }

        self.display_time = reconcile(&self.snapshot, self.duration, now);
        trace!(object = %self.object, time = self.display_time, "tick");

        if !self.is_owner() || !reached_end(&self.snapshot, self.duration, now) {
            return;
        }

        let duration = self.duration;
        self.snapshot.is_playing = false;
        self.snapshot.set_anchor(now, duration);
        self.commit("end_of_timeline");

        if let Some(engine) = self.engine.as_mut() {
            engine.pause();
            engine.set_time(duration);
            engine.evaluate();
        }
        self.display_time = duration;

        info!(
            object = %self.object,
            replica = %self.replica,
            version = self.snapshot.version,
            "reached end of timeline, paused"
        );
    }

    /// Inbound replication. Applies `snapshot` when it passes the freshness
    /// check; duplicates and stale versions cause no engine calls.
    pub fn on_snapshot_received(&mut self, snapshot: &SyncSnapshot, now: NetworkTime) -> ApplyOutcome {
        if !self.ensure_initialized() {
            if self
                .config
                .freshness
                .accepts(self.local.last_applied_version, snapshot.version)
            {
                self.snapshot = *snapshot;
                self.held = true;
            }
            return ApplyOutcome::Uninitialized;
        }

        if self.is_owner() {
            return ApplyOutcome::IgnoredAsOwner;
        }

        let last = self.local.last_applied_version;
        if last == Some(snapshot.version) {
            trace!(object = %self.object, version = snapshot.version, "duplicate snapshot ignored");
            return ApplyOutcome::Duplicate;
        }
        if !self.config.freshness.accepts(last, snapshot.version) {
            debug!(
                object = %self.object,
                version = snapshot.version,
                last_applied = ?last,
                "stale snapshot ignored"
            );
            return ApplyOutcome::Stale;
        }

        self.snapshot = *snapshot;
        self.local.last_applied_version = Some(snapshot.version);
        self.apply_snapshot_to_engine(now);
        self.display_time = reconcile(&self.snapshot, self.duration, now);

        debug!(
            object = %self.object,
            replica = %self.replica,
            version = snapshot.version,
            playing = snapshot.is_playing,
            time = self.display_time,
            "snapshot applied"
        );
        ApplyOutcome::Applied
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn take_ownership(&mut self) {
        if self.arbiter.is_owner(self.replica, self.object) {
            return;
        }
        self.arbiter.request_ownership(self.replica, self.object);
        if self.arbiter.is_owner(self.replica, self.object) {
            info!(object = %self.object, replica = %self.replica, "ownership acquired");
        }
    }

    /// Bump the version and broadcast
    fn commit(&mut self, op: &'static str) {
        let version = self.snapshot.bump_version();
        self.channel.broadcast(self.object, self.replica, &self.snapshot);
        debug!(
            object = %self.object,
            replica = %self.replica,
            version,
            op,
            playing = self.snapshot.is_playing,
            looping = self.snapshot.is_loop,
            anchor = self.snapshot.anchor_timeline_time,
            "snapshot committed"
        );
    }

    /// Owner-side apply: the engine keeps its own cursor while running,
    /// and is parked exactly on the anchor otherwise.
    fn apply_owner_state(&mut self) {
        let mode = self.snapshot.wrap_mode(self.config.base_wrap_mode);
        let run = self.snapshot.is_playing && !self.local.external_control;
        let anchor = self.snapshot.anchor_timeline_time;

        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.set_wrap_mode(mode);
        if run {
            engine.play();
        } else {
            engine.pause();
            engine.set_time(anchor);
            engine.evaluate();
        }
    }

    /// Apply the snapshot received while uninitialized and record its
    /// version, so a redelivery counts as a duplicate
    fn apply_held_snapshot(&mut self) {
        self.held = false;
        if self.is_owner() {
            return;
        }

        let now = self.clock.now();
        self.local.last_applied_version = Some(self.snapshot.version);
        self.apply_snapshot_to_engine(now);
        self.display_time = reconcile(&self.snapshot, self.duration, now);

        debug!(
            object = %self.object,
            replica = %self.replica,
            version = self.snapshot.version,
            time = self.display_time,
            "held snapshot applied"
        );
    }

    /// Follower-side apply: seat the engine at the reconciled position
    fn apply_snapshot_to_engine(&mut self, now: NetworkTime) {
        let mode = self.snapshot.wrap_mode(self.config.base_wrap_mode);
        let run = self.snapshot.is_playing && !self.local.external_control;
        let t = reconcile(&self.snapshot, self.duration, now);

        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.set_wrap_mode(mode);
        engine.set_time(t);
        engine.evaluate();
        if run {
            engine.play();
        } else {
            engine.pause();
        }
    }
}
