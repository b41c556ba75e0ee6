//! Sync simulator - a group of replicas over chaos links
//!
//! All replicas share one simulated network clock (each may read it with a
//! skew) and one ownership arbiter. Every [`SyncSimulator::step`]:
//! 1. Advances shared time and every running engine
//! 2. Delivers datagrams that are due on each link
//! 3. Ticks every connected replica
//! 4. Sends each replica's outbound datagrams to every other replica

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lockstep_core::{NetworkTime, ObjectId, ReplicaId};
use lockstep_runtime::{Replica, ReplicaConfig};
use lockstep_state::{LocalArbiter, SyncPlayer};
use lockstep_time::{ManualClock, NetworkClock};
use tracing::{debug, info};

use crate::chaos::{ChaosLink, LinkConfig, LinkStats};
use crate::fakes::{ScriptedEngine, SimClock};

/// Network time at which every simulation starts
const START_TIME: f64 = 1_000.0;

struct SimReplica {
    replica: Replica<ScriptedEngine>,
    clock: Arc<SimClock>,
    connected: bool,
}

/// Deterministic multi-replica simulation of one timeline object
pub struct SyncSimulator {
    object: ObjectId,
    duration: f64,
    clock: Arc<ManualClock>,
    arbiter: Arc<LocalArbiter>,
    config: ReplicaConfig,
    default_link: LinkConfig,
    links: BTreeMap<(usize, usize), ChaosLink>,
    replicas: Vec<SimReplica>,
    seed: u64,
    seed_counter: u64,
    elapsed: Duration,
}

impl SyncSimulator {
    /// `replicas` replicas of a `duration`-second timeline. Replica 0 owns
    /// the object initially. Nothing is started yet.
    pub fn new(replicas: usize, duration: f64, link: LinkConfig, seed: u64) -> Self {
        Self::with_config(replicas, duration, link, seed, ReplicaConfig::default())
    }

    pub fn with_config(
        replicas: usize,
        duration: f64,
        link: LinkConfig,
        seed: u64,
        config: ReplicaConfig,
    ) -> Self {
        let object = ObjectId::new(1);
        let arbiter = Arc::new(LocalArbiter::new());
        arbiter.assign(object, replica_id(0));

        let mut sim = SyncSimulator {
            object,
            duration,
            clock: Arc::new(ManualClock::new(START_TIME)),
            arbiter,
            config,
            default_link: link,
            links: BTreeMap::new(),
            replicas: Vec::with_capacity(replicas),
            seed,
            seed_counter: 0,
            elapsed: Duration::ZERO,
        };
        for _ in 0..replicas {
            sim.add_replica();
        }
        sim
    }

    /// Add a replica (not yet started) and link it both ways to every
    /// existing replica. Returns its index.
    pub fn add_replica(&mut self) -> usize {
        let index = self.replicas.len();
        let clock = Arc::new(SimClock::new(self.clock.clone()));

        let mut replica = Replica::new(
            replica_id(index),
            self.object,
            self.config.clone(),
            clock.clone(),
            self.arbiter.clone(),
        );
        replica.attach_engine(ScriptedEngine::new(self.duration));

        for other in 0..index {
            self.insert_link(index, other, self.default_link.clone());
            self.insert_link(other, index, self.default_link.clone());
        }

        self.replicas.push(SimReplica {
            replica,
            clock,
            connected: false,
        });
        debug!(index, "replica added");
        index
    }

    /// Connect and start one replica
    pub fn start(&mut self, index: usize) {
        let sim = &mut self.replicas[index];
        sim.connected = true;
        sim.replica.start();
        info!(index, replica = %sim.replica.id(), "replica started");
    }

    pub fn start_all(&mut self) {
        for index in 0..self.replicas.len() {
            self.start(index);
        }
    }

    /// Replace the conditions of the `from -> to` link
    pub fn set_link(&mut self, from: usize, to: usize, config: LinkConfig) {
        self.insert_link(from, to, config);
    }

    pub fn set_skew(&mut self, index: usize, skew: f64) {
        self.replicas[index].clock.set_skew(skew);
    }

    fn insert_link(&mut self, from: usize, to: usize, config: LinkConfig) {
        let seed = self.seed.wrapping_add(self.seed_counter);
        self.seed_counter += 1;
        self.links.insert((from, to), ChaosLink::new(config, seed));
    }

    pub fn step(&mut self, dt: Duration) {
        let secs = dt.as_secs_f64();
        self.clock.advance(secs);
        self.elapsed += dt;

        for sim in &mut self.replicas {
            if let Some(engine) = sim.replica.player_mut().engine_mut() {
                engine.advance(secs);
            }
        }

        for (&(_, to), link) in self.links.iter_mut() {
            for data in link.tick(dt) {
                let target = &mut self.replicas[to];
                if !target.connected {
                    continue;
                }
                if let Err(e) = target.replica.ingest(&data) {
                    debug!(to, "undecodable datagram: {}", e);
                }
            }
        }

        for sim in &mut self.replicas {
            if sim.connected {
                sim.replica.tick();
            }
        }

        for from in 0..self.replicas.len() {
            if !self.replicas[from].connected {
                continue;
            }
            let outgoing = self.replicas[from].replica.drain_outgoing();
            for bytes in outgoing {
                for to in 0..self.replicas.len() {
                    if to == from {
                        continue;
                    }
                    if let Some(link) = self.links.get_mut(&(from, to)) {
                        link.send(bytes.clone());
                    }
                }
            }
        }
    }

    /// Step in `dt` increments until `total` has elapsed
    pub fn run(&mut self, total: Duration, dt: Duration) {
        let steps = (total.as_secs_f64() / dt.as_secs_f64()).round() as u64;
        for _ in 0..steps {
            self.step(dt);
        }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn object_id(&self) -> ObjectId {
        self.object
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// True network time (no skew)
    pub fn now(&self) -> NetworkTime {
        self.clock.now()
    }

    pub fn replica(&self, index: usize) -> &Replica<ScriptedEngine> {
        &self.replicas[index].replica
    }

    pub fn player(&self, index: usize) -> &SyncPlayer<ScriptedEngine> {
        self.replicas[index].replica.player()
    }

    pub fn player_mut(&mut self, index: usize) -> &mut SyncPlayer<ScriptedEngine> {
        self.replicas[index].replica.player_mut()
    }

    pub fn engine(&self, index: usize) -> Option<&ScriptedEngine> {
        self.player(index).engine()
    }

    /// Index of the replica the arbiter names as owner
    pub fn owner_index(&self) -> Option<usize> {
        let owner = self.arbiter.owner_of(self.object)?;
        self.replicas
            .iter()
            .position(|sim| sim.replica.id() == owner)
    }

    pub fn link_stats(&self, from: usize, to: usize) -> Option<&LinkStats> {
        self.links.get(&(from, to)).map(|link| link.stats())
    }

    /// Largest distance between the owner's engine time and any connected
    /// replica's engine time. Looping timelines measure around the loop.
    pub fn max_drift(&self) -> f64 {
        let Some(owner) = self.owner_index() else {
            return 0.0;
        };
        let reference = self.player(owner).current_time();
        let looping = self.player(owner).is_loop();
        let duration = self.player(owner).duration();

        self.replicas
            .iter()
            .filter(|sim| sim.connected)
            .map(|sim| {
                let d = (sim.replica.player().current_time() - reference).abs();
                if looping {
                    d.min((duration - d).abs())
                } else {
                    d
                }
            })
            .fold(0.0, f64::max)
    }

    /// True when every connected replica holds the owner's snapshot
    pub fn snapshots_agree(&self) -> bool {
        let Some(owner) = self.owner_index() else {
            return false;
        };
        let reference = *self.player(owner).snapshot();
        self.replicas
            .iter()
            .filter(|sim| sim.connected)
            .all(|sim| *sim.replica.player().snapshot() == reference)
    }
}

fn replica_id(index: usize) -> ReplicaId {
    ReplicaId::new(index as u64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::JitterDistribution;
    use crate::fakes::EngineCall;
    use lockstep_state::PlayerConfig;
    use proptest::prelude::*;

    const TICK: Duration = Duration::from_millis(10);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn settled(sim: &mut SyncSimulator) {
        sim.start_all();
        sim.run(ms(500), TICK);
    }

    #[test]
    fn test_zero_latency_follower_lands_on_seek() {
        let mut sim = SyncSimulator::new(2, 30.0, LinkConfig::perfect(), 1);
        settled(&mut sim);

        sim.player_mut(0).seek(5.0);
        sim.run(ms(100), TICK);

        assert_eq!(sim.player(1).current_time(), 5.0);
        assert!(!sim.player(1).is_playing());
        assert!(sim.snapshots_agree());
        assert_eq!(sim.player(1).snapshot().version, 2);
    }

    #[test]
    fn test_convergence_under_latency_and_jitter() {
        let link = LinkConfig {
            base_latency: ms(80),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 40,
            },
            ..LinkConfig::perfect()
        };
        let mut sim = SyncSimulator::new(4, 60.0, link, 99);
        settled(&mut sim);

        sim.player_mut(0).seek(12.0);
        sim.run(ms(500), TICK);
        sim.player_mut(0).toggle_play_pause();
        sim.run(ms(2_000), TICK);

        assert!(sim.snapshots_agree());
        assert!(sim.max_drift() < 1e-6, "drift {}", sim.max_drift());
        for i in 0..sim.len() {
            assert!(sim.engine(i).unwrap().is_running());
        }
        assert!((sim.player(3).current_time() - 14.0).abs() < 1e-6);
    }

    #[test]
    fn test_late_joiner_catches_up() {
        let mut sim = SyncSimulator::new(2, 60.0, LinkConfig::fixed(ms(50)), 5);
        settled(&mut sim);
        sim.player_mut(0).seek(3.0);
        sim.player_mut(0).toggle_play_pause();
        sim.run(ms(2_000), TICK);

        let joiner = sim.add_replica();
        sim.start(joiner);
        sim.run(ms(500), TICK);

        assert!(sim.snapshots_agree());
        assert!(sim.player(joiner).is_playing());
        assert!(sim.max_drift() < 1e-6, "drift {}", sim.max_drift());
        assert!(sim.replica(0).stats().join_requests_served >= 2);
    }

    #[test]
    fn test_duplicate_delivery_applies_each_version_once() {
        let link = LinkConfig {
            duplicate_prob: 1.0,
            ..LinkConfig::perfect()
        };
        let mut sim = SyncSimulator::new(2, 30.0, link, 8);
        settled(&mut sim);
        sim.player_mut(0).toggle_play_pause();
        sim.run(ms(200), TICK);

        let stats = sim.replica(1).stats();
        assert_eq!(stats.snapshots_applied, 2);
        assert!(stats.duplicates_ignored >= 3);

        let plays = sim
            .engine(1)
            .unwrap()
            .calls()
            .iter()
            .filter(|c| **c == EngineCall::Play)
            .count();
        assert_eq!(plays, 1);
    }

    #[test]
    fn test_ownership_handoff() {
        let mut sim = SyncSimulator::new(3, 30.0, LinkConfig::perfect(), 2);
        settled(&mut sim);
        sim.player_mut(0).toggle_play_pause();
        sim.run(ms(1_000), TICK);

        assert!(sim.player_mut(2).toggle_play_pause());
        sim.run(ms(100), TICK);

        assert_eq!(sim.owner_index(), Some(2));
        assert!(sim.snapshots_agree());
        assert!(!sim.player(0).is_playing());
        for i in 0..sim.len() {
            assert!(!sim.engine(i).unwrap().is_running());
        }
        assert!(sim.max_drift() < 1e-6, "drift {}", sim.max_drift());
    }

    #[test]
    fn test_end_of_timeline_reaches_followers() {
        let mut sim = SyncSimulator::new(3, 2.0, LinkConfig::fixed(ms(30)), 3);
        settled(&mut sim);
        sim.player_mut(0).toggle_play_pause();
        sim.run(ms(3_000), TICK);

        assert!(sim.snapshots_agree());
        assert_eq!(sim.player(0).snapshot().version, 3);
        for i in 0..sim.len() {
            assert!(!sim.player(i).is_playing());
            assert_eq!(sim.player(i).current_time(), 2.0);
        }
    }

    #[test]
    fn test_clock_skew_shows_as_drift() {
        let mut sim = SyncSimulator::new(2, 60.0, LinkConfig::perfect(), 4);
        sim.set_skew(1, 0.25);
        settled(&mut sim);
        sim.player_mut(0).toggle_play_pause();
        sim.run(ms(1_000), TICK);

        assert!((sim.max_drift() - 0.25).abs() < 1e-6, "drift {}", sim.max_drift());
    }

    #[test]
    fn test_strict_followers_survive_reordering() {
        let link = LinkConfig {
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 300,
            },
            ..LinkConfig::perfect()
        };
        let config = ReplicaConfig {
            player: PlayerConfig::strict(),
            ..ReplicaConfig::default()
        };
        let mut sim = SyncSimulator::with_config(2, 60.0, link, 21, config);
        settled(&mut sim);

        for i in 0..20 {
            sim.player_mut(0).seek(i as f64);
            sim.step(TICK);
        }
        sim.run(ms(1_000), TICK);

        assert!(sim.snapshots_agree());
        assert_eq!(sim.player(1).current_time(), 19.0);
        assert!(sim.replica(1).stats().stale_ignored > 0);
    }

    #[test]
    fn test_lossy_link_recovers_with_resync() {
        let link = LinkConfig {
            loss_rate: 0.3,
            ..LinkConfig::fixed(ms(40))
        };
        let mut sim = SyncSimulator::new(2, 120.0, link, 13);
        settled(&mut sim);
        sim.player_mut(0).seek(7.0);
        sim.player_mut(0).toggle_play_pause();

        for _ in 0..20 {
            sim.run(ms(200), TICK);
            sim.player_mut(0).resync();
        }
        sim.run(ms(200), TICK);

        let owner = *sim.player(0).snapshot();
        let follower = *sim.player(1).snapshot();
        assert_eq!(follower.anchor_timeline_time, owner.anchor_timeline_time);
        assert_eq!(follower.anchor_network_time, owner.anchor_network_time);
        assert!(sim.max_drift() < 1e-6, "drift {}", sim.max_drift());
        assert!(sim.link_stats(0, 1).unwrap().packets_lost > 0);
    }

    #[derive(Clone, Debug)]
    enum Op {
        PlayPause(usize),
        Stop(usize),
        Loop(usize),
        Seek(usize, f64),
        Resync(usize),
        Wait(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3usize).prop_map(Op::PlayPause),
            (0..3usize).prop_map(Op::Stop),
            (0..3usize).prop_map(Op::Loop),
            (0..3usize, -2.0..12.0f64).prop_map(|(i, t)| Op::Seek(i, t)),
            (0..3usize).prop_map(Op::Resync),
            (1..300u64).prop_map(Op::Wait),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_sequential_operations_converge(ops in proptest::collection::vec(op(), 1..24)) {
            let mut sim = SyncSimulator::new(3, 10.0, LinkConfig::perfect(), 77);
            settled(&mut sim);

            for op in ops {
                // each operation is issued against a converged group
                for _ in 0..10 {
                    if sim.snapshots_agree() {
                        break;
                    }
                    sim.step(TICK);
                }
                match op {
                    Op::PlayPause(i) => { sim.player_mut(i).toggle_play_pause(); }
                    Op::Stop(i) => { sim.player_mut(i).stop(); }
                    Op::Loop(i) => { sim.player_mut(i).toggle_loop(); }
                    Op::Seek(i, t) => { sim.player_mut(i).seek(t); }
                    Op::Resync(i) => { sim.player_mut(i).resync(); }
                    Op::Wait(n) => sim.run(ms(n * 10), TICK),
                }
                sim.step(TICK);
                sim.step(TICK);
            }
            sim.run(ms(100), TICK);

            prop_assert!(sim.snapshots_agree());
            prop_assert!(sim.max_drift() < 1e-6, "drift {}", sim.max_drift());
        }
    }
}
