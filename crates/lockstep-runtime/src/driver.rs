//! Async host loop driving a [`Replica`] over UDP

use std::net::SocketAddr;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use lockstep_core::{LockstepError, LockstepResult};
use lockstep_state::PlaybackEngine;
use lockstep_transport::{start_receive_loop, UdpTransport};

use crate::Replica;

/// Run `replica` until `shutdown` flips to true.
///
/// Every tick interval the replica ticks and its outbound frames are sent to
/// every peer. Datagrams are ingested as they arrive and applied on the next tick.
pub async fn run<E: PlaybackEngine>(
    replica: &mut Replica<E>,
    transport: &UdpTransport,
    peers: &[SocketAddr],
    mut shutdown: watch::Receiver<bool>,
) -> LockstepResult<()> {
    let mut packets = start_receive_loop(transport.socket(), replica.config().max_inbound_buffer);
    let mut ticker = interval(replica.config().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        replica = %replica.id(),
        object = %replica.object_id(),
        local = %transport.local_addr(),
        peers = peers.len(),
        "replica driver started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                replica.tick();
                for bytes in replica.drain_outgoing() {
                    transport.broadcast_bytes(&bytes, peers).await;
                }
            }
            packet = packets.recv() => {
                let Some((bytes, from)) = packet else {
                    return Err(LockstepError::ChannelClosed);
                };
                if let Err(e) = replica.ingest(&bytes) {
                    warn!(%from, "dropping undecodable frame: {}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!(replica = %replica.id(), stats = ?replica.stats(), "replica driver stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use lockstep_core::{ObjectId, ReplicaId, WrapMode};
    use lockstep_state::LocalArbiter;
    use lockstep_time::LocalClock;

    use crate::ReplicaConfig;

    struct StubEngine {
        time: f64,
    }

    impl PlaybackEngine for StubEngine {
        fn duration(&self) -> f64 {
            60.0
        }
        fn time(&self) -> f64 {
            self.time
        }
        fn set_time(&mut self, t: f64) {
            self.time = t;
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn evaluate(&mut self) {}
        fn set_wrap_mode(&mut self, _mode: WrapMode) {}
    }

    #[tokio::test]
    async fn test_follower_converges_over_loopback() {
        let object = ObjectId(5);
        let clock = Arc::new(LocalClock::new());
        let arbiter = Arc::new(LocalArbiter::new());
        arbiter.assign(object, ReplicaId(1));

        let config = ReplicaConfig {
            tick_interval: Duration::from_millis(5),
            ..ReplicaConfig::default()
        };

        let mut owner = Replica::new(
            ReplicaId(1),
            object,
            config.clone(),
            clock.clone(),
            arbiter.clone(),
        );
        owner.attach_engine(StubEngine { time: 0.0 });
        owner.start();
        owner.player_mut().seek(5.0);

        let mut follower = Replica::new(ReplicaId(2), object, config, clock, arbiter);
        follower.attach_engine(StubEngine { time: 0.0 });
        follower.start();

        let owner_udp = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let follower_udp = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let owner_peers = [follower_udp.local_addr()];
        let follower_peers = [owner_udp.local_addr()];

        let (stop_tx, stop_rx) = watch::channel(false);
        let owner_rx = stop_rx.clone();

        let owner_task = tokio::spawn(async move {
            run(&mut owner, &owner_udp, &owner_peers, owner_rx)
                .await
                .unwrap();
            owner
        });
        let follower_task = tokio::spawn(async move {
            run(&mut follower, &follower_udp, &follower_peers, stop_rx)
                .await
                .unwrap();
            follower
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();

        let owner = owner_task.await.unwrap();
        let follower = follower_task.await.unwrap();

        assert_eq!(follower.player().snapshot().version, 2);
        assert_eq!(follower.player().current_time(), 5.0);
        assert!(owner.stats().join_requests_served >= 1);
    }
}
