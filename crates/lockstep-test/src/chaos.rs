//! Chaos links between simulated replicas
//!
//! One [`ChaosLink`] is one direction of one replica pair. Simulates:
//! - Base latency plus jitter (which also reorders)
//! - Random and burst loss
//! - Duplication

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Jitter distribution type
#[derive(Clone, Debug)]
pub enum JitterDistribution {
    None,
    Uniform { min_ms: u32, max_ms: u32 },
    /// Normal distribution (mean, stddev), truncated at zero
    Normal { mean_ms: f64, stddev_ms: f64 },
    /// Heavy tail, capped at one second
    Pareto { scale_ms: f64, shape: f64 },
}

impl JitterDistribution {
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            JitterDistribution::None => Duration::ZERO,
            JitterDistribution::Uniform { min_ms, max_ms } => {
                let (lo, hi) = (*min_ms.min(max_ms), *min_ms.max(max_ms));
                Duration::from_millis(rng.gen_range(lo..=hi) as u64)
            }
            JitterDistribution::Normal { mean_ms, stddev_ms } => {
                // Box-Muller
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                Duration::from_secs_f64((mean_ms + stddev_ms * z).max(0.0) / 1000.0)
            }
            JitterDistribution::Pareto { scale_ms, shape } => {
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                let value = scale_ms / u.powf(1.0 / shape);
                Duration::from_secs_f64(value.min(1000.0) / 1000.0)
            }
        }
    }
}

/// Link conditions
#[derive(Clone, Debug)]
pub struct LinkConfig {
    pub base_latency: Duration,
    pub jitter: JitterDistribution,
    /// Packet loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability that a send starts a loss burst
    pub burst_loss_prob: f64,
    /// Burst length range, in packets
    pub burst_length: (u32, u32),
    pub duplicate_prob: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::good()
    }
}

impl LinkConfig {
    /// Zero latency, nothing lost
    pub fn perfect() -> Self {
        LinkConfig {
            base_latency: Duration::ZERO,
            jitter: JitterDistribution::None,
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            duplicate_prob: 0.0,
        }
    }

    /// Fixed latency, nothing lost
    pub fn fixed(latency: Duration) -> Self {
        LinkConfig {
            base_latency: latency,
            ..LinkConfig::perfect()
        }
    }

    pub fn good() -> Self {
        LinkConfig {
            base_latency: Duration::from_millis(20),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 10,
            },
            loss_rate: 0.001,
            burst_loss_prob: 0.0,
            burst_length: (1, 2),
            duplicate_prob: 0.001,
        }
    }

    pub fn poor() -> Self {
        LinkConfig {
            base_latency: Duration::from_millis(100),
            jitter: JitterDistribution::Pareto {
                scale_ms: 50.0,
                shape: 1.5,
            },
            loss_rate: 0.05,
            burst_loss_prob: 0.05,
            burst_length: (2, 5),
            duplicate_prob: 0.02,
        }
    }

    /// 2G-class conditions
    pub fn hostile() -> Self {
        LinkConfig {
            base_latency: Duration::from_millis(200),
            jitter: JitterDistribution::Pareto {
                scale_ms: 100.0,
                shape: 1.2,
            },
            loss_rate: 0.15,
            burst_loss_prob: 0.1,
            burst_length: (3, 10),
            duplicate_prob: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct InFlight {
    delivery_time: Duration,
    seq: u64,
    send_time: Duration,
    data: Bytes,
}

#[derive(Clone, Debug, Default)]
pub struct LinkStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_lost: u64,
    pub packets_reordered: u64,
    pub packets_duplicated: u64,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl LinkStats {
    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_lost as f64 / self.packets_sent as f64
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.packets_delivered == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.packets_delivered as f64
        }
    }
}

/// One direction of a simulated link
pub struct ChaosLink {
    config: LinkConfig,
    rng: StdRng,
    in_flight: BinaryHeap<Reverse<InFlight>>,
    current_time: Duration,
    burst_remaining: u32,
    next_seq: u64,
    highest_delivered: Option<u64>,
    stats: LinkStats,
}

impl ChaosLink {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_flight: BinaryHeap::new(),
            current_time: Duration::ZERO,
            burst_remaining: 0,
            next_seq: 0,
            highest_delivered: None,
            stats: LinkStats::default(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Replace the link conditions; packets in flight keep their schedule
    pub fn set_config(&mut self, config: LinkConfig) {
        self.config = config;
    }

    pub fn send(&mut self, data: Bytes) {
        self.stats.packets_sent += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.should_drop() {
            self.stats.packets_lost += 1;
            return;
        }

        let latency = self.config.base_latency + self.config.jitter.sample(&mut self.rng);
        let delivery_time = self.current_time + latency;

        if self.config.duplicate_prob > 0.0 && self.rng.gen::<f64>() < self.config.duplicate_prob {
            let extra = self.config.jitter.sample(&mut self.rng);
            self.in_flight.push(Reverse(InFlight {
                delivery_time: delivery_time + extra,
                seq,
                send_time: self.current_time,
                data: data.clone(),
            }));
            self.stats.packets_duplicated += 1;
        }

        self.in_flight.push(Reverse(InFlight {
            delivery_time,
            seq,
            send_time: self.current_time,
            data,
        }));
    }

    fn should_drop(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }

        if self.config.burst_loss_prob > 0.0 && self.rng.gen::<f64>() < self.config.burst_loss_prob {
            let (min, max) = self.config.burst_length;
            // this packet is the first of the burst
            self.burst_remaining = self.rng.gen_range(min..=max.max(min)).saturating_sub(1);
            return true;
        }

        self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate
    }

    /// Advance link time and return every packet now due, in delivery order
    pub fn tick(&mut self, dt: Duration) -> Vec<Bytes> {
        self.current_time += dt;

        let mut delivered = Vec::new();
        while self
            .in_flight
            .peek()
            .is_some_and(|Reverse(p)| p.delivery_time <= self.current_time)
        {
            let Some(Reverse(packet)) = self.in_flight.pop() else {
                break;
            };
            let latency = (packet.delivery_time - packet.send_time).as_millis() as u64;

            self.stats.packets_delivered += 1;
            self.stats.total_latency_ms += latency;
            self.stats.max_latency_ms = self.stats.max_latency_ms.max(latency);
            match self.highest_delivered {
                Some(h) if packet.seq < h => self.stats.packets_reordered += 1,
                _ => self.highest_delivered = Some(packet.seq),
            }

            delivered.push(packet.data);
        }
        delivered
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = LinkStats::default();
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }
}
