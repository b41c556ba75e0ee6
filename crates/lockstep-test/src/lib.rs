//! Lockstep Test Harness - deterministic simulation of replica groups
//!
//! This crate provides:
//! - Chaos links (latency, jitter, loss, duplication)
//! - A scripted playback engine and skewable network clocks
//! - A multi-replica simulator with a drift metric

pub mod chaos;
pub mod fakes;
pub mod simulator;

pub use chaos::*;
pub use fakes::*;
pub use simulator::*;
