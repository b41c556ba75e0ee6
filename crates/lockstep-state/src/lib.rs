//! Lockstep State - replicated playback state machine
//!
//! This crate implements the synchronization core:
//! - Collaborator contracts (playback engine, ownership arbiter, replication channel)
//! - Ownership arbitration for in-process sessions
//! - Snapshot freshness checking
//! - The owner / follower state machine with the external control overlay

pub mod authority;
pub mod engine;
pub mod freshness;
pub mod player;
pub mod replication;

pub use authority::*;
pub use engine::*;
pub use freshness::*;
pub use player::*;
pub use replication::*;
