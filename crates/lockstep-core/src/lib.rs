//! Lockstep Core - Fundamental types for replicated timeline playback
//!
//! This crate defines the types shared by every other lockstep crate:
//! - Identifiers (ReplicaId, ObjectId)
//! - Network time (NetworkTime)
//! - The replicated playback snapshot (SyncSnapshot) and wrap modes
//! - The common error type

pub mod error;
pub mod id;
pub mod snapshot;
pub mod time;

pub use error::*;
pub use id::*;
pub use snapshot::*;
pub use time::*;
