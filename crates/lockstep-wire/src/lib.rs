//! Lockstep Wire Protocol - Binary frame format
//!
//! Every frame is a fixed 38-byte record carrying one full snapshot:
//! - Version + kind byte
//! - Snapshot flags
//! - Object and sender identities
//! - Snapshot version and anchors

pub mod flags;
pub mod frame;

pub use flags::*;
pub use frame::*;
