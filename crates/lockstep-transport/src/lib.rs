//! Lockstep Transport - moving sync frames between replicas
//!
//! Frames are small and self-contained, so plain UDP datagrams are enough;
//! loss and reordering are tolerated by the snapshot protocol itself.

pub mod udp;

pub use udp::*;
