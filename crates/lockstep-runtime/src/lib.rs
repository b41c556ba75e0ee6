//! Lockstep Runtime - hosting a synchronized timeline on one replica
//!
//! Each tick of the host loop:
//! 1. Read the network clock
//! 2. Decode and queue inbound frames
//! 3. Apply fresh snapshots, answer join requests
//! 4. Re-derive display time, run the owner's end-of-timeline check
//! 5. Hand outbound frames to the transport

pub mod config;
pub mod control;
pub mod driver;
pub mod logging;
pub mod replica;

pub use config::*;
pub use control::*;
pub use driver::*;
pub use logging::*;
pub use replica::*;
