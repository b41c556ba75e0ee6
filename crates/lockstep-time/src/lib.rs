//! Lockstep Time - shared clocks and clock reconciliation
//!
//! This crate implements:
//! - The network clock contract and its implementations (local, session, manual)
//! - Session clock offset estimation
//! - Reconciliation: snapshot + network time -> timeline time

pub mod clock;
pub mod offset;
pub mod reconcile;

pub use clock::*;
pub use offset::*;
pub use reconcile::*;
