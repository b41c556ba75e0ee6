//! Time primitives
//!
//! Two time axes exist in lockstep:
//! - Network time: a shared clock reading in seconds, comparable across replicas
//! - Timeline time: a position inside one timeline, in `[0, duration]`
//!
//! Timeline time stays a bare `f64`; network time gets a newtype so the two
//! are never mixed up at an anchor.

use std::ops::{Add, Sub};
use std::time::Duration;

/// Network time - shared clock reading in seconds since the session epoch
#[derive(Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct NetworkTime(pub f64);

impl NetworkTime {
    pub const ZERO: NetworkTime = NetworkTime(0.0);

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        NetworkTime(secs)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        NetworkTime(millis as f64 / 1000.0)
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `anchor`, never negative.
    /// A reading behind the anchor (clock skew between replicas) counts as zero.
    #[inline]
    pub fn elapsed_since(self, anchor: NetworkTime) -> f64 {
        (self.0 - anchor.0).max(0.0)
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl Add<Duration> for NetworkTime {
    type Output = NetworkTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        NetworkTime(self.0 + rhs.as_secs_f64())
    }
}

impl Add<f64> for NetworkTime {
    type Output = NetworkTime;

    #[inline]
    fn add(self, rhs: f64) -> Self::Output {
        NetworkTime(self.0 + rhs)
    }
}

impl Sub<NetworkTime> for NetworkTime {
    type Output = f64;

    /// Signed difference in seconds
    #[inline]
    fn sub(self, rhs: NetworkTime) -> Self::Output {
        self.0 - rhs.0
    }
}

impl std::fmt::Debug for NetworkTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "net({:.3}s)", self.0)
    }
}

impl std::fmt::Display for NetworkTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_clamps_negative() {
        let anchor = NetworkTime::from_secs_f64(10.0);
        assert_eq!(NetworkTime::from_secs_f64(12.5).elapsed_since(anchor), 2.5);
        assert_eq!(NetworkTime::from_secs_f64(9.0).elapsed_since(anchor), 0.0);
    }

    #[test]
    fn test_add_duration() {
        let t = NetworkTime::from_millis(1500) + Duration::from_millis(250);
        assert!((t.as_secs_f64() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_signed_difference() {
        let a = NetworkTime::from_secs_f64(1.0);
        let b = NetworkTime::from_secs_f64(3.0);
        assert_eq!(a - b, -2.0);
    }
}
