//! Replicated playback snapshot
//!
//! A snapshot is the whole replicated state of one timeline object. It is
//! small enough to resend in full on every change, which is what makes late
//! joiners and lost packets cheap to handle.

use crate::NetworkTime;

/// Playback intent shared by all replicas of one timeline object.
///
/// `(anchor_network_time, anchor_timeline_time)` is the single anchor the
/// current position is extrapolated from.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct SyncSnapshot {
    /// Network clock reading at which `anchor_timeline_time` was valid
    pub anchor_network_time: NetworkTime,
    /// Timeline position at the anchor instant, in `[0, duration]`
    pub anchor_timeline_time: f64,
    pub is_playing: bool,
    pub is_loop: bool,
    /// Change counter, bumped (wrapping) on every owner-authored mutation
    pub version: u32,
}

impl SyncSnapshot {
    /// Paused at zero, version 0
    pub fn new() -> Self {
        SyncSnapshot::default()
    }

    /// Move the anchor to `(now, timeline_time)`
    #[inline]
    pub fn set_anchor(&mut self, now: NetworkTime, timeline_time: f64) {
        self.anchor_network_time = now;
        self.anchor_timeline_time = timeline_time;
    }

    /// Advance the version counter, returning the new value
    #[inline]
    pub fn bump_version(&mut self) -> u32 {
        self.version = self.version.wrapping_add(1);
        self.version
    }

    /// Wrap mode the engine should use while this snapshot is active
    #[inline]
    pub fn wrap_mode(&self, base: WrapMode) -> WrapMode {
        if self.is_loop {
            WrapMode::Loop
        } else {
            base
        }
    }
}

/// End-of-timeline behavior of a playback engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Stop advancing at `duration`
    #[default]
    ClampAtEnd,
    /// Jump back to zero and continue
    Loop,
}

/// Role of a replica relative to one timeline object.
/// Derived from the ownership arbiter on demand, never replicated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplicaRole {
    Owner,
    NonOwner,
}

impl ReplicaRole {
    #[inline]
    pub fn from_ownership(is_owner: bool) -> Self {
        if is_owner {
            ReplicaRole::Owner
        } else {
            ReplicaRole::NonOwner
        }
    }

    #[inline]
    pub fn is_owner(self) -> bool {
        self == ReplicaRole::Owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_snapshot_is_paused_at_zero() {
        let snap = SyncSnapshot::new();
        assert!(!snap.is_playing);
        assert!(!snap.is_loop);
        assert_eq!(snap.anchor_timeline_time, 0.0);
        assert_eq!(snap.version, 0);
    }

    #[test]
    fn test_bump_version_wraps() {
        let mut snap = SyncSnapshot {
            version: u32::MAX,
            ..SyncSnapshot::default()
        };
        assert_eq!(snap.bump_version(), 0);
        assert_eq!(snap.bump_version(), 1);
    }

    #[test]
    fn test_wrap_mode_follows_loop_flag() {
        let mut snap = SyncSnapshot::new();
        assert_eq!(snap.wrap_mode(WrapMode::ClampAtEnd), WrapMode::ClampAtEnd);
        snap.is_loop = true;
        assert_eq!(snap.wrap_mode(WrapMode::ClampAtEnd), WrapMode::Loop);
    }
}
