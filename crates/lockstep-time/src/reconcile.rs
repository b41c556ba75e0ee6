//! Clock reconciliation - where should the timeline be right now?
//!
//! Every replica, owner included, derives its target position from the same
//! snapshot and the same shared clock:
//!
//! ```text
//! t = anchor_timeline_time
//!   + max(0, now - anchor_network_time)     (only while playing)
//! t = wrap(t, duration)                     (looping)
//! t = clamp(t, 0, duration)                 (otherwise)
//! ```
//!
//! There is no smoothing or latency compensation beyond extrapolating from
//! the single anchor.

use lockstep_core::{NetworkTime, SyncSnapshot};

/// Duration used when the engine reports nothing usable
pub const FALLBACK_DURATION: f64 = 1.0;

/// Replace a non-positive or non-finite duration with [`FALLBACK_DURATION`]
#[inline]
pub fn sanitize_duration(reported: f64) -> f64 {
    if reported.is_finite() && reported > 0.0 {
        reported
    } else {
        FALLBACK_DURATION
    }
}

/// Clamp a timeline time into `[0, duration]`. NaN maps to 0.
#[inline]
pub fn clamp_to_timeline(t: f64, duration: f64) -> f64 {
    if t.is_nan() {
        0.0
    } else {
        t.clamp(0.0, duration.max(0.0))
    }
}

/// Floor-modulo wrap into `[0, duration)`: `wrap(-0.5, 10) == 9.5`
#[inline]
pub fn wrap(t: f64, duration: f64) -> f64 {
    if !t.is_finite() || duration <= 0.0 {
        return 0.0;
    }
    let r = t.rem_euclid(duration);
    // rem_euclid may round up to exactly `duration` for tiny negative inputs
    if r >= duration {
        0.0
    } else {
        r
    }
}

/// Target timeline time for `snapshot` at network time `now`
pub fn reconcile(snapshot: &SyncSnapshot, duration: f64, now: NetworkTime) -> f64 {
    let mut t = snapshot.anchor_timeline_time;

    if snapshot.is_playing {
        t += now.elapsed_since(snapshot.anchor_network_time);
    }

    if duration > 0.0 {
        if snapshot.is_loop {
            t = wrap(t, duration);
        } else {
            t = clamp_to_timeline(t, duration);
        }
    }

    t
}

/// True when a playing, non-looping snapshot has run off the end
#[inline]
pub fn reached_end(snapshot: &SyncSnapshot, duration: f64, now: NetworkTime) -> bool {
    snapshot.is_playing && !snapshot.is_loop && reconcile(snapshot, duration, now) >= duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn playing(anchor_net: f64, anchor_tl: f64, is_loop: bool) -> SyncSnapshot {
        SyncSnapshot {
            anchor_network_time: NetworkTime::from_secs_f64(anchor_net),
            anchor_timeline_time: anchor_tl,
            is_playing: true,
            is_loop,
            version: 1,
        }
    }

    #[test]
    fn test_wrap_floor_modulo() {
        assert_eq!(wrap(13.0, 10.0), 3.0);
        assert_eq!(wrap(-0.5, 10.0), 9.5);
        assert_eq!(wrap(10.0, 10.0), 0.0);
        assert_eq!(wrap(-1e-18, 10.0), 0.0);
    }

    #[test]
    fn test_sanitize_duration() {
        assert_eq!(sanitize_duration(12.0), 12.0);
        assert_eq!(sanitize_duration(0.0), 1.0);
        assert_eq!(sanitize_duration(-3.0), 1.0);
        assert_eq!(sanitize_duration(f64::NAN), 1.0);
    }

    #[test]
    fn test_clamp_nan_is_zero() {
        assert_eq!(clamp_to_timeline(f64::NAN, 5.0), 0.0);
        assert_eq!(clamp_to_timeline(f64::INFINITY, 5.0), 5.0);
        assert_eq!(clamp_to_timeline(-2.0, 5.0), 0.0);
    }

    #[test]
    fn test_zero_latency_follower() {
        // owner started playing at network time 0 from position 0
        let snap = playing(0.0, 0.0, false);
        let t = reconcile(&snap, 20.0, NetworkTime::from_secs_f64(5.0));
        assert_eq!(t, 5.0);
    }

    #[test]
    fn test_loop_wraps_past_end() {
        let snap = playing(100.0, 8.0, true);
        let t = reconcile(&snap, 10.0, NetworkTime::from_secs_f64(105.0));
        assert!((t - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clock_behind_anchor_does_not_rewind() {
        let snap = playing(50.0, 4.0, false);
        let t = reconcile(&snap, 10.0, NetworkTime::from_secs_f64(49.0));
        assert_eq!(t, 4.0);
    }

    #[test]
    fn test_reached_end() {
        let snap = playing(0.0, 0.0, false);
        assert!(!reached_end(&snap, 10.0, NetworkTime::from_secs_f64(9.9)));
        assert!(reached_end(&snap, 10.0, NetworkTime::from_secs_f64(10.0)));

        let looping = playing(0.0, 0.0, true);
        assert!(!reached_end(&looping, 10.0, NetworkTime::from_secs_f64(25.0)));
    }

    proptest! {
        #[test]
        fn prop_playing_matches_anchor_formula(
            anchor_net in -1.0e4f64..1.0e4,
            anchor_tl in 0.0f64..600.0,
            now in -1.0e4f64..1.0e4,
            duration in 0.1f64..600.0,
        ) {
            let snap = playing(anchor_net, anchor_tl, false);
            let expected = (anchor_tl + (now - anchor_net).max(0.0)).clamp(0.0, duration);
            let t = reconcile(&snap, duration, NetworkTime::from_secs_f64(now));
            prop_assert_eq!(t, expected);
        }

        #[test]
        fn prop_paused_ignores_clock(
            anchor_tl in -50.0f64..650.0,
            now_a in -1.0e4f64..1.0e4,
            now_b in -1.0e4f64..1.0e4,
            duration in 0.1f64..600.0,
            is_loop in any::<bool>(),
        ) {
            let snap = SyncSnapshot {
                anchor_network_time: NetworkTime::ZERO,
                anchor_timeline_time: anchor_tl,
                is_playing: false,
                is_loop,
                version: 3,
            };
            let a = reconcile(&snap, duration, NetworkTime::from_secs_f64(now_a));
            let b = reconcile(&snap, duration, NetworkTime::from_secs_f64(now_b));
            prop_assert_eq!(a, b);
            if !is_loop {
                prop_assert_eq!(a, anchor_tl.clamp(0.0, duration));
            }
        }

        #[test]
        fn prop_loop_stays_in_range(
            anchor_tl in 0.0f64..600.0,
            now in 0.0f64..1.0e5,
            duration in 0.1f64..600.0,
        ) {
            let snap = playing(0.0, anchor_tl, true);
            let t = reconcile(&snap, duration, NetworkTime::from_secs_f64(now));
            prop_assert!(t >= 0.0);
            prop_assert!(t < duration);
        }

        #[test]
        fn prop_playing_is_monotonic_until_end(
            anchor_tl in 0.0f64..100.0,
            a in 0.0f64..1.0e3,
            delta in 0.0f64..1.0e3,
        ) {
            let snap = playing(0.0, anchor_tl, false);
            let earlier = reconcile(&snap, 100.0, NetworkTime::from_secs_f64(a));
            let later = reconcile(&snap, 100.0, NetworkTime::from_secs_f64(a + delta));
            prop_assert!(later >= earlier);
        }
    }
}
