#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lockstep_core::{NetworkTime, SyncSnapshot};
use lockstep_time::{reconcile, sanitize_duration};

#[derive(Arbitrary, Debug)]
struct Input {
    anchor_network_time: f64,
    anchor_timeline_time: f64,
    is_playing: bool,
    is_loop: bool,
    duration: f64,
    now: f64,
}

fuzz_target!(|input: Input| {
    if !input.anchor_network_time.is_finite()
        || !input.anchor_timeline_time.is_finite()
        || !input.now.is_finite()
    {
        return;
    }
    let snapshot = SyncSnapshot {
        anchor_network_time: NetworkTime::from_secs_f64(input.anchor_network_time),
        anchor_timeline_time: input.anchor_timeline_time,
        is_playing: input.is_playing,
        is_loop: input.is_loop,
        version: 0,
    };
    let duration = sanitize_duration(input.duration);
    let t = reconcile(&snapshot, duration, NetworkTime::from_secs_f64(input.now));

    if t.is_finite() {
        assert!(t >= 0.0 && t <= duration, "t = {} outside [0, {}]", t, duration);
    }
});
