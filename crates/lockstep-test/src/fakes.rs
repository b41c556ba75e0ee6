//! Scripted engine and skewable clock for simulations

use std::sync::Arc;

use lockstep_core::{NetworkTime, WrapMode};
use lockstep_state::PlaybackEngine;
use lockstep_time::{ManualClock, NetworkClock};
use parking_lot::Mutex;

/// Engine call, as recorded by [`ScriptedEngine`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineCall {
    SetTime(f64),
    Play,
    Pause,
    Evaluate,
    SetWrapMode(WrapMode),
}

/// Playback engine whose time only moves when the simulation advances it
#[derive(Clone, Debug)]
pub struct ScriptedEngine {
    duration: f64,
    time: f64,
    playing: bool,
    wrap_mode: WrapMode,
    calls: Vec<EngineCall>,
}

impl ScriptedEngine {
    pub fn new(duration: f64) -> Self {
        ScriptedEngine {
            duration,
            time: 0.0,
            playing: false,
            wrap_mode: WrapMode::ClampAtEnd,
            calls: Vec::new(),
        }
    }

    /// Advance by `dt` seconds if playing. Looping wraps; otherwise the
    /// cursor holds at the end.
    pub fn advance(&mut self, dt: f64) {
        if !self.playing {
            return;
        }
        let next = self.time + dt;
        self.time = match self.wrap_mode {
            WrapMode::Loop if self.duration > 0.0 => next.rem_euclid(self.duration),
            _ => next.min(self.duration.max(0.0)),
        };
    }

    pub fn is_running(&self) -> bool {
        self.playing
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl PlaybackEngine for ScriptedEngine {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, t: f64) {
        self.time = t;
        self.calls.push(EngineCall::SetTime(t));
    }

    fn play(&mut self) {
        self.playing = true;
        self.calls.push(EngineCall::Play);
    }

    fn pause(&mut self) {
        self.playing = false;
        self.calls.push(EngineCall::Pause);
    }

    fn evaluate(&mut self) {
        self.calls.push(EngineCall::Evaluate);
    }

    fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.wrap_mode = mode;
        self.calls.push(EngineCall::SetWrapMode(mode));
    }
}

/// A replica's view of shared simulated time, off by a fixed skew
#[derive(Debug)]
pub struct SimClock {
    shared: Arc<ManualClock>,
    skew: Mutex<f64>,
}

impl SimClock {
    pub fn new(shared: Arc<ManualClock>) -> Self {
        SimClock {
            shared,
            skew: Mutex::new(0.0),
        }
    }

    /// Seconds this replica reads ahead of (positive) or behind true time
    pub fn set_skew(&self, skew: f64) {
        *self.skew.lock() = skew;
    }

    pub fn skew(&self) -> f64 {
        *self.skew.lock()
    }
}

impl NetworkClock for SimClock {
    fn now(&self) -> NetworkTime {
        self.shared.now() + self.skew()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_advances_only_while_playing() {
        let mut engine = ScriptedEngine::new(10.0);
        engine.advance(1.0);
        assert_eq!(engine.time(), 0.0);

        engine.play();
        engine.advance(1.5);
        assert_eq!(engine.time(), 1.5);
    }

    #[test]
    fn test_engine_wrap_modes() {
        let mut engine = ScriptedEngine::new(4.0);
        engine.play();
        engine.advance(5.0);
        assert_eq!(engine.time(), 4.0);

        engine.set_wrap_mode(WrapMode::Loop);
        engine.set_time(3.0);
        engine.advance(2.0);
        assert!((engine.time() - 1.0).abs() < 1e-12);
        assert_eq!(
            engine.calls().last(),
            Some(&EngineCall::SetTime(3.0))
        );
    }

    #[test]
    fn test_sim_clock_skew() {
        let shared = Arc::new(ManualClock::new(10.0));
        let clock = SimClock::new(shared.clone());
        clock.set_skew(-0.25);
        shared.advance(1.0);
        assert_eq!(clock.now(), NetworkTime::from_secs_f64(10.75));
    }
}
