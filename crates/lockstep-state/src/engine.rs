//! Playback engine contract

use lockstep_core::WrapMode;

/// A controllable timeline cursor (media player, animation director, ...).
///
/// The engine advances its own time while playing; the synchronization core
/// only seats it at a position and tells it whether to run.
pub trait PlaybackEngine {
    /// Timeline length in seconds. Non-positive values are tolerated.
    fn duration(&self) -> f64;

    /// Current cursor position in seconds
    fn time(&self) -> f64;

    fn set_time(&mut self, t: f64);

    fn play(&mut self);

    fn pause(&mut self);

    /// Recompute visible output at the current time without advancing.
    /// Needed after `set_time` while paused.
    fn evaluate(&mut self);

    fn set_wrap_mode(&mut self, mode: WrapMode);
}

impl<E: PlaybackEngine + ?Sized> PlaybackEngine for Box<E> {
    fn duration(&self) -> f64 {
        (**self).duration()
    }

    fn time(&self) -> f64 {
        (**self).time()
    }

    fn set_time(&mut self, t: f64) {
        (**self).set_time(t)
    }

    fn play(&mut self) {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn evaluate(&mut self) {
        (**self).evaluate()
    }

    fn set_wrap_mode(&mut self, mode: WrapMode) {
        (**self).set_wrap_mode(mode)
    }
}
