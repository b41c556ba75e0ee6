//! Transport controls - headless play/stop/loop/scrub surface
//!
//! Holds the presentation state of a transport bar (display mode, slider,
//! drag in progress) and maps user gestures onto [`SyncPlayer`] operations:
//! - press the slider: external control on
//! - drag: local preview, nothing replicated
//! - release: one seek at the slider value, external control off

use lockstep_state::{PlaybackEngine, SyncPlayer};

/// Unit used for time labels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Frames,
    Seconds,
}

impl DisplayMode {
    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::Frames => "FRAME",
            DisplayMode::Seconds => "SEC",
        }
    }

    fn toggled(self) -> Self {
        match self {
            DisplayMode::Frames => DisplayMode::Seconds,
            DisplayMode::Seconds => DisplayMode::Frames,
        }
    }
}

/// Icon shown on the play/pause button; the action it would perform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayIcon {
    Play,
    Pause,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopIcon {
    On,
    Off,
}

/// Everything a transport bar renders for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct TransportView {
    pub mode_label: &'static str,
    pub length_label: String,
    pub current_label: String,
    pub slider_value: f64,
    pub slider_max: f64,
    pub play_icon: PlayIcon,
    pub loop_icon: LoopIcon,
}

/// Transport bar state for one player
#[derive(Clone, Debug, Default)]
pub struct TransportControl {
    mode: DisplayMode,
    dragging: bool,
    slider_value: f64,
    slider_max: Option<f64>,
}

impl TransportControl {
    pub fn new(mode: DisplayMode) -> Self {
        TransportControl {
            mode,
            ..TransportControl::default()
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn toggle_display_mode(&mut self) -> DisplayMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Recompute the view. While dragging, labels follow the slider instead
    /// of the engine.
    pub fn refresh<E: PlaybackEngine>(&mut self, player: &SyncPlayer<E>) -> TransportView {
        let duration = player.duration();
        let framerate = player.framerate();

        // the slider range is fixed the first time a duration is known;
        // a drag already in progress keeps its value
        if self.slider_max.is_none() && duration > 0.0 {
            self.slider_max = Some(duration);
            if !self.dragging {
                self.slider_value = 0.0;
            }
        }
        let slider_max = self.slider_max.unwrap_or(0.0);

        let shown = if self.dragging {
            self.slider_value.clamp(0.0, duration.max(0.0))
        } else {
            let current = player.current_time().clamp(0.0, duration.max(0.0));
            if self.slider_max.is_some() {
                self.slider_value = current;
            }
            current
        };

        TransportView {
            mode_label: self.mode.label(),
            length_label: self.format_length(duration, framerate),
            current_label: self.format_current(shown, framerate),
            slider_value: self.slider_value,
            slider_max,
            play_icon: if player.is_playing() {
                PlayIcon::Pause
            } else {
                PlayIcon::Play
            },
            loop_icon: if player.is_loop() {
                LoopIcon::On
            } else {
                LoopIcon::Off
            },
        }
    }

    pub fn press_slider<E: PlaybackEngine>(&mut self, player: &mut SyncPlayer<E>) {
        self.dragging = true;
        player.set_external_control(true);
    }

    /// Move the slider. Only previews while a drag is in progress.
    pub fn drag_slider<E: PlaybackEngine>(&mut self, player: &mut SyncPlayer<E>, value: f64) {
        self.slider_value = value;
        if self.dragging {
            player.preview_local_time(value);
        }
    }

    pub fn release_slider<E: PlaybackEngine>(&mut self, player: &mut SyncPlayer<E>) {
        if !self.dragging {
            return;
        }
        self.dragging = false;
        player.seek(self.slider_value);
        player.set_external_control(false);
    }

    pub fn click_play_pause<E: PlaybackEngine>(&self, player: &mut SyncPlayer<E>) -> bool {
        player.toggle_play_pause()
    }

    pub fn click_stop<E: PlaybackEngine>(&self, player: &mut SyncPlayer<E>) -> bool {
        player.stop()
    }

    pub fn click_loop<E: PlaybackEngine>(&self, player: &mut SyncPlayer<E>) -> bool {
        player.toggle_loop()
    }

    pub fn click_resync<E: PlaybackEngine>(&self, player: &mut SyncPlayer<E>) -> bool {
        player.resync()
    }

    fn format_length(&self, duration: f64, framerate: f64) -> String {
        match self.mode {
            DisplayMode::Frames => format!("{} f", to_frames(duration, framerate)),
            DisplayMode::Seconds => format!("{:.2}", duration),
        }
    }

    fn format_current(&self, t: f64, framerate: f64) -> String {
        match self.mode {
            DisplayMode::Frames => to_frames(t, framerate).to_string(),
            DisplayMode::Seconds => format!("{:.2}", t),
        }
    }
}

fn to_frames(t: f64, framerate: f64) -> i64 {
    (t * framerate).round() as i64
}
