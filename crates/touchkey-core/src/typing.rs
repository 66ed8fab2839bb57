use crate::config::{NoiseHacks, TrackerParams};
use crate::types::*;
use std::time::{Duration, Instant};

/// Remembers when the user last typed, to tell fast typing apart from
/// deliberate strokes.
#[derive(Debug, Clone)]
pub struct TypingTimeRecorder {
    static_time_threshold_after_fast_typing: Duration,
    suppress_key_preview_after_batch_input: Duration,
    ignore_alt_code_key_timeout: Duration,
    last_typing_time: Option<Instant>,
    last_letter_typing_time: Option<Instant>,
    last_batch_input_time: Option<Instant>,
    typing_state_until: Option<Instant>,
}

impl TypingTimeRecorder {
    pub fn new(params: &TrackerParams) -> Self {
        Self {
            static_time_threshold_after_fast_typing: params.static_time_threshold_after_fast_typing(),
            suppress_key_preview_after_batch_input: params.suppress_key_preview_after_batch_input(),
            ignore_alt_code_key_timeout: params.ignore_alt_code_key_timeout(),
            last_typing_time: None,
            last_letter_typing_time: None,
            last_batch_input_time: None,
            typing_state_until: None,
        }
    }

    fn within(&self, since: Option<Instant>, now: Instant) -> bool {
        since.map_or(false, |t| {
            now.saturating_duration_since(t) < self.static_time_threshold_after_fast_typing
        })
    }

    pub fn is_in_fast_typing(&self, now: Instant) -> bool {
        self.within(self.last_letter_typing_time, now)
    }

    fn was_last_input_typing(&self) -> bool {
        self.last_typing_time >= self.last_batch_input_time
    }

    pub fn on_code_input(&mut self, code: i32, now: Instant) {
        if is_alphabetic_code(code) {
            // Successive letters, or a letter soon after any key.
            if self.was_last_input_typing() || self.within(self.last_typing_time, now) {
                self.last_letter_typing_time = Some(now);
            }
        } else if self.within(self.last_letter_typing_time, now) {
            // A symbol in the middle of fast typing is part of it.
            self.last_letter_typing_time = Some(now);
        }
        self.last_typing_time = Some(now);
    }

    pub fn on_end_batch_input(&mut self, now: Instant) {
        self.last_batch_input_time = Some(now);
    }

    pub fn last_letter_typing_time(&self) -> Option<Instant> {
        self.last_letter_typing_time
    }

    pub fn needs_to_suppress_key_preview_popup(&self, now: Instant) -> bool {
        !self.was_last_input_typing()
            && self.last_batch_input_time.map_or(false, |t| {
                now.saturating_duration_since(t) < self.suppress_key_preview_after_batch_input
            })
    }

    /// Track the "while typing" state that swaps keys to their alt code.
    /// Space and enter end it; modifiers and alt-code keys leave it alone.
    pub fn on_press_key(&mut self, code: i32, is_modifier: bool, alt_code_while_typing: bool, now: Instant) {
        if is_modifier || alt_code_while_typing {
            return;
        }
        if code == CODE_SPACE || code == CODE_ENTER {
            self.typing_state_until = None;
            return;
        }
        self.typing_state_until = Some(now + self.ignore_alt_code_key_timeout);
    }

    pub fn is_typing_state(&self, now: Instant) -> bool {
        self.typing_state_until.map_or(false, |until| now < until)
    }
}

/// Detects move events that are really a new tap on flaky touch panels.
#[derive(Debug, Clone, Default)]
pub struct BogusMoveDetector {
    enabled: bool,
    accumulated_ratio: f32,
    radius_ratio: f32,
    accumulated_distance_threshold: i32,
    radius_threshold: i32,
    accumulated_distance_from_down_key: i32,
    actual_down_x: i32,
    actual_down_y: i32,
}

impl BogusMoveDetector {
    pub fn new(hacks: &NoiseHacks) -> Self {
        Self {
            enabled: hacks.proximate_bogus_down_move_up,
            accumulated_ratio: hacks.bogus_move_accumulated_distance_threshold,
            radius_ratio: hacks.bogus_move_radius_threshold,
            ..Self::default()
        }
    }

    pub fn set_keyboard_geometry(&mut self, key_width: i32, key_height: i32) {
        let diagonal = (key_width as f32).hypot(key_height as f32);
        self.accumulated_distance_threshold = (diagonal * self.accumulated_ratio) as i32;
        self.radius_threshold = (diagonal * self.radius_ratio) as i32;
    }

    pub fn on_actual_down(&mut self, x: i32, y: i32) {
        self.actual_down_x = x;
        self.actual_down_y = y;
    }

    pub fn on_down_key(&mut self) {
        self.accumulated_distance_from_down_key = 0;
    }

    pub fn on_move_key(&mut self, distance: i32) {
        self.accumulated_distance_from_down_key += distance;
    }

    pub fn accumulated_distance_from_down_key(&self) -> i32 {
        self.accumulated_distance_from_down_key
    }

    /// Mostly horizontal travel over a long distance since the down key.
    pub fn has_traveled_long_distance(&self, x: i32, y: i32) -> bool {
        if !self.enabled {
            return false;
        }
        let dx = (x - self.actual_down_x).abs();
        let dy = (y - self.actual_down_y).abs();
        dx >= dy && self.accumulated_distance_from_down_key >= self.accumulated_distance_threshold
    }

    pub fn distance_from_down_event(&self, x: i32, y: i32) -> i32 {
        distance(x, y, self.actual_down_x, self.actual_down_y)
    }

    pub fn is_close_to_actual_down_event(&self, x: i32, y: i32) -> bool {
        self.enabled && self.distance_from_down_event(x, y) < self.radius_threshold
    }
}

pub(crate) fn distance(x1: i32, y1: i32, x2: i32, y2: i32) -> i32 {
    ((x1 - x2) as f32).hypot((y1 - y2) as f32) as i32
}
