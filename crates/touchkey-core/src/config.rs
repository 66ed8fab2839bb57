use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device-specific noise compensations. Thresholds are ratios of the most
/// common key size; they tune heuristic quality, not correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseHacks {
    /// Treat a too-large jump between two moves as up + down.
    #[serde(default)]
    pub phantom_sudden_move: bool,
    /// Jump threshold as a ratio of the most common key width.
    #[serde(default = "default_phantom_sudden_move_threshold")]
    pub phantom_sudden_move_threshold: f32,

    /// Treat a fast down-move-up cluster near the down point as up + down.
    #[serde(default)]
    pub proximate_bogus_down_move_up: bool,
    /// Ratio of the key diagonal.
    #[serde(default = "default_bogus_move_accumulated_distance_threshold")]
    pub bogus_move_accumulated_distance_threshold: f32,
    /// Ratio of the key diagonal.
    #[serde(default = "default_bogus_move_radius_threshold")]
    pub bogus_move_radius_threshold: f32,
}

fn default_phantom_sudden_move_threshold() -> f32 {
    0.25
}

fn default_bogus_move_accumulated_distance_threshold() -> f32 {
    0.53
}

fn default_bogus_move_radius_threshold() -> f32 {
    1.14
}

impl Default for NoiseHacks {
    fn default() -> Self {
        Self {
            phantom_sudden_move: false,
            phantom_sudden_move_threshold: 0.25,
            proximate_bogus_down_move_up: false,
            bogus_move_accumulated_distance_threshold: 0.53,
            bogus_move_radius_threshold: 1.14,
        }
    }
}

/// Tunables for pointer tracking. Distances are keyboard pixels, times are
/// milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    /// Sliding onto another key selects it instead of cancelling.
    #[serde(default)]
    pub key_selection_by_dragging_finger: bool,

    #[serde(default = "default_touch_noise_threshold_time_ms")]
    pub touch_noise_threshold_time_ms: u64,
    #[serde(default = "default_touch_noise_threshold_distance")]
    pub touch_noise_threshold_distance: i32,

    #[serde(default = "default_key_repeat_start_timeout_ms")]
    pub key_repeat_start_timeout_ms: u64,
    #[serde(default = "default_key_repeat_interval_ms")]
    pub key_repeat_interval_ms: u64,

    #[serde(default = "default_long_press_timeout_ms")]
    pub long_press_timeout_ms: u64,
    #[serde(default = "default_long_press_shift_lock_timeout_ms")]
    pub long_press_shift_lock_timeout_ms: u64,
    /// Long-pressing space opens the input method picker too.
    #[serde(default)]
    pub space_long_press_shows_picker: bool,

    #[serde(default = "default_key_hysteresis_distance")]
    pub key_hysteresis_distance: i32,
    #[serde(default = "default_key_hysteresis_distance_for_sliding_modifier")]
    pub key_hysteresis_distance_for_sliding_modifier: i32,

    /// Extra reach of popup keys beyond their edges.
    #[serde(default = "default_more_keys_slide_allowance")]
    pub more_keys_slide_allowance: i32,

    #[serde(default)]
    pub gesture_enabled: bool,
    #[serde(default = "default_static_time_threshold_after_fast_typing_ms")]
    pub static_time_threshold_after_fast_typing_ms: u64,
    #[serde(default = "default_suppress_key_preview_after_batch_input_ms")]
    pub suppress_key_preview_after_batch_input_ms: u64,
    /// How long after typing a letter keys with an alt code keep emitting it.
    #[serde(default = "default_ignore_alt_code_key_timeout_ms")]
    pub ignore_alt_code_key_timeout_ms: u64,

    /// Per-axis offset applied to every touch before hit-testing.
    #[serde(default)]
    pub key_detector_correction: (i32, i32),

    #[serde(default)]
    pub noise_hacks: NoiseHacks,
}

fn default_touch_noise_threshold_time_ms() -> u64 {
    40
}

fn default_touch_noise_threshold_distance() -> i32 {
    12
}

fn default_key_repeat_start_timeout_ms() -> u64 {
    400
}

fn default_key_repeat_interval_ms() -> u64 {
    50
}

fn default_long_press_timeout_ms() -> u64 {
    300
}

fn default_long_press_shift_lock_timeout_ms() -> u64 {
    1200
}

fn default_key_hysteresis_distance() -> i32 {
    20
}

fn default_key_hysteresis_distance_for_sliding_modifier() -> i32 {
    30
}

fn default_more_keys_slide_allowance() -> i32 {
    40
}

fn default_static_time_threshold_after_fast_typing_ms() -> u64 {
    350
}

fn default_suppress_key_preview_after_batch_input_ms() -> u64 {
    1000
}

fn default_ignore_alt_code_key_timeout_ms() -> u64 {
    350
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            key_selection_by_dragging_finger: false,
            touch_noise_threshold_time_ms: 40,
            touch_noise_threshold_distance: 12,
            key_repeat_start_timeout_ms: 400,
            key_repeat_interval_ms: 50,
            long_press_timeout_ms: 300,
            long_press_shift_lock_timeout_ms: 1200,
            space_long_press_shows_picker: false,
            key_hysteresis_distance: 20,
            key_hysteresis_distance_for_sliding_modifier: 30,
            more_keys_slide_allowance: 40,
            gesture_enabled: false,
            static_time_threshold_after_fast_typing_ms: 350,
            suppress_key_preview_after_batch_input_ms: 1000,
            ignore_alt_code_key_timeout_ms: 350,
            key_detector_correction: (0, 0),
            noise_hacks: NoiseHacks::default(),
        }
    }
}

impl TrackerParams {
    pub fn touch_noise_threshold_time(&self) -> Duration {
        Duration::from_millis(self.touch_noise_threshold_time_ms)
    }

    pub fn key_repeat_start_timeout(&self) -> Duration {
        Duration::from_millis(self.key_repeat_start_timeout_ms)
    }

    pub fn key_repeat_interval(&self) -> Duration {
        Duration::from_millis(self.key_repeat_interval_ms)
    }

    pub fn long_press_timeout(&self) -> Duration {
        Duration::from_millis(self.long_press_timeout_ms)
    }

    pub fn long_press_shift_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.long_press_shift_lock_timeout_ms)
    }

    pub fn static_time_threshold_after_fast_typing(&self) -> Duration {
        Duration::from_millis(self.static_time_threshold_after_fast_typing_ms)
    }

    pub fn suppress_key_preview_after_batch_input(&self) -> Duration {
        Duration::from_millis(self.suppress_key_preview_after_batch_input_ms)
    }

    pub fn ignore_alt_code_key_timeout(&self) -> Duration {
        Duration::from_millis(self.ignore_alt_code_key_timeout_ms)
    }
}

/// Popup panel sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoreKeysParams {
    /// Divider width as a ratio of the key width.
    #[serde(default = "default_divider_ratio")]
    pub divider_ratio: f32,
    /// Extra width for labelled popup keys, as a ratio of the key width.
    #[serde(default = "default_label_padding_ratio")]
    pub label_padding_ratio: f32,
    /// Offset added to the parent key's top when anchoring the panel.
    #[serde(default)]
    pub vertical_offset: i32,
}

fn default_divider_ratio() -> f32 {
    0.2
}

fn default_label_padding_ratio() -> f32 {
    0.2
}

impl Default for MoreKeysParams {
    fn default() -> Self {
        Self {
            divider_ratio: 0.2,
            label_padding_ratio: 0.2,
            vertical_offset: 0,
        }
    }
}

/// Eviction policy of the layout cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Total number of layouts kept.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Most recently used alphabetic layouts that are never evicted.
    #[serde(default = "default_pinned_alphabet_layouts")]
    pub pinned_alphabet_layouts: usize,
}

fn default_cache_capacity() -> usize {
    16
}

fn default_pinned_alphabet_layouts() -> usize {
    4
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            capacity: 16,
            pinned_alphabet_layouts: 4,
        }
    }
}
