use crate::config::{MoreKeysParams, TrackerParams};
use crate::detector::KeyDetector;
use crate::error::LayoutError;
use crate::layout::{KeyRef, KeyboardLayout, LayoutHandle};
use crate::listener::{DrawingProxy, GestureArbiter, KeyboardActionListener, TimerScheduler};
use crate::more_keys::{build_more_keys_keyboard, MoreKeysKeyboard};
use crate::panel::{MoreKeysPanel, PanelMove};
use crate::typing::{distance, BogusMoveDetector, TypingTimeRecorder};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Long press on a key reached by sliding from a modifier waits this many
/// times longer.
const LONG_PRESS_MULTIPLIER_IN_SLIDING_INPUT: u32 = 3;

/// Timer scheduler plus the pointers that have a shift long-press pending.
pub(crate) struct Timers {
    scheduler: Box<dyn TimerScheduler>,
    shift_long_press: Vec<PointerId>,
}

impl Timers {
    pub(crate) fn new(scheduler: Box<dyn TimerScheduler>) -> Self {
        Self {
            scheduler,
            shift_long_press: Vec::new(),
        }
    }

    fn start_long_press(&mut self, pointer: PointerId, delay: Duration, is_shift: bool) {
        self.scheduler.start_long_press(pointer, delay);
        if is_shift {
            self.shift_long_press.push(pointer);
        }
    }

    /// Any new long press supersedes every pending shift-lock timer.
    fn cancel_shift_long_press(&mut self) {
        for pointer in std::mem::take(&mut self.shift_long_press) {
            self.scheduler.cancel_long_press(pointer);
        }
    }

    fn cancel_long_press(&mut self, pointer: PointerId) {
        self.shift_long_press.retain(|&p| p != pointer);
        self.scheduler.cancel_long_press(pointer);
    }

    fn start_repeat(&mut self, pointer: PointerId, code: i32, repeat_count: u32, delay: Duration) {
        self.scheduler.start_repeat(pointer, code, repeat_count, delay);
    }

    pub(crate) fn cancel_key_timers(&mut self, pointer: PointerId) {
        self.shift_long_press.retain(|&p| p != pointer);
        self.scheduler.cancel_all(pointer);
    }
}

/// Popup keyboards built for keys of the current layout.
#[derive(Debug, Default)]
pub(crate) struct PanelCache {
    entries: HashMap<KeyId, Arc<MoreKeysKeyboard>>,
}

impl PanelCache {
    fn get_or_build(&mut self, parent: &KeyRef, params: &MoreKeysParams) -> Result<Arc<MoreKeysKeyboard>, LayoutError> {
        if let Some(keyboard) = self.entries.get(&parent.id()) {
            return Ok(keyboard.clone());
        }
        let keyboard = Arc::new(build_more_keys_keyboard(parent, parent.layout(), params)?);
        self.entries.insert(parent.id(), keyboard.clone());
        Ok(keyboard)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Work that touches other pointers, run by the owner once the current
/// pointer's handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deferred {
    CancelAllTracking,
    DismissAllPanels,
    /// Full up event for this pointer (older pointers released first), then
    /// stop tracking it.
    UpThenCancel { x: i32, y: i32, time: Instant },
    RemoveFromCoordinator,
}

/// Everything a pointer session may touch besides its own state.
pub(crate) struct SessionContext<'a> {
    pub params: &'a TrackerParams,
    pub more_keys_params: &'a MoreKeysParams,
    pub layout: &'a LayoutHandle,
    pub listener: &'a mut dyn KeyboardActionListener,
    pub timers: &'a mut Timers,
    pub arbiter: &'a mut dyn GestureArbiter,
    pub drawing: &'a mut dyn DrawingProxy,
    pub typing: &'a mut TypingTimeRecorder,
    pub panels: &'a mut PanelCache,
    pub in_gesture: &'a mut bool,
    pub handles_gesture: bool,
    pub active_pointers: usize,
    pub is_oldest: bool,
    pub has_older_modifier: bool,
    pub deferred: Vec<Deferred>,
}

/// Touch state of one pointer id. Pooled: reset on every down, never freed.
#[derive(Debug)]
pub struct PointerSession {
    id: PointerId,
    detector: KeyDetector,
    bogus_move: BogusMoveDetector,
    phantom_sudden_move_threshold: i32,

    current_key: Option<KeyRef>,
    // Where the current key was first recognised.
    key_x: i32,
    key_y: i32,
    last_x: i32,
    last_y: i32,
    down_time: Option<Instant>,
    down_x: i32,
    down_y: i32,
    up_time: Option<Instant>,

    is_detecting_gesture: bool,
    tracking_disabled: bool,
    is_allowed_dragging_finger: bool,
    is_in_dragging_finger: bool,
    is_sliding_from_modifier: bool,
    repeating_code: Option<i32>,
    long_press_key: Option<KeyRef>,
    panel: Option<MoreKeysPanel>,
}

impl PointerSession {
    pub(crate) fn new(id: PointerId, layout: Arc<KeyboardLayout>, params: &TrackerParams) -> Self {
        let mut session = Self {
            id,
            detector: KeyDetector::from_params(params),
            bogus_move: BogusMoveDetector::new(&params.noise_hacks),
            phantom_sudden_move_threshold: 0,
            current_key: None,
            key_x: 0,
            key_y: 0,
            last_x: 0,
            last_y: 0,
            down_time: None,
            down_x: 0,
            down_y: 0,
            up_time: None,
            is_detecting_gesture: false,
            // Nothing is tracked before the first down.
            tracking_disabled: true,
            is_allowed_dragging_finger: false,
            is_in_dragging_finger: false,
            is_sliding_from_modifier: false,
            repeating_code: None,
            long_press_key: None,
            panel: None,
        };
        session.set_layout(layout, params);
        session
    }

    pub fn id(&self) -> PointerId {
        self.id
    }

    pub fn current_key(&self) -> Option<&KeyRef> {
        self.current_key.as_ref()
    }

    pub fn layout(&self) -> Option<&Arc<KeyboardLayout>> {
        self.detector.layout()
    }

    pub fn is_modifier(&self) -> bool {
        self.current_key.as_ref().map_or(false, |key| key.is_modifier())
    }

    pub fn is_in_dragging_finger(&self) -> bool {
        self.is_in_dragging_finger
    }

    pub fn is_sliding_from_modifier(&self) -> bool {
        self.is_sliding_from_modifier
    }

    /// False once this stroke has been cancelled.
    pub fn is_in_operation(&self) -> bool {
        !self.tracking_disabled
    }

    pub fn is_detecting_gesture(&self) -> bool {
        self.is_detecting_gesture
    }

    pub fn repeating_code(&self) -> Option<i32> {
        self.repeating_code
    }

    pub fn down_time(&self) -> Option<Instant> {
        self.down_time
    }

    pub fn down_coordinates(&self) -> (i32, i32) {
        (self.down_x, self.down_y)
    }

    pub fn last_coordinates(&self) -> (i32, i32) {
        (self.last_x, self.last_y)
    }

    pub fn panel(&self) -> Option<&MoreKeysPanel> {
        self.panel.as_ref()
    }

    pub fn is_showing_panel(&self) -> bool {
        self.panel.is_some()
    }

    pub(crate) fn long_press_key(&self) -> Option<&KeyRef> {
        self.long_press_key.as_ref()
    }

    pub(crate) fn set_layout(&mut self, layout: Arc<KeyboardLayout>, params: &TrackerParams) {
        if self.detector.is_layout(&layout) {
            return;
        }
        let key_width = layout.most_common_key_width();
        let key_height = layout.most_common_key_height();
        self.phantom_sudden_move_threshold =
            (key_width as f32 * params.noise_hacks.phantom_sudden_move_threshold) as i32;
        self.bogus_move.set_keyboard_geometry(key_width, key_height);
        // The current key stays on the old layout until the next move or up.
        self.detector.set_layout(layout);
    }

    pub(crate) fn detect_key(&self, x: i32, y: i32) -> Option<KeyRef> {
        self.detector.detect_hit_key(x, y)
    }

    pub(crate) fn note_actual_down(&mut self, x: i32, y: i32) {
        self.bogus_move.on_actual_down(x, y);
    }

    pub(crate) fn note_up(&mut self, time: Instant) {
        self.up_time = Some(time);
    }

    /// Contact bounce: a down too soon and too close after the last up.
    pub(crate) fn is_bounce(&self, x: i32, y: i32, time: Instant, params: &TrackerParams) -> bool {
        let Some(up_time) = self.up_time else {
            return false;
        };
        let delta = time.saturating_duration_since(up_time);
        if delta >= params.touch_noise_threshold_time() {
            return false;
        }
        let dist = distance(x, y, self.last_x, self.last_y);
        if dist < params.touch_noise_threshold_distance {
            warn!(
                pointer = self.id,
                delta_ms = delta.as_millis() as u64,
                dist,
                "down ignored as potential noise"
            );
            return true;
        }
        false
    }

    pub(crate) fn cancel_tracking(&mut self) {
        if self.panel.is_some() {
            return;
        }
        self.tracking_disabled = true;
    }

    pub(crate) fn start_gesture_detection(&mut self, key: Option<&KeyRef>, x: i32, y: i32, time: Instant, cx: &mut SessionContext) {
        if !cx.handles_gesture {
            return;
        }
        // A gesture starts only from a non-modifier key of an alphabet layout.
        self.is_detecting_gesture = self.detector.layout().map_or(false, |l| l.is_alphabet())
            && key.map_or(false, |k| !k.is_modifier());
        if self.is_detecting_gesture {
            cx.arbiter.add_down_point(
                self.id,
                x,
                y,
                time,
                cx.typing.last_letter_typing_time(),
                cx.active_pointers,
            );
        }
    }

    // ---- listener calls -------------------------------------------------

    /// Report a press. Returns true if the host switched layouts in the
    /// callback; the detector then already points at the new layout.
    fn call_press(&mut self, key: &KeyRef, repeat_count: u32, time: Instant, cx: &mut SessionContext) -> bool {
        if *cx.in_gesture || self.is_detecting_gesture || self.tracking_disabled {
            return false;
        }
        if self.is_in_dragging_finger && key.is_modifier() {
            trace!(pointer = self.id, code = key.code, "press ignored while sliding");
            return false;
        }
        if !key.is_enabled() {
            return false;
        }
        cx.listener.on_press_key(key.code, repeat_count, cx.active_pointers == 1);
        cx.typing
            .on_press_key(key.code, key.is_modifier(), key.alt_code_while_typing(), time);
        let current = cx.layout.current();
        if self.detector.is_layout(&current) {
            return false;
        }
        debug!(pointer = self.id, "layout changed by press");
        self.set_layout(current, cx.params);
        true
    }

    fn call_code_input(&mut self, key: &KeyRef, code: i32, x: i32, y: i32, time: Instant, is_repeat: bool, cx: &mut SessionContext) {
        let ignore_modifier = self.is_in_dragging_finger && key.is_modifier();
        let alters_code = key.alt_code_while_typing() && cx.typing.is_typing_state(time);
        let code = match key.alt_code {
            Some(alt) if alters_code => alt,
            _ => code,
        };
        if ignore_modifier {
            return;
        }
        // A disabled key still answers with its alt code while typing.
        if !key.is_enabled() && !alters_code {
            return;
        }
        cx.typing.on_code_input(code, time);
        if code == CODE_OUTPUT_TEXT {
            if let Some(text) = key.output_text.as_deref() {
                cx.listener.on_text_input(text);
            }
        } else if code != CODE_UNSPECIFIED {
            if key.layout().has_proximity_chars_correction(code) {
                cx.listener.on_code_input(code, x, y, is_repeat);
            } else {
                cx.listener
                    .on_code_input(code, NOT_A_COORDINATE, NOT_A_COORDINATE, is_repeat);
            }
        }
    }

    fn call_release(&mut self, key: &KeyRef, code: i32, with_sliding: bool, cx: &mut SessionContext) {
        if *cx.in_gesture || self.is_detecting_gesture || self.tracking_disabled {
            return;
        }
        if self.is_in_dragging_finger && key.is_modifier() {
            return;
        }
        if key.is_enabled() {
            cx.listener.on_release_key(code, with_sliding);
        }
    }

    // ---- key graphics ---------------------------------------------------

    fn set_pressed_graphics(&self, key: Option<&KeyRef>, time: Instant, cx: &mut SessionContext) {
        let Some(key) = key else { return };
        let alters_code = key.alt_code_while_typing() && cx.typing.is_typing_state(time);
        if !key.is_enabled() && !alters_code {
            return;
        }
        let no_preview = *cx.in_gesture
            || (cx.handles_gesture && cx.typing.needs_to_suppress_key_preview_popup(time));
        key.set_pressed(true);
        cx.drawing.on_key_pressed(key, !no_preview && !key.flags.no_key_preview);
        let layout = key.layout();
        for id in companion_keys(key, alters_code) {
            layout.set_pressed(id, true);
            if let Some(companion) = layout.key(id) {
                cx.drawing.on_key_pressed(companion, false);
            }
        }
    }

    fn set_released_graphics(&self, key: Option<&KeyRef>, with_animation: bool, cx: &mut SessionContext) {
        let Some(key) = key else { return };
        key.set_pressed(false);
        cx.drawing.on_key_released(key, with_animation);
        let layout = key.layout();
        for id in companion_keys(key, key.alt_code_while_typing()) {
            layout.set_pressed(id, false);
            if let Some(companion) = layout.key(id) {
                cx.drawing.on_key_released(companion, false);
            }
        }
    }

    // ---- down -----------------------------------------------------------

    fn on_down_key(&mut self, x: i32, y: i32, time: Instant) -> Option<KeyRef> {
        self.down_time = Some(time);
        self.down_x = x;
        self.down_y = y;
        self.bogus_move.on_down_key();
        let key = self.on_move_key(x, y);
        self.on_move_to_new_key(key, x, y)
    }

    fn on_move_key(&mut self, x: i32, y: i32) -> Option<KeyRef> {
        self.bogus_move
            .on_move_key(distance(x, y, self.last_x, self.last_y));
        self.last_x = x;
        self.last_y = y;
        self.detector.detect_hit_key(x, y)
    }

    fn on_move_to_new_key(&mut self, key: Option<KeyRef>, x: i32, y: i32) -> Option<KeyRef> {
        self.current_key = key.clone();
        self.key_x = x;
        self.key_y = y;
        key
    }

    pub(crate) fn on_down_internal(&mut self, x: i32, y: i32, time: Instant, cx: &mut SessionContext) {
        let mut key = self.on_down_key(x, y, time);
        // Dragging selects keys when configured, when starting on a modifier,
        // or inside popup panels.
        self.is_allowed_dragging_finger = cx.params.key_selection_by_dragging_finger
            || key.as_ref().map_or(false, |k| k.is_modifier())
            || self.detector.always_allows_drag_selection();
        self.tracking_disabled = false;
        self.reset_dragging(cx);
        let Some(pressed) = key.clone() else { return };
        if self.call_press(&pressed, 0, time, cx) {
            key = self.on_down_key(x, y, time);
        }
        self.start_repeat_key(key.as_ref(), cx);
        self.start_long_press_timer(key.as_ref(), cx);
        self.set_pressed_graphics(key.as_ref(), time, cx);
    }

    fn start_dragging(&mut self, key: &KeyRef) {
        if !self.is_in_dragging_finger {
            self.is_sliding_from_modifier = key.is_modifier();
        }
        self.is_in_dragging_finger = true;
    }

    fn reset_dragging(&mut self, cx: &mut SessionContext) {
        self.is_in_dragging_finger = false;
        self.is_sliding_from_modifier = false;
        cx.drawing.show_sliding_key_input_preview(None);
    }

    // ---- gesture --------------------------------------------------------

    fn on_gesture_move(&mut self, x: i32, y: i32, time: Instant, is_major: bool, key: Option<&KeyRef>, cx: &mut SessionContext) {
        if !self.is_detecting_gesture {
            return;
        }
        if !cx.arbiter.add_move_point(self.id, x, y, time, is_major) {
            debug!(pointer = self.id, x, y, "gesture left the valid area");
            self.cancel_batch_input(cx);
            return;
        }
        // Points are still recorded while a panel is up, but no gesture starts.
        if self.panel.is_some() {
            return;
        }
        if !*cx.in_gesture
            && key.map_or(false, |k| is_alphabetic_code(k.code))
            && cx.arbiter.may_start(self.id)
        {
            *cx.in_gesture = true;
            self.on_start_batch_input(cx);
        }
        if *cx.in_gesture {
            if key.is_some() {
                if let Some(points) = cx.arbiter.update(self.id, time) {
                    trace!(pointer = self.id, points = points.len(), "batch input update");
                    cx.listener.on_update_batch_input(&points);
                }
            }
            self.show_gesture_trail(cx);
        }
    }

    fn on_start_batch_input(&mut self, cx: &mut SessionContext) {
        debug!(pointer = self.id, "batch input started");
        cx.listener.on_start_batch_input();
        cx.deferred.push(Deferred::DismissAllPanels);
        cx.timers.cancel_long_press(self.id);
        self.long_press_key = None;
    }

    pub(crate) fn cancel_batch_input(&mut self, cx: &mut SessionContext) {
        self.cancel_tracking();
        cx.deferred.push(Deferred::CancelAllTracking);
        self.is_detecting_gesture = false;
        if !*cx.in_gesture {
            return;
        }
        *cx.in_gesture = false;
        debug!(pointer = self.id, "batch input cancelled");
        cx.listener.on_cancel_batch_input();
    }

    fn show_gesture_trail(&self, cx: &mut SessionContext) {
        if self.tracking_disabled {
            return;
        }
        // The floating preview text follows the oldest finger.
        cx.drawing.show_gesture_trail(self.id, cx.is_oldest);
    }

    // ---- move -----------------------------------------------------------

    pub(crate) fn on_move_event(&mut self, x: i32, y: i32, time: Instant, cx: &mut SessionContext) {
        if self.tracking_disabled {
            return;
        }
        if let Some(panel) = self.panel.as_mut() {
            let (tx, ty) = (panel.translate_x(x), panel.translate_y(y));
            if panel.on_move(tx, ty, self.id) == PanelMove::Cancelled {
                debug!(pointer = self.id, "slid off more keys panel");
                self.dismiss_panel(cx);
                cx.deferred.push(Deferred::DismissAllPanels);
                self.cancel_tracking();
            }
            self.on_move_key(x, y);
            if self.is_sliding_from_modifier {
                cx.drawing.show_sliding_key_input_preview(Some(self.id));
            }
            return;
        }
        self.on_move_internal(x, y, time, cx);
    }

    fn on_move_internal(&mut self, x: i32, y: i32, time: Instant, cx: &mut SessionContext) {
        let (last_x, last_y) = (self.last_x, self.last_y);
        let old_key = self.current_key.clone();
        let new_key = self.on_move_key(x, y);

        if cx.handles_gesture {
            self.on_gesture_move(x, y, time, true, new_key.as_ref(), cx);
            if *cx.in_gesture {
                self.current_key = None;
                self.set_released_graphics(old_key.as_ref(), true, cx);
                return;
            }
        }

        match (new_key, old_key) {
            (Some(new_key), Some(old_key)) => {
                if self.is_major_enough_move(x, y, time, Some(&new_key), cx) {
                    self.drag_to_new_key(new_key, x, y, time, old_key, last_x, last_y, cx);
                }
            }
            (Some(new_key), None) => {
                // Slid onto a key from nowhere.
                self.drag_in_to_new_key(new_key, x, y, time, cx);
            }
            (None, Some(old_key)) => {
                if self.is_major_enough_move(x, y, time, None, cx) {
                    self.drag_out_of_key(&old_key, x, y, cx);
                }
            }
            (None, None) => {}
        }
        if self.is_sliding_from_modifier {
            cx.drawing.show_sliding_key_input_preview(Some(self.id));
        }
    }

    fn is_major_enough_move(&self, x: i32, y: i32, time: Instant, new_key: Option<&KeyRef>, cx: &SessionContext) -> bool {
        let Some(current) = self.current_key.as_ref() else {
            return new_key.is_some();
        };
        if new_key == Some(current) {
            return false;
        }
        let hysteresis_sq = self.detector.key_hysteresis_sq(self.is_sliding_from_modifier);
        let distance_sq = current.squared_distance_to_edge(x, y);
        if distance_sq >= hysteresis_sq {
            trace!(pointer = self.id, distance_sq, hysteresis_sq, "major move past key edge");
            return true;
        }
        if !self.is_allowed_dragging_finger
            && cx.typing.is_in_fast_typing(time)
            && self.bogus_move.has_traveled_long_distance(x, y)
        {
            debug!(
                pointer = self.id,
                travelled = self.bogus_move.accumulated_distance_from_down_key(),
                "major move by long travel while typing fast"
            );
            return true;
        }
        false
    }

    fn drag_in_to_new_key(&mut self, new_key: KeyRef, x: i32, y: i32, time: Instant, cx: &mut SessionContext) {
        let mut key = Some(new_key.clone());
        if self.call_press(&new_key, 0, time, cx) {
            key = self.on_move_key(x, y);
        }
        let key = self.on_move_to_new_key(key, x, y);
        if self.tracking_disabled {
            return;
        }
        self.start_long_press_timer(key.as_ref(), cx);
        self.set_pressed_graphics(key.as_ref(), time, cx);
    }

    fn release_old_key_for_slide(&mut self, old_key: &KeyRef, cx: &mut SessionContext) {
        self.set_released_graphics(Some(old_key), true, cx);
        self.call_release(old_key, old_key.code, true, cx);
        self.start_dragging(old_key);
        cx.timers.cancel_key_timers(self.id);
        self.long_press_key = None;
    }

    #[allow(clippy::too_many_arguments)]
    fn drag_to_new_key(
        &mut self,
        new_key: KeyRef,
        x: i32,
        y: i32,
        time: Instant,
        old_key: KeyRef,
        last_x: i32,
        last_y: i32,
        cx: &mut SessionContext,
    ) {
        // Release the old key before pressing the new one.
        self.release_old_key_for_slide(&old_key, cx);
        self.start_repeat_key(Some(&new_key), cx);
        if self.is_allowed_dragging_finger {
            self.drag_in_to_new_key(new_key, x, y, time, cx);
            return;
        }
        let hacks = &cx.params.noise_hacks;
        if hacks.phantom_sudden_move
            && distance(x, y, last_x, last_y) >= self.phantom_sudden_move_threshold
        {
            // Some panels report two quick taps as one sudden move.
            warn!(
                pointer = self.id,
                from = old_key.code,
                to = new_key.code,
                distance = distance(x, y, last_x, last_y),
                "phantom sudden move translated to up/down"
            );
            self.on_up_internal(x, y, time, cx);
            self.on_down_internal(x, y, time, cx);
        } else if cx.typing.is_in_fast_typing(time) && self.bogus_move.is_close_to_actual_down_event(x, y) {
            warn!(
                pointer = self.id,
                from = old_key.code,
                to = new_key.code,
                radius = self.bogus_move.distance_from_down_event(x, y),
                "bogus down-move-up translated to up/down"
            );
            self.on_up_internal(x, y, time, cx);
            self.on_down_internal(x, y, time, cx);
        } else if cx.active_pointers > 1 && !cx.has_older_modifier {
            // Close multi-touch is noisy: keep the old key and end this stroke.
            debug!(pointer = self.id, "sliding finger while multi touching");
            cx.deferred.push(Deferred::UpThenCancel { x, y, time });
            self.set_released_graphics(Some(&old_key), true, cx);
        } else {
            if !self.is_detecting_gesture {
                self.cancel_tracking();
            }
            self.set_released_graphics(Some(&old_key), true, cx);
        }
    }

    fn drag_out_of_key(&mut self, old_key: &KeyRef, x: i32, y: i32, cx: &mut SessionContext) {
        self.release_old_key_for_slide(old_key, cx);
        if self.is_allowed_dragging_finger {
            self.on_move_to_new_key(None, x, y);
        } else if !self.is_detecting_gesture {
            self.cancel_tracking();
        }
    }

    // ---- up / cancel ----------------------------------------------------

    /// Up of a pointer forced out by another one: keep the key down visually,
    /// emit as if lifted at the last point, then stop tracking.
    pub(crate) fn on_phantom_up(&mut self, time: Instant, cx: &mut SessionContext) {
        trace!(pointer = self.id, "phantom up");
        self.on_up_internal(self.last_x, self.last_y, time, cx);
        self.cancel_tracking();
    }

    pub(crate) fn on_up_internal(&mut self, x: i32, y: i32, time: Instant, cx: &mut SessionContext) {
        cx.timers.cancel_key_timers(self.id);
        self.long_press_key = None;
        let was_dragging = self.is_in_dragging_finger;
        let was_sliding_from_modifier = self.is_sliding_from_modifier;
        self.reset_dragging(cx);
        self.is_detecting_gesture = false;
        let current = self.current_key.take();
        let repeating_code = self.repeating_code.take();
        self.set_released_graphics(current.as_ref(), true, cx);

        if let Some(mut panel) = self.panel.take() {
            if !self.tracking_disabled {
                let (tx, ty) = (panel.translate_x(x), panel.translate_y(y));
                panel.on_up(tx, ty, self.id, &mut *cx.listener);
            }
            panel.dismiss();
            cx.drawing.on_dismiss_more_keys_panel();
            return;
        }

        if *cx.in_gesture {
            if let Some(points) = cx.arbiter.may_end(self.id, time, cx.active_pointers) {
                *cx.in_gesture = false;
                cx.typing.on_end_batch_input(time);
                if !self.tracking_disabled {
                    debug!(pointer = self.id, points = points.len(), "batch input ended");
                    cx.listener.on_end_batch_input(&points);
                }
            }
            self.show_gesture_trail(cx);
            return;
        }

        if self.tracking_disabled {
            return;
        }
        // The repeats already produced the input.
        if let Some(key) = current.as_ref() {
            if key.is_repeatable() && Some(key.code) == repeating_code && !was_dragging {
                return;
            }
        }
        self.detect_and_send_key(current.as_ref(), self.key_x, self.key_y, time, cx);
        if was_sliding_from_modifier {
            cx.listener.on_finish_sliding_input();
        }
    }

    fn detect_and_send_key(&mut self, key: Option<&KeyRef>, x: i32, y: i32, time: Instant, cx: &mut SessionContext) {
        let Some(key) = key else {
            cx.listener.on_cancel_input();
            return;
        };
        let code = key.code;
        self.call_code_input(key, code, x, y, time, false, cx);
        self.call_release(key, code, false, cx);
    }

    pub(crate) fn on_cancel_internal(&mut self, cx: &mut SessionContext) {
        cx.timers.cancel_key_timers(self.id);
        self.long_press_key = None;
        self.set_released_graphics(self.current_key.as_ref(), true, cx);
        self.reset_dragging(cx);
        self.dismiss_panel(cx);
        self.tracking_disabled = true;
    }

    pub(crate) fn dismiss_panel(&mut self, cx: &mut SessionContext) {
        if let Some(mut panel) = self.panel.take() {
            panel.dismiss();
            cx.drawing.on_dismiss_more_keys_panel();
        }
    }

    /// Drop out of the coordinator without emitting anything more.
    fn cancel_key_tracking(&mut self, cx: &mut SessionContext) {
        self.reset_dragging(cx);
        self.cancel_tracking();
        self.set_released_graphics(self.current_key.as_ref(), true, cx);
        cx.deferred.push(Deferred::RemoveFromCoordinator);
    }

    // ---- timers ---------------------------------------------------------

    fn long_press_timeout(&self, code: i32, params: &TrackerParams) -> Duration {
        if code == CODE_SHIFT {
            return params.long_press_shift_lock_timeout();
        }
        if self.is_sliding_from_modifier {
            return params.long_press_timeout() * LONG_PRESS_MULTIPLIER_IN_SLIDING_INPUT;
        }
        params.long_press_timeout()
    }

    fn start_long_press_timer(&mut self, key: Option<&KeyRef>, cx: &mut SessionContext) {
        cx.timers.cancel_shift_long_press();
        if *cx.in_gesture {
            return;
        }
        let Some(key) = key else { return };
        if !key.is_long_press_enabled() {
            return;
        }
        // Space and the globe key long-press without more keys; not while dragging.
        if self.is_in_dragging_finger && key.more_keys.is_none() {
            return;
        }
        let delay = self.long_press_timeout(key.code, cx.params);
        if delay.is_zero() {
            return;
        }
        cx.timers.start_long_press(self.id, delay, key.code == CODE_SHIFT);
        self.long_press_key = Some(key.clone());
    }

    fn start_repeat_key(&mut self, key: Option<&KeyRef>, cx: &mut SessionContext) {
        if *cx.in_gesture || self.is_in_dragging_finger {
            return;
        }
        let Some(key) = key else { return };
        if !key.is_repeatable() {
            return;
        }
        self.start_key_repeat_timer(key.code, 1, cx);
    }

    fn start_key_repeat_timer(&mut self, code: i32, repeat_count: u32, cx: &mut SessionContext) {
        let delay = if repeat_count == 1 {
            cx.params.key_repeat_start_timeout()
        } else {
            cx.params.key_repeat_interval()
        };
        cx.timers.start_repeat(self.id, code, repeat_count, delay);
    }

    pub(crate) fn on_key_repeat(&mut self, code: i32, repeat_count: u32, time: Instant, cx: &mut SessionContext) {
        let key = match self.current_key.clone() {
            Some(key) if key.code == code && !self.tracking_disabled => key,
            _ => {
                self.repeating_code = None;
                return;
            }
        };
        self.repeating_code = Some(code);
        self.is_detecting_gesture = false;
        self.start_key_repeat_timer(code, repeat_count + 1, cx);
        self.call_press(&key, repeat_count, time, cx);
        let (key_x, key_y) = (self.key_x, self.key_y);
        self.call_code_input(&key, code, key_x, key_y, time, true, cx);
    }

    pub(crate) fn on_long_pressed(&mut self, cx: &mut SessionContext) -> Result<(), LayoutError> {
        cx.timers.cancel_long_press(self.id);
        self.long_press_key = None;
        if self.panel.is_some() || self.tracking_disabled {
            return Ok(());
        }
        let Some(key) = self.current_key.clone() else {
            return Ok(());
        };

        if key.has_no_panel_auto_more_key() {
            if let Some(code) = key.more_keys.as_ref().and_then(|specs| specs.first()).map(|spec| spec.code) {
                debug!(pointer = self.id, parent = key.code, code, "long press auto more key");
                self.cancel_key_tracking(cx);
                cx.listener.on_press_key(code, 0, true);
                cx.listener
                    .on_code_input(code, NOT_A_COORDINATE, NOT_A_COORDINATE, false);
                cx.listener.on_release_key(code, false);
                return Ok(());
            }
        }

        let code = key.code;
        if code == CODE_LANGUAGE_SWITCH || (code == CODE_SPACE && cx.params.space_long_press_shows_picker) {
            if cx.listener.on_custom_request(CUSTOM_CODE_SHOW_INPUT_METHOD_PICKER) {
                debug!(pointer = self.id, code, "long press opened the input method picker");
                self.cancel_key_tracking(cx);
                cx.listener.on_release_key(code, false);
                return Ok(());
            }
        }

        if key.more_keys.is_none() {
            return Ok(());
        }
        let keyboard = cx.panels.get_or_build(&key, cx.more_keys_params)?;
        self.set_released_graphics(Some(&key), false, cx);
        let mut panel = MoreKeysPanel::show(
            keyboard,
            &key,
            key.layout(),
            cx.params.more_keys_slide_allowance,
            cx.more_keys_params.vertical_offset,
        );
        cx.drawing
            .on_show_more_keys_panel(panel.keyboard(), panel.origin());
        panel.on_down(panel.translate_x(self.last_x), panel.translate_y(self.last_y), self.id);
        self.panel = Some(panel);
        Ok(())
    }
}

/// Keys drawn together with `key`: the other shift keys, and the key the
/// alt code would produce.
fn companion_keys(key: &KeyRef, with_alt_code: bool) -> Vec<KeyId> {
    let layout = key.layout();
    let mut ids = Vec::new();
    if key.code == CODE_SHIFT {
        ids.extend(
            layout
                .keys()
                .iter()
                .enumerate()
                .filter(|&(id, other)| other.code == CODE_SHIFT && id != key.id())
                .map(|(id, _)| id),
        );
    }
    if with_alt_code {
        if let Some(id) = key.alt_code.and_then(|alt| layout.key_for_code(alt)) {
            if id != key.id() {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutBuilder, LayoutParams};
    use crate::key::KeyGeometry;
    use crate::listener::{ChannelTimer, TimerRequest};

    fn layout() -> Arc<KeyboardLayout> {
        let mut b = LayoutBuilder::new(LayoutParams {
            width: 200,
            height: 100,
            ..LayoutParams::default()
        });
        b.start_row(None);
        for c in ['a', 'b'] {
            let (x, y, w, h) = b.next_cell(100);
            b.add_key(KeyGeometry::new(c as i32, Some(c.to_string()), x, y, w, h, 0, 0));
        }
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn test_new_long_press_cancels_pending_shift_timers() {
        let (timer, rx) = ChannelTimer::unbounded();
        let mut timers = Timers::new(Box::new(timer));
        timers.start_long_press(0, Duration::from_millis(1200), true);
        timers.start_long_press(1, Duration::from_millis(300), false);
        timers.cancel_shift_long_press();
        timers.cancel_shift_long_press();
        let got: Vec<TimerRequest> = rx.try_iter().collect();
        assert_eq!(got.len(), 3);
        assert_eq!(got[2], TimerRequest::CancelLongPress { pointer: 0 });
    }

    #[test]
    fn test_bounce_needs_recent_close_up() {
        let params = TrackerParams::default();
        let mut session = PointerSession::new(0, layout(), &params);
        let t0 = Instant::now();
        assert!(!session.is_bounce(50, 50, t0, &params));

        session.note_up(t0);
        assert!(session.is_bounce(5, 5, t0 + Duration::from_millis(10), &params));
        assert!(!session.is_bounce(90, 50, t0 + Duration::from_millis(10), &params));
        assert!(!session.is_bounce(5, 5, t0 + Duration::from_millis(40), &params));
    }

    #[test]
    fn test_fresh_session_tracks_nothing() {
        let session = PointerSession::new(3, layout(), &TrackerParams::default());
        assert!(!session.is_in_operation());
        assert!(session.current_key().is_none());
        assert_eq!(session.detect_key(150, 50).map(|k| k.code), Some('b' as i32));
    }
}
