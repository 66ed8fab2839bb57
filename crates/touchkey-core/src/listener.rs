//! Collaborator boundaries of the input core.
//!
//! The core never inserts text, draws, or sleeps. It reports decisions to a
//! [`KeyboardActionListener`], asks a [`TimerScheduler`] for delayed
//! callbacks, and delegates stroke recognition to a [`GestureArbiter`].

use crate::key::KeyGeometry;
use crate::more_keys::MoreKeysKeyboard;
use crate::types::PointerId;
use crossbeam_channel::{Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::debug;

/// One sampled point of a gesture stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GesturePoint {
    pub pointer: PointerId,
    pub x: i32,
    pub y: i32,
    pub time: Instant,
}

/// Receives key decisions. Every method defaults to a no-op so hosts only
/// implement what they consume.
pub trait KeyboardActionListener: Send {
    fn on_press_key(&mut self, _code: i32, _repeat_count: u32, _is_single_pointer: bool) {}
    fn on_release_key(&mut self, _code: i32, _with_sliding: bool) {}
    fn on_code_input(&mut self, _code: i32, _x: i32, _y: i32, _is_key_repeat: bool) {}
    fn on_text_input(&mut self, _text: &str) {}
    fn on_start_batch_input(&mut self) {}
    fn on_update_batch_input(&mut self, _points: &[GesturePoint]) {}
    fn on_end_batch_input(&mut self, _points: &[GesturePoint]) {}
    fn on_cancel_batch_input(&mut self) {}
    fn on_cancel_input(&mut self) {}
    fn on_finish_sliding_input(&mut self) {}
    /// Returns true if the host handled the request.
    fn on_custom_request(&mut self, _request_code: i32) -> bool {
        false
    }
}

/// Listener that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl KeyboardActionListener for NullListener {}

/// Listener callbacks as values, for hosts that consume them off-thread.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Press { code: i32, repeat_count: u32, is_single_pointer: bool },
    Release { code: i32, with_sliding: bool },
    Code { code: i32, x: i32, y: i32, is_key_repeat: bool },
    Text(String),
    StartBatch,
    UpdateBatch(Vec<GesturePoint>),
    EndBatch(Vec<GesturePoint>),
    CancelBatch,
    CancelInput,
    FinishSliding,
    Custom(i32),
}

/// Forwards every callback over a channel.
///
/// Custom requests are forwarded too and answered with a fixed reply, since
/// the receiving side cannot respond synchronously.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: Sender<KeyAction>,
    accepts_custom_requests: bool,
}

impl ChannelListener {
    pub fn new(tx: Sender<KeyAction>) -> Self {
        Self {
            tx,
            accepts_custom_requests: false,
        }
    }

    /// Unbounded channel pair.
    pub fn unbounded() -> (Self, Receiver<KeyAction>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    pub fn accepting_custom_requests(mut self, accepts: bool) -> Self {
        self.accepts_custom_requests = accepts;
        self
    }

    fn send(&self, action: KeyAction) {
        // A closed receiver means the host is shutting down.
        if let Err(err) = self.tx.send(action) {
            debug!("key action dropped, receiver closed: {:?}", err.into_inner());
        }
    }
}

impl KeyboardActionListener for ChannelListener {
    fn on_press_key(&mut self, code: i32, repeat_count: u32, is_single_pointer: bool) {
        self.send(KeyAction::Press {
            code,
            repeat_count,
            is_single_pointer,
        });
    }

    fn on_release_key(&mut self, code: i32, with_sliding: bool) {
        self.send(KeyAction::Release { code, with_sliding });
    }

    fn on_code_input(&mut self, code: i32, x: i32, y: i32, is_key_repeat: bool) {
        self.send(KeyAction::Code {
            code,
            x,
            y,
            is_key_repeat,
        });
    }

    fn on_text_input(&mut self, text: &str) {
        self.send(KeyAction::Text(text.to_string()));
    }

    fn on_start_batch_input(&mut self) {
        self.send(KeyAction::StartBatch);
    }

    fn on_update_batch_input(&mut self, points: &[GesturePoint]) {
        self.send(KeyAction::UpdateBatch(points.to_vec()));
    }

    fn on_end_batch_input(&mut self, points: &[GesturePoint]) {
        self.send(KeyAction::EndBatch(points.to_vec()));
    }

    fn on_cancel_batch_input(&mut self) {
        self.send(KeyAction::CancelBatch);
    }

    fn on_cancel_input(&mut self) {
        self.send(KeyAction::CancelInput);
    }

    fn on_finish_sliding_input(&mut self) {
        self.send(KeyAction::FinishSliding);
    }

    fn on_custom_request(&mut self, request_code: i32) -> bool {
        self.send(KeyAction::Custom(request_code));
        self.accepts_custom_requests
    }
}

/// Schedules delayed callbacks. When a timer fires the host calls
/// `InputSession::on_long_press_timeout` or `InputSession::on_key_repeat_timeout`.
pub trait TimerScheduler: Send {
    fn start_long_press(&mut self, pointer: PointerId, delay: Duration);
    fn start_repeat(&mut self, pointer: PointerId, code: i32, repeat_count: u32, delay: Duration);
    fn cancel_long_press(&mut self, pointer: PointerId);
    fn cancel_repeat(&mut self, pointer: PointerId);
    fn cancel_all(&mut self, pointer: PointerId) {
        self.cancel_long_press(pointer);
        self.cancel_repeat(pointer);
    }
}

/// Timer requests as values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    StartLongPress { pointer: PointerId, delay: Duration },
    StartRepeat { pointer: PointerId, code: i32, repeat_count: u32, delay: Duration },
    CancelLongPress { pointer: PointerId },
    CancelRepeat { pointer: PointerId },
    CancelAll { pointer: PointerId },
}

/// Forwards timer requests to the host event loop over a channel.
#[derive(Debug, Clone)]
pub struct ChannelTimer {
    tx: Sender<TimerRequest>,
}

impl ChannelTimer {
    pub fn new(tx: Sender<TimerRequest>) -> Self {
        Self { tx }
    }

    pub fn unbounded() -> (Self, Receiver<TimerRequest>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    fn send(&self, request: TimerRequest) {
        if let Err(err) = self.tx.send(request) {
            debug!("timer request dropped, receiver closed: {:?}", err.into_inner());
        }
    }
}

impl TimerScheduler for ChannelTimer {
    fn start_long_press(&mut self, pointer: PointerId, delay: Duration) {
        self.send(TimerRequest::StartLongPress { pointer, delay });
    }

    fn start_repeat(&mut self, pointer: PointerId, code: i32, repeat_count: u32, delay: Duration) {
        self.send(TimerRequest::StartRepeat {
            pointer,
            code,
            repeat_count,
            delay,
        });
    }

    fn cancel_long_press(&mut self, pointer: PointerId) {
        self.send(TimerRequest::CancelLongPress { pointer });
    }

    fn cancel_repeat(&mut self, pointer: PointerId) {
        self.send(TimerRequest::CancelRepeat { pointer });
    }

    fn cancel_all(&mut self, pointer: PointerId) {
        self.send(TimerRequest::CancelAll { pointer });
    }
}

/// Decides when a stroke becomes a gesture and aggregates its points.
///
/// One arbiter serves every pointer; gestures may span several fingers.
pub trait GestureArbiter: Send {
    fn set_keyboard_geometry(&mut self, _key_width: i32, _keyboard_height: i32) {}
    fn add_down_point(
        &mut self,
        pointer: PointerId,
        x: i32,
        y: i32,
        time: Instant,
        last_letter_typing_time: Option<Instant>,
        active_pointers: usize,
    );
    /// Returns false once the stroke leaves the valid gesture area.
    fn add_move_point(&mut self, pointer: PointerId, x: i32, y: i32, time: Instant, is_major_event: bool) -> bool;
    /// True when the stroke of `pointer` is recognised as a gesture start.
    fn may_start(&mut self, pointer: PointerId) -> bool;
    /// Aggregated points to report, if an update is due.
    fn update(&mut self, pointer: PointerId, time: Instant) -> Option<Vec<GesturePoint>>;
    /// Final points if the gesture ends with this up.
    fn may_end(&mut self, pointer: PointerId, time: Instant, active_pointers: usize) -> Option<Vec<GesturePoint>>;
}

/// Arbiter for hosts without gesture typing: no stroke ever starts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGesture;

impl GestureArbiter for NoGesture {
    fn add_down_point(&mut self, _: PointerId, _: i32, _: i32, _: Instant, _: Option<Instant>, _: usize) {}

    fn add_move_point(&mut self, _: PointerId, _: i32, _: i32, _: Instant, _: bool) -> bool {
        true
    }

    fn may_start(&mut self, _: PointerId) -> bool {
        false
    }

    fn update(&mut self, _: PointerId, _: Instant) -> Option<Vec<GesturePoint>> {
        None
    }

    fn may_end(&mut self, _: PointerId, _: Instant, _: usize) -> Option<Vec<GesturePoint>> {
        None
    }
}

/// Visual feedback hooks. All optional.
pub trait DrawingProxy: Send {
    fn on_key_pressed(&mut self, _key: &KeyGeometry, _with_preview: bool) {}
    fn on_key_released(&mut self, _key: &KeyGeometry, _with_animation: bool) {}
    fn show_gesture_trail(&mut self, _pointer: PointerId, _shows_floating_preview_text: bool) {}
    fn show_sliding_key_input_preview(&mut self, _pointer: Option<PointerId>) {}
    /// `origin` is the panel's top-left corner in keyboard coordinates.
    fn on_show_more_keys_panel(&mut self, _panel: &MoreKeysKeyboard, _origin: (i32, i32)) {}
    fn on_dismiss_more_keys_panel(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullDrawing;

impl DrawingProxy for NullDrawing {}
