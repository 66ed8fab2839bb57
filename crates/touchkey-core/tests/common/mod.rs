#![allow(dead_code)]

use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use touchkey_core::layout_text::parse_layout;
use touchkey_core::*;

/// 1000x400, keys 100x100.
///
/// Key centres: q (50,50) w (150,50) e (250,50); a (50,150); shift (50,250)
/// z (150,250) delete (850,250) lang (950,250); comma (150,350)
/// space (500,350) period (850,350).
pub const LAYOUT: &str = "\
; Scenario
#width 1000
#key 100 100
q w e[1,2,3,4,5] r t y u i o p
a s d f g h j k l !gap
!shift z x c v b n m !delete !lang
!symbol ,[!noPanelAutoMoreKey!,'] !space*6 .^? !enter
";

pub fn layout() -> Arc<KeyboardLayout> {
    Arc::new(parse_layout(LAYOUT).unwrap())
}

pub fn code(c: char) -> i32 {
    c as i32
}

pub fn params() -> TrackerParams {
    TrackerParams {
        gesture_enabled: false,
        ..TrackerParams::default()
    }
}

/// Accepts a gesture once a stroke has `min_points` points; points above
/// the keyboard are outside the gesture area.
pub struct StrokeArbiter {
    points: Vec<GesturePoint>,
    min_points: usize,
}

impl StrokeArbiter {
    pub fn new(min_points: usize) -> Self {
        Self {
            points: Vec::new(),
            min_points,
        }
    }
}

impl GestureArbiter for StrokeArbiter {
    fn add_down_point(&mut self, pointer: PointerId, x: i32, y: i32, time: Instant, _: Option<Instant>, _: usize) {
        self.points.clear();
        self.points.push(GesturePoint { pointer, x, y, time });
    }

    fn add_move_point(&mut self, pointer: PointerId, x: i32, y: i32, time: Instant, _: bool) -> bool {
        if y < 0 {
            return false;
        }
        self.points.push(GesturePoint { pointer, x, y, time });
        true
    }

    fn may_start(&mut self, _: PointerId) -> bool {
        self.points.len() >= self.min_points
    }

    fn update(&mut self, _: PointerId, _: Instant) -> Option<Vec<GesturePoint>> {
        Some(self.points.clone())
    }

    fn may_end(&mut self, _: PointerId, _: Instant, active_pointers: usize) -> Option<Vec<GesturePoint>> {
        (active_pointers <= 1).then(|| std::mem::take(&mut self.points))
    }
}

pub struct Harness {
    pub input: InputSession,
    pub actions: Receiver<KeyAction>,
    pub timers: Receiver<TimerRequest>,
    t0: Instant,
}

impl Harness {
    pub fn new(params: TrackerParams) -> Self {
        Self::build(layout(), params, false, None)
    }

    pub fn build(layout: Arc<KeyboardLayout>, params: TrackerParams, accepts_custom: bool, arbiter: Option<StrokeArbiter>) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (listener, actions) = ChannelListener::unbounded();
        let (timer, timers) = ChannelTimer::unbounded();
        // Panels overlap the parent key row so the finger starts on them.
        let more_keys = MoreKeysParams {
            vertical_offset: 60,
            ..MoreKeysParams::default()
        };
        let mut input = InputSession::new(layout, params, listener.accepting_custom_requests(accepts_custom), timer)
            .with_more_keys_params(more_keys);
        if let Some(arbiter) = arbiter {
            input = input.with_gesture_arbiter(arbiter);
        }
        Self {
            input,
            actions,
            timers,
            t0: Instant::now(),
        }
    }

    pub fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    pub fn down(&mut self, pointer: PointerId, x: i32, y: i32, ms: u64) {
        let time = self.at(ms);
        self.input.on_down(pointer, x, y, time);
    }

    pub fn move_to(&mut self, pointer: PointerId, x: i32, y: i32, ms: u64) {
        let time = self.at(ms);
        self.input.on_move(pointer, x, y, time);
    }

    pub fn up(&mut self, pointer: PointerId, x: i32, y: i32, ms: u64) {
        let time = self.at(ms);
        self.input.on_up(pointer, x, y, time);
    }

    pub fn tap(&mut self, pointer: PointerId, x: i32, y: i32, ms: u64) {
        self.down(pointer, x, y, ms);
        self.up(pointer, x, y, ms + 30);
    }

    pub fn actions(&self) -> Vec<KeyAction> {
        self.actions.try_iter().collect()
    }

    /// Codes reaching `on_code_input`, in order.
    pub fn codes(&self) -> Vec<i32> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                KeyAction::Code { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn timer_requests(&self) -> Vec<TimerRequest> {
        self.timers.try_iter().collect()
    }
}

pub fn press(code: i32, is_single_pointer: bool) -> KeyAction {
    KeyAction::Press {
        code,
        repeat_count: 0,
        is_single_pointer,
    }
}

pub fn release(code: i32, with_sliding: bool) -> KeyAction {
    KeyAction::Release { code, with_sliding }
}

pub fn input(code: i32, x: i32, y: i32) -> KeyAction {
    KeyAction::Code {
        code,
        x,
        y,
        is_key_repeat: false,
    }
}
