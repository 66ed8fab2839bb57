//! Entry point for hosts: one `InputSession` per keyboard view.
//!
//! All touch primitives and timer callbacks must be delivered from a single
//! thread, in the order they happened.

use crate::config::{MoreKeysParams, TrackerParams};
use crate::coordinator::PointerCoordinator;
use crate::error::LayoutError;
use crate::layout::{KeyboardLayout, LayoutHandle};
use crate::listener::{DrawingProxy, GestureArbiter, KeyboardActionListener, NoGesture, NullDrawing, TimerScheduler};
use crate::session::{Deferred, PanelCache, PointerSession, SessionContext, Timers};
use crate::typing::TypingTimeRecorder;
use crate::types::PointerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Whether strokes may turn into gestures.
#[derive(Debug, Clone)]
pub struct GestureEnabler {
    enabled_by_user: bool,
    password_mode: bool,
    // Flipped by the dictionary loader thread.
    main_dictionary_available: Arc<AtomicBool>,
}

impl GestureEnabler {
    pub fn new(enabled_by_user: bool) -> Self {
        Self {
            enabled_by_user,
            password_mode: false,
            main_dictionary_available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn should_handle_gesture(&self) -> bool {
        self.enabled_by_user && !self.password_mode && self.main_dictionary_available.load(Ordering::Relaxed)
    }

    pub fn set_enabled_by_user(&mut self, enabled: bool) {
        self.enabled_by_user = enabled;
    }

    pub fn set_password_mode(&mut self, password_mode: bool) {
        self.password_mode = password_mode;
    }

    /// Shared flag for the thread that loads the main dictionary.
    pub fn main_dictionary_flag(&self) -> Arc<AtomicBool> {
        self.main_dictionary_available.clone()
    }
}

/// Owns every pointer session of one keyboard view, their coordinator and
/// the collaborators they report to.
pub struct InputSession {
    params: TrackerParams,
    more_keys_params: MoreKeysParams,
    layout: LayoutHandle,
    active_layout: Arc<KeyboardLayout>,
    sessions: HashMap<PointerId, PointerSession>,
    coordinator: PointerCoordinator,
    listener: Box<dyn KeyboardActionListener>,
    timers: Timers,
    arbiter: Box<dyn GestureArbiter>,
    drawing: Box<dyn DrawingProxy>,
    typing: TypingTimeRecorder,
    gesture: GestureEnabler,
    in_gesture: bool,
    panels: PanelCache,
}

impl InputSession {
    pub fn new(
        layout: Arc<KeyboardLayout>,
        params: TrackerParams,
        listener: impl KeyboardActionListener + 'static,
        timer: impl TimerScheduler + 'static,
    ) -> Self {
        Self::with_layout_handle(LayoutHandle::new(layout), params, listener, timer)
    }

    /// Share `layout` with the host, e.g. a listener that switches layouts
    /// when a modifier is pressed.
    pub fn with_layout_handle(
        layout: LayoutHandle,
        params: TrackerParams,
        listener: impl KeyboardActionListener + 'static,
        timer: impl TimerScheduler + 'static,
    ) -> Self {
        let active_layout = layout.current();
        let typing = TypingTimeRecorder::new(&params);
        let gesture = GestureEnabler::new(params.gesture_enabled);
        let mut arbiter: Box<dyn GestureArbiter> = Box::new(NoGesture);
        arbiter.set_keyboard_geometry(active_layout.most_common_key_width(), active_layout.occupied_height());
        Self {
            params,
            more_keys_params: MoreKeysParams::default(),
            layout,
            active_layout,
            sessions: HashMap::new(),
            coordinator: PointerCoordinator::new(),
            listener: Box::new(listener),
            timers: Timers::new(Box::new(timer)),
            arbiter,
            drawing: Box::new(NullDrawing),
            typing,
            gesture,
            in_gesture: false,
            panels: PanelCache::default(),
        }
    }

    pub fn with_gesture_arbiter(mut self, arbiter: impl GestureArbiter + 'static) -> Self {
        self.arbiter = Box::new(arbiter);
        self.arbiter.set_keyboard_geometry(
            self.active_layout.most_common_key_width(),
            self.active_layout.occupied_height(),
        );
        self
    }

    pub fn with_drawing_proxy(mut self, drawing: impl DrawingProxy + 'static) -> Self {
        self.drawing = Box::new(drawing);
        self
    }

    pub fn with_more_keys_params(mut self, params: MoreKeysParams) -> Self {
        self.more_keys_params = params;
        self.panels.clear();
        self
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    pub fn layout(&self) -> Arc<KeyboardLayout> {
        self.layout.current()
    }

    /// Handle through which the host, or a listener mid-callback, swaps layouts.
    pub fn layout_handle(&self) -> LayoutHandle {
        self.layout.clone()
    }

    pub fn set_layout(&mut self, layout: Arc<KeyboardLayout>) {
        self.layout.replace(layout);
        self.sync_layout();
    }

    pub fn gesture_enabler(&self) -> &GestureEnabler {
        &self.gesture
    }

    pub fn gesture_enabler_mut(&mut self) -> &mut GestureEnabler {
        &mut self.gesture
    }

    pub fn typing(&self) -> &TypingTimeRecorder {
        &self.typing
    }

    pub fn session(&self, pointer: PointerId) -> Option<&PointerSession> {
        self.sessions.get(&pointer)
    }

    /// Pointers currently down, oldest first.
    pub fn active_pointers(&self) -> &[PointerId] {
        self.coordinator.active()
    }

    pub fn is_in_gesture(&self) -> bool {
        self.in_gesture
    }

    pub fn is_any_in_dragging_finger(&self) -> bool {
        self.coordinator
            .any(|p| self.sessions.get(&p).map_or(false, PointerSession::is_in_dragging_finger))
    }

    pub fn is_showing_more_keys_panel(&self) -> bool {
        self.sessions.values().any(PointerSession::is_showing_panel)
    }

    pub fn cached_panel_count(&self) -> usize {
        self.panels.len()
    }

    // ---- touch primitives -----------------------------------------------

    pub fn on_down(&mut self, pointer: PointerId, x: i32, y: i32, time: Instant) {
        self.sync_layout();
        let Self { sessions, active_layout, params, .. } = self;
        let session = sessions
            .entry(pointer)
            .or_insert_with(|| PointerSession::new(pointer, active_layout.clone(), params));
        if session.is_bounce(x, y, time, params) {
            session.cancel_tracking();
            return;
        }
        let key = session.detect_key(x, y);
        session.note_actual_down(x, y);

        // A modifier goes down alone.
        if key.as_ref().map_or(false, |k| k.is_modifier()) {
            if self.in_gesture {
                return;
            }
            self.release_all_pointers(None, time);
        }
        self.coordinator.add(pointer);
        self.with_session(pointer, |session, cx| {
            session.on_down_internal(x, y, time, cx);
            session.start_gesture_detection(key.as_ref(), x, y, time, cx);
        });
    }

    pub fn on_move(&mut self, pointer: PointerId, x: i32, y: i32, time: Instant) {
        self.sync_layout();
        // A lone finger driving a panel owns the keyboard.
        if let Some(owner) = self.coordinator.oldest() {
            let owner_shows_panel = self
                .sessions
                .get(&owner)
                .map_or(false, PointerSession::is_showing_panel);
            if owner != pointer && self.coordinator.len() == 1 && owner_shows_panel {
                trace!(pointer, owner, "move ignored while a panel is shown");
                return;
            }
        }
        self.with_session(pointer, |session, cx| session.on_move_event(x, y, time, cx));
    }

    pub fn on_up(&mut self, pointer: PointerId, x: i32, y: i32, time: Instant) {
        self.sync_layout();
        self.up_event(pointer, x, y, time);
    }

    /// The host lost the touch stream for `pointer`. Ends everything in
    /// flight without emitting input.
    pub fn on_cancel(&mut self, pointer: PointerId, time: Instant) {
        self.sync_layout();
        self.with_session(pointer, |session, cx| session.cancel_batch_input(cx));
        self.dismiss_all_panels();
        self.cancel_all_tracking();
        self.release_all_pointers(None, time);
        self.with_session(pointer, |session, cx| session.on_cancel_internal(cx));
        self.coordinator.remove(pointer);
    }

    // ---- timer callbacks ------------------------------------------------

    /// The long-press timer of `pointer` fired. Fails only if the popup
    /// panel for the pressed key cannot be laid out.
    pub fn on_long_press_timeout(&mut self, pointer: PointerId) -> Result<(), LayoutError> {
        self.sync_layout();
        let armed = self.sessions.get(&pointer).map_or(false, |session| {
            session.long_press_key().is_some() && session.long_press_key() == session.current_key()
        });
        if !armed {
            trace!(pointer, "stale long press timer");
            return Ok(());
        }
        self.with_session(pointer, |session, cx| session.on_long_pressed(cx))?;

        if self.sessions.get(&pointer).map_or(false, PointerSession::is_showing_panel) {
            let others: Vec<PointerId> = self
                .sessions
                .iter()
                .filter(|(&p, session)| p != pointer && session.is_showing_panel())
                .map(|(&p, _)| p)
                .collect();
            for other in others {
                self.with_session(other, |session, cx| session.dismiss_panel(cx));
            }
        }
        Ok(())
    }

    pub fn on_key_repeat_timeout(&mut self, pointer: PointerId, code: i32, repeat_count: u32, time: Instant) {
        self.sync_layout();
        if !self.sessions.contains_key(&pointer) {
            return;
        }
        self.with_session(pointer, |session, cx| session.on_key_repeat(code, repeat_count, time, cx));
    }

    // ---- whole-keyboard operations --------------------------------------

    /// Stop tracking every active pointer. Shown panels keep their pointer.
    pub fn cancel_all_tracking(&mut self) {
        for pointer in self.coordinator.active().to_vec() {
            if let Some(session) = self.sessions.get_mut(&pointer) {
                session.cancel_tracking();
            }
        }
    }

    pub fn dismiss_all_panels(&mut self) {
        let showing: Vec<PointerId> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_showing_panel())
            .map(|(&p, _)| p)
            .collect();
        for pointer in showing {
            self.with_session(pointer, |session, cx| session.dismiss_panel(cx));
        }
    }

    // ---- internals ------------------------------------------------------

    fn session_mut(&mut self, pointer: PointerId) -> &mut PointerSession {
        let Self { sessions, active_layout, params, .. } = self;
        sessions
            .entry(pointer)
            .or_insert_with(|| PointerSession::new(pointer, active_layout.clone(), params))
    }

    fn sync_layout(&mut self) {
        let current = self.layout.current();
        if Arc::ptr_eq(&current, &self.active_layout) {
            return;
        }
        debug!(
            name = current.name().unwrap_or("unnamed"),
            keys = current.len(),
            "keyboard layout changed"
        );
        self.panels.clear();
        for session in self.sessions.values_mut() {
            session.set_layout(current.clone(), &self.params);
        }
        self.arbiter
            .set_keyboard_geometry(current.most_common_key_width(), current.occupied_height());
        self.active_layout = current;
    }

    fn up_event(&mut self, pointer: PointerId, x: i32, y: i32, time: Instant) {
        if !self.in_gesture {
            let is_modifier = self
                .sessions
                .get(&pointer)
                .map_or(false, PointerSession::is_modifier);
            if is_modifier {
                // Lifting a modifier ends every other stroke.
                self.release_all_pointers(Some(pointer), time);
            } else if self.coordinator.contains(pointer) {
                self.release_pointers_older_than(pointer, time);
            }
        }
        self.with_session(pointer, |session, cx| session.on_up_internal(x, y, time, cx));
        self.coordinator.remove(pointer);
        self.session_mut(pointer).note_up(time);
    }

    fn release_all_pointers(&mut self, keep: Option<PointerId>, time: Instant) {
        for other in self.coordinator.take_all_except(keep) {
            self.with_session(other, |session, cx| session.on_phantom_up(time, cx));
        }
    }

    fn release_pointers_older_than(&mut self, pointer: PointerId, time: Instant) {
        let sessions = &self.sessions;
        let older = self.coordinator.take_older_than(pointer, |p| {
            sessions.get(&p).map_or(false, PointerSession::is_modifier)
        });
        for other in older {
            debug!(pointer, older = other, "releasing older pointer");
            self.with_session(other, |session, cx| session.on_phantom_up(time, cx));
        }
    }

    /// Run `f` on the session of `pointer` with access to everything it may
    /// touch, then apply the cross-pointer work it asked for.
    fn with_session<R>(&mut self, pointer: PointerId, f: impl FnOnce(&mut PointerSession, &mut SessionContext<'_>) -> R) -> R {
        let active_pointers = self.coordinator.len();
        let is_oldest = self.coordinator.oldest() == Some(pointer);
        let has_older_modifier = {
            let sessions = &self.sessions;
            self.coordinator.has_modifier_older_than(pointer, |p| {
                sessions.get(&p).map_or(false, PointerSession::is_modifier)
            })
        };
        let handles_gesture = self.gesture.should_handle_gesture();

        let Self {
            params,
            more_keys_params,
            layout,
            active_layout,
            sessions,
            listener,
            timers,
            arbiter,
            drawing,
            typing,
            in_gesture,
            panels,
            ..
        } = self;
        let session = sessions
            .entry(pointer)
            .or_insert_with(|| PointerSession::new(pointer, active_layout.clone(), params));
        let mut cx = SessionContext {
            params,
            more_keys_params,
            layout,
            listener: listener.as_mut(),
            timers,
            arbiter: arbiter.as_mut(),
            drawing: drawing.as_mut(),
            typing,
            panels,
            in_gesture,
            handles_gesture,
            active_pointers,
            is_oldest,
            has_older_modifier,
            deferred: Vec::new(),
        };
        let result = f(session, &mut cx);
        let deferred = std::mem::take(&mut cx.deferred);
        self.run_deferred(pointer, deferred);
        result
    }

    fn run_deferred(&mut self, pointer: PointerId, deferred: Vec<Deferred>) {
        for work in deferred {
            match work {
                Deferred::CancelAllTracking => self.cancel_all_tracking(),
                Deferred::DismissAllPanels => self.dismiss_all_panels(),
                Deferred::UpThenCancel { x, y, time } => {
                    self.up_event(pointer, x, y, time);
                    if let Some(session) = self.sessions.get_mut(&pointer) {
                        session.cancel_tracking();
                    }
                }
                Deferred::RemoveFromCoordinator => self.coordinator.remove(pointer),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyGeometry;
    use crate::layout::{LayoutBuilder, LayoutParams};
    use crate::listener::{ChannelListener, ChannelTimer, KeyAction, TimerRequest};
    use crate::more_key_spec::parse_more_keys;
    use crate::types::*;
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    // Row 0: q w e r t, 100x100 each. Row 1: shift a(more keys) del space.
    fn layout() -> Arc<KeyboardLayout> {
        let mut b = LayoutBuilder::new(LayoutParams {
            width: 500,
            height: 200,
            ..LayoutParams::default()
        });
        b.start_row(None);
        for c in ['q', 'w', 'e', 'r', 't'] {
            let (x, y, w, h) = b.next_cell(100);
            b.add_key(KeyGeometry::new(c as i32, Some(c.to_string()), x, y, w, h, 0, 0));
        }
        b.start_row(None);
        let (x, y, w, h) = b.next_cell(100);
        b.add_key(KeyGeometry::new(CODE_SHIFT, None, x, y, w, h, 0, 0));
        let (x, y, w, h) = b.next_cell(100);
        b.add_key(
            KeyGeometry::new('a' as i32, Some("a".into()), x, y, w, h, 0, 0)
                .with_more_keys(parse_more_keys("à,á,â", None, 5).unwrap()),
        );
        let (x, y, w, h) = b.next_cell(100);
        b.add_key(KeyGeometry::new(CODE_DELETE, None, x, y, w, h, 0, 0).repeatable());
        let (x, y, w, h) = b.next_cell(200);
        b.add_key(KeyGeometry::new(CODE_SPACE, None, x, y, w, h, 0, 0));
        Arc::new(b.build().unwrap())
    }

    fn session() -> (InputSession, Receiver<KeyAction>, Receiver<TimerRequest>) {
        let (listener, actions) = ChannelListener::unbounded();
        let (timer, timers) = ChannelTimer::unbounded();
        let params = TrackerParams {
            gesture_enabled: false,
            ..TrackerParams::default()
        };
        // Panels overlap the parent key so the pressing finger lands on them.
        let more_keys = MoreKeysParams {
            vertical_offset: 60,
            ..MoreKeysParams::default()
        };
        let session = InputSession::new(layout(), params, listener, timer).with_more_keys_params(more_keys);
        (session, actions, timers)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn code(c: char) -> i32 {
        c as i32
    }

    #[test]
    fn test_tap_emits_press_code_release() {
        let (mut s, actions, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 50, t0);
        s.on_up(0, 150, 50, t0 + ms(50));
        assert_eq!(
            actions.try_iter().collect::<Vec<_>>(),
            vec![
                KeyAction::Press { code: code('w'), repeat_count: 0, is_single_pointer: true },
                KeyAction::Code { code: code('w'), x: 150, y: 50, is_key_repeat: false },
                KeyAction::Release { code: code('w'), with_sliding: false },
            ]
        );
        assert!(s.active_pointers().is_empty());
    }

    #[test]
    fn test_small_moves_do_not_change_key() {
        let (mut s, actions, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 50, t0);
        // 10px past the right edge of 'w' is inside the 20px hysteresis.
        for i in 0..20 {
            s.on_move(0, 205 + (i % 5), 50, t0 + ms(10 + i as u64));
        }
        s.on_up(0, 150, 50, t0 + ms(100));
        let got: Vec<KeyAction> = actions.try_iter().collect();
        assert_eq!(got.len(), 3);
        assert!(matches!(got[1], KeyAction::Code { code: c, .. } if c == code('w')));
    }

    #[test]
    fn test_bounce_down_is_discarded() {
        let (mut s, actions, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 50, t0);
        s.on_up(0, 150, 50, t0 + ms(50));
        actions.try_iter().count();

        // 10ms and 3px later: contact bounce.
        s.on_down(0, 152, 52, t0 + ms(60));
        s.on_up(0, 152, 52, t0 + ms(70));
        assert_eq!(actions.try_iter().count(), 0);

        // Far enough away it is a real tap.
        s.on_down(0, 350, 50, t0 + ms(80));
        assert!(matches!(actions.try_recv(), Ok(KeyAction::Press { code: c, .. }) if c == code('r')));
    }

    #[test]
    fn test_repeat_timer_and_up_suppression() {
        let (mut s, actions, timers) = session();
        let t0 = Instant::now();
        s.on_down(0, 250, 150, t0);
        let requests: Vec<TimerRequest> = timers.try_iter().collect();
        assert!(requests.contains(&TimerRequest::StartRepeat {
            pointer: 0,
            code: CODE_DELETE,
            repeat_count: 1,
            delay: ms(400),
        }));
        s.on_key_repeat_timeout(0, CODE_DELETE, 1, t0 + ms(400));
        s.on_key_repeat_timeout(0, CODE_DELETE, 2, t0 + ms(450));
        s.on_up(0, 250, 150, t0 + ms(480));
        let got: Vec<KeyAction> = actions.try_iter().collect();
        assert_eq!(
            got,
            vec![
                KeyAction::Press { code: CODE_DELETE, repeat_count: 0, is_single_pointer: true },
                KeyAction::Press { code: CODE_DELETE, repeat_count: 1, is_single_pointer: true },
                KeyAction::Code { code: CODE_DELETE, x: 250, y: 150, is_key_repeat: true },
                KeyAction::Press { code: CODE_DELETE, repeat_count: 2, is_single_pointer: true },
                KeyAction::Code { code: CODE_DELETE, x: 250, y: 150, is_key_repeat: true },
            ]
        );
        // Next timer is at the repeat interval.
        assert!(timers.try_iter().any(|r| r
            == TimerRequest::StartRepeat { pointer: 0, code: CODE_DELETE, repeat_count: 3, delay: ms(50) }));
    }

    #[test]
    fn test_stale_repeat_is_ignored() {
        let (mut s, actions, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 50, t0);
        s.on_key_repeat_timeout(0, CODE_DELETE, 1, t0 + ms(400));
        s.on_long_press_timeout(0).unwrap();
        assert_eq!(actions.try_iter().count(), 1);
        assert_eq!(s.session(0).and_then(|p| p.repeating_code()), None);
    }

    #[test]
    fn test_long_press_opens_panel_and_up_emits_more_key() {
        let (mut s, actions, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 150, t0);
        s.on_long_press_timeout(0).unwrap();
        assert!(s.is_showing_more_keys_panel());
        assert_eq!(s.cached_panel_count(), 1);
        // The first more key sits under the finger.
        s.on_up(0, 150, 150, t0 + ms(400));
        let got: Vec<KeyAction> = actions.try_iter().collect();
        assert_eq!(got[0], KeyAction::Press { code: code('a'), repeat_count: 0, is_single_pointer: true });
        assert!(matches!(got[1], KeyAction::Code { code: c, .. } if c == code('à')));
        assert_eq!(got.len(), 2);
        assert!(!s.is_showing_more_keys_panel());
    }

    #[test]
    fn test_layout_change_clears_panel_cache() {
        let (mut s, _, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 150, t0);
        s.on_long_press_timeout(0).unwrap();
        s.on_up(0, 150, 150, t0 + ms(400));
        assert_eq!(s.cached_panel_count(), 1);
        s.set_layout(layout());
        assert_eq!(s.cached_panel_count(), 0);
    }

    #[test]
    fn test_shift_down_releases_other_pointers() {
        let (mut s, actions, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 50, t0);
        s.on_down(1, 50, 150, t0 + ms(100));
        let got: Vec<KeyAction> = actions.try_iter().collect();
        // 'w' is lifted by a phantom up before shift is pressed.
        assert_eq!(
            got,
            vec![
                KeyAction::Press { code: code('w'), repeat_count: 0, is_single_pointer: true },
                KeyAction::Code { code: code('w'), x: 150, y: 50, is_key_repeat: false },
                KeyAction::Release { code: code('w'), with_sliding: false },
                KeyAction::Press { code: CODE_SHIFT, repeat_count: 0, is_single_pointer: true },
            ]
        );
        assert_eq!(s.active_pointers(), &[1]);
        // The forced-out pointer emits nothing on its real up.
        s.on_up(0, 150, 50, t0 + ms(150));
        assert_eq!(actions.try_iter().count(), 0);
    }

    #[test]
    fn test_cancel_is_total() {
        let (mut s, actions, _) = session();
        let t0 = Instant::now();
        s.on_down(0, 150, 50, t0);
        actions.try_iter().count();
        s.on_cancel(0, t0 + ms(10));
        s.on_cancel(0, t0 + ms(11));
        s.on_move(0, 350, 50, t0 + ms(20));
        s.on_up(0, 350, 50, t0 + ms(30));
        s.on_key_repeat_timeout(0, code('w'), 1, t0 + ms(40));
        s.on_long_press_timeout(0).unwrap();
        assert_eq!(actions.try_iter().count(), 0);
        assert!(s.active_pointers().is_empty());
    }

    #[test]
    fn test_move_without_down_is_ignored() {
        let (mut s, actions, _) = session();
        s.on_move(4, 150, 50, Instant::now());
        assert_eq!(actions.try_iter().count(), 0);
    }
}
