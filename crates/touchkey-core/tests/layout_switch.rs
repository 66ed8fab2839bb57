mod common;

use common::*;
use crossbeam_channel::Sender;
use std::sync::Arc;
use touchkey_core::layout_text::parse_layout;
use touchkey_core::*;

const UPPER: &str = "\
; Upper
#width 1000
#key 100 100
#element alphabet_manual_shifted
Q W E R T Y U I O P
A S D F G H J K L !gap
!shift Z X C V B N M !delete !lang
!symbol , !space*6 . !enter
";

/// Switches to the shifted layout when shift is pressed, like a host
/// keyboard switcher.
struct Switcher {
    handle: LayoutHandle,
    shifted: Arc<KeyboardLayout>,
    inner: ChannelListener,
}

impl KeyboardActionListener for Switcher {
    fn on_press_key(&mut self, code: i32, repeat_count: u32, is_single_pointer: bool) {
        self.inner.on_press_key(code, repeat_count, is_single_pointer);
        if code == CODE_SHIFT {
            self.handle.replace(self.shifted.clone());
        }
    }

    fn on_release_key(&mut self, code: i32, with_sliding: bool) {
        self.inner.on_release_key(code, with_sliding);
    }

    fn on_code_input(&mut self, code: i32, x: i32, y: i32, is_key_repeat: bool) {
        self.inner.on_code_input(code, x, y, is_key_repeat);
    }
}

fn switching_session() -> (InputSession, crossbeam_channel::Receiver<KeyAction>) {
    let (tx, rx): (Sender<KeyAction>, _) = crossbeam_channel::unbounded();
    let handle = LayoutHandle::new(layout());
    let listener = Switcher {
        handle: handle.clone(),
        shifted: Arc::new(parse_layout(UPPER).unwrap()),
        inner: ChannelListener::new(tx),
    };
    let (timer, _timers) = ChannelTimer::unbounded();
    (InputSession::with_layout_handle(handle, params(), listener, timer), rx)
}

#[test]
fn test_press_that_switches_layout_rebinds_key() {
    let (mut input, rx) = switching_session();
    let t0 = std::time::Instant::now();
    let ms = std::time::Duration::from_millis;

    input.on_down(0, 50, 250, t0);
    // The pointer now tracks the shift key of the new layout.
    let session = input.session(0).unwrap();
    assert_eq!(session.layout().and_then(|l| l.name()), Some("Upper"));
    assert_eq!(session.current_key().map(|k| k.code), Some(CODE_SHIFT));
    input.on_up(0, 50, 250, t0 + ms(40));

    input.on_down(0, 50, 50, t0 + ms(100));
    input.on_up(0, 50, 50, t0 + ms(140));
    let codes: Vec<i32> = rx
        .try_iter()
        .filter_map(|a| match a {
            KeyAction::Code { code, .. } => Some(code),
            _ => None,
        })
        .collect();
    assert_eq!(codes, vec![CODE_SHIFT, code('Q')]);
    assert_eq!(input.layout().name(), Some("Upper"));
}

#[test]
fn test_host_layout_change_clears_cached_panels() {
    let mut h = Harness::new(params());
    h.down(0, 250, 50, 0);
    h.input.on_long_press_timeout(0).unwrap();
    h.up(0, 250, 50, 400);
    assert_eq!(h.input.cached_panel_count(), 1);

    h.input.set_layout(Arc::new(parse_layout(UPPER).unwrap()));
    assert_eq!(h.input.cached_panel_count(), 0);
    h.tap(0, 150, 50, 500);
    assert_eq!(h.codes(), vec![code('1'), code('W')]);
}
