mod common;

use common::*;
use std::time::Duration;
use touchkey_core::*;

fn long_press(h: &mut Harness, pointer: PointerId) {
    h.input.on_long_press_timeout(pointer).unwrap();
}

#[test]
fn test_long_press_panel_types_key_under_finger() {
    let mut h = Harness::new(params());
    h.down(0, 250, 50, 0);
    assert!(h.timer_requests().contains(&TimerRequest::StartLongPress {
        pointer: 0,
        delay: Duration::from_millis(300),
    }));
    long_press(&mut h, 0);
    assert!(h.input.is_showing_more_keys_panel());
    h.up(0, 250, 50, 400);
    assert_eq!(h.codes(), vec![code('1')]);
    assert!(!h.input.is_showing_more_keys_panel());
}

#[test]
fn test_sliding_inside_panel_selects_neighbour() {
    let mut h = Harness::new(params());
    h.down(0, 250, 50, 0);
    long_press(&mut h, 0);
    // The second more key sits right of the first.
    h.move_to(0, 350, 50, 350);
    h.up(0, 350, 50, 400);
    assert_eq!(h.codes(), vec![code('2')]);
}

#[test]
fn test_sliding_off_panel_dismisses_it() {
    let mut h = Harness::new(params());
    h.down(0, 250, 50, 0);
    long_press(&mut h, 0);
    h.move_to(0, 250, -200, 350);
    assert!(!h.input.is_showing_more_keys_panel());
    h.up(0, 250, -200, 400);
    assert!(h.codes().is_empty());
}

#[test]
fn test_auto_more_key_is_typed_without_panel() {
    let mut h = Harness::new(params());
    h.down(0, 150, 350, 0);
    long_press(&mut h, 0);
    assert!(!h.input.is_showing_more_keys_panel());
    assert!(h.input.active_pointers().is_empty());
    h.up(0, 150, 350, 400);
    assert_eq!(
        h.actions(),
        vec![
            press(code(','), true),
            press(code('\''), true),
            input(code('\''), NOT_A_COORDINATE, NOT_A_COORDINATE),
            release(code('\''), false),
        ]
    );
}

#[test]
fn test_language_key_long_press_opens_picker() {
    let mut h = Harness::build(layout(), params(), true, None);
    h.down(0, 950, 250, 0);
    long_press(&mut h, 0);
    h.up(0, 950, 250, 400);
    assert_eq!(
        h.actions(),
        vec![
            press(CODE_LANGUAGE_SWITCH, true),
            KeyAction::Custom(CUSTOM_CODE_SHOW_INPUT_METHOD_PICKER),
            release(CODE_LANGUAGE_SWITCH, false),
        ]
    );
}

#[test]
fn test_refused_picker_leaves_language_key_pressed() {
    let mut h = Harness::new(params());
    h.down(0, 950, 250, 0);
    long_press(&mut h, 0);
    h.up(0, 950, 250, 400);
    let got = h.actions();
    assert_eq!(got[1], KeyAction::Custom(CUSTOM_CODE_SHOW_INPUT_METHOD_PICKER));
    assert!(matches!(got[2], KeyAction::Code { code: CODE_LANGUAGE_SWITCH, .. }));
    assert_eq!(got[3], release(CODE_LANGUAGE_SWITCH, false));
}

#[test]
fn test_space_long_press_picker_is_configurable() {
    let mut h = Harness::build(layout(), params(), true, None);
    h.down(0, 500, 350, 0);
    long_press(&mut h, 0);
    h.up(0, 500, 350, 400);
    // Off by default: space types normally.
    assert_eq!(h.codes(), vec![CODE_SPACE]);

    let mut h = Harness::build(
        layout(),
        TrackerParams {
            space_long_press_shows_picker: true,
            ..params()
        },
        true,
        None,
    );
    h.down(0, 500, 350, 0);
    long_press(&mut h, 0);
    h.up(0, 500, 350, 400);
    let got = h.actions();
    assert!(got.contains(&KeyAction::Custom(CUSTOM_CODE_SHOW_INPUT_METHOD_PICKER)));
    assert!(!got.iter().any(|a| matches!(a, KeyAction::Code { .. })));
}

#[test]
fn test_long_press_after_up_is_stale() {
    let mut h = Harness::new(params());
    h.tap(0, 250, 50, 0);
    long_press(&mut h, 0);
    assert!(!h.input.is_showing_more_keys_panel());
    assert_eq!(h.codes(), vec![code('e')]);
}

#[test]
fn test_long_press_waits_longer_after_sliding_from_shift() {
    let mut h = Harness::new(params());
    h.down(0, 50, 250, 0);
    assert_eq!(
        h.timer_requests().last(),
        Some(&TimerRequest::StartLongPress {
            pointer: 0,
            delay: Duration::from_millis(1200),
        })
    );
    h.move_to(0, 250, 50, 80);
    assert_eq!(
        h.timer_requests().last(),
        Some(&TimerRequest::StartLongPress {
            pointer: 0,
            delay: Duration::from_millis(900),
        })
    );
}

#[test]
fn test_cancel_with_panel_shown_emits_nothing() {
    let mut h = Harness::new(params());
    h.down(0, 250, 50, 0);
    long_press(&mut h, 0);
    h.actions();
    let t = h.at(350);
    h.input.on_cancel(0, t);
    assert!(!h.input.is_showing_more_keys_panel());
    h.up(0, 250, 50, 400);
    assert!(h.actions().is_empty());
}

#[test]
fn test_panel_of_another_pointer_is_dismissed() {
    let mut h = Harness::new(params());
    h.down(0, 250, 50, 0);
    long_press(&mut h, 0);
    assert!(h.input.session(0).unwrap().is_showing_panel());
    h.down(1, 240, 60, 100);
    long_press(&mut h, 1);
    assert!(h.input.session(1).unwrap().is_showing_panel());
    assert!(!h.input.session(0).unwrap().is_showing_panel());
    // Both panels come from the same cached keyboard.
    assert_eq!(h.input.cached_panel_count(), 1);
}
