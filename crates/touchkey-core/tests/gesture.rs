mod common;

use common::*;
use std::sync::atomic::Ordering;
use touchkey_core::*;

fn gesture_harness() -> Harness {
    Harness::build(
        layout(),
        TrackerParams {
            gesture_enabled: true,
            ..params()
        },
        false,
        Some(StrokeArbiter::new(3)),
    )
}

/// q to r along the top row, starting at `t` ms.
fn stroke_at(h: &mut Harness, t: u64) {
    h.down(0, 50, 50, t);
    h.move_to(0, 150, 50, t + 20);
    h.move_to(0, 250, 50, t + 40);
    h.move_to(0, 350, 50, t + 60);
}

fn stroke(h: &mut Harness) {
    stroke_at(h, 0);
}

#[test]
fn test_stroke_becomes_batch_input() {
    let mut h = gesture_harness();
    stroke(&mut h);
    assert!(h.input.is_in_gesture());
    h.up(0, 350, 50, 80);
    assert!(!h.input.is_in_gesture());

    let got = h.actions();
    assert_eq!(got[0], press(code('q'), true));
    assert_eq!(got[1], KeyAction::StartBatch);
    assert!(matches!(&got[2], KeyAction::UpdateBatch(points) if points.len() == 3));
    assert!(matches!(&got[3], KeyAction::UpdateBatch(points) if points.len() == 4));
    assert!(matches!(&got[4], KeyAction::EndBatch(points) if points.len() == 4));
    assert_eq!(got.len(), 5);
}

#[test]
fn test_leaving_gesture_area_cancels_batch() {
    let mut h = gesture_harness();
    stroke(&mut h);
    h.move_to(0, 350, -10, 70);
    assert!(!h.input.is_in_gesture());
    assert_eq!(h.actions().last(), Some(&KeyAction::CancelBatch));
    h.up(0, 350, -10, 90);
    assert!(h.actions().is_empty());
}

#[test]
fn test_gesture_never_starts_from_modifier() {
    let mut h = gesture_harness();
    h.down(0, 50, 250, 0);
    h.move_to(0, 150, 250, 20);
    h.move_to(0, 250, 250, 40);
    h.move_to(0, 350, 250, 60);
    assert!(!h.input.is_in_gesture());
    assert!(!h.actions().contains(&KeyAction::StartBatch));
}

#[test]
fn test_password_mode_disables_gestures() {
    let mut h = gesture_harness();
    h.input.gesture_enabler_mut().set_password_mode(true);
    stroke(&mut h);
    h.up(0, 350, 50, 80);
    assert!(!h.actions().contains(&KeyAction::StartBatch));
}

#[test]
fn test_missing_dictionary_disables_gestures() {
    let mut h = gesture_harness();
    let flag = h.input.gesture_enabler().main_dictionary_flag();
    flag.store(false, Ordering::Relaxed);
    stroke(&mut h);
    assert!(!h.input.is_in_gesture());
    flag.store(true, Ordering::Relaxed);
    h.up(0, 350, 50, 80);
    h.actions();

    stroke_at(&mut h, 200);
    assert!(h.input.is_in_gesture());
}
