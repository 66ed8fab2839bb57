use crate::detector::KeyDetector;
use crate::key::KeyGeometry;
use crate::layout::{KeyRef, KeyboardLayout};
use crate::listener::KeyboardActionListener;
use crate::more_keys::MoreKeysKeyboard;
use crate::types::*;
use std::sync::Arc;
use tracing::debug;

/// What a move inside a panel decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelMove {
    Tracking,
    /// The finger left the last panel key: the panel must close.
    Cancelled,
}

/// A shown popup panel driven by the pointer that long-pressed its parent.
///
/// Coordinates given to `on_*` are panel-local; use `translate_x`/`translate_y`
/// on keyboard coordinates first.
#[derive(Debug)]
pub struct MoreKeysPanel {
    keyboard: Arc<MoreKeysKeyboard>,
    detector: KeyDetector,
    origin_x: i32,
    origin_y: i32,
    pointer: Option<PointerId>,
    current_key: Option<KeyRef>,
}

impl MoreKeysPanel {
    /// Anchor `keyboard` above `parent`, centred on it and kept inside the
    /// parent keyboard horizontally.
    pub fn show(
        keyboard: Arc<MoreKeysKeyboard>,
        parent: &KeyGeometry,
        parent_layout: &KeyboardLayout,
        slide_allowance: i32,
        vertical_offset: i32,
    ) -> Self {
        let panel = &keyboard.layout;
        let point_x = parent.x() + parent.width() / 2;
        let point_y = parent.y() + vertical_offset;
        let max_x = (parent_layout.occupied_width() - panel.occupied_width()).max(0);
        let origin_x = (point_x - keyboard.default_key_coord_x).min(max_x).max(0);
        let origin_y = point_y - panel.occupied_height();

        let mut detector = KeyDetector::for_more_keys(slide_allowance);
        detector.set_layout(panel.clone());
        debug!(parent = parent.code, origin_x, origin_y, "more keys panel shown");
        Self {
            keyboard,
            detector,
            origin_x,
            origin_y,
            pointer: None,
            current_key: None,
        }
    }

    pub fn keyboard(&self) -> &Arc<MoreKeysKeyboard> {
        &self.keyboard
    }

    pub fn origin(&self) -> (i32, i32) {
        (self.origin_x, self.origin_y)
    }

    pub fn translate_x(&self, x: i32) -> i32 {
        x - self.origin_x
    }

    pub fn translate_y(&self, y: i32) -> i32 {
        y - self.origin_y
    }

    pub fn current_key(&self) -> Option<&KeyRef> {
        self.current_key.as_ref()
    }

    pub fn on_down(&mut self, x: i32, y: i32, pointer: PointerId) {
        self.pointer = Some(pointer);
        self.current_key = self.detect_key(x, y);
    }

    pub fn on_move(&mut self, x: i32, y: i32, pointer: PointerId) -> PanelMove {
        if self.pointer != Some(pointer) {
            return PanelMove::Tracking;
        }
        let had_key = self.current_key.is_some();
        self.current_key = self.detect_key(x, y);
        if had_key && self.current_key.is_none() {
            PanelMove::Cancelled
        } else {
            PanelMove::Tracking
        }
    }

    /// Emit the key under `(x, y)`, if any.
    pub fn on_up(&mut self, x: i32, y: i32, pointer: PointerId, listener: &mut dyn KeyboardActionListener) {
        if self.pointer != Some(pointer) {
            return;
        }
        // The last move and the up share coordinates, so detecting again is harmless.
        self.current_key = self.detect_key(x, y);
        if let Some(key) = self.current_key.take() {
            key.set_pressed(false);
            let code = key.code;
            if code == CODE_OUTPUT_TEXT {
                if let Some(text) = key.output_text.as_deref() {
                    listener.on_text_input(text);
                }
            } else if code != CODE_UNSPECIFIED {
                if self.keyboard.layout.has_proximity_chars_correction(code) {
                    listener.on_code_input(code, x, y, false);
                } else {
                    listener.on_code_input(code, NOT_A_COORDINATE, NOT_A_COORDINATE, false);
                }
            }
        }
    }

    /// Release pressed state. Idempotent.
    pub fn dismiss(&mut self) {
        if let Some(key) = self.current_key.take() {
            key.set_pressed(false);
        }
        self.pointer = None;
    }

    fn detect_key(&self, x: i32, y: i32) -> Option<KeyRef> {
        let new_key = self.detector.detect_hit_key(x, y);
        if new_key == self.current_key {
            return new_key;
        }
        if let Some(old) = &self.current_key {
            old.set_pressed(false);
        }
        if let Some(new) = &new_key {
            new.set_pressed(true);
        }
        new_key
    }
}
