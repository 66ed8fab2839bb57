use serde::{Deserialize, Serialize};

/// Index of a pointer (finger) as reported by the host touch system.
pub type PointerId = usize;

/// Index of a key inside its `KeyboardLayout`.
pub type KeyId = usize;

// Special key codes. Printable keys use their Unicode scalar value.
pub const CODE_SHIFT: i32 = -1;
pub const CODE_CAPSLOCK: i32 = -2;
pub const CODE_SWITCH_ALPHA_SYMBOL: i32 = -3;
pub const CODE_OUTPUT_TEXT: i32 = -4;
pub const CODE_DELETE: i32 = -5;
pub const CODE_SETTINGS: i32 = -6;
pub const CODE_SHORTCUT: i32 = -7;
pub const CODE_ACTION_NEXT: i32 = -8;
pub const CODE_ACTION_PREVIOUS: i32 = -9;
pub const CODE_LANGUAGE_SWITCH: i32 = -10;
pub const CODE_EMOJI: i32 = -11;
pub const CODE_CLIPBOARD: i32 = -12;
pub const CODE_SHIFT_ENTER: i32 = -13;
pub const CODE_SYMBOL_SHIFT: i32 = -14;
pub const CODE_UNSPECIFIED: i32 = -20;

pub const CODE_TAB: i32 = '\t' as i32;
pub const CODE_ENTER: i32 = '\n' as i32;
pub const CODE_SPACE: i32 = ' ' as i32;

/// Coordinate sentinel: the event is not tied to a touch point.
pub const NOT_A_COORDINATE: i32 = -1;
/// Coordinate sentinel: the event came from outside the keyboard surface.
pub const SUGGESTION_STRIP_COORDINATE: i32 = -2;

/// Request id passed to `on_custom_request` when the language key is long-pressed.
pub const CUSTOM_CODE_SHOW_INPUT_METHOD_PICKER: i32 = 1;

/// Shift and the alphabet/symbol switch are the keys that take part in
/// chorded sliding input.
pub const fn is_modifier_code(code: i32) -> bool {
    code == CODE_SHIFT || code == CODE_SWITCH_ALPHA_SYMBOL
}

/// Any code from space upwards counts as typed text.
pub const fn is_letter_code(code: i32) -> bool {
    code >= CODE_SPACE
}

/// Whether `code` is an alphabetic character (used for proximity correction).
pub fn is_alphabetic_code(code: i32) -> bool {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map_or(false, char::is_alphabetic)
}

/// Axis-aligned rectangle in keyboard pixels.
///
/// Containment is half-open (`left <= x < right`, `top <= y < bottom`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn contains(&self, x: i32, y: i32) -> bool {
        self.left <= x && x < self.right && self.top <= y && y < self.bottom
    }

    /// True when `other` lies entirely inside `self`.
    pub const fn encloses(&self, other: &Rect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}
