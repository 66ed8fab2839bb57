use crate::more_key_spec::{MoreKeySpec, MoreKeysConfig, ParsedMoreKeys};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// What a key entry is for. Spacers and dividers occupy space but never
/// produce input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyKind {
    #[default]
    Normal,
    Spacer,
    Divider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyFlags {
    pub repeatable: bool,
    pub modifier: bool,
    pub long_press_enabled: bool,
    pub no_key_preview: bool,
    /// Emit `alt_code` instead of `code` while the user is typing fast.
    pub alt_code_while_typing: bool,
}

/// Immutable description of one key.
///
/// `rect` is the visual rectangle (gaps removed); `hit_box` is the area that
/// accepts touches. Runtime bits (pressed, enabled) live in the owning
/// layout, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGeometry {
    pub code: i32,
    pub label: Option<String>,
    pub output_text: Option<String>,
    pub icon: Option<String>,
    pub rect: Rect,
    pub hit_box: Rect,
    pub horizontal_gap: i32,
    pub vertical_gap: i32,
    pub kind: KeyKind,
    pub flags: KeyFlags,
    pub more_keys: Option<Vec<MoreKeySpec>>,
    pub more_keys_config: MoreKeysConfig,
    pub alt_code: Option<i32>,
}

impl KeyGeometry {
    /// Key occupying the cell `(x, y, width, height)`, gaps included.
    pub fn new(
        code: i32,
        label: Option<String>,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        horizontal_gap: i32,
        vertical_gap: i32,
    ) -> Self {
        Self {
            code,
            label,
            output_text: None,
            icon: None,
            rect: Rect::from_xywh(
                x + horizontal_gap / 2,
                y,
                width - horizontal_gap,
                height - vertical_gap,
            ),
            hit_box: Rect::new(x, y, x + width + 1, y + height),
            horizontal_gap,
            vertical_gap,
            kind: KeyKind::Normal,
            flags: KeyFlags {
                modifier: is_modifier_code(code),
                ..KeyFlags::default()
            },
            more_keys: None,
            more_keys_config: MoreKeysConfig::default(),
            alt_code: None,
        }
    }

    /// Gapless single-character key over `rect`.
    pub fn letter(c: char, rect: Rect) -> Self {
        Self::new(
            c as i32,
            Some(c.to_string()),
            rect.left,
            rect.top,
            rect.width(),
            rect.height(),
            0,
            0,
        )
    }

    /// Key built from a parsed more-key spec (popup panels).
    pub fn from_more_key(spec: &MoreKeySpec, x: i32, y: i32, width: i32, height: i32, h_gap: i32, v_gap: i32) -> Self {
        let mut key = Self::new(spec.code, spec.label.clone(), x, y, width, height, h_gap, v_gap);
        key.output_text = spec.output_text.clone();
        key.icon = spec.icon.clone();
        key
    }

    pub fn spacer(x: i32, y: i32, width: i32, height: i32) -> Self {
        let mut key = Self::new(CODE_UNSPECIFIED, None, x, y, width, height, 0, 0);
        key.kind = KeyKind::Spacer;
        key
    }

    /// Divider drawn between popup columns. Its hit box equals its rect.
    pub fn divider(x: i32, y: i32, width: i32, height: i32) -> Self {
        let mut key = Self::spacer(x, y, width, height);
        key.kind = KeyKind::Divider;
        key.hit_box = key.rect;
        key
    }

    pub fn with_output_text(mut self, text: impl Into<String>) -> Self {
        self.code = CODE_OUTPUT_TEXT;
        self.output_text = Some(text.into());
        self
    }

    pub fn with_flags(mut self, flags: KeyFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.flags.repeatable = true;
        self
    }

    pub fn with_alt_code(mut self, alt_code: i32) -> Self {
        self.alt_code = Some(alt_code);
        self.flags.alt_code_while_typing = true;
        self
    }

    /// Attach parsed more keys. Long press is enabled only if any survived.
    pub fn with_more_keys(mut self, parsed: ParsedMoreKeys) -> Self {
        self.flags.long_press_enabled |= parsed.specs.is_some();
        self.more_keys = parsed.specs;
        self.more_keys_config = parsed.config;
        self
    }

    pub fn x(&self) -> i32 {
        self.rect.left
    }

    pub fn y(&self) -> i32 {
        self.rect.top
    }

    pub fn width(&self) -> i32 {
        self.rect.width()
    }

    pub fn height(&self) -> i32 {
        self.rect.height()
    }

    pub fn is_spacer(&self) -> bool {
        self.kind != KeyKind::Normal
    }

    pub fn is_modifier(&self) -> bool {
        self.flags.modifier
    }

    pub fn is_repeatable(&self) -> bool {
        self.flags.repeatable
    }

    pub fn is_long_press_enabled(&self) -> bool {
        self.flags.long_press_enabled
    }

    pub fn has_no_panel_auto_more_key(&self) -> bool {
        self.more_keys_config.no_panel_auto_more_key
    }

    pub fn alt_code_while_typing(&self) -> bool {
        self.flags.alt_code_while_typing && self.alt_code.is_some()
    }

    pub fn is_on_key(&self, x: i32, y: i32) -> bool {
        self.hit_box.contains(x, y)
    }

    /// Squared distance from `(x, y)` to the nearest point of the visual rect.
    /// Zero when the point is inside.
    pub fn squared_distance_to_edge(&self, x: i32, y: i32) -> i32 {
        let left = self.x();
        let right = left + self.width();
        let top = self.y();
        let bottom = top + self.height();
        let edge_x = x.clamp(left, right.max(left));
        let edge_y = y.clamp(top, bottom.max(top));
        let dx = x - edge_x;
        let dy = y - edge_y;
        dx * dx + dy * dy
    }

    pub(crate) fn mark_as_left_edge(&mut self, left_padding: i32) {
        self.hit_box.left = left_padding;
    }

    pub(crate) fn mark_as_right_edge(&mut self, occupied_width: i32, right_padding: i32) {
        self.hit_box.right = occupied_width - right_padding;
    }

    pub(crate) fn mark_as_top_edge(&mut self, top_padding: i32) {
        self.hit_box.top = top_padding;
    }

    pub(crate) fn mark_as_bottom_edge(&mut self, occupied_height: i32, bottom_padding: i32) {
        self.hit_box.bottom = occupied_height + bottom_padding;
    }
}
