use crate::cache::KeyboardElement;
use crate::error::LayoutError;
use crate::key::KeyGeometry;
use crate::more_key_spec::{remove_redundant_more_keys, LettersOnBaseLayout};
use crate::proximity::{GridProximity, SpatialIndex};
use crate::types::*;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The two mutable bits of a key. Owned by the layout, indexed by `KeyId`.
#[derive(Debug)]
pub struct KeyRuntimeState {
    pressed: AtomicBool,
    enabled: AtomicBool,
}

impl Default for KeyRuntimeState {
    fn default() -> Self {
        Self {
            pressed: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        }
    }
}

/// Geometry settings for building a layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub name: Option<String>,
    pub element: KeyboardElement,
    pub width: i32,
    /// Minimum occupied height; grows to fit the rows.
    pub height: i32,
    pub top_padding: i32,
    pub bottom_padding: i32,
    pub left_padding: i32,
    pub right_padding: i32,
    pub horizontal_gap: i32,
    pub vertical_gap: i32,
    pub default_key_width: i32,
    pub default_row_height: i32,
    pub max_more_keys_column: usize,
    pub proximity_chars_correction: bool,
    pub allow_redundant_more_keys: bool,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            name: None,
            element: KeyboardElement::Alphabet,
            width: 1000,
            height: 0,
            top_padding: 0,
            bottom_padding: 0,
            left_padding: 0,
            right_padding: 0,
            horizontal_gap: 0,
            vertical_gap: 0,
            default_key_width: 100,
            default_row_height: 100,
            max_more_keys_column: 5,
            proximity_chars_correction: true,
            allow_redundant_more_keys: false,
        }
    }
}

/// Immutable collection of keys plus aggregate metrics.
///
/// Keys are sorted top-left to bottom-right and addressed by index.
pub struct KeyboardLayout {
    params: LayoutParams,
    keys: Vec<KeyGeometry>,
    runtime: Vec<KeyRuntimeState>,
    occupied_width: i32,
    occupied_height: i32,
    most_common_key_width: i32,
    most_common_key_height: i32,
    index: Box<dyn SpatialIndex>,
    // Read from background threads; kept apart from the hit-testing path.
    code_cache: Mutex<HashMap<i32, Option<KeyId>>>,
}

impl fmt::Debug for KeyboardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyboardLayout")
            .field("name", &self.params.name)
            .field("element", &self.params.element)
            .field("keys", &self.keys.len())
            .field("occupied_width", &self.occupied_width)
            .field("occupied_height", &self.occupied_height)
            .finish()
    }
}

impl KeyboardLayout {
    /// Build from already positioned keys. Hit boxes are used as given.
    pub fn from_keys(params: LayoutParams, keys: Vec<KeyGeometry>) -> Result<Self, LayoutError> {
        let occupied_height = params.height;
        Self::assemble(params, keys, occupied_height, None)
    }

    /// Same as `from_keys` with a custom spatial index.
    pub fn with_index(
        params: LayoutParams,
        keys: Vec<KeyGeometry>,
        index: Box<dyn SpatialIndex>,
    ) -> Result<Self, LayoutError> {
        let occupied_height = params.height;
        Self::assemble(params, keys, occupied_height, Some(index))
    }

    fn assemble(
        params: LayoutParams,
        mut keys: Vec<KeyGeometry>,
        occupied_height: i32,
        index: Option<Box<dyn SpatialIndex>>,
    ) -> Result<Self, LayoutError> {
        // Zero width spacers carry no information.
        keys.retain(|key| !(key.is_spacer() && key.width() <= 0));
        if keys.iter().all(KeyGeometry::is_spacer) {
            return Err(LayoutError::NoKeys);
        }
        keys.sort_by_key(|key| (key.y(), key.x()));

        if !params.allow_redundant_more_keys {
            let mut letters = LettersOnBaseLayout::new();
            for key in &keys {
                letters.add_key(key);
            }
            for key in &mut keys {
                if key.more_keys.is_none() {
                    continue;
                }
                key.more_keys = remove_redundant_more_keys(key.more_keys.take(), &letters);
                if key.more_keys.is_none() {
                    key.flags.long_press_enabled = false;
                }
            }
        }

        let (most_common_key_width, most_common_key_height) =
            most_common_sizes(&keys, params.horizontal_gap, params.vertical_gap);
        let occupied_width = params.width;
        let index = index.unwrap_or_else(|| {
            Box::new(GridProximity::new(
                &keys,
                occupied_width,
                occupied_height,
                most_common_key_width,
            ))
        });
        let runtime = keys.iter().map(|_| KeyRuntimeState::default()).collect();

        debug!(
            name = ?params.name,
            keys = keys.len(),
            most_common_key_width,
            most_common_key_height,
            "layout built"
        );
        Ok(Self {
            params,
            keys,
            runtime,
            occupied_width,
            occupied_height,
            most_common_key_width,
            most_common_key_height,
            index,
            code_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.params.name.as_deref()
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn element(&self) -> KeyboardElement {
        self.params.element
    }

    pub fn is_alphabet(&self) -> bool {
        self.params.element.is_alphabet()
    }

    pub fn keys(&self) -> &[KeyGeometry] {
        &self.keys
    }

    pub fn key(&self, id: KeyId) -> Option<&KeyGeometry> {
        self.keys.get(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn occupied_width(&self) -> i32 {
        self.occupied_width
    }

    pub fn occupied_height(&self) -> i32 {
        self.occupied_height
    }

    pub fn most_common_key_width(&self) -> i32 {
        self.most_common_key_width
    }

    pub fn most_common_key_height(&self) -> i32 {
        self.most_common_key_height
    }

    pub fn vertical_gap(&self) -> i32 {
        self.params.vertical_gap
    }

    pub fn horizontal_gap(&self) -> i32 {
        self.params.horizontal_gap
    }

    pub fn max_more_keys_column(&self) -> usize {
        self.params.max_more_keys_column
    }

    /// Candidate keys near `(x, y)`. Points are clamped into the keyboard so
    /// edge pixels are never dead.
    pub fn nearest_keys(&self, x: i32, y: i32) -> &[KeyId] {
        let x = x.min(self.occupied_width - 1).max(0);
        let y = y.min(self.occupied_height - 1).max(0);
        self.index.nearest_keys(x, y)
    }

    /// First key producing `code`. Safe to call from any thread.
    pub fn key_for_code(&self, code: i32) -> Option<KeyId> {
        if code == CODE_UNSPECIFIED {
            return None;
        }
        let mut cache = self.code_cache.lock();
        *cache
            .entry(code)
            .or_insert_with(|| self.keys.iter().position(|key| key.code == code))
    }

    /// Whether touch coordinates are useful for correcting `code`.
    pub fn has_proximity_chars_correction(&self, code: i32) -> bool {
        if !self.params.proximity_chars_correction {
            return false;
        }
        self.params.element.has_proximity_info() || is_alphabetic_code(code)
    }

    pub fn is_pressed(&self, id: KeyId) -> bool {
        self.runtime
            .get(id)
            .map_or(false, |state| state.pressed.load(Ordering::Relaxed))
    }

    pub fn set_pressed(&self, id: KeyId, pressed: bool) {
        if let Some(state) = self.runtime.get(id) {
            state.pressed.store(pressed, Ordering::Relaxed);
        }
    }

    pub fn is_enabled(&self, id: KeyId) -> bool {
        self.runtime
            .get(id)
            .map_or(false, |state| state.enabled.load(Ordering::Relaxed))
    }

    pub fn set_enabled(&self, id: KeyId, enabled: bool) {
        if let Some(state) = self.runtime.get(id) {
            state.enabled.store(enabled, Ordering::Relaxed);
        }
    }
}

fn most_common_sizes(keys: &[KeyGeometry], horizontal_gap: i32, vertical_gap: i32) -> (i32, i32) {
    let mut widths: HashMap<i32, usize> = HashMap::new();
    let mut heights: HashMap<i32, usize> = HashMap::new();
    let (mut best_width, mut best_width_count) = (0, 0);
    let (mut best_height, mut best_height_count) = (0, 0);
    for key in keys.iter().filter(|key| !key.is_spacer()) {
        let height = key.height() + vertical_gap;
        let count = heights.entry(height).or_default();
        *count += 1;
        // Strictly greater: ties keep the first size seen.
        if *count > best_height_count {
            best_height_count = *count;
            best_height = height;
        }

        let width = key.width() + horizontal_gap;
        let count = widths.entry(width).or_default();
        *count += 1;
        if *count > best_width_count {
            best_width_count = *count;
            best_width = width;
        }
    }
    (best_width, best_height)
}

/// Handle on one key of one layout.
///
/// Holds the layout alive, so a key pressed before a layout switch can still
/// be released against the layout it came from.
#[derive(Clone)]
pub struct KeyRef {
    layout: Arc<KeyboardLayout>,
    id: KeyId,
}

impl KeyRef {
    pub fn new(layout: Arc<KeyboardLayout>, id: KeyId) -> Option<Self> {
        (id < layout.len()).then_some(Self { layout, id })
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn layout(&self) -> &Arc<KeyboardLayout> {
        &self.layout
    }

    pub fn is_pressed(&self) -> bool {
        self.layout.is_pressed(self.id)
    }

    pub fn set_pressed(&self, pressed: bool) {
        self.layout.set_pressed(self.id, pressed);
    }

    pub fn is_enabled(&self) -> bool {
        self.layout.is_enabled(self.id)
    }
}

impl Deref for KeyRef {
    type Target = KeyGeometry;

    fn deref(&self) -> &KeyGeometry {
        &self.layout.keys[self.id]
    }
}

impl PartialEq for KeyRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.layout, &other.layout)
    }
}

impl Eq for KeyRef {}

impl fmt::Debug for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRef({}, code={})", self.id, self.code)
    }
}

/// The layout currently shown, shared with the host.
///
/// A listener that switches layouts from inside `on_press_key` replaces the
/// layout here; the pressing pointer notices and hit-tests again.
#[derive(Debug, Clone)]
pub struct LayoutHandle(Arc<RwLock<Arc<KeyboardLayout>>>);

impl LayoutHandle {
    pub fn new(layout: Arc<KeyboardLayout>) -> Self {
        Self(Arc::new(RwLock::new(layout)))
    }

    pub fn current(&self) -> Arc<KeyboardLayout> {
        self.0.read().clone()
    }

    pub fn replace(&self, layout: Arc<KeyboardLayout>) {
        *self.0.write() = layout;
    }
}

/// Row-by-row layout construction with edge marking.
///
/// The first key of each row reaches the left padding, the last key reaches
/// the right edge, keys of the first row reach the top padding and keys of
/// the last row reach the bottom.
pub struct LayoutBuilder {
    params: LayoutParams,
    keys: Vec<KeyGeometry>,
    current_y: i32,
    row: Option<RowCursor>,
    top_edge: bool,
    last_row: Vec<usize>,
}

struct RowCursor {
    x: i32,
    height: i32,
    first: bool,
    right_edge_key: Option<usize>,
    members: Vec<usize>,
}

impl LayoutBuilder {
    pub fn new(params: LayoutParams) -> Self {
        let current_y = params.top_padding;
        Self {
            params,
            keys: Vec::new(),
            current_y,
            row: None,
            top_edge: true,
            last_row: Vec::new(),
        }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn start_row(&mut self, row_height: Option<i32>) {
        self.end_row();
        self.row = Some(RowCursor {
            x: self.params.left_padding,
            height: row_height.unwrap_or(self.params.default_row_height),
            first: true,
            right_edge_key: None,
            members: Vec::new(),
        });
    }

    /// Cell `(x, y, width, height)` for the next key of `width` pixels, gaps
    /// included. Advances the row cursor.
    pub fn next_cell(&mut self, width: i32) -> (i32, i32, i32, i32) {
        if self.row.is_none() {
            self.start_row(None);
        }
        let y = self.current_y;
        match self.row.as_mut() {
            Some(row) => {
                let x = row.x;
                row.x += width;
                (x, y, width, row.height)
            }
            None => (0, y, width, self.params.default_row_height),
        }
    }

    /// Leave empty space in the current row.
    pub fn add_gap(&mut self, width: i32) {
        let (x, y, w, h) = self.next_cell(width);
        self.keys.push(KeyGeometry::spacer(x, y, w, h));
    }

    /// Add a key produced from `next_cell`.
    pub fn add_key(&mut self, mut key: KeyGeometry) {
        if self.row.is_none() {
            self.start_row(None);
        }
        let id = self.keys.len();
        if let Some(row) = self.row.as_mut() {
            if row.first {
                key.mark_as_left_edge(self.params.left_padding);
                row.first = false;
            }
            if self.top_edge {
                key.mark_as_top_edge(self.params.top_padding);
            }
            row.right_edge_key = Some(id);
            row.members.push(id);
        }
        self.keys.push(key);
    }

    pub fn end_row(&mut self) {
        let Some(row) = self.row.take() else { return };
        if let Some(id) = row.right_edge_key {
            let width = self.params.width;
            let right_padding = self.params.right_padding;
            self.keys[id].mark_as_right_edge(width, right_padding);
        }
        self.current_y += row.height;
        self.top_edge = false;
        if !row.members.is_empty() {
            self.last_row = row.members;
        }
    }

    pub fn build(mut self) -> Result<KeyboardLayout, LayoutError> {
        self.end_row();
        let actual_height = self.current_y - self.params.vertical_gap + self.params.bottom_padding;
        let occupied_height = self.params.height.max(actual_height);
        for &id in &self.last_row {
            self.keys[id].mark_as_bottom_edge(occupied_height, self.params.bottom_padding);
        }
        KeyboardLayout::assemble(self.params, self.keys, occupied_height, None)
    }
}
