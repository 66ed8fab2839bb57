use crate::key::KeyGeometry;
use crate::types::KeyId;
use std::fmt;

pub const GRID_WIDTH: usize = 32;
pub const GRID_HEIGHT: usize = 16;
/// Keys within this many most-common-key-widths of a cell centre are candidates.
const SEARCH_DISTANCE: f32 = 1.2;

/// Nearest-key lookup used by hit-testing.
///
/// Implementations return a small candidate set, never the full key list
/// unless the keyboard is tiny. Coordinates are already clamped inside the
/// keyboard.
pub trait SpatialIndex: fmt::Debug + Send + Sync {
    fn nearest_keys(&self, x: i32, y: i32) -> &[KeyId];
}

/// Fixed grid over the keyboard; each cell lists the keys close to its centre.
#[derive(Debug, Clone)]
pub struct GridProximity {
    grid_width: usize,
    grid_height: usize,
    cell_width: i32,
    cell_height: i32,
    width: i32,
    height: i32,
    cells: Vec<Vec<KeyId>>,
}

impl GridProximity {
    pub fn new(keys: &[KeyGeometry], width: i32, height: i32, most_common_key_width: i32) -> Self {
        Self::with_grid(keys, width, height, most_common_key_width, GRID_WIDTH, GRID_HEIGHT)
    }

    pub fn with_grid(
        keys: &[KeyGeometry],
        width: i32,
        height: i32,
        most_common_key_width: i32,
        grid_width: usize,
        grid_height: usize,
    ) -> Self {
        let gw = grid_width.max(1) as i32;
        let gh = grid_height.max(1) as i32;
        // Round up so no pixel falls outside the grid.
        let cell_width = ((width.max(1) + gw - 1) / gw).max(1);
        let cell_height = ((height.max(1) + gh - 1) / gh).max(1);
        let threshold = (most_common_key_width as f32 * SEARCH_DISTANCE) as i32;
        let threshold_sq = threshold * threshold;

        let mut cells = vec![Vec::new(); (gw * gh) as usize];
        for (index, cell) in cells.iter_mut().enumerate() {
            let cx = (index as i32 % gw) * cell_width + cell_width / 2;
            let cy = (index as i32 / gw) * cell_height + cell_height / 2;
            for (id, key) in keys.iter().enumerate() {
                if key.is_spacer() {
                    continue;
                }
                if key.squared_distance_to_edge(cx, cy) < threshold_sq || key.is_on_key(cx, cy) {
                    cell.push(id);
                }
            }
        }

        Self {
            grid_width: gw as usize,
            grid_height: gh as usize,
            cell_width,
            cell_height,
            width,
            height,
            cells,
        }
    }

    pub fn grid_size(&self) -> (usize, usize) {
        (self.grid_width, self.grid_height)
    }
}

impl SpatialIndex for GridProximity {
    fn nearest_keys(&self, x: i32, y: i32) -> &[KeyId] {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return &[];
        }
        let col = (x / self.cell_width) as usize;
        let row = (y / self.cell_height) as usize;
        let index = row * self.grid_width + col;
        self.cells.get(index).map_or(&[], Vec::as_slice)
    }
}

/// Every non-spacer key is a candidate. Used for tiny keyboards such as
/// popup panels.
#[derive(Debug, Clone)]
pub struct AllKeys {
    ids: Vec<KeyId>,
}

impl AllKeys {
    pub fn new(keys: &[KeyGeometry]) -> Self {
        Self {
            ids: keys
                .iter()
                .enumerate()
                .filter(|(_, key)| !key.is_spacer())
                .map(|(id, _)| id)
                .collect(),
        }
    }
}

impl SpatialIndex for AllKeys {
    fn nearest_keys(&self, _x: i32, _y: i32) -> &[KeyId] {
        &self.ids
    }
}
