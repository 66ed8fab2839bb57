//! Geometry of long-press popup panels.
//!
//! Position 0 is always the slot right above the parent key. Other keys fan
//! out to the right (positive positions) and left (negative). Row 0 is the
//! bottom row, closest to the parent key.

use crate::config::MoreKeysParams;
use crate::error::LayoutError;
use crate::key::KeyGeometry;
use crate::layout::{KeyboardLayout, LayoutParams};
use crate::more_key_spec::MoreKeySpec;
use crate::proximity::AllKeys;
use std::sync::Arc;
use tracing::debug;

/// Inputs of the popup layout algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreKeysConstraints {
    pub num_keys: usize,
    /// Column count (exact when `fixed_column`, an upper bound otherwise).
    pub num_column: usize,
    pub key_width: i32,
    pub row_height: i32,
    /// Centre of the parent key in parent keyboard coordinates.
    pub coord_x_in_parent: i32,
    pub parent_keyboard_width: i32,
    pub fixed_column: bool,
    pub fixed_order: bool,
    pub divider_width: i32,
    pub vertical_gap: i32,
    pub top_padding: i32,
    pub bottom_padding: i32,
    pub left_padding: i32,
}

/// Solved row/column layout of a popup panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoreKeysGeometry {
    pub num_rows: i32,
    pub num_columns: i32,
    /// Keys in the top row.
    pub top_keys: i32,
    pub left_keys: i32,
    /// Includes the parent-aligned slot.
    pub right_keys: i32,
    /// 0 or -1: shifts the top row left by half a column to keep it centred.
    pub top_row_adjustment: i32,
    pub fixed_order: bool,
    pub key_width: i32,
    pub row_height: i32,
    pub divider_width: i32,
    pub column_width: i32,
    pub occupied_width: i32,
    pub occupied_height: i32,
    pub top_padding: i32,
    pub left_padding: i32,
}

impl MoreKeysGeometry {
    pub fn compute(c: &MoreKeysConstraints) -> Result<Self, LayoutError> {
        if c.key_width <= 0 {
            return Err(LayoutError::ZeroKeyWidth(c.key_width));
        }
        if c.num_keys == 0 || c.num_column == 0 {
            return Err(LayoutError::NoKeys);
        }
        let num_keys = c.num_keys as i32;
        let num_column = c.num_column as i32;
        if c.parent_keyboard_width / c.key_width < num_keys.min(num_column) {
            return Err(LayoutError::MoreKeysTooWide {
                keyboard_width: c.parent_keyboard_width,
                key_width: c.key_width,
                num_keys: c.num_keys,
                max_columns: c.num_column,
            });
        }

        let num_rows = (num_keys + num_column - 1) / num_column;
        let num_columns = if c.fixed_column {
            num_keys.min(num_column)
        } else {
            optimized_columns(num_keys, num_column, num_rows)
        };
        let top_keys = match num_keys % num_columns {
            0 => num_columns,
            n => n,
        };

        let num_left_keys = (num_columns - 1) / 2;
        let num_right_keys = num_columns - num_left_keys;
        // How many columns fit on each side of the parent key.
        let max_left_keys = c.coord_x_in_parent / c.key_width;
        let max_right_keys = (c.parent_keyboard_width - c.coord_x_in_parent) / c.key_width;
        let (mut left_keys, mut right_keys) = if num_left_keys > max_left_keys {
            (max_left_keys, num_columns - max_left_keys)
        } else if num_right_keys > max_right_keys + 1 {
            (num_columns - (max_right_keys + 1), max_right_keys + 1)
        } else {
            (num_left_keys, num_right_keys)
        };
        // A side filled right up to the keyboard edge pushes the panel one
        // column inwards, unless the parent key itself sits on that edge.
        if max_left_keys == left_keys && left_keys > 0 {
            left_keys -= 1;
            right_keys += 1;
        }
        if max_right_keys == right_keys - 1 && right_keys > 1 {
            left_keys += 1;
            right_keys -= 1;
        }

        let mut geometry = Self {
            num_rows,
            num_columns,
            top_keys,
            left_keys,
            right_keys,
            top_row_adjustment: 0,
            fixed_order: c.fixed_order,
            key_width: c.key_width,
            row_height: c.row_height,
            divider_width: c.divider_width,
            column_width: c.key_width + c.divider_width,
            occupied_width: 0,
            occupied_height: 0,
            top_padding: c.top_padding,
            left_padding: c.left_padding,
        };
        geometry.top_row_adjustment = if c.fixed_order {
            geometry.fixed_order_top_row_adjustment()
        } else {
            geometry.auto_order_top_row_adjustment()
        };
        geometry.occupied_width = num_columns * geometry.column_width - c.divider_width;
        // Only the bottom row's gutter is dropped.
        geometry.occupied_height =
            num_rows * c.row_height - c.vertical_gap + c.top_padding + c.bottom_padding;
        Ok(geometry)
    }

    fn fixed_order_top_row_adjustment(&self) -> i32 {
        if self.num_rows == 1
            || self.top_keys % 2 == 1
            || self.top_keys == self.num_columns
            || self.left_keys == 0
            || self.right_keys == 1
        {
            0
        } else {
            -1
        }
    }

    fn auto_order_top_row_adjustment(&self) -> i32 {
        if self.num_rows == 1
            || self.top_keys == 1
            || self.num_columns % 2 == self.top_keys % 2
            || self.left_keys == 0
            || self.right_keys == 1
        {
            0
        } else {
            -1
        }
    }

    pub fn is_top_row(&self, row: i32) -> bool {
        self.num_rows > 1 && row == self.num_rows - 1
    }

    /// Column position of the `n`th more key relative to the parent slot.
    pub fn column_pos(&self, n: usize) -> i32 {
        if self.fixed_order {
            self.fixed_order_column_pos(n as i32)
        } else {
            self.automatic_column_pos(n as i32)
        }
    }

    fn fixed_order_column_pos(&self, n: i32) -> i32 {
        let col = n % self.num_columns;
        let row = n / self.num_columns;
        if !self.is_top_row(row) {
            return col - self.left_keys;
        }
        let right_side_keys = self.top_keys / 2;
        let left_side_keys = self.top_keys - (right_side_keys + 1);
        let pos = col - left_side_keys;
        let num_left_keys = self.left_keys + self.top_row_adjustment;
        let num_right_keys = self.right_keys - 1;
        if num_right_keys >= right_side_keys && num_left_keys >= left_side_keys {
            pos
        } else if num_right_keys < right_side_keys {
            pos - (right_side_keys - num_right_keys)
        } else {
            pos + (left_side_keys - num_left_keys)
        }
    }

    fn automatic_column_pos(&self, n: i32) -> i32 {
        let col = n % self.num_columns;
        let row = n / self.num_columns;
        let mut left_keys = self.left_keys;
        if self.is_top_row(row) {
            left_keys += self.top_row_adjustment;
        }
        if col == 0 {
            return 0;
        }

        let mut pos = 0;
        let mut right = 1;
        let mut left = 0;
        let mut i = 0;
        loop {
            let before = i;
            if right < self.right_keys {
                pos = right;
                right += 1;
                i += 1;
            }
            if i >= col {
                break;
            }
            if left < left_keys {
                left += 1;
                pos = -left;
                i += 1;
            }
            if i >= col || i == before {
                break;
            }
        }
        pos
    }

    /// X of the parent-aligned column.
    pub fn default_key_coord_x(&self) -> i32 {
        self.left_keys * self.column_width + self.left_padding
    }

    pub fn x(&self, n: usize, row: i32) -> i32 {
        let x = self.column_pos(n) * self.column_width + self.default_key_coord_x();
        if self.is_top_row(row) {
            x + self.top_row_adjustment * (self.column_width / 2)
        } else {
            x
        }
    }

    pub fn y(&self, row: i32) -> i32 {
        (self.num_rows - 1 - row) * self.row_height + self.top_padding
    }
}

fn top_row_empty_slots(num_keys: i32, num_columns: i32) -> i32 {
    match num_keys % num_columns {
        0 => 0,
        remaining => num_columns - remaining,
    }
}

fn optimized_columns(num_keys: i32, max_columns: i32, num_rows: i32) -> i32 {
    let mut num_columns = num_keys.min(max_columns);
    while num_columns > 1 && top_row_empty_slots(num_keys, num_columns) >= num_rows {
        num_columns -= 1;
    }
    num_columns
}

/// One placed entry of a popup panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedMoreKey {
    pub key: KeyGeometry,
    /// Column position; `None` for dividers.
    pub position: Option<i32>,
    pub row: i32,
}

/// Place `specs` according to `geometry`, inserting dividers between
/// columns when the geometry has a divider width.
pub fn place_more_keys(
    geometry: &MoreKeysGeometry,
    specs: &[MoreKeySpec],
    vertical_gap: i32,
) -> Vec<PlacedMoreKey> {
    let mut placed = Vec::with_capacity(specs.len() * 2);
    for (n, spec) in specs.iter().enumerate() {
        let row = n as i32 / geometry.num_columns;
        let x = geometry.x(n, row);
        let y = geometry.y(row);
        let mut key = KeyGeometry::from_more_key(
            spec,
            x,
            y,
            geometry.key_width,
            geometry.row_height,
            0,
            vertical_gap,
        );
        mark_as_edge_key(geometry, &mut key, row);
        let pos = geometry.column_pos(n);
        placed.push(PlacedMoreKey {
            key,
            position: Some(pos),
            row,
        });

        if geometry.divider_width > 0 && pos != 0 {
            let divider_x = if pos > 0 {
                x - geometry.divider_width
            } else {
                x + geometry.key_width
            };
            placed.push(PlacedMoreKey {
                key: KeyGeometry::divider(divider_x, y, geometry.divider_width, geometry.row_height),
                position: None,
                row,
            });
        }
    }
    placed
}

// The bottom row reaches the panel bottom so a finger resting just above the
// parent key still selects; the top row reaches the top padding.
fn mark_as_edge_key(geometry: &MoreKeysGeometry, key: &mut KeyGeometry, row: i32) {
    if row == 0 {
        key.mark_as_bottom_edge(geometry.occupied_height, 0);
    }
    if row == geometry.num_rows - 1 {
        key.mark_as_top_edge(geometry.top_padding);
    }
}

/// A built popup panel keyboard.
#[derive(Debug, Clone)]
pub struct MoreKeysKeyboard {
    pub layout: Arc<KeyboardLayout>,
    pub geometry: MoreKeysGeometry,
    /// Panel-local X of the parent key centre line.
    pub default_key_coord_x: i32,
}

/// Build the popup panel for `parent` living in `parent_layout`.
pub fn build_more_keys_keyboard(
    parent: &KeyGeometry,
    parent_layout: &KeyboardLayout,
    params: &MoreKeysParams,
) -> Result<MoreKeysKeyboard, LayoutError> {
    let specs = parent
        .more_keys
        .as_deref()
        .filter(|specs| !specs.is_empty())
        .ok_or(LayoutError::NoKeys)?;
    let config = parent.more_keys_config;

    let base_width = parent_layout.most_common_key_width();
    let has_long_labels = specs
        .iter()
        .any(|spec| spec.label.as_ref().map_or(false, |l| l.chars().count() > 1));
    let key_width = if config.has_labels && has_long_labels {
        base_width + (base_width as f32 * params.label_padding_ratio) as i32
    } else {
        base_width
    };
    let divider_width = if config.needs_dividers {
        (key_width as f32 * params.divider_ratio) as i32
    } else {
        0
    };
    let vertical_gap = parent_layout.vertical_gap() / 2;
    let num_column = if config.column > 0 {
        config.column
    } else {
        parent_layout.max_more_keys_column().max(1)
    };

    let constraints = MoreKeysConstraints {
        num_keys: specs.len(),
        num_column,
        key_width,
        row_height: parent_layout.most_common_key_height(),
        coord_x_in_parent: parent.x() + parent.width() / 2,
        parent_keyboard_width: parent_layout.occupied_width(),
        fixed_column: config.fixed_column,
        fixed_order: config.fixed_order,
        divider_width,
        vertical_gap,
        top_padding: 0,
        bottom_padding: 0,
        left_padding: 0,
    };
    let geometry = MoreKeysGeometry::compute(&constraints)?;
    let keys: Vec<KeyGeometry> = place_more_keys(&geometry, specs, vertical_gap)
        .into_iter()
        .map(|placed| placed.key)
        .collect();

    let layout_params = LayoutParams {
        name: parent_layout.name().map(|name| format!("{name}/more:{}", parent.code)),
        element: parent_layout.element(),
        width: geometry.occupied_width,
        height: geometry.occupied_height,
        vertical_gap,
        default_key_width: key_width,
        default_row_height: geometry.row_height,
        proximity_chars_correction: parent_layout.params().proximity_chars_correction,
        allow_redundant_more_keys: true,
        ..LayoutParams::default()
    };
    let index = Box::new(AllKeys::new(&keys));
    let layout = KeyboardLayout::with_index(layout_params, keys, index)?;
    debug!(
        parent = parent.code,
        rows = geometry.num_rows,
        columns = geometry.num_columns,
        "more keys keyboard built"
    );
    Ok(MoreKeysKeyboard {
        layout: Arc::new(layout),
        default_key_coord_x: geometry.default_key_coord_x() + geometry.key_width / 2,
        geometry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(num_keys: usize, num_column: usize, coord_x: i32) -> MoreKeysConstraints {
        MoreKeysConstraints {
            num_keys,
            num_column,
            key_width: 100,
            row_height: 80,
            coord_x_in_parent: coord_x,
            parent_keyboard_width: 1000,
            fixed_column: false,
            fixed_order: false,
            divider_width: 0,
            vertical_gap: 0,
            top_padding: 0,
            bottom_padding: 0,
            left_padding: 0,
        }
    }

    fn positions(g: &MoreKeysGeometry, n: usize) -> Vec<i32> {
        (0..n).map(|i| g.column_pos(i)).collect()
    }

    #[test]
    fn test_five_keys_three_columns_auto_order() {
        let g = MoreKeysGeometry::compute(&constraints(5, 3, 500)).unwrap();
        assert_eq!(g.num_rows, 2);
        assert_eq!(g.num_columns, 3);
        assert_eq!(g.top_keys, 2);
        assert_eq!((g.left_keys, g.right_keys), (1, 2));
        // Parent slot, then right, then left.
        assert_eq!(positions(&g, 3), vec![0, 1, -1]);
        // Even top row is shifted half a column left to stay centred.
        assert_eq!(g.top_row_adjustment, -1);
        assert_eq!(g.column_pos(3), 0);
        assert_eq!(g.column_pos(4), 1);
    }

    #[test]
    fn test_wide_row_alternates_right_then_left() {
        let g = MoreKeysGeometry::compute(&constraints(5, 5, 500)).unwrap();
        assert_eq!(g.num_rows, 1);
        assert_eq!((g.left_keys, g.right_keys), (2, 3));
        assert_eq!(positions(&g, 5), vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn test_optimized_columns_avoid_sparse_top_row() {
        // 7 keys, at most 5 columns: 2 rows either way, 4 columns leave
        // fewer empty top slots than 5.
        let g = MoreKeysGeometry::compute(&constraints(7, 5, 500)).unwrap();
        assert_eq!(g.num_rows, 2);
        assert_eq!(g.num_columns, 4);
        assert_eq!(g.top_keys, 3);

        let mut fixed = constraints(7, 5, 500);
        fixed.fixed_column = true;
        assert_eq!(MoreKeysGeometry::compute(&fixed).unwrap().num_columns, 5);
    }

    #[test]
    fn test_parent_at_left_edge_shifts_keys_right() {
        let g = MoreKeysGeometry::compute(&constraints(5, 5, 50)).unwrap();
        assert_eq!((g.left_keys, g.right_keys), (0, 5));
        assert_eq!(positions(&g, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_parent_near_right_edge_shifts_keys_left() {
        let g = MoreKeysGeometry::compute(&constraints(5, 5, 950)).unwrap();
        assert_eq!(g.right_keys, 1);
        assert_eq!(g.left_keys, 4);
        assert_eq!(positions(&g, 5), vec![0, -1, -2, -3, -4]);
        // Panel never extends past the parent keyboard.
        let left_edge = 950 - g.left_keys * g.column_width - g.key_width / 2;
        assert!(left_edge >= 0);
    }

    #[test]
    fn test_boundary_compensation() {
        // Two columns fit exactly on the left: shift one to the right.
        let g = MoreKeysGeometry::compute(&constraints(5, 5, 250)).unwrap();
        assert_eq!((g.left_keys, g.right_keys), (1, 4));
    }

    #[test]
    fn test_fixed_order_is_left_to_right() {
        let mut c = constraints(4, 4, 500);
        c.fixed_column = true;
        c.fixed_order = true;
        let g = MoreKeysGeometry::compute(&c).unwrap();
        assert_eq!((g.left_keys, g.right_keys), (1, 3));
        assert_eq!(positions(&g, 4), vec![-1, 0, 1, 2]);
    }

    #[test]
    fn test_fixed_order_two_rows() {
        let mut c = constraints(5, 3, 500);
        c.fixed_column = true;
        c.fixed_order = true;
        let g = MoreKeysGeometry::compute(&c).unwrap();
        assert_eq!(g.top_keys, 2);
        assert_eq!(g.top_row_adjustment, -1);
        // Bottom row is linear, top row centred around the parent slot.
        assert_eq!(positions(&g, 5), vec![-1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_rows_and_unique_positions() {
        for n in 1..=12usize {
            for max in 1..=6usize {
                let g = MoreKeysGeometry::compute(&constraints(n, max, 500)).unwrap();
                assert_eq!(g.num_rows as usize, (n + max - 1) / max);
                let cols = g.num_columns as usize;
                for row in 0..g.num_rows as usize {
                    let start = row * cols;
                    let end = (start + cols).min(n);
                    let mut seen: Vec<i32> = (start..end).map(|i| g.column_pos(i)).collect();
                    seen.sort_unstable();
                    seen.dedup();
                    assert_eq!(seen.len(), end - start, "n={n} max={max} row={row}");
                }
                assert_eq!(g.column_pos(0), 0);
            }
        }
    }

    #[test]
    fn test_too_wide_is_an_error() {
        let mut c = constraints(5, 5, 150);
        c.parent_keyboard_width = 300;
        assert_eq!(
            MoreKeysGeometry::compute(&c),
            Err(LayoutError::MoreKeysTooWide {
                keyboard_width: 300,
                key_width: 100,
                num_keys: 5,
                max_columns: 5,
            })
        );
        c.key_width = 0;
        assert_eq!(MoreKeysGeometry::compute(&c), Err(LayoutError::ZeroKeyWidth(0)));
    }

    #[test]
    fn test_size_and_placement() {
        let mut c = constraints(3, 3, 500);
        c.divider_width = 20;
        c.vertical_gap = 4;
        let g = MoreKeysGeometry::compute(&c).unwrap();
        assert_eq!(g.column_width, 120);
        assert_eq!(g.occupied_width, 3 * 120 - 20);
        assert_eq!(g.occupied_height, 80 - 4);

        let specs: Vec<MoreKeySpec> = ['a', 'b', 'c'].into_iter().map(MoreKeySpec::from_char).collect();
        let placed = place_more_keys(&g, &specs, 4);
        // Two side keys get a divider each.
        assert_eq!(placed.len(), 5);
        let a = &placed[0];
        assert_eq!(a.position, Some(0));
        assert_eq!(a.key.x(), g.default_key_coord_x());
        let b = &placed[1];
        assert_eq!(b.position, Some(1));
        let divider = &placed[2];
        assert_eq!(divider.position, None);
        assert_eq!(divider.key.x(), b.key.x() - 20);
    }

    #[test]
    fn test_top_row_sits_above_bottom_row() {
        let g = MoreKeysGeometry::compute(&constraints(5, 3, 500)).unwrap();
        assert_eq!(g.y(0), 80);
        assert_eq!(g.y(1), 0);
        // Top row shifted by half a column.
        assert_eq!(g.x(3, 1), g.default_key_coord_x() - 50);
    }
}
