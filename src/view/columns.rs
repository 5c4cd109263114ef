//! Column layout engine: sizing, visibility, ordering, and container fit.
//!
//! Base widths are what the user asked for; rendered widths are what the row
//! actually lays out after distributing container surplus into the flexible
//! column. Only base widths are persisted.

use std::collections::HashSet;

use log::warn;
use serde_json::Value;

/// Column that absorbs leftover container width.
pub const FLEXIBLE_COLUMN_KEY: &str = "title";

/// Maximum tolerated gap between the rendered row and the container edge.
pub const SLACK_TOLERANCE_PX: u32 = 2;

/// One column in display order. `width_px` is the base (user-intended) width.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ColumnSpec {
    pub key: String,
    pub width_px: u32,
    pub visible: bool,
}

/// Pixel bounds for a column width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidthBounds {
    pub min_px: u32,
    pub max_px: u32,
}

/// Returns width bounds for a column key.
pub fn column_width_bounds(key: &str) -> ColumnWidthBounds {
    match key.trim().to_ascii_lowercase().as_str() {
        "index" => ColumnWidthBounds {
            min_px: 36,
            max_px: 64,
        },
        "duration" | "time" => ColumnWidthBounds {
            min_px: 52,
            max_px: 120,
        },
        "title" => ColumnWidthBounds {
            min_px: 120,
            max_px: 960,
        },
        _ => ColumnWidthBounds {
            min_px: 120,
            max_px: 600,
        },
    }
}

/// Default column set applied on first run and when persisted state is gone.
pub fn default_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            key: "index".to_string(),
            width_px: 40,
            visible: true,
        },
        ColumnSpec {
            key: "title".to_string(),
            width_px: 280,
            visible: true,
        },
        ColumnSpec {
            key: "artist".to_string(),
            width_px: 180,
            visible: true,
        },
        ColumnSpec {
            key: "album".to_string(),
            width_px: 180,
            visible: true,
        },
        ColumnSpec {
            key: "duration".to_string(),
            width_px: 64,
            visible: true,
        },
    ]
}

fn clamp_to_bounds(key: &str, width_px: u32) -> u32 {
    let bounds = column_width_bounds(key);
    width_px.clamp(bounds.min_px, bounds.max_px.max(bounds.min_px))
}

/// Deduplicates, clamps, restores missing defaults, and enforces the
/// two-visible-columns floor.
pub fn sanitize_columns(columns: &[ColumnSpec]) -> Vec<ColumnSpec> {
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut merged: Vec<ColumnSpec> = Vec::new();

    for column in columns {
        let key = column.key.trim().to_ascii_lowercase();
        if key.is_empty() || !seen_keys.insert(key.clone()) {
            continue;
        }
        merged.push(ColumnSpec {
            width_px: clamp_to_bounds(&key, column.width_px),
            key,
            visible: column.visible,
        });
    }

    for default_column in default_columns() {
        if !seen_keys.contains(&default_column.key) {
            merged.push(default_column);
        }
    }

    let mut visible_count = merged.iter().filter(|column| column.visible).count();
    for column in merged.iter_mut() {
        if visible_count >= 2 {
            break;
        }
        if !column.visible {
            column.visible = true;
            visible_count += 1;
        }
    }

    merged
}

/// Edge grabbed by a resize drag. Left-edge drags resize the previous column.
pub use crate::protocol::ResizeEdge;

/// Column layout state for one track listing.
#[derive(Debug, Clone)]
pub struct ColumnLayoutEngine {
    columns: Vec<ColumnSpec>,
    container_width_px: u32,
}

impl ColumnLayoutEngine {
    pub fn new(columns: Vec<ColumnSpec>, container_width_px: u32) -> ColumnLayoutEngine {
        ColumnLayoutEngine {
            columns: sanitize_columns(&columns),
            container_width_px,
        }
    }

    /// Restores the engine from a persisted settings value, falling back to
    /// defaults when the value is missing or malformed.
    pub fn from_settings(value: Option<&Value>, container_width_px: u32) -> ColumnLayoutEngine {
        let columns = value
            .and_then(|value| value.get("columns"))
            .and_then(|columns| {
                serde_json::from_value::<Vec<ColumnSpec>>(columns.clone())
                    .map_err(|err| {
                        warn!("Ignoring malformed persisted column layout: {}", err);
                        err
                    })
                    .ok()
            })
            .unwrap_or_else(default_columns);
        ColumnLayoutEngine::new(columns, container_width_px)
    }

    /// Serializes base widths, visibility, and order for the settings store.
    pub fn to_settings(&self) -> Value {
        serde_json::json!({ "columns": self.columns })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn visible_keys(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|column| column.visible)
            .map(|column| column.key.clone())
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.columns.iter().filter(|column| column.visible).count()
    }

    pub fn container_width_px(&self) -> u32 {
        self.container_width_px
    }

    pub fn set_container_width(&mut self, width_px: u32) {
        self.container_width_px = width_px;
    }

    pub fn base_width(&self, key: &str) -> Option<u32> {
        self.columns
            .iter()
            .find(|column| column.key == key)
            .map(|column| column.width_px)
    }

    fn visible_index_to_slot(&self, visible_index: usize) -> Option<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.visible)
            .nth(visible_index)
            .map(|(slot, _)| slot)
    }

    /// Sets the base width of `key`, clamped to its bounds.
    pub fn set_width(&mut self, key: &str, width_px: u32) {
        if let Some(column) = self.columns.iter_mut().find(|column| column.key == key) {
            column.width_px = clamp_to_bounds(key, width_px);
        }
    }

    /// Applies a resize drag delta to the column owning the grabbed edge.
    ///
    /// Dragging the right edge of column A resizes A; dragging the left edge
    /// of column A resizes the previous visible column. A left-edge drag on
    /// the first visible column is clamped to a no-op.
    pub fn resize(&mut self, visible_index: usize, delta_px: i32, edge: ResizeEdge) {
        let target_visible_index = match edge {
            ResizeEdge::Right => visible_index,
            ResizeEdge::Left => {
                if visible_index == 0 {
                    return;
                }
                visible_index - 1
            }
        };
        let Some(slot) = self.visible_index_to_slot(target_visible_index) else {
            return;
        };
        let key = self.columns[slot].key.clone();
        let next_width = self.columns[slot].width_px.saturating_add_signed(delta_px);
        self.columns[slot].width_px = clamp_to_bounds(&key, next_width);
    }

    /// Sets the base width of `key` to its measured content width, bounded.
    /// The result persists like any manual resize.
    pub fn auto_fit(&mut self, key: &str, content_width_px: u32) {
        self.set_width(key, content_width_px);
    }

    /// Shows or hides a column. Rejected (returns `false`) when hiding would
    /// drop the visible count below two.
    pub fn set_visible(&mut self, key: &str, visible: bool) -> bool {
        if !visible && self.visible_count() <= 2 {
            let currently_visible = self
                .columns
                .iter()
                .any(|column| column.key == key && column.visible);
            if currently_visible {
                return false;
            }
        }
        if let Some(column) = self.columns.iter_mut().find(|column| column.key == key) {
            column.visible = visible;
            return true;
        }
        false
    }

    /// Moves a visible column to another visible position, preserving the
    /// relative placement of hidden columns.
    pub fn reorder(&mut self, from_visible_index: usize, to_visible_index: usize) {
        let visible_count = self.visible_count();
        if visible_count < 2
            || from_visible_index >= visible_count
            || to_visible_index >= visible_count
            || from_visible_index == to_visible_index
        {
            return;
        }

        let mut visible_columns: Vec<ColumnSpec> = self
            .columns
            .iter()
            .filter(|column| column.visible)
            .cloned()
            .collect();
        let moved = visible_columns.remove(from_visible_index);
        visible_columns.insert(to_visible_index, moved);

        let mut visible_iter = visible_columns.into_iter();
        let mut reordered = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            if column.visible {
                if let Some(next_visible) = visible_iter.next() {
                    reordered.push(next_visible);
                }
            } else {
                reordered.push(column.clone());
            }
        }
        self.columns = reordered;
    }

    /// Rendered widths for visible columns in display order.
    ///
    /// When the base widths leave more surplus against the container than
    /// the slack tolerance, the surplus goes to the flexible column so no
    /// gap opens before the scrollbar. When they exceed the container,
    /// widths pass through untouched and the listing scrolls horizontally.
    pub fn rendered_widths(&self) -> Vec<(String, u32)> {
        let mut rendered: Vec<(String, u32)> = self
            .columns
            .iter()
            .filter(|column| column.visible)
            .map(|column| (column.key.clone(), column.width_px))
            .collect();
        if rendered.is_empty() {
            return rendered;
        }

        let total: u32 = rendered.iter().map(|(_, width)| *width).sum();
        if total >= self.container_width_px {
            return rendered;
        }

        let surplus = self.container_width_px - total;
        if surplus <= SLACK_TOLERANCE_PX {
            return rendered;
        }
        let flexible_slot = rendered
            .iter()
            .position(|(key, _)| key == FLEXIBLE_COLUMN_KEY)
            .unwrap_or(rendered.len() - 1);
        rendered[flexible_slot].1 += surplus;
        rendered
    }

    /// Total rendered row width.
    pub fn rendered_total_width(&self) -> u32 {
        self.rendered_widths().iter().map(|(_, width)| *width).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_defaults(container_px: u32) -> ColumnLayoutEngine {
        ColumnLayoutEngine::new(default_columns(), container_px)
    }

    fn rendered_width(engine: &ColumnLayoutEngine, key: &str) -> u32 {
        engine
            .rendered_widths()
            .into_iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, width)| width)
            .expect("column should be rendered")
    }

    #[test]
    fn test_right_edge_resize_targets_grabbed_column() {
        let mut engine = engine_with_defaults(1200);
        let before = engine.base_width("artist").expect("artist exists");

        // Visible order: index, title, artist, album, duration.
        engine.resize(2, 40, ResizeEdge::Right);
        assert_eq!(engine.base_width("artist"), Some(before + 40));
    }

    #[test]
    fn test_left_edge_resize_targets_previous_column() {
        let mut engine = engine_with_defaults(1200);
        let title_before = engine.base_width("title").expect("title exists");
        let artist_before = engine.base_width("artist").expect("artist exists");

        engine.resize(2, -30, ResizeEdge::Left);
        assert_eq!(engine.base_width("title"), Some(title_before - 30));
        assert_eq!(engine.base_width("artist"), Some(artist_before));
    }

    #[test]
    fn test_left_edge_resize_on_first_column_is_a_noop() {
        let mut engine = engine_with_defaults(1200);
        let widths_before: Vec<ColumnSpec> = engine.columns().to_vec();
        engine.resize(0, 25, ResizeEdge::Left);
        assert_eq!(engine.columns(), widths_before.as_slice());
    }

    #[test]
    fn test_resize_clamps_to_per_key_minimums() {
        let mut engine = engine_with_defaults(1200);

        // Visible index 4 is the duration column; dedicated 52px minimum.
        engine.resize(4, -500, ResizeEdge::Right);
        assert_eq!(engine.base_width("duration"), Some(52));

        // Artist is a general-purpose column with a 120px minimum.
        engine.resize(2, -500, ResizeEdge::Right);
        assert_eq!(engine.base_width("artist"), Some(120));
    }

    #[test]
    fn test_visibility_floor_of_two_columns() {
        let mut engine = engine_with_defaults(1200);
        assert!(engine.set_visible("index", false));
        assert!(engine.set_visible("album", false));
        assert!(engine.set_visible("duration", false));
        assert_eq!(engine.visible_count(), 2);

        assert!(!engine.set_visible("artist", false));
        assert_eq!(engine.visible_count(), 2);

        // Re-showing is always allowed.
        assert!(engine.set_visible("album", true));
        assert_eq!(engine.visible_count(), 3);
    }

    #[test]
    fn test_reorder_then_inverse_restores_original_order() {
        let mut engine = engine_with_defaults(1200);
        let original = engine.visible_keys();

        engine.reorder(3, 1);
        assert_ne!(engine.visible_keys(), original);
        engine.reorder(1, 3);
        assert_eq!(engine.visible_keys(), original);
    }

    #[test]
    fn test_reorder_preserves_hidden_column_slots() {
        let mut columns = default_columns();
        columns[3].visible = false; // hide album at slot 3
        let mut engine = ColumnLayoutEngine::new(columns, 1200);

        engine.reorder(0, 2);
        assert_eq!(engine.columns()[3].key, "album");
        assert!(!engine.columns()[3].visible);
        assert_eq!(
            engine.visible_keys(),
            vec![
                "title".to_string(),
                "artist".to_string(),
                "index".to_string(),
                "duration".to_string(),
            ]
        );
    }

    #[test]
    fn test_surplus_flows_into_flexible_column_with_no_gap() {
        let engine = engine_with_defaults(1400);
        let base_total: u32 = engine
            .columns()
            .iter()
            .filter(|column| column.visible)
            .map(|column| column.width_px)
            .sum();
        assert!(base_total < 1400);

        assert_eq!(engine.rendered_total_width(), 1400);
        let title_rendered = rendered_width(&engine, "title");
        assert_eq!(title_rendered, 280 + (1400 - base_total));

        // Non-flexible columns keep their base widths.
        assert_eq!(rendered_width(&engine, "artist"), 180);
    }

    #[test]
    fn test_sub_tolerance_surplus_is_left_as_slack() {
        // Default visible base widths sum to 744.
        let snug = engine_with_defaults(744 + SLACK_TOLERANCE_PX);
        assert_eq!(rendered_width(&snug, "title"), 280);
        assert_eq!(snug.rendered_total_width(), 744);

        let loose = engine_with_defaults(744 + SLACK_TOLERANCE_PX + 1);
        assert_eq!(rendered_width(&loose, "title"), 283);
    }

    #[test]
    fn test_overfull_layout_passes_base_widths_through() {
        let engine = engine_with_defaults(400);
        let rendered = engine.rendered_widths();
        for (key, width) in rendered {
            assert_eq!(Some(width), engine.base_width(&key));
        }
        assert!(engine.rendered_total_width() > 400);
    }

    #[test]
    fn test_auto_fit_persists_across_repeated_renders() {
        let mut engine = engine_with_defaults(900);
        engine.auto_fit("artist", 240);
        assert_eq!(engine.base_width("artist"), Some(240));

        let first_render = rendered_width(&engine, "artist");
        let second_render = rendered_width(&engine, "artist");
        assert_eq!(first_render, 240);
        assert_eq!(first_render, second_render);
    }

    #[test]
    fn test_auto_fit_clamps_measured_width_to_bounds() {
        let mut engine = engine_with_defaults(900);
        engine.auto_fit("duration", 8);
        assert_eq!(engine.base_width("duration"), Some(52));
        engine.auto_fit("artist", 4000);
        assert_eq!(engine.base_width("artist"), Some(600));
    }

    #[test]
    fn test_settings_round_trip_restores_layout() {
        let mut engine = engine_with_defaults(1100);
        engine.set_width("artist", 220);
        engine.set_visible("album", false);
        engine.reorder(0, 3);

        let persisted = engine.to_settings();
        let restored = ColumnLayoutEngine::from_settings(Some(&persisted), 1100);
        assert_eq!(restored.columns(), engine.columns());
    }

    #[test]
    fn test_from_settings_falls_back_on_malformed_value() {
        let malformed = serde_json::json!({ "columns": "not-an-array" });
        let engine = ColumnLayoutEngine::from_settings(Some(&malformed), 1000);
        assert_eq!(engine.columns(), sanitize_columns(&default_columns()).as_slice());
    }

    #[test]
    fn test_sanitize_restores_missing_defaults_and_visibility_floor() {
        let persisted = vec![
            ColumnSpec {
                key: "title".to_string(),
                width_px: 10_000,
                visible: false,
            },
            ColumnSpec {
                key: "title".to_string(),
                width_px: 300,
                visible: true,
            },
        ];
        let sanitized = sanitize_columns(&persisted);

        // Duplicate dropped, width clamped, defaults restored.
        assert_eq!(
            sanitized
                .iter()
                .filter(|column| column.key == "title")
                .count(),
            1
        );
        assert_eq!(sanitized[0].width_px, 960);
        assert!(sanitized.iter().any(|column| column.key == "duration"));
        assert!(sanitized.iter().filter(|column| column.visible).count() >= 2);
    }
}
