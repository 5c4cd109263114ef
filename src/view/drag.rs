//! Header drag state machine and hit-testing.
//!
//! Resize and reorder drags are modal from pointer-down to pointer-up. While
//! a drag is active the controller suppresses header sort clicks, then
//! re-enables them atomically on release.

use crate::protocol::ResizeEdge;

/// Gap in pixels rendered between adjacent header cells.
pub const HEADER_COLUMN_SPACING_PX: i32 = 4;

/// Divider grab tolerance in pixels on either side of a column boundary.
pub const DIVIDER_HIT_TOLERANCE_PX: i32 = 4;

/// Modal drag state for the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Resizing {
        visible_index: usize,
        edge: ResizeEdge,
        last_x_px: i32,
    },
    Reordering {
        from_visible_index: usize,
    },
}

/// Outcome of a drag transition the controller must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEffect {
    None,
    /// Live resize preview; `delta_px` is relative to the previous move.
    ResizeBy {
        visible_index: usize,
        edge: ResizeEdge,
        delta_px: i32,
    },
    /// Resize finished; the result should be persisted.
    CommitResize,
    /// Reorder finished over `drop_gap` (a gap index, not a column index).
    CommitReorder {
        from_visible_index: usize,
        drop_gap: usize,
    },
}

impl DragState {
    pub fn new() -> DragState {
        DragState::Idle
    }

    /// Enters resize mode. Ignored while another drag is in flight.
    pub fn begin_resize(&mut self, visible_index: usize, edge: ResizeEdge, pointer_x_px: i32) {
        if *self == DragState::Idle {
            *self = DragState::Resizing {
                visible_index,
                edge,
                last_x_px: pointer_x_px,
            };
        }
    }

    /// Enters reorder mode. Ignored while another drag is in flight.
    pub fn begin_reorder(&mut self, from_visible_index: usize) {
        if *self == DragState::Idle {
            *self = DragState::Reordering { from_visible_index };
        }
    }

    /// Pointer moved. Returns the incremental effect to apply.
    pub fn pointer_move(&mut self, pointer_x_px: i32) -> DragEffect {
        match *self {
            DragState::Resizing {
                visible_index,
                edge,
                last_x_px,
            } => {
                let delta_px = pointer_x_px - last_x_px;
                *self = DragState::Resizing {
                    visible_index,
                    edge,
                    last_x_px: pointer_x_px,
                };
                if delta_px == 0 {
                    DragEffect::None
                } else {
                    DragEffect::ResizeBy {
                        visible_index,
                        edge,
                        delta_px,
                    }
                }
            }
            _ => DragEffect::None,
        }
    }

    /// Pointer released over `drop_gap` (for reorders). Always returns to
    /// `Idle`.
    pub fn pointer_up(&mut self, drop_gap: usize) -> DragEffect {
        let effect = match *self {
            DragState::Resizing { .. } => DragEffect::CommitResize,
            DragState::Reordering { from_visible_index } => DragEffect::CommitReorder {
                from_visible_index,
                drop_gap,
            },
            DragState::Idle => DragEffect::None,
        };
        *self = DragState::Idle;
        effect
    }

    /// True while a drag is in flight; sort clicks are suppressed.
    pub fn is_active(&self) -> bool {
        *self != DragState::Idle
    }
}

impl Default for DragState {
    fn default() -> Self {
        DragState::new()
    }
}

/// Converts a reorder drop gap into the target visible index for the move.
///
/// Dropping into the gap just past the dragged column is the same position,
/// so the index is adjusted to avoid overshooting when moving rightwards.
pub fn drop_gap_to_target_index(from_visible_index: usize, drop_gap: usize) -> usize {
    if drop_gap > from_visible_index {
        drop_gap - 1
    } else {
        drop_gap
    }
}

/// Resolves the visible header column index at `mouse_x_px`, or `-1`.
pub fn resolve_header_column_from_x(mouse_x_px: i32, widths_px: &[i32]) -> i32 {
    if mouse_x_px < 0 {
        return -1;
    }
    let mut start_px: i32 = 0;
    for (index, width_px) in widths_px.iter().enumerate() {
        let column_width = (*width_px).max(0);
        let end_px = start_px.saturating_add(column_width);
        if mouse_x_px >= start_px && mouse_x_px < end_px {
            return index as i32;
        }
        let next_start = end_px.saturating_add(HEADER_COLUMN_SPACING_PX);
        if mouse_x_px < next_start {
            return -1;
        }
        start_px = next_start;
    }
    -1
}

/// Resolves the header gap index at `mouse_x_px` for reorder drops.
pub fn resolve_header_gap_from_x(mouse_x_px: i32, widths_px: &[i32]) -> i32 {
    if widths_px.is_empty() {
        return -1;
    }
    if mouse_x_px < 0 {
        return 0;
    }

    let mut start_px: i32 = 0;
    for (index, width_px) in widths_px.iter().enumerate() {
        let column_width = (*width_px).max(0);
        let end_px = start_px.saturating_add(column_width);
        let midpoint_px = start_px.saturating_add(column_width / 2);

        if mouse_x_px < start_px {
            return index as i32;
        }
        if mouse_x_px < end_px {
            return if mouse_x_px < midpoint_px {
                index as i32
            } else {
                index as i32 + 1
            };
        }

        let next_start = end_px.saturating_add(HEADER_COLUMN_SPACING_PX);
        if mouse_x_px < next_start {
            return index as i32 + 1;
        }
        start_px = next_start;
    }
    widths_px.len() as i32
}

/// Resolves the header divider index at `mouse_x_px`, or `-1`.
pub fn resolve_header_divider_from_x(
    mouse_x_px: i32,
    widths_px: &[i32],
    hit_tolerance_px: i32,
) -> i32 {
    if mouse_x_px < 0 || widths_px.is_empty() {
        return -1;
    }
    let tolerance = hit_tolerance_px.max(1);
    let mut start_px: i32 = 0;
    for (index, width_px) in widths_px.iter().enumerate() {
        let column_width = (*width_px).max(0);
        let end_px = start_px.saturating_add(column_width);
        if (mouse_x_px - end_px).abs() <= tolerance {
            return index as i32;
        }
        start_px = end_px.saturating_add(HEADER_COLUMN_SPACING_PX);
    }
    -1
}
