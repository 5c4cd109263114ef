//! Track-row selection state with anchor-based range support.

use std::collections::HashSet;

/// Coarse selection phase used by menu gating and shortcut handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Empty,
    Single,
    Multi,
}

/// Set of selected track ids plus the range anchor.
///
/// The anchor follows the most recent plain or toggle selection and is the
/// fixed endpoint for subsequent shift-range gestures.
#[derive(Debug, Clone, Default)]
pub struct SelectionModel {
    selected: HashSet<String>,
    anchor: Option<String>,
}

impl SelectionModel {
    pub fn new() -> SelectionModel {
        SelectionModel::default()
    }

    /// Replaces the selection with a single id. Plain clicks collapse here.
    pub fn select_only(&mut self, id: &str) {
        self.selected.clear();
        self.selected.insert(id.to_string());
        self.anchor = Some(id.to_string());
    }

    /// Adds or removes `id` without disturbing the rest of the selection.
    /// The anchor moves to the toggled id.
    pub fn toggle(&mut self, id: &str) {
        if !self.selected.remove(id) {
            self.selected.insert(id.to_string());
        }
        self.anchor = Some(id.to_string());
    }

    /// Selects the contiguous slice between the anchor and `target`
    /// inclusive, in either direction, unioned with the existing selection.
    ///
    /// Without an anchor this degrades to `select_only(target)`.
    pub fn select_range(&mut self, target: &str, ordered_ids: &[String]) {
        let Some(anchor) = self.anchor.clone() else {
            self.select_only(target);
            return;
        };
        let anchor_index = ordered_ids.iter().position(|id| id == &anchor);
        let target_index = ordered_ids.iter().position(|id| id == target);
        let (Some(anchor_index), Some(target_index)) = (anchor_index, target_index) else {
            self.select_only(target);
            return;
        };

        let (start, end) = if anchor_index <= target_index {
            (anchor_index, target_index)
        } else {
            (target_index, anchor_index)
        };
        for id in &ordered_ids[start..=end] {
            self.selected.insert(id.clone());
        }
        // The anchor stays put so a follow-up shift-click extends from the
        // same endpoint.
    }

    /// Selects every rendered id. Repeated calls are a no-op.
    pub fn select_all(&mut self, ordered_ids: &[String]) {
        for id in ordered_ids {
            self.selected.insert(id.clone());
        }
        if self.anchor.is_none() {
            self.anchor = ordered_ids.first().cloned();
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }

    /// Drops ids no longer present in the rendered listing.
    pub fn retain_rendered(&mut self, ordered_ids: &[String]) {
        let rendered: HashSet<&String> = ordered_ids.iter().collect();
        self.selected.retain(|id| rendered.contains(id));
        if let Some(anchor) = &self.anchor {
            if !rendered.contains(anchor) {
                self.anchor = None;
            }
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn phase(&self) -> SelectionPhase {
        match self.selected.len() {
            0 => SelectionPhase::Empty,
            1 => SelectionPhase::Single,
            _ => SelectionPhase::Multi,
        }
    }

    /// Selected ids in rendered order.
    pub fn ordered_ids(&self, ordered_ids: &[String]) -> Vec<String> {
        ordered_ids
            .iter()
            .filter(|id| self.selected.contains(*id))
            .cloned()
            .collect()
    }
}
