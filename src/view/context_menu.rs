//! Context-menu placement and item gating.

use crate::protocol::ViewContext;

/// Action behind a context-menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    PlayNow,
    PlayNext,
    Enqueue,
    EditMetadata,
    ToggleFavorite,
    RevealInFileManager,
    RemoveFromPlaylist,
    RemoveFromLibrary,
}

/// One rendered menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub action: MenuAction,
    pub label: String,
    pub enabled: bool,
}

/// Top-left corner the menu should open at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuPlacement {
    pub x_px: i32,
    pub y_px: i32,
}

fn selection_label(selection_count: usize) -> String {
    if selection_count == 1 {
        "track".to_string()
    } else {
        format!("{} tracks", selection_count)
    }
}

/// Builds the menu item set for the current selection and view context.
///
/// Single-target actions are disabled for multi-selections; the remove entry
/// depends on whether the listing is a playlist.
pub fn build_menu_items(selection_count: usize, context: ViewContext) -> Vec<MenuItem> {
    if selection_count == 0 {
        return Vec::new();
    }
    let noun = selection_label(selection_count);
    let single = selection_count == 1;

    let mut items = vec![
        MenuItem {
            action: MenuAction::PlayNow,
            label: format!("Play {}", noun),
            enabled: true,
        },
        MenuItem {
            action: MenuAction::PlayNext,
            label: format!("Play {} next", noun),
            enabled: true,
        },
        MenuItem {
            action: MenuAction::Enqueue,
            label: format!("Add {} to queue", noun),
            enabled: true,
        },
        MenuItem {
            action: MenuAction::ToggleFavorite,
            label: "Favorite".to_string(),
            enabled: true,
        },
        MenuItem {
            action: MenuAction::EditMetadata,
            label: "Edit metadata".to_string(),
            enabled: single,
        },
        MenuItem {
            action: MenuAction::RevealInFileManager,
            label: "Reveal in file manager".to_string(),
            enabled: single,
        },
    ];
    items.push(match context {
        ViewContext::Playlist => MenuItem {
            action: MenuAction::RemoveFromPlaylist,
            label: format!("Remove {} from playlist", noun),
            enabled: true,
        },
        ViewContext::Library => MenuItem {
            action: MenuAction::RemoveFromLibrary,
            label: format!("Remove {} from library", noun),
            enabled: true,
        },
    });
    items
}

/// Places the menu at the cursor, flipping horizontally (and vertically)
/// when it would spill past the viewport's trailing edges.
pub fn place_menu(
    cursor_x_px: i32,
    cursor_y_px: i32,
    menu_width_px: i32,
    menu_height_px: i32,
    viewport_width_px: i32,
    viewport_height_px: i32,
) -> MenuPlacement {
    let x_px = if cursor_x_px + menu_width_px > viewport_width_px {
        (cursor_x_px - menu_width_px).max(0)
    } else {
        cursor_x_px
    };
    let y_px = if cursor_y_px + menu_height_px > viewport_height_px {
        (cursor_y_px - menu_height_px).max(0)
    } else {
        cursor_y_px
    };
    MenuPlacement { x_px, y_px }
}

/// Open/closed state of the single context menu instance.
#[derive(Debug, Clone, Default)]
pub struct ContextMenuController {
    open_menu: Option<(MenuPlacement, Vec<MenuItem>)>,
}

impl ContextMenuController {
    pub fn new() -> ContextMenuController {
        ContextMenuController::default()
    }

    /// Opens the menu for the current selection. An empty selection leaves
    /// the menu closed.
    #[allow(clippy::too_many_arguments)]
    pub fn open_at(
        &mut self,
        cursor_x_px: i32,
        cursor_y_px: i32,
        menu_width_px: i32,
        menu_height_px: i32,
        viewport_width_px: i32,
        viewport_height_px: i32,
        selection_count: usize,
        context: ViewContext,
    ) {
        let items = build_menu_items(selection_count, context);
        if items.is_empty() {
            self.open_menu = None;
            return;
        }
        let placement = place_menu(
            cursor_x_px,
            cursor_y_px,
            menu_width_px,
            menu_height_px,
            viewport_width_px,
            viewport_height_px,
        );
        self.open_menu = Some((placement, items));
    }

    pub fn is_open(&self) -> bool {
        self.open_menu.is_some()
    }

    pub fn placement(&self) -> Option<MenuPlacement> {
        self.open_menu.as_ref().map(|(placement, _)| *placement)
    }

    pub fn items(&self) -> &[MenuItem] {
        self.open_menu
            .as_ref()
            .map(|(_, items)| items.as_slice())
            .unwrap_or(&[])
    }

    /// Closes on outside click or Escape.
    pub fn close(&mut self) {
        self.open_menu = None;
    }

    /// Activates the item at `index` and closes the menu. Disabled items and
    /// out-of-range indices return `None` (menu stays open for those).
    pub fn activate(&mut self, index: usize) -> Option<MenuAction> {
        let action = match self.open_menu.as_ref() {
            Some((_, items)) => items
                .get(index)
                .filter(|item| item.enabled)
                .map(|item| item.action),
            None => None,
        };
        if action.is_some() {
            self.open_menu = None;
        }
        action
    }
}
