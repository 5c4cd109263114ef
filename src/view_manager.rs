//! View-domain front controller.
//!
//! Owns selection, sort, column layout, drag, and context-menu state for the
//! track listing, persists view-layer state to the settings store, and
//! translates gestures into playback/library/integration commands.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde_json::json;
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::config::Config;
use crate::config_coordinator::ConfigCoordinator;
use crate::protocol::{self, PlayMode, Track, ViewContext};
use crate::settings_store::{SettingsStore, KEY_COLUMN_LAYOUT, KEY_SIDEBAR_COLLAPSED};
use crate::view::columns::ColumnLayoutEngine;
use crate::view::context_menu::{ContextMenuController, MenuAction};
use crate::view::drag::{
    drop_gap_to_target_index, resolve_header_column_from_x, resolve_header_divider_from_x,
    resolve_header_gap_from_x, DragEffect, DragState, DIVIDER_HIT_TOLERANCE_PX,
};
use crate::view::selection::SelectionModel;
use crate::view::sort::{parse_ignore_words, sort_tracks, SortState};

const CONTEXT_MENU_WIDTH_PX: i32 = 220;
const CONTEXT_MENU_ITEM_HEIGHT_PX: i32 = 28;
const DEFAULT_VIEWPORT_WIDTH_PX: u32 = 900;
const DEFAULT_VIEWPORT_HEIGHT_PX: u32 = 600;

/// Throttle for live column previews during a drag; the commit itself is
/// always persisted immediately.
const LAYOUT_PREVIEW_THROTTLE: Duration = Duration::from_millis(250);

/// Coordinates all view-state for the track listing.
pub struct ViewManager {
    selection: SelectionModel,
    sort: SortState,
    layout: ColumnLayoutEngine,
    menu: ContextMenuController,
    drag: DragState,
    settings: SettingsStore,
    tracks: Vec<Track>,
    rendered_ids: Vec<String>,
    context: ViewContext,
    viewport_height_px: u32,
    sidebar_collapsed: bool,
    ignore_words: Vec<String>,
    last_layout_preview: Option<Instant>,
    config: Config,
    config_coordinator: Arc<ConfigCoordinator>,
    bus_consumer: Receiver<protocol::Message>,
    bus_producer: Sender<protocol::Message>,
}

impl ViewManager {
    /// Creates a view manager bound to bus channels, restoring column layout
    /// and sidebar state from the settings store.
    pub fn new(
        bus_consumer: Receiver<protocol::Message>,
        bus_producer: Sender<protocol::Message>,
        settings: SettingsStore,
        config_coordinator: Arc<ConfigCoordinator>,
    ) -> Self {
        let config = config_coordinator.snapshot();
        let layout = ColumnLayoutEngine::from_settings(
            settings.get(KEY_COLUMN_LAYOUT),
            DEFAULT_VIEWPORT_WIDTH_PX,
        );
        let sidebar_collapsed = settings.get_bool(KEY_SIDEBAR_COLLAPSED).unwrap_or(false);
        let sort = SortState::new(&config.ui.sort_key, config.ui.sort_order);
        let ignore_words = if config.ui.sort_ignore_words_enabled {
            parse_ignore_words(&config.ui.sort_ignore_words)
        } else {
            Vec::new()
        };
        Self {
            selection: SelectionModel::new(),
            sort,
            layout,
            menu: ContextMenuController::new(),
            drag: DragState::new(),
            settings,
            tracks: Vec::new(),
            rendered_ids: Vec::new(),
            context: ViewContext::Library,
            viewport_height_px: DEFAULT_VIEWPORT_HEIGHT_PX,
            sidebar_collapsed,
            ignore_words,
            last_layout_preview: None,
            config,
            config_coordinator,
            bus_consumer,
            bus_producer,
        }
    }

    pub fn run(&mut self) {
        let _ = self.bus_producer.send(protocol::Message::Library(
            protocol::LibraryMessage::RequestTracks,
        ));

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => match message {
                    protocol::Message::View(view_message) => {
                        self.handle_view_message(view_message);
                    }
                    protocol::Message::Library(library_message) => {
                        self.handle_library_message(library_message);
                    }
                    protocol::Message::Integration(
                        protocol::IntegrationMessage::AuthUrlReady(url),
                    ) => {
                        if let Err(err) = webbrowser::open(&url) {
                            error!("ViewManager: failed to open auth URL: {err}");
                        }
                    }
                    protocol::Message::Integration(
                        protocol::IntegrationMessage::ScrobbleResult { track_id, status },
                    ) => {
                        let _ = self.bus_producer.send(protocol::Message::View(
                            protocol::ViewMessage::ToastRequested(format!(
                                "Scrobble for {track_id}: {}",
                                status.status_text()
                            )),
                        ));
                    }
                    protocol::Message::Config(protocol::ConfigMessage::ConfigChanged(config)) => {
                        self.apply_config(config);
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("ViewManager: bus receiver lagged, skipped {skipped} messages");
                }
                Err(RecvError::Closed) => {
                    info!("ViewManager: bus closed, shutting down");
                    break;
                }
            }
        }
    }

    fn handle_view_message(&mut self, message: protocol::ViewMessage) {
        match message {
            protocol::ViewMessage::PointerDown { index, ctrl, shift } => {
                self.pointer_down(index, ctrl, shift);
            }
            protocol::ViewMessage::RowActivated(index) => {
                self.activate_row(index);
            }
            protocol::ViewMessage::SelectAll {
                focus_in_text_input,
            } => {
                if focus_in_text_input {
                    return;
                }
                let before = self.selection.len();
                self.selection.select_all(&self.rendered_ids);
                if self.selection.len() != before {
                    self.emit_selection_changed();
                }
            }
            protocol::ViewMessage::Escape => {
                if self.menu.is_open() {
                    self.menu.close();
                } else if !self.selection.is_empty() {
                    self.selection.clear();
                    self.emit_selection_changed();
                }
            }
            protocol::ViewMessage::DeselectAll => {
                if !self.selection.is_empty() {
                    self.selection.clear();
                    self.emit_selection_changed();
                }
            }
            protocol::ViewMessage::SortByColumn(key) => {
                self.sort_by_column(&key);
            }
            protocol::ViewMessage::ViewModeChanged(context) => {
                // Same listing, different renderer; selection survives.
                self.context = context;
            }
            protocol::ViewMessage::SectionChanged(context) => {
                self.context = context;
                self.menu.close();
                if !self.selection.is_empty() {
                    self.selection.clear();
                    self.emit_selection_changed();
                }
            }
            protocol::ViewMessage::HeaderPointerDown { pointer_x_px } => {
                self.header_pointer_down(pointer_x_px);
            }
            protocol::ViewMessage::HeaderPointerMove { pointer_x_px } => {
                self.header_pointer_move(pointer_x_px);
            }
            protocol::ViewMessage::HeaderPointerUp { pointer_x_px } => {
                self.header_pointer_up(pointer_x_px);
            }
            protocol::ViewMessage::SetColumnVisible { key, visible } => {
                if self.layout.set_visible(&key, visible) {
                    self.persist_column_layout();
                    self.emit_column_layout_changed();
                } else {
                    let _ = self.bus_producer.send(protocol::Message::View(
                        protocol::ViewMessage::ToastRequested(
                            "At least two columns must stay visible".to_string(),
                        ),
                    ));
                }
            }
            protocol::ViewMessage::AutoFitColumn {
                key,
                content_width_px,
            } => {
                self.layout.auto_fit(&key, content_width_px);
                self.persist_column_layout();
                self.emit_column_layout_changed();
            }
            protocol::ViewMessage::ViewportWidthChanged(width_px) => {
                self.layout.set_container_width(width_px);
                self.emit_column_layout_changed();
            }
            protocol::ViewMessage::OpenContextMenu { x_px, y_px } => {
                self.open_context_menu(x_px, y_px);
            }
            protocol::ViewMessage::ActivateContextMenuItem(index) => {
                if let Some(action) = self.menu.activate(index) {
                    self.dispatch_menu_action(action);
                }
            }
            protocol::ViewMessage::CloseContextMenu => {
                self.menu.close();
            }
            protocol::ViewMessage::SetSidebarCollapsed(collapsed) => {
                self.sidebar_collapsed = collapsed;
                self.settings.set(KEY_SIDEBAR_COLLAPSED, json!(collapsed));
            }
            protocol::ViewMessage::PickWatchedFolder => {
                if let Some(folder) = rfd::FileDialog::new().pick_folder() {
                    let _ = self.bus_producer.send(protocol::Message::Library(
                        protocol::LibraryMessage::WatchedFolderAdd(folder),
                    ));
                }
            }
            // Notifications this manager emits itself, or UI-level traffic.
            protocol::ViewMessage::SelectionChanged(_)
            | protocol::ViewMessage::SortChanged { .. }
            | protocol::ViewMessage::ColumnLayoutChanged
            | protocol::ViewMessage::EditMetadataRequested(_)
            | protocol::ViewMessage::ToastRequested(_) => {}
        }
    }

    fn handle_library_message(&mut self, message: protocol::LibraryMessage) {
        match message {
            protocol::LibraryMessage::TracksResult(tracks) => {
                self.tracks = tracks;
                self.refresh_rendered_order();
                let before = self.selection.len();
                self.selection.retain_rendered(&self.rendered_ids);
                if self.selection.len() != before {
                    self.emit_selection_changed();
                }
            }
            protocol::LibraryMessage::TrackMetadataChanged(updated) => {
                if let Some(track) = self
                    .tracks
                    .iter_mut()
                    .find(|track| track.id == updated.id)
                {
                    *track = updated;
                    self.refresh_rendered_order();
                }
            }
            protocol::LibraryMessage::FavoriteChanged { id, favorite } => {
                if let Some(track) = self.tracks.iter_mut().find(|track| track.id == id) {
                    track.favorite = favorite;
                }
            }
            _ => {}
        }
    }

    fn pointer_down(&mut self, index: usize, ctrl: bool, shift: bool) {
        let Some(id) = self.rendered_ids.get(index).cloned() else {
            return;
        };
        if shift {
            self.selection.select_range(&id, &self.rendered_ids);
        } else if ctrl {
            self.selection.toggle(&id);
        } else {
            self.selection.select_only(&id);
        }
        self.emit_selection_changed();
    }

    /// Double-click / Enter plays the rendered order starting at the row.
    fn activate_row(&mut self, index: usize) {
        let Some(id) = self.rendered_ids.get(index).cloned() else {
            return;
        };
        self.selection.select_only(&id);
        self.emit_selection_changed();
        let ids = self.rendered_ids[index..].to_vec();
        let _ = self.bus_producer.send(protocol::Message::Playback(
            protocol::PlaybackMessage::PlayTracks {
                ids,
                mode: PlayMode::Now,
            },
        ));
    }

    fn sort_by_column(&mut self, key: &str) {
        // A click that ends a header drag is not a sort request.
        if self.drag.is_active() {
            debug!("ViewManager: sort click suppressed during header drag");
            return;
        }
        self.sort.cycle(key);
        self.refresh_rendered_order();
        self.persist_sort_preferences();
        let _ = self.bus_producer.send(protocol::Message::View(
            protocol::ViewMessage::SortChanged {
                key: self.sort.key.clone(),
                order: self.sort.order,
            },
        ));
    }

    /// A press within the divider tolerance starts a resize of the column
    /// owning that edge; a press on a column body starts a reorder drag.
    fn header_pointer_down(&mut self, pointer_x_px: i32) {
        let widths = self.rendered_widths_px();
        let divider =
            resolve_header_divider_from_x(pointer_x_px, &widths, DIVIDER_HIT_TOLERANCE_PX);
        if divider >= 0 {
            self.drag
                .begin_resize(divider as usize, protocol::ResizeEdge::Right, pointer_x_px);
            return;
        }
        let column = resolve_header_column_from_x(pointer_x_px, &widths);
        if column >= 0 {
            self.drag.begin_reorder(column as usize);
        }
    }

    fn header_pointer_move(&mut self, pointer_x_px: i32) {
        if let DragEffect::ResizeBy {
            visible_index,
            edge,
            delta_px,
        } = self.drag.pointer_move(pointer_x_px)
        {
            self.layout.resize(visible_index, delta_px, edge);
            let now = Instant::now();
            let throttled = self
                .last_layout_preview
                .is_some_and(|at| now.duration_since(at) < LAYOUT_PREVIEW_THROTTLE);
            if !throttled {
                self.last_layout_preview = Some(now);
                self.emit_column_layout_changed();
            }
        }
    }

    fn header_pointer_up(&mut self, pointer_x_px: i32) {
        let widths = self.rendered_widths_px();
        let gap = resolve_header_gap_from_x(pointer_x_px, &widths).max(0) as usize;
        match self.drag.pointer_up(gap) {
            DragEffect::CommitResize => {
                self.last_layout_preview = None;
                self.persist_column_layout();
                self.emit_column_layout_changed();
            }
            DragEffect::CommitReorder {
                from_visible_index,
                drop_gap,
            } => {
                let target = drop_gap_to_target_index(from_visible_index, drop_gap);
                self.layout.reorder(from_visible_index, target);
                self.persist_column_layout();
                self.emit_column_layout_changed();
            }
            DragEffect::None | DragEffect::ResizeBy { .. } => {}
        }
    }

    fn rendered_widths_px(&self) -> Vec<i32> {
        self.layout
            .rendered_widths()
            .iter()
            .map(|(_, width)| *width as i32)
            .collect()
    }

    fn open_context_menu(&mut self, x_px: i32, y_px: i32) {
        let item_count =
            crate::view::context_menu::build_menu_items(self.selection.len(), self.context).len();
        self.menu.open_at(
            x_px,
            y_px,
            CONTEXT_MENU_WIDTH_PX,
            item_count as i32 * CONTEXT_MENU_ITEM_HEIGHT_PX,
            self.layout.container_width_px() as i32,
            self.viewport_height_px as i32,
            self.selection.len(),
            self.context,
        );
    }

    fn dispatch_menu_action(&mut self, action: MenuAction) {
        let selected = self.selection.ordered_ids(&self.rendered_ids);
        match action {
            MenuAction::PlayNow => self.send_play(selected, PlayMode::Now),
            MenuAction::PlayNext => self.send_play(selected, PlayMode::Next),
            MenuAction::Enqueue => self.send_play(selected, PlayMode::Enqueue),
            MenuAction::EditMetadata => {
                if let Some(id) = selected.into_iter().next() {
                    let _ = self.bus_producer.send(protocol::Message::View(
                        protocol::ViewMessage::EditMetadataRequested(id),
                    ));
                }
            }
            MenuAction::ToggleFavorite => {
                for id in selected {
                    let _ = self.bus_producer.send(protocol::Message::Library(
                        protocol::LibraryMessage::ToggleFavorite(id),
                    ));
                }
            }
            MenuAction::RevealInFileManager => {
                let track = selected
                    .first()
                    .and_then(|id| self.tracks.iter().find(|track| track.id == *id));
                if let Some(track) = track {
                    showfile::show_path_in_file_manager(&track.path);
                }
            }
            MenuAction::RemoveFromPlaylist => {
                let _ = self.bus_producer.send(protocol::Message::Playback(
                    protocol::PlaybackMessage::RemoveFromQueue(selected),
                ));
            }
            MenuAction::RemoveFromLibrary => {
                let _ = self.bus_producer.send(protocol::Message::Library(
                    protocol::LibraryMessage::RemoveTracks(selected),
                ));
            }
        }
    }

    fn send_play(&self, ids: Vec<String>, mode: PlayMode) {
        if ids.is_empty() {
            return;
        }
        let _ = self.bus_producer.send(protocol::Message::Playback(
            protocol::PlaybackMessage::PlayTracks { ids, mode },
        ));
    }

    fn apply_config(&mut self, config: Config) {
        self.sort = SortState::new(&config.ui.sort_key, config.ui.sort_order);
        self.ignore_words = if config.ui.sort_ignore_words_enabled {
            parse_ignore_words(&config.ui.sort_ignore_words)
        } else {
            Vec::new()
        };
        self.config = config;
        self.refresh_rendered_order();
    }

    fn refresh_rendered_order(&mut self) {
        sort_tracks(&mut self.tracks, &self.sort, &self.ignore_words);
        self.rendered_ids = self.tracks.iter().map(|track| track.id.clone()).collect();
    }

    fn persist_column_layout(&mut self) {
        let value = self.layout.to_settings();
        self.settings.set(KEY_COLUMN_LAYOUT, value);
    }

    fn persist_sort_preferences(&mut self) {
        let sort_key = self.sort.key.clone();
        let sort_order = self.sort.order;
        self.config = self.config_coordinator.apply_update(|config| {
            config.ui.sort_key = sort_key;
            config.ui.sort_order = sort_order;
        });
        let _ = self.bus_producer.send(protocol::Message::Config(
            protocol::ConfigMessage::ConfigChanged(self.config.clone()),
        ));
    }

    fn emit_selection_changed(&self) {
        let _ = self.bus_producer.send(protocol::Message::View(
            protocol::ViewMessage::SelectionChanged(
                self.selection.ordered_ids(&self.rendered_ids),
            ),
        ));
    }

    fn emit_column_layout_changed(&self) {
        let _ = self.bus_producer.send(protocol::Message::View(
            protocol::ViewMessage::ColumnLayoutChanged,
        ));
    }
}
