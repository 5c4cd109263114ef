//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the view-state
//! controller, playback facade, library, and integration handlers.

use std::path::PathBuf;

use crate::config::Config;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    View(ViewMessage),
    Playback(PlaybackMessage),
    Library(LibraryMessage),
    Integration(IntegrationMessage),
    Config(ConfigMessage),
}

/// Sort direction for a track listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Returns the opposite direction.
    pub fn flipped(self) -> SortOrder {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// Which column edge a resize drag grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    Left,
    Right,
}

/// View context the track listing is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewContext {
    Library,
    Playlist,
}

/// Queue insertion behavior for a play gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Replace the queue and start the first track.
    Now,
    /// Insert immediately after the current track.
    Next,
    /// Append to the end of the queue.
    Enqueue,
}

/// Transport state reported by the lower playback layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Playing,
    Paused,
    Stopped,
}

/// One track in the library collection.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Track {
    /// Stable track id.
    pub id: String,
    /// File path on disk.
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Duration in seconds as reported by the tag scanner.
    pub duration_secs: f64,
    #[serde(default)]
    pub favorite: bool,
}

/// One watched library folder.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct WatchedFolder {
    /// Stable folder id.
    pub id: String,
    /// Folder path on disk.
    pub path: PathBuf,
    /// Disabled folders are kept but skipped during rescans.
    pub enabled: bool,
}

/// Scrobble submission payload with ceiling-second fields.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScrobblePayload {
    /// Stable track id the play belongs to.
    pub track_id: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    /// Whole track length, seconds, rounded up.
    pub duration: u64,
    /// Played time at threshold crossing, seconds, rounded up.
    pub played_time: u64,
    /// Unix timestamp of when the play started.
    pub started_at_epoch_secs: u64,
}

/// Outcome of a scrobble submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleStatus {
    Success,
    /// Submission failed and the payload was placed on the retry queue.
    Queued,
    ThresholdNotMet,
}

impl ScrobbleStatus {
    /// Status text surfaced to the user.
    pub fn status_text(self) -> &'static str {
        match self {
            ScrobbleStatus::Success => "success",
            ScrobbleStatus::Queued => "queued",
            ScrobbleStatus::ThresholdNotMet => "threshold_not_met",
        }
    }
}

/// View-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum ViewMessage {
    /// Pointer press on a rendered track row, with modifier state.
    PointerDown {
        index: usize,
        ctrl: bool,
        shift: bool,
    },
    /// Double-click / Enter on a rendered track row.
    RowActivated(usize),
    /// Ctrl/Cmd+A. No-op while a text input holds focus.
    SelectAll {
        focus_in_text_input: bool,
    },
    Escape,
    DeselectAll,
    SelectionChanged(Vec<String>),
    /// Header click requesting a sort cycle on a column key.
    SortByColumn(String),
    SortChanged {
        key: String,
        order: SortOrder,
    },
    /// Display-mode switch inside the same listing; selection survives.
    ViewModeChanged(ViewContext),
    /// Navigation to another section; selection resets.
    SectionChanged(ViewContext),
    /// Pointer pressed on the header row. A press within the divider
    /// tolerance starts a resize; a press on a column body starts a reorder.
    HeaderPointerDown {
        pointer_x_px: i32,
    },
    HeaderPointerMove {
        pointer_x_px: i32,
    },
    HeaderPointerUp {
        pointer_x_px: i32,
    },
    SetColumnVisible {
        key: String,
        visible: bool,
    },
    AutoFitColumn {
        key: String,
        content_width_px: u32,
    },
    ViewportWidthChanged(u32),
    ColumnLayoutChanged,
    OpenContextMenu {
        x_px: i32,
        y_px: i32,
    },
    ActivateContextMenuItem(usize),
    CloseContextMenu,
    /// The UI should open the metadata editor for this track.
    EditMetadataRequested(String),
    SetSidebarCollapsed(bool),
    /// Opens the native folder picker and forwards the choice to the library.
    PickWatchedFolder,
    /// Non-blocking notification surfaced in the UI.
    ToastRequested(String),
}

/// Playback-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    PlayTracks {
        ids: Vec<String>,
        mode: PlayMode,
    },
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    /// Seek to a fraction of the current track, `0.0..=1.0`.
    Seek(f64),
    SetVolume(f32),
    ToggleMute,
    SetShuffle(bool),
    ClearQueue,
    RemoveFromQueue(Vec<String>),
    /// Periodic tick from the lower playback layer.
    Progress {
        position_ms: u64,
        duration_ms: u64,
        state: EngineState,
    },
    QueueChanged {
        track_ids: Vec<String>,
        current_index: Option<usize>,
    },
    PlayerStateChanged(PlayerSnapshot),
    TrackStarted {
        id: String,
    },
}

/// Point-in-time player state fanned out to renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub volume: f32,
    pub muted: bool,
    pub shuffle: bool,
    pub current_track_id: Option<String>,
}

/// Library-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum LibraryMessage {
    RequestTracks,
    TracksResult(Vec<Track>),
    UpdateTrackMetadata {
        id: String,
        title: String,
        artist: String,
        album: String,
    },
    TrackMetadataChanged(Track),
    ToggleFavorite(String),
    FavoriteChanged {
        id: String,
        favorite: bool,
    },
    /// Marks favorites in bulk after a loved-tracks import. Pairs are
    /// (artist, title) compared case-insensitively.
    MarkFavoritesByIdentity(Vec<(String, String)>),
    RemoveTracks(Vec<String>),
    RequestWatchedFolders,
    WatchedFoldersResult(Vec<WatchedFolder>),
    WatchedFolderAdd(PathBuf),
    WatchedFolderSetEnabled {
        id: String,
        enabled: bool,
    },
    WatchedFolderRemove(String),
    RescanWatchedFolders,
    ScanStarted,
    ScanCompleted {
        indexed_tracks: usize,
    },
    ScanFailed(String),
}

/// Integration-domain commands and notifications (Last.fm scrobbling).
#[derive(Debug, Clone)]
pub enum IntegrationMessage {
    BeginAuth,
    /// Auth URL the controller should open in the system browser.
    AuthUrlReady(String),
    CompleteAuth,
    /// Signed-in username, or `None` after sign-out.
    SessionChanged(Option<String>),
    SignOut,
    SubmitNowPlaying {
        artist: String,
        title: String,
        album: String,
        duration_secs: u64,
    },
    SubmitScrobble(ScrobblePayload),
    ScrobbleResult {
        track_id: String,
        status: ScrobbleStatus,
    },
    RetryQueuedScrobbles,
    RequestQueueStatus,
    QueueStatus {
        pending: usize,
    },
    ImportLovedTracks,
    LovedTracksImported {
        imported: usize,
    },
    IntegrationFailed(String),
}

/// Runtime configuration updates.
#[derive(Debug, Clone)]
pub enum ConfigMessage {
    ConfigChanged(Config),
}
