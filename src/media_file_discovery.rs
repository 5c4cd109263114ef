use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::debug;

use crate::protocol::WatchedFolder;

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 7] =
    ["mp3", "wav", "ogg", "flac", "aac", "m4a", "mp4"];

pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Walks one folder tree and collects supported audio files, sorted.
pub fn collect_audio_files_from_folder(folder_path: &Path) -> Vec<PathBuf> {
    let mut pending_directories = vec![folder_path.to_path_buf()];
    let mut tracks = Vec::new();

    while let Some(directory) = pending_directories.pop() {
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(
                        "Failed to read a directory entry in {}: {}",
                        directory.display(),
                        err
                    );
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("Failed to inspect {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_dir() {
                pending_directories.push(path);
                continue;
            }

            if file_type.is_file() && is_supported_audio_file(&path) {
                tracks.push(path);
            }
        }
    }

    tracks.sort_unstable();
    tracks
}

/// Scans all enabled watched folders and returns the deduplicated union of
/// their audio files. Disabled folders are skipped.
pub fn collect_audio_files_from_watched_folders(folders: &[WatchedFolder]) -> Vec<PathBuf> {
    let mut tracks = BTreeSet::new();
    for folder in folders.iter().filter(|folder| folder.enabled) {
        for track in collect_audio_files_from_folder(&folder.path) {
            tracks.insert(track);
        }
    }
    tracks.into_iter().collect()
}

/// Infers (title, artist, album) for a file from its path, following the
/// artist/album/title folder convention. Missing levels fall back to
/// unknown placeholders.
pub fn infer_track_fields(path: &Path) -> (String, String, String) {
    let title = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown Title".to_string());
    let album = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown Album".to_string());
    let artist = path
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown Artist".to_string());
    (title, artist, album)
}
