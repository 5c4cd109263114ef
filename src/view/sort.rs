//! Track sorting with optional leading-token ("ignore words") stripping.

use crate::protocol::{SortOrder, Track};

/// Current sort key and direction for a track listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub key: String,
    pub order: SortOrder,
}

impl SortState {
    pub fn new(key: &str, order: SortOrder) -> SortState {
        SortState {
            key: key.to_string(),
            order,
        }
    }

    /// Header-click cycle: same key flips direction, a new key sorts
    /// ascending.
    pub fn cycle(&mut self, key: &str) {
        if self.key == key {
            self.order = self.order.flipped();
        } else {
            self.key = key.to_string();
            self.order = SortOrder::Ascending;
        }
    }
}

/// Parses a comma-separated ignore-word list: trimmed, lowercased, empties
/// dropped.
pub fn parse_ignore_words(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|word| word.trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Lowercased comparison form of `value` with one matching leading token
/// stripped. The displayed value is never altered.
pub fn comparison_key(value: &str, ignore_words: &[String]) -> String {
    let lowered = value.trim().to_lowercase();
    if ignore_words.is_empty() {
        return lowered;
    }
    let Some((first_token, rest)) = lowered.split_once(char::is_whitespace) else {
        return lowered;
    };
    if ignore_words.iter().any(|word| word == first_token) {
        rest.trim_start().to_string()
    } else {
        lowered
    }
}

fn sort_value<'a>(track: &'a Track, key: &str) -> &'a str {
    match key {
        "title" => &track.title,
        "artist" => &track.artist,
        "album" => &track.album,
        _ => &track.title,
    }
}

/// Sorts tracks by `state.key` in `state.order`. Stable and
/// case-insensitive; duration sorts numerically.
pub fn sort_tracks(tracks: &mut [Track], state: &SortState, ignore_words: &[String]) {
    let ascending = state.order == SortOrder::Ascending;
    if state.key == "duration" {
        tracks.sort_by(|left, right| {
            let ordering = left
                .duration_secs
                .partial_cmp(&right.duration_secs)
                .unwrap_or(std::cmp::Ordering::Equal);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    } else {
        tracks.sort_by(|left, right| {
            let ordering = comparison_key(sort_value(left, &state.key), ignore_words)
                .cmp(&comparison_key(sort_value(right, &state.key), ignore_words));
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }
}
