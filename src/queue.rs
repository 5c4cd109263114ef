//! Queue, player, and scrobble-threshold state.
//!
//! Pure state types mutated by the playback manager. All time-sensitive
//! operations take an explicit `Instant` so tests control the clock.

use std::time::{Duration, Instant};

use rand::{rngs::StdRng, RngExt, SeedableRng};

use crate::protocol::{PlayMode, ScrobblePayload, Track};

/// Window in which a repeated identical play gesture is treated as a
/// double-click duplicate and dropped.
pub const DUPLICATE_GESTURE_WINDOW: Duration = Duration::from_millis(300);

/// How long after a seek stale progress ticks are discarded.
pub const SEEK_SETTLE_WINDOW: Duration = Duration::from_millis(500);

/// Ordered play queue of track ids with an optional current position.
pub struct PlayerQueue {
    entries: Vec<String>,
    current_index: Option<usize>,
    shuffle: bool,
    shuffled_indices: Vec<usize>,
    // Use StdRng instead of ThreadRng for thread safety
    rng_seed: [u8; 32],
    last_gesture: Option<(Vec<String>, PlayMode, Instant)>,
}

impl PlayerQueue {
    pub fn new() -> PlayerQueue {
        let mut seed = [0u8; 32];
        let _ = getrandom::fill(&mut seed);
        PlayerQueue {
            entries: Vec::new(),
            current_index: None,
            shuffle: false,
            shuffled_indices: Vec::new(),
            rng_seed: seed,
            last_gesture: None,
        }
    }

    /// Applies a play gesture. Returns `false` when the gesture duplicates
    /// the previous one inside the debounce window and was dropped.
    pub fn play_tracks(&mut self, ids: &[String], mode: PlayMode, now: Instant) -> bool {
        if let Some((last_ids, last_mode, at)) = &self.last_gesture {
            if *last_mode == mode
                && last_ids.as_slice() == ids
                && now.duration_since(*at) <= DUPLICATE_GESTURE_WINDOW
            {
                return false;
            }
        }
        self.last_gesture = Some((ids.to_vec(), mode, now));

        match mode {
            PlayMode::Now => {
                self.entries = ids.to_vec();
                self.current_index = if self.entries.is_empty() {
                    None
                } else {
                    Some(0)
                };
            }
            PlayMode::Next => {
                let insert_at = self
                    .current_index
                    .map(|index| index + 1)
                    .unwrap_or(0)
                    .min(self.entries.len());
                for (offset, id) in ids.iter().enumerate() {
                    self.entries.insert(insert_at + offset, id.clone());
                }
            }
            PlayMode::Enqueue => {
                self.entries.extend(ids.iter().cloned());
            }
        }
        if self.shuffle {
            self.generate_shuffle_order();
        }
        true
    }

    pub fn ids(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_track_id(&self) -> Option<&str> {
        self.current_index
            .and_then(|index| self.entries.get(index))
            .map(String::as_str)
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Toggles shuffle. The current track never changes; only the traversal
    /// order of subsequent next/previous moves does.
    pub fn set_shuffle(&mut self, shuffle: bool) {
        if self.shuffle != shuffle {
            self.shuffle = shuffle;
            if shuffle {
                self.generate_shuffle_order();
            }
        }
    }

    /// Advances to the next track in the active traversal order.
    pub fn advance(&mut self) -> Option<usize> {
        let next = self.next_index()?;
        self.current_index = Some(next);
        self.current_index
    }

    /// Steps back to the previous track in the active traversal order.
    pub fn step_back(&mut self) -> Option<usize> {
        let current = self.current_index?;
        let previous = if self.shuffle {
            let position = self
                .shuffled_indices
                .iter()
                .position(|&index| index == current)?;
            position
                .checked_sub(1)
                .map(|position| self.shuffled_indices[position])
        } else {
            current.checked_sub(1)
        }?;
        self.current_index = Some(previous);
        self.current_index
    }

    fn next_index(&mut self) -> Option<usize> {
        let current = self.current_index?;
        if self.shuffle {
            if self.shuffled_indices.len() != self.entries.len() {
                self.generate_shuffle_order();
            }
            let position = self
                .shuffled_indices
                .iter()
                .position(|&index| index == current)?;
            self.shuffled_indices.get(position + 1).copied()
        } else {
            let next = current + 1;
            (next < self.entries.len()).then_some(next)
        }
    }

    fn generate_shuffle_order(&mut self) {
        let track_count = self.entries.len();
        let mut indices: Vec<usize> = (0..track_count).collect();

        let mut rng = StdRng::from_seed(self.rng_seed);
        for i in (1..track_count).rev() {
            let j = rng.random_range(0..=i);
            indices.swap(i, j);
        }

        // Step the seed so consecutive orders differ.
        let mut new_seed = [0u8; 32];
        for (i, val) in new_seed.iter_mut().enumerate() {
            *val = self.rng_seed[i].wrapping_add(1);
        }
        self.rng_seed = new_seed;

        self.shuffled_indices = indices;
    }

    /// Removes all occurrences of `ids`. The current track survives when it
    /// is not among the removed ids.
    pub fn remove_ids(&mut self, ids: &[String]) {
        let current_id = self.current_track_id().map(str::to_string);
        self.entries.retain(|entry| !ids.contains(entry));
        self.current_index = current_id
            .and_then(|id| self.entries.iter().position(|entry| *entry == id));
        if self.shuffle {
            self.generate_shuffle_order();
        }
    }

    /// Empties the queue and clears the current track.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_index = None;
        self.shuffled_indices.clear();
    }
}

impl Default for PlayerQueue {
    fn default() -> Self {
        PlayerQueue::new()
    }
}

/// Transport state mirrored from the lower playback layer, with seek and
/// pause guards against stale in-flight ticks.
pub struct PlayerState {
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub volume: f32,
    pub muted: bool,
    seek_guard: Option<(u64, Instant)>,
}

impl PlayerState {
    pub fn new(volume: f32, muted: bool) -> PlayerState {
        PlayerState {
            is_playing: false,
            position_ms: 0,
            duration_ms: 0,
            volume,
            muted,
            seek_guard: None,
        }
    }

    /// Applies a progress tick. Paused players ignore ticks so the position
    /// stays frozen; a zero duration never overwrites a known-good one, and
    /// stale pre-seek positions are dropped inside the settle window.
    pub fn on_progress(&mut self, position_ms: u64, duration_ms: u64, now: Instant) {
        if !self.is_playing {
            return;
        }
        if duration_ms > 0 {
            self.duration_ms = duration_ms;
        }
        if let Some((target_ms, at)) = self.seek_guard {
            if now.duration_since(at) <= SEEK_SETTLE_WINDOW {
                let tolerance_ms = (self.duration_ms / 20).max(2_000);
                if position_ms < target_ms.saturating_sub(tolerance_ms) {
                    return;
                }
            } else {
                self.seek_guard = None;
            }
        }
        self.position_ms = position_ms;
    }

    /// Seeks to a fraction of the known duration and returns the target
    /// position in milliseconds.
    pub fn seek_to_fraction(&mut self, fraction: f64, now: Instant) -> u64 {
        let fraction = fraction.clamp(0.0, 1.0);
        let target_ms = (self.duration_ms as f64 * fraction).round() as u64;
        self.position_ms = target_ms;
        self.seek_guard = Some((target_ms, now));
        target_ms
    }

    pub fn play(&mut self) {
        self.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }

    pub fn stop(&mut self) {
        self.is_playing = false;
        self.position_ms = 0;
        self.duration_ms = 0;
        self.seek_guard = None;
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }
}

/// One-shot scrobble threshold detector for the current play.
pub struct ScrobbleTracker {
    track_id: String,
    artist: String,
    title: String,
    album: String,
    threshold: f64,
    scrobble_checked: bool,
    known_duration_ms: u64,
    started_at_epoch_secs: u64,
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1_000)
}

impl ScrobbleTracker {
    /// Starts tracking a fresh play of `track`.
    pub fn begin(track: &Track, threshold: f64, started_at_epoch_secs: u64) -> ScrobbleTracker {
        ScrobbleTracker {
            track_id: track.id.clone(),
            artist: track.artist.clone(),
            title: track.title.clone(),
            album: track.album.clone(),
            threshold,
            scrobble_checked: false,
            known_duration_ms: (track.duration_secs * 1_000.0).round() as u64,
            started_at_epoch_secs,
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Whether this play already produced a payload.
    pub fn has_fired(&self) -> bool {
        self.scrobble_checked
    }

    /// Feeds a progress tick. Returns a payload exactly once per play, when
    /// the played fraction first crosses the threshold.
    pub fn on_progress(&mut self, position_ms: u64, duration_ms: u64) -> Option<ScrobblePayload> {
        if duration_ms > 0 {
            self.known_duration_ms = duration_ms;
        }
        if self.scrobble_checked || self.known_duration_ms == 0 {
            return None;
        }
        let played_fraction = position_ms as f64 / self.known_duration_ms as f64;
        if played_fraction < self.threshold {
            return None;
        }
        self.scrobble_checked = true;
        Some(ScrobblePayload {
            track_id: self.track_id.clone(),
            artist: self.artist.clone(),
            title: self.title.clone(),
            album: self.album.clone(),
            duration: ceil_secs(self.known_duration_ms),
            played_time: ceil_secs(position_ms),
            started_at_epoch_secs: self.started_at_epoch_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn track(id: &str, duration_secs: f64) -> Track {
        Track {
            id: id.to_string(),
            path: PathBuf::from(format!("/music/{}.flac", id)),
            title: format!("title {}", id),
            artist: format!("artist {}", id),
            album: "album".to_string(),
            duration_secs,
            favorite: false,
        }
    }

    #[test]
    fn test_play_now_replaces_queue_and_starts_first() {
        let mut queue = PlayerQueue::new();
        let now = Instant::now();
        queue.play_tracks(&ids(&["a", "b"]), PlayMode::Enqueue, now);
        queue.play_tracks(
            &ids(&["c", "d", "e"]),
            PlayMode::Now,
            now + Duration::from_secs(1),
        );

        assert_eq!(queue.ids(), ids(&["c", "d", "e"]).as_slice());
        assert_eq!(queue.current_track_id(), Some("c"));
    }

    #[test]
    fn test_play_next_inserts_after_current() {
        let mut queue = PlayerQueue::new();
        let now = Instant::now();
        queue.play_tracks(&ids(&["a", "b", "c"]), PlayMode::Now, now);
        queue.play_tracks(
            &ids(&["x", "y"]),
            PlayMode::Next,
            now + Duration::from_secs(1),
        );

        assert_eq!(queue.ids(), ids(&["a", "x", "y", "b", "c"]).as_slice());
        assert_eq!(queue.current_track_id(), Some("a"));
    }

    #[test]
    fn test_rapid_duplicate_gesture_is_dropped() {
        let mut queue = PlayerQueue::new();
        let now = Instant::now();
        let library = ids(&["a", "b", "c"]);

        assert!(queue.play_tracks(&library, PlayMode::Enqueue, now));
        assert!(!queue.play_tracks(
            &library,
            PlayMode::Enqueue,
            now + Duration::from_millis(80)
        ));
        assert!(!queue.play_tracks(
            &library,
            PlayMode::Enqueue,
            now + Duration::from_millis(160)
        ));
        assert_eq!(queue.len(), library.len());

        // Outside the window the same gesture is deliberate.
        assert!(queue.play_tracks(&library, PlayMode::Enqueue, now + Duration::from_secs(2)));
        assert_eq!(queue.len(), library.len() * 2);
    }

    #[test]
    fn test_shuffle_toggle_keeps_current_track() {
        let mut queue = PlayerQueue::new();
        let now = Instant::now();
        queue.play_tracks(&ids(&["a", "b", "c", "d"]), PlayMode::Now, now);
        queue.advance();
        let current_before = queue.current_track_id().map(str::to_string);

        queue.set_shuffle(true);
        assert_eq!(
            queue.current_track_id().map(str::to_string),
            current_before
        );
        queue.set_shuffle(false);
        assert_eq!(
            queue.current_track_id().map(str::to_string),
            current_before
        );
    }

    #[test]
    fn test_remove_ids_keeps_current_when_it_survives() {
        let mut queue = PlayerQueue::new();
        queue.play_tracks(&ids(&["a", "b", "c"]), PlayMode::Now, Instant::now());
        queue.advance();
        assert_eq!(queue.current_track_id(), Some("b"));

        queue.remove_ids(&ids(&["a"]));
        assert_eq!(queue.ids(), ids(&["b", "c"]).as_slice());
        assert_eq!(queue.current_track_id(), Some("b"));

        queue.remove_ids(&ids(&["b"]));
        assert_eq!(queue.current_track_id(), None);
    }

    #[test]
    fn test_clear_nulls_current_track() {
        let mut queue = PlayerQueue::new();
        queue.play_tracks(&ids(&["a", "b"]), PlayMode::Now, Instant::now());
        assert!(queue.current_track_id().is_some());

        queue.clear();
        assert!(queue.current_track_id().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sequential_advance_and_step_back() {
        let mut queue = PlayerQueue::new();
        queue.play_tracks(&ids(&["a", "b", "c"]), PlayMode::Now, Instant::now());

        assert_eq!(queue.advance(), Some(1));
        assert_eq!(queue.advance(), Some(2));
        assert_eq!(queue.advance(), None);
        assert_eq!(queue.current_index(), Some(2));
        assert_eq!(queue.step_back(), Some(1));
    }

    #[test]
    fn test_pause_freezes_position_against_late_ticks() {
        let mut player = PlayerState::new(1.0, false);
        let now = Instant::now();
        player.play();
        player.on_progress(10_000, 180_000, now);
        assert_eq!(player.position_ms, 10_000);

        player.pause();
        player.on_progress(10_750, 180_000, now + Duration::from_millis(750));
        assert_eq!(player.position_ms, 10_000);
    }

    #[test]
    fn test_zero_duration_keeps_last_known_value() {
        let mut player = PlayerState::new(1.0, false);
        let now = Instant::now();
        player.play();
        player.on_progress(5_000, 107_066, now);
        player.on_progress(6_000, 0, now + Duration::from_millis(250));

        assert_eq!(player.duration_ms, 107_066);
        assert_eq!(player.position_ms, 6_000);
    }

    #[test]
    fn test_seek_discards_stale_preseek_ticks() {
        let mut player = PlayerState::new(1.0, false);
        let now = Instant::now();
        player.play();
        player.on_progress(1_000, 200_000, now);

        let target = player.seek_to_fraction(0.25, now);
        assert_eq!(target, 50_000);

        // A tick still carrying the pre-seek position arrives late.
        player.on_progress(1_400, 200_000, now + Duration::from_millis(120));
        assert_eq!(player.position_ms, 50_000);

        // Ticks near the target apply normally.
        player.on_progress(50_400, 200_000, now + Duration::from_millis(400));
        assert_eq!(player.position_ms, 50_400);
    }

    #[test]
    fn test_scrobble_fires_exactly_once_at_threshold() {
        let mut tracker = ScrobbleTracker::begin(&track("t1", 100.0), 0.8, 1_700_000_000);

        assert!(tracker.on_progress(79_000, 100_000).is_none());
        let payload = tracker
            .on_progress(80_100, 100_000)
            .expect("threshold crossing fires");
        assert_eq!(payload.duration, 100);
        assert_eq!(payload.played_time, 81);

        assert!(tracker.on_progress(90_000, 100_000).is_none());
        assert!(tracker.on_progress(99_000, 100_000).is_none());
    }

    #[test]
    fn test_scrobble_payload_uses_ceiling_seconds() {
        let mut tracker = ScrobbleTracker::begin(&track("t1", 107.066), 0.8, 1_700_000_000);
        let payload = tracker
            .on_progress(85_839, 107_066)
            .expect("fraction 0.8017 crosses threshold");
        assert_eq!(payload.duration, 108);
        assert_eq!(payload.played_time, 86);
    }

    #[test]
    fn test_scrobble_survives_zero_duration_reports() {
        let mut tracker = ScrobbleTracker::begin(&track("t1", 100.0), 0.8, 1_700_000_000);
        assert!(tracker.on_progress(50_000, 100_000).is_none());
        // The engine briefly reports no duration; the known value holds.
        let payload = tracker
            .on_progress(80_500, 0)
            .expect("threshold crossing with preserved duration");
        assert_eq!(payload.duration, 100);
    }
}
