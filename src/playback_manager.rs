//! Playback-domain orchestrator.
//!
//! Owns the play queue and mirrored transport state, reacts to transport
//! commands and progress ticks from the bus, and raises scrobble submissions
//! when the played fraction crosses the configured threshold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::config::Config;
use crate::config_coordinator::ConfigCoordinator;
use crate::protocol::{self, EngineState, PlayMode, PlayerSnapshot, Track};
use crate::queue::{PlayerQueue, PlayerState, ScrobbleTracker};

/// Coordinates queue mutations, transport state, and scrobble detection.
pub struct PlaybackManager {
    queue: PlayerQueue,
    player: PlayerState,
    scrobble_tracker: Option<ScrobbleTracker>,
    tracks_by_id: HashMap<String, Track>,
    config: Config,
    config_coordinator: Arc<ConfigCoordinator>,
    bus_consumer: Receiver<protocol::Message>,
    bus_producer: Sender<protocol::Message>,
}

fn epoch_secs_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

impl PlaybackManager {
    /// Creates a playback manager bound to bus channels. Preference updates
    /// go through the shared config coordinator.
    pub fn new(
        bus_consumer: Receiver<protocol::Message>,
        bus_producer: Sender<protocol::Message>,
        config_coordinator: Arc<ConfigCoordinator>,
    ) -> Self {
        let config = config_coordinator.snapshot();
        let mut queue = PlayerQueue::new();
        queue.set_shuffle(config.ui.shuffle);
        let player = PlayerState::new(config.ui.volume, config.ui.muted);
        Self {
            queue,
            player,
            scrobble_tracker: None,
            tracks_by_id: HashMap::new(),
            config,
            config_coordinator,
            bus_consumer,
            bus_producer,
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => match message {
                    protocol::Message::Playback(playback_message) => {
                        self.handle_playback_message(playback_message);
                    }
                    protocol::Message::Library(protocol::LibraryMessage::TracksResult(
                        tracks,
                    )) => {
                        self.tracks_by_id = tracks
                            .into_iter()
                            .map(|track| (track.id.clone(), track))
                            .collect();
                    }
                    protocol::Message::Library(
                        protocol::LibraryMessage::TrackMetadataChanged(track),
                    ) => {
                        self.tracks_by_id.insert(track.id.clone(), track);
                    }
                    protocol::Message::Config(protocol::ConfigMessage::ConfigChanged(config)) => {
                        self.config = config;
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("PlaybackManager: bus receiver lagged, skipped {skipped} messages");
                }
                Err(RecvError::Closed) => {
                    info!("PlaybackManager: bus closed, shutting down");
                    break;
                }
            }
        }
    }

    fn handle_playback_message(&mut self, message: protocol::PlaybackMessage) {
        match message {
            protocol::PlaybackMessage::PlayTracks { ids, mode } => {
                self.play_tracks(ids, mode);
            }
            protocol::PlaybackMessage::Play => {
                if self.queue.current_track_id().is_some() {
                    self.player.play();
                    self.emit_player_snapshot();
                }
            }
            protocol::PlaybackMessage::Pause => {
                self.player.pause();
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::Stop => {
                self.player.stop();
                self.scrobble_tracker = None;
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::Next => {
                if self.queue.advance().is_some() {
                    self.start_current_track();
                } else {
                    self.player.stop();
                    self.emit_player_snapshot();
                }
            }
            protocol::PlaybackMessage::Previous => {
                if self.queue.step_back().is_some() {
                    self.start_current_track();
                }
            }
            protocol::PlaybackMessage::Seek(fraction) => {
                let target_ms = self.player.seek_to_fraction(fraction, Instant::now());
                debug!("PlaybackManager: seek to {target_ms}ms");
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::SetVolume(volume) => {
                self.player.set_volume(volume);
                self.persist_preferences();
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::ToggleMute => {
                self.player.toggle_mute();
                self.persist_preferences();
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::SetShuffle(shuffle) => {
                self.queue.set_shuffle(shuffle);
                self.persist_preferences();
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::RemoveFromQueue(ids) => {
                let current_before = self.queue.current_track_id().map(str::to_string);
                self.queue.remove_ids(&ids);
                if self.queue.current_track_id().is_none() && current_before.is_some() {
                    self.player.stop();
                    self.scrobble_tracker = None;
                }
                self.emit_queue_changed();
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::ClearQueue => {
                self.queue.clear();
                self.player.stop();
                self.scrobble_tracker = None;
                self.emit_queue_changed();
                self.emit_player_snapshot();
            }
            protocol::PlaybackMessage::Progress {
                position_ms,
                duration_ms,
                state,
            } => {
                self.handle_progress(position_ms, duration_ms, state);
            }
            // Notifications this manager emits itself.
            protocol::PlaybackMessage::QueueChanged { .. }
            | protocol::PlaybackMessage::PlayerStateChanged(_)
            | protocol::PlaybackMessage::TrackStarted { .. } => {}
        }
    }

    fn play_tracks(&mut self, ids: Vec<String>, mode: PlayMode) {
        let started_new_track = mode == PlayMode::Now;
        if !self.queue.play_tracks(&ids, mode, Instant::now()) {
            debug!("PlaybackManager: dropped duplicate play gesture ({} ids)", ids.len());
            return;
        }
        self.emit_queue_changed();
        if started_new_track && self.queue.current_track_id().is_some() {
            self.start_current_track();
        } else {
            self.emit_player_snapshot();
        }
    }

    fn start_current_track(&mut self) {
        let Some(track_id) = self.queue.current_track_id().map(str::to_string) else {
            return;
        };
        let Some(track) = self.tracks_by_id.get(&track_id).cloned() else {
            error!("PlaybackManager: queue references unknown track {track_id}");
            return;
        };

        self.player.stop();
        self.player.play();
        self.player.duration_ms = (track.duration_secs * 1_000.0).round() as u64;

        self.scrobble_tracker = Some(ScrobbleTracker::begin(
            &track,
            self.config.scrobbler.scrobble_threshold,
            epoch_secs_now(),
        ));

        let _ = self.bus_producer.send(protocol::Message::Playback(
            protocol::PlaybackMessage::TrackStarted {
                id: track_id.clone(),
            },
        ));
        if self.config.scrobbler.enabled {
            let _ = self.bus_producer.send(protocol::Message::Integration(
                protocol::IntegrationMessage::SubmitNowPlaying {
                    artist: track.artist.clone(),
                    title: track.title.clone(),
                    album: track.album.clone(),
                    duration_secs: track.duration_secs.ceil() as u64,
                },
            ));
        }
        self.emit_player_snapshot();
        info!("PlaybackManager: started track {track_id}");
    }

    fn handle_progress(&mut self, position_ms: u64, duration_ms: u64, state: EngineState) {
        match state {
            EngineState::Stopped => {
                // Track ran out; advance or come to rest.
                if self.player.is_playing {
                    if self.config.scrobbler.enabled {
                        if let Some(tracker) = self.scrobble_tracker.take() {
                            if !tracker.has_fired() {
                                let _ = self.bus_producer.send(protocol::Message::Integration(
                                    protocol::IntegrationMessage::ScrobbleResult {
                                        track_id: tracker.track_id().to_string(),
                                        status: protocol::ScrobbleStatus::ThresholdNotMet,
                                    },
                                ));
                            }
                        }
                    }
                    if self.queue.advance().is_some() {
                        self.start_current_track();
                    } else {
                        self.player.stop();
                        self.emit_player_snapshot();
                    }
                }
                return;
            }
            EngineState::Playing | EngineState::Paused => {}
        }

        let position_before = self.player.position_ms;
        self.player.on_progress(position_ms, duration_ms, Instant::now());
        if self.player.position_ms == position_before && !self.player.is_playing {
            return;
        }

        if self.player.is_playing && self.config.scrobbler.enabled {
            if let Some(tracker) = self.scrobble_tracker.as_mut() {
                if let Some(payload) =
                    tracker.on_progress(self.player.position_ms, self.player.duration_ms)
                {
                    info!(
                        "PlaybackManager: scrobble threshold crossed for {}",
                        payload.track_id
                    );
                    let _ = self.bus_producer.send(protocol::Message::Integration(
                        protocol::IntegrationMessage::SubmitScrobble(payload),
                    ));
                }
            }
        }
        self.emit_player_snapshot();
    }

    fn persist_preferences(&mut self) {
        let volume = self.player.volume;
        let muted = self.player.muted;
        let shuffle = self.queue.shuffle();
        self.config = self.config_coordinator.apply_update(|config| {
            config.ui.volume = volume;
            config.ui.muted = muted;
            config.ui.shuffle = shuffle;
        });
        let _ = self.bus_producer.send(protocol::Message::Config(
            protocol::ConfigMessage::ConfigChanged(self.config.clone()),
        ));
    }

    fn emit_queue_changed(&self) {
        let _ = self.bus_producer.send(protocol::Message::Playback(
            protocol::PlaybackMessage::QueueChanged {
                track_ids: self.queue.ids().to_vec(),
                current_index: self.queue.current_index(),
            },
        ));
    }

    fn emit_player_snapshot(&self) {
        let snapshot = PlayerSnapshot {
            is_playing: self.player.is_playing,
            position_ms: self.player.position_ms,
            duration_ms: self.player.duration_ms,
            volume: self.player.volume,
            muted: self.player.muted,
            shuffle: self.queue.shuffle(),
            current_track_id: self.queue.current_track_id().map(str::to_string),
        };
        let _ = self.bus_producer.send(protocol::Message::Playback(
            protocol::PlaybackMessage::PlayerStateChanged(snapshot),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;
    use tokio::sync::broadcast::{self, error::TryRecvError};

    struct PlaybackManagerHarness {
        bus_sender: Sender<protocol::Message>,
        receiver: Receiver<protocol::Message>,
    }

    impl PlaybackManagerHarness {
        fn new(config: Config) -> Self {
            Self::with_coordinator(Arc::new(ConfigCoordinator::new_in_memory(config)))
        }

        fn with_coordinator(coordinator: Arc<ConfigCoordinator>) -> Self {
            let (bus_sender, _) = broadcast::channel(4096);
            let manager_bus_sender = bus_sender.clone();
            let manager_receiver = bus_sender.subscribe();

            thread::spawn(move || {
                let mut manager =
                    PlaybackManager::new(manager_receiver, manager_bus_sender, coordinator);
                manager.run();
            });

            let receiver = bus_sender.subscribe();
            Self {
                bus_sender,
                receiver,
            }
        }

        fn send(&self, message: protocol::Message) {
            self.bus_sender
                .send(message)
                .expect("failed to send message to bus");
        }

        fn seed_tracks(&self, tracks: Vec<Track>) {
            self.send(protocol::Message::Library(
                protocol::LibraryMessage::TracksResult(tracks),
            ));
        }

        fn drain_messages(&mut self) {
            loop {
                match self.receiver.try_recv() {
                    Ok(_) => {}
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Closed) => break,
                }
            }
        }
    }

    fn wait_for_message<F>(
        receiver: &mut Receiver<protocol::Message>,
        timeout: Duration,
        mut predicate: F,
    ) -> protocol::Message
    where
        F: FnMut(&protocol::Message) -> bool,
    {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timed out waiting for expected message");
            }
            match receiver.try_recv() {
                Ok(message) => {
                    if predicate(&message) {
                        return message;
                    }
                }
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("bus closed while waiting for message"),
            }
        }
    }

    fn assert_no_message<F>(
        receiver: &mut Receiver<protocol::Message>,
        timeout: Duration,
        mut predicate: F,
    ) where
        F: FnMut(&protocol::Message) -> bool,
    {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                return;
            }
            match receiver.try_recv() {
                Ok(message) => {
                    if predicate(&message) {
                        panic!("received unexpected message: {:?}", message);
                    }
                }
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => return,
            }
        }
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

    fn scrobbling_config() -> Config {
        let mut config = Config::default();
        config.scrobbler.enabled = true;
        config
    }

    #[test]
    fn test_play_now_emits_queue_and_track_started() {
        let mut harness = PlaybackManagerHarness::new(scrobbling_config());
        harness.seed_tracks(vec![track("a", 100.0), track("b", 100.0)]);
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::PlayTracks {
                ids: vec!["a".to_string(), "b".to_string()],
                mode: PlayMode::Now,
            },
        ));

        let queue_message =
            wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
                matches!(
                    message,
                    protocol::Message::Playback(protocol::PlaybackMessage::QueueChanged { .. })
                )
            });
        if let protocol::Message::Playback(protocol::PlaybackMessage::QueueChanged {
            track_ids,
            current_index,
        }) = queue_message
        {
            assert_eq!(track_ids, vec!["a".to_string(), "b".to_string()]);
            assert_eq!(current_index, Some(0));
        }

        wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                protocol::Message::Playback(protocol::PlaybackMessage::TrackStarted { id }) if id == "a"
            )
        });
        wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                protocol::Message::Integration(
                    protocol::IntegrationMessage::SubmitNowPlaying { .. }
                )
            )
        });
    }

    #[test]
    fn test_scrobble_submitted_once_per_play() {
        let mut harness = PlaybackManagerHarness::new(scrobbling_config());
        harness.seed_tracks(vec![track("a", 107.066)]);
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::PlayTracks {
                ids: vec!["a".to_string()],
                mode: PlayMode::Now,
            },
        ));
        wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                protocol::Message::Playback(protocol::PlaybackMessage::TrackStarted { .. })
            )
        });
        harness.drain_messages();

        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::Progress {
                position_ms: 85_839,
                duration_ms: 107_066,
                state: EngineState::Playing,
            },
        ));
        let scrobble_message =
            wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
                matches!(
                    message,
                    protocol::Message::Integration(
                        protocol::IntegrationMessage::SubmitScrobble(_)
                    )
                )
            });
        if let protocol::Message::Integration(protocol::IntegrationMessage::SubmitScrobble(
            payload,
        )) = scrobble_message
        {
            assert_eq!(payload.duration, 108);
            assert_eq!(payload.played_time, 86);
        }

        // Later ticks never re-submit for the same play.
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::Progress {
                position_ms: 100_000,
                duration_ms: 107_066,
                state: EngineState::Playing,
            },
        ));
        assert_no_message(
            &mut harness.receiver,
            Duration::from_millis(200),
            |message| {
                matches!(
                    message,
                    protocol::Message::Integration(
                        protocol::IntegrationMessage::SubmitScrobble(_)
                    )
                )
            },
        );
    }

    #[test]
    fn test_paused_player_ignores_progress_ticks() {
        let mut harness = PlaybackManagerHarness::new(scrobbling_config());
        harness.seed_tracks(vec![track("a", 100.0)]);
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::PlayTracks {
                ids: vec!["a".to_string()],
                mode: PlayMode::Now,
            },
        ));
        wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                protocol::Message::Playback(protocol::PlaybackMessage::TrackStarted { .. })
            )
        });
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::Progress {
                position_ms: 10_000,
                duration_ms: 100_000,
                state: EngineState::Playing,
            },
        ));
        harness.send(protocol::Message::Playback(protocol::PlaybackMessage::Pause));
        wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                protocol::Message::Playback(protocol::PlaybackMessage::PlayerStateChanged(
                    snapshot
                )) if !snapshot.is_playing
            )
        });
        harness.drain_messages();

        // A tick that was already in flight when the pause landed.
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::Progress {
                position_ms: 10_750,
                duration_ms: 100_000,
                state: EngineState::Playing,
            },
        ));
        assert_no_message(
            &mut harness.receiver,
            Duration::from_millis(200),
            |message| {
                matches!(
                    message,
                    protocol::Message::Playback(protocol::PlaybackMessage::PlayerStateChanged(
                        snapshot
                    )) if snapshot.position_ms == 10_750
                )
            },
        );
    }

    #[test]
    fn test_volume_persist_keeps_other_config_sections() {
        let dir = std::env::temp_dir().join(format!("cadenza-prefs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp config dir");
        let path = dir.join("config.toml");

        // Another manager already persisted a watched folder.
        let mut config = Config::default();
        config.library.watched_folders.push(protocol::WatchedFolder {
            id: "wf-1".to_string(),
            path: PathBuf::from("/music"),
            enabled: true,
        });
        crate::config_persistence::persist_config_file(&config, &path);
        let coordinator = Arc::new(ConfigCoordinator::new(config, path.clone()));

        let mut harness = PlaybackManagerHarness::with_coordinator(coordinator);
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::SetVolume(0.5),
        ));
        wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                protocol::Message::Config(protocol::ConfigMessage::ConfigChanged(config))
                    if (config.ui.volume - 0.5).abs() < f32::EPSILON
            )
        });

        let on_disk = crate::config_persistence::load_config_file(&path);
        assert!((on_disk.ui.volume - 0.5).abs() < f32::EPSILON);
        assert_eq!(on_disk.library.watched_folders.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_clear_queue_resets_current_track() {
        let mut harness = PlaybackManagerHarness::new(scrobbling_config());
        harness.seed_tracks(vec![track("a", 100.0)]);
        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::PlayTracks {
                ids: vec!["a".to_string()],
                mode: PlayMode::Now,
            },
        ));
        wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                protocol::Message::Playback(protocol::PlaybackMessage::TrackStarted { .. })
            )
        });

        harness.send(protocol::Message::Playback(
            protocol::PlaybackMessage::ClearQueue,
        ));
        let queue_message =
            wait_for_message(&mut harness.receiver, Duration::from_secs(1), |message| {
                matches!(
                    message,
                    protocol::Message::Playback(protocol::PlaybackMessage::QueueChanged {
                        track_ids,
                        ..
                    }) if track_ids.is_empty()
                )
            });
        if let protocol::Message::Playback(protocol::PlaybackMessage::QueueChanged {
            current_index,
            ..
        }) = queue_message
        {
            assert_eq!(current_index, None);
        }
    }
}
