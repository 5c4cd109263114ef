//! Integration-domain orchestrator for Last.fm scrobbling.
//!
//! Owns the browser auth flow, the persistent session, and the offline retry
//! queue for scrobbles that could not be delivered.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::backends::{BackendSession, ScrobbleBackendAdapter};
use crate::config::Config;
use crate::config_coordinator::ConfigCoordinator;
use crate::integration_keyring;
use crate::protocol::{self, ScrobblePayload, ScrobbleStatus};
use crate::settings_store::{SettingsStore, KEY_SCROBBLE_RETRY_QUEUE};

/// Coordinates backend auth, scrobble delivery, and the retry queue.
pub struct IntegrationManager {
    adapter: Box<dyn ScrobbleBackendAdapter>,
    session: Option<BackendSession>,
    pending_auth_token: Option<String>,
    retry_queue: Vec<ScrobblePayload>,
    settings: SettingsStore,
    config: Config,
    config_coordinator: Arc<ConfigCoordinator>,
    bus_consumer: Receiver<protocol::Message>,
    bus_producer: Sender<protocol::Message>,
}

impl IntegrationManager {
    /// Creates an integration manager bound to bus channels. An in-memory
    /// coordinator disables preference and keyring persistence (tests).
    pub fn new(
        adapter: Box<dyn ScrobbleBackendAdapter>,
        bus_consumer: Receiver<protocol::Message>,
        bus_producer: Sender<protocol::Message>,
        settings: SettingsStore,
        config_coordinator: Arc<ConfigCoordinator>,
    ) -> Self {
        let retry_queue = settings
            .get(KEY_SCROBBLE_RETRY_QUEUE)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        let config = config_coordinator.snapshot();
        Self {
            adapter,
            session: None,
            pending_auth_token: None,
            retry_queue,
            settings,
            config,
            config_coordinator,
            bus_consumer,
            bus_producer,
        }
    }

    pub fn run(&mut self) {
        self.restore_session();
        self.emit_queue_status();

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => match message {
                    protocol::Message::Integration(integration_message) => {
                        self.handle_integration_message(integration_message);
                    }
                    protocol::Message::Config(protocol::ConfigMessage::ConfigChanged(config)) => {
                        self.config = config;
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("IntegrationManager: bus receiver lagged, skipped {skipped} messages");
                }
                Err(RecvError::Closed) => {
                    info!("IntegrationManager: bus closed, shutting down");
                    break;
                }
            }
        }
    }

    fn handle_integration_message(&mut self, message: protocol::IntegrationMessage) {
        match message {
            protocol::IntegrationMessage::BeginAuth => {
                self.begin_auth();
            }
            protocol::IntegrationMessage::CompleteAuth => {
                self.complete_auth();
            }
            protocol::IntegrationMessage::SignOut => {
                self.sign_out();
            }
            protocol::IntegrationMessage::SubmitNowPlaying {
                artist,
                title,
                album,
                duration_secs,
            } => {
                self.submit_now_playing(&artist, &title, &album, duration_secs);
            }
            protocol::IntegrationMessage::SubmitScrobble(payload) => {
                self.submit_scrobble(payload);
            }
            protocol::IntegrationMessage::RetryQueuedScrobbles => {
                self.retry_queued_scrobbles();
            }
            protocol::IntegrationMessage::RequestQueueStatus => {
                self.emit_queue_status();
            }
            protocol::IntegrationMessage::ImportLovedTracks => {
                self.import_loved_tracks();
            }
            // Notifications this manager emits itself.
            protocol::IntegrationMessage::AuthUrlReady(_)
            | protocol::IntegrationMessage::SessionChanged(_)
            | protocol::IntegrationMessage::ScrobbleResult { .. }
            | protocol::IntegrationMessage::QueueStatus { .. }
            | protocol::IntegrationMessage::LovedTracksImported { .. }
            | protocol::IntegrationMessage::IntegrationFailed(_) => {}
        }
    }

    fn restore_session(&mut self) {
        let username = self.config.scrobbler.username.clone();
        if username.is_empty() {
            return;
        }
        match integration_keyring::get_session_key(&username) {
            Ok(Some(session_key)) => {
                info!("IntegrationManager: restored session for {username}");
                self.session = Some(BackendSession {
                    session_key,
                    username: username.clone(),
                });
                self.emit_session_changed();
            }
            Ok(None) => {
                warn!("IntegrationManager: no stored session for {username}");
            }
            Err(err) => {
                warn!("IntegrationManager: session restore failed: {err}");
            }
        }
    }

    fn begin_auth(&mut self) {
        match self.adapter.request_auth_token() {
            Ok(token) => {
                let url = self.adapter.auth_url(&token);
                self.pending_auth_token = Some(token);
                let _ = self.bus_producer.send(protocol::Message::Integration(
                    protocol::IntegrationMessage::AuthUrlReady(url),
                ));
            }
            Err(err) => {
                error!("IntegrationManager: auth token request failed: {err}");
                self.emit_failure(err);
            }
        }
    }

    fn complete_auth(&mut self) {
        let Some(token) = self.pending_auth_token.take() else {
            self.emit_failure("no pending authorization to complete".to_string());
            return;
        };
        match self.adapter.complete_auth(&token) {
            Ok(session) => {
                if self.config_coordinator.persistence_enabled() {
                    if let Err(err) = integration_keyring::set_session_key(
                        &session.username,
                        &session.session_key,
                    ) {
                        warn!("IntegrationManager: session key not persisted: {err}");
                    }
                }
                self.persist_scrobbler_account(session.username.clone(), true);
                info!(
                    "IntegrationManager: signed in as {}",
                    session.username
                );
                self.session = Some(session);
                self.emit_session_changed();
                self.retry_queued_scrobbles();
            }
            Err(err) => {
                error!("IntegrationManager: auth completion failed: {err}");
                self.emit_failure(err);
            }
        }
    }

    fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            if self.config_coordinator.persistence_enabled() {
                if let Err(err) = integration_keyring::delete_session_key(&session.username) {
                    warn!("IntegrationManager: session key not removed: {err}");
                }
            }
        }
        self.persist_scrobbler_account(String::new(), false);
        self.emit_session_changed();
    }

    fn submit_now_playing(&self, artist: &str, title: &str, album: &str, duration_secs: u64) {
        let Some(session) = &self.session else {
            return;
        };
        // Now-playing is best effort; failures are not queued.
        if let Err(err) = self.adapter.update_now_playing(
            &session.session_key,
            artist,
            title,
            album,
            duration_secs,
        ) {
            warn!("IntegrationManager: now-playing update failed: {err}");
        }
    }

    fn submit_scrobble(&mut self, payload: ScrobblePayload) {
        let track_id = payload.track_id.clone();
        let status = match &self.session {
            Some(session) => match self.adapter.submit_scrobble(&session.session_key, &payload) {
                Ok(()) => ScrobbleStatus::Success,
                Err(err) => {
                    warn!("IntegrationManager: scrobble delivery failed, queueing: {err}");
                    self.retry_queue.push(payload);
                    self.persist_retry_queue();
                    ScrobbleStatus::Queued
                }
            },
            None => {
                self.retry_queue.push(payload);
                self.persist_retry_queue();
                ScrobbleStatus::Queued
            }
        };
        let _ = self.bus_producer.send(protocol::Message::Integration(
            protocol::IntegrationMessage::ScrobbleResult { track_id, status },
        ));
        self.emit_queue_status();
    }

    fn retry_queued_scrobbles(&mut self) {
        if self.retry_queue.is_empty() {
            return;
        }
        let Some(session) = self.session.clone() else {
            self.emit_queue_status();
            return;
        };
        let pending = std::mem::take(&mut self.retry_queue);
        let pending_count = pending.len();
        for payload in pending {
            match self.adapter.submit_scrobble(&session.session_key, &payload) {
                Ok(()) => {
                    let _ = self.bus_producer.send(protocol::Message::Integration(
                        protocol::IntegrationMessage::ScrobbleResult {
                            track_id: payload.track_id.clone(),
                            status: ScrobbleStatus::Success,
                        },
                    ));
                }
                Err(err) => {
                    warn!("IntegrationManager: retry delivery failed: {err}");
                    self.retry_queue.push(payload);
                }
            }
        }
        info!(
            "IntegrationManager: retried {} queued scrobbles, {} remain",
            pending_count,
            self.retry_queue.len()
        );
        self.persist_retry_queue();
        self.emit_queue_status();
    }

    fn import_loved_tracks(&mut self) {
        let Some(session) = &self.session else {
            self.emit_failure("sign in before importing loved tracks".to_string());
            return;
        };
        match self.adapter.fetch_loved_tracks(&session.username) {
            Ok(pairs) => {
                let imported = pairs.len();
                let _ = self.bus_producer.send(protocol::Message::Library(
                    protocol::LibraryMessage::MarkFavoritesByIdentity(pairs),
                ));
                let _ = self.bus_producer.send(protocol::Message::Integration(
                    protocol::IntegrationMessage::LovedTracksImported { imported },
                ));
            }
            Err(err) => {
                error!("IntegrationManager: loved tracks import failed: {err}");
                self.emit_failure(err);
            }
        }
    }

    fn persist_retry_queue(&mut self) {
        match serde_json::to_value(&self.retry_queue) {
            Ok(value) => self.settings.set(KEY_SCROBBLE_RETRY_QUEUE, value),
            Err(err) => warn!("IntegrationManager: retry queue not serialized: {err}"),
        }
    }

    fn persist_scrobbler_account(&mut self, username: String, enabled: bool) {
        self.config = self.config_coordinator.apply_update(|config| {
            config.scrobbler.username = username;
            config.scrobbler.enabled = enabled;
        });
        let _ = self.bus_producer.send(protocol::Message::Config(
            protocol::ConfigMessage::ConfigChanged(self.config.clone()),
        ));
    }

    fn emit_session_changed(&self) {
        let username = self
            .session
            .as_ref()
            .map(|session| session.username.clone());
        let _ = self.bus_producer.send(protocol::Message::Integration(
            protocol::IntegrationMessage::SessionChanged(username),
        ));
    }

    fn emit_queue_status(&self) {
        let _ = self.bus_producer.send(protocol::Message::Integration(
            protocol::IntegrationMessage::QueueStatus {
                pending: self.retry_queue.len(),
            },
        ));
    }

    fn emit_failure(&self, detail: String) {
        let _ = self.bus_producer.send(protocol::Message::Integration(
            protocol::IntegrationMessage::IntegrationFailed(detail),
        ));
    }
}
