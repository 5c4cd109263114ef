//! Scrobble backend abstractions and concrete implementations.

pub mod lastfm;

use crate::protocol::ScrobblePayload;

/// Authenticated backend session obtained after browser authorization.
#[derive(Debug, Clone)]
pub struct BackendSession {
    pub session_key: String,
    pub username: String,
}

/// Interface implemented by concrete scrobble backend adapters.
pub trait ScrobbleBackendAdapter: Send + Sync {
    /// Requests a fresh request token for the browser auth flow.
    fn request_auth_token(&self) -> Result<String, String>;
    /// Builds the URL the user must visit to authorize the token.
    fn auth_url(&self, token: &str) -> String;
    /// Exchanges an authorized token for a persistent session.
    fn complete_auth(&self, token: &str) -> Result<BackendSession, String>;
    fn update_now_playing(
        &self,
        session_key: &str,
        artist: &str,
        title: &str,
        album: &str,
        duration_secs: u64,
    ) -> Result<(), String>;
    fn submit_scrobble(&self, session_key: &str, payload: &ScrobblePayload) -> Result<(), String>;
    /// Fetches (artist, title) pairs of the user's loved tracks.
    fn fetch_loved_tracks(&self, username: &str) -> Result<Vec<(String, String)>, String>;
}
