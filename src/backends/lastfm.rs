//! Last.fm backend adapter implementation.

use std::time::Duration;

use serde_json::Value;

use crate::backends::{BackendSession, ScrobbleBackendAdapter};
use crate::protocol::ScrobblePayload;

const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";
const AUTH_ROOT: &str = "https://www.last.fm/api/auth/";
const API_KEY: &str = "e8f3c61d5a6b4f0a9c27d41b83e5a902";
const API_SECRET: &str = "4b19d07fa3c845e1b6d20c9e7f51a384";
const LOVED_TRACKS_PAGE_LIMIT: usize = 200;

/// Last.fm adapter backed by `ureq`.
pub struct LastfmAdapter {
    http_client: ureq::Agent,
}

impl LastfmAdapter {
    /// Creates a new Last.fm adapter.
    pub fn new() -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self { http_client }
    }

    /// Computes the `api_sig` over parameters sorted by key, excluding
    /// `format`, followed by the shared secret.
    fn api_signature(params: &[(String, String)]) -> String {
        let mut signable: Vec<&(String, String)> = params
            .iter()
            .filter(|(key, _)| key != "format")
            .collect();
        signable.sort_by(|a, b| a.0.cmp(&b.0));
        let mut concatenated = String::new();
        for (key, value) in signable {
            concatenated.push_str(key);
            concatenated.push_str(value);
        }
        concatenated.push_str(API_SECRET);
        format!("{:x}", md5::compute(concatenated))
    }

    fn signed_params(method: &str, mut params: Vec<(String, String)>) -> Vec<(String, String)> {
        params.push(("method".to_string(), method.to_string()));
        params.push(("api_key".to_string(), API_KEY.to_string()));
        let signature = Self::api_signature(&params);
        params.push(("api_sig".to_string(), signature));
        params.push(("format".to_string(), "json".to_string()));
        params
    }

    fn encode_form(params: &[(String, String)]) -> String {
        params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<String>>()
            .join("&")
    }

    fn check_api_error(method: &str, parsed: &Value) -> Result<(), String> {
        if let Some(code) = parsed.get("error").and_then(Value::as_i64) {
            let message = parsed
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Last.fm returned an error");
            return Err(format!("Last.fm error {code} ({method}): {message}"));
        }
        Ok(())
    }

    fn get_json(&self, method: &str, params: Vec<(String, String)>) -> Result<Value, String> {
        let query = Self::encode_form(&Self::signed_params(method, params));
        let url = format!("{API_ROOT}?{query}");
        let response = self
            .http_client
            .get(&url)
            .call()
            .map_err(|err| format!("Last.fm request failed ({method}): {err}"))?;
        let parsed: Value = response
            .into_json()
            .map_err(|err| format!("Last.fm response parse failed ({method}): {err}"))?;
        Self::check_api_error(method, &parsed)?;
        Ok(parsed)
    }

    fn post_json(&self, method: &str, params: Vec<(String, String)>) -> Result<Value, String> {
        let body = Self::encode_form(&Self::signed_params(method, params));
        let response = self
            .http_client
            .post(API_ROOT)
            .set("Content-Type", "application/x-www-form-urlencoded")
            .send_string(&body)
            .map_err(|err| format!("Last.fm request failed ({method}): {err}"))?;
        let parsed: Value = response
            .into_json()
            .map_err(|err| format!("Last.fm response parse failed ({method}): {err}"))?;
        Self::check_api_error(method, &parsed)?;
        Ok(parsed)
    }

    fn fetch_loved_tracks_page(
        &self,
        username: &str,
        page: usize,
    ) -> Result<(Vec<(String, String)>, usize), String> {
        let query = Self::encode_form(&[
            ("method".to_string(), "user.getLovedTracks".to_string()),
            ("api_key".to_string(), API_KEY.to_string()),
            ("user".to_string(), username.to_string()),
            ("limit".to_string(), LOVED_TRACKS_PAGE_LIMIT.to_string()),
            ("page".to_string(), page.to_string()),
            ("format".to_string(), "json".to_string()),
        ]);
        let url = format!("{API_ROOT}?{query}");
        let response = self
            .http_client
            .get(&url)
            .call()
            .map_err(|err| format!("Last.fm request failed (user.getLovedTracks): {err}"))?;
        let parsed: Value = response.into_json().map_err(|err| {
            format!("Last.fm response parse failed (user.getLovedTracks): {err}")
        })?;
        Self::check_api_error("user.getLovedTracks", &parsed)?;

        let container = parsed
            .get("lovedtracks")
            .ok_or_else(|| "Last.fm loved tracks response missing payload".to_string())?;
        let total_pages = container
            .get("@attr")
            .and_then(|attr| attr.get("totalPages"))
            .and_then(Value::as_str)
            .and_then(|pages| pages.parse::<usize>().ok())
            .unwrap_or(1);
        let tracks = match container.get("track") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => Vec::new(),
        };
        let pairs = tracks
            .into_iter()
            .filter_map(|item| {
                let title = item.get("name").and_then(Value::as_str)?;
                let artist = item
                    .get("artist")
                    .and_then(|artist| artist.get("name"))
                    .and_then(Value::as_str)?;
                Some((artist.to_string(), title.to_string()))
            })
            .collect();
        Ok((pairs, total_pages))
    }
}

impl Default for LastfmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrobbleBackendAdapter for LastfmAdapter {
    fn request_auth_token(&self) -> Result<String, String> {
        let parsed = self.get_json("auth.getToken", Vec::new())?;
        parsed
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| "Last.fm token response missing token".to_string())
    }

    fn auth_url(&self, token: &str) -> String {
        format!(
            "{AUTH_ROOT}?api_key={API_KEY}&token={}",
            urlencoding::encode(token)
        )
    }

    fn complete_auth(&self, token: &str) -> Result<BackendSession, String> {
        let parsed = self.get_json(
            "auth.getSession",
            vec![("token".to_string(), token.to_string())],
        )?;
        let session = parsed
            .get("session")
            .ok_or_else(|| "Last.fm session response missing session".to_string())?;
        let session_key = session
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| "Last.fm session response missing key".to_string())?;
        let username = session
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(BackendSession {
            session_key: session_key.to_string(),
            username: username.to_string(),
        })
    }

    fn update_now_playing(
        &self,
        session_key: &str,
        artist: &str,
        title: &str,
        album: &str,
        duration_secs: u64,
    ) -> Result<(), String> {
        let mut params = vec![
            ("artist".to_string(), artist.to_string()),
            ("track".to_string(), title.to_string()),
            ("sk".to_string(), session_key.to_string()),
        ];
        if !album.is_empty() {
            params.push(("album".to_string(), album.to_string()));
        }
        if duration_secs > 0 {
            params.push(("duration".to_string(), duration_secs.to_string()));
        }
        self.post_json("track.updateNowPlaying", params)?;
        Ok(())
    }

    fn submit_scrobble(&self, session_key: &str, payload: &ScrobblePayload) -> Result<(), String> {
        let mut params = vec![
            ("artist".to_string(), payload.artist.clone()),
            ("track".to_string(), payload.title.clone()),
            (
                "timestamp".to_string(),
                payload.started_at_epoch_secs.to_string(),
            ),
            ("sk".to_string(), session_key.to_string()),
        ];
        if !payload.album.is_empty() {
            params.push(("album".to_string(), payload.album.clone()));
        }
        if payload.duration > 0 {
            params.push(("duration".to_string(), payload.duration.to_string()));
        }
        self.post_json("track.scrobble", params)?;
        Ok(())
    }

    fn fetch_loved_tracks(&self, username: &str) -> Result<Vec<(String, String)>, String> {
        let mut all_pairs = Vec::new();
        let mut page = 1;
        loop {
            let (pairs, total_pages) = self.fetch_loved_tracks_page(username, page)?;
            all_pairs.extend(pairs);
            if page >= total_pages {
                break;
            }
            page += 1;
        }
        Ok(all_pairs)
    }
}
