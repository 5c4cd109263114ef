//! Credential-storage helpers for the scrobble session key.

use keyring::Entry;

const LASTFM_SERVICE_NAME: &str = "cadenza.integration.lastfm";

fn session_entry(username: &str) -> Result<Entry, String> {
    Entry::new(LASTFM_SERVICE_NAME, username)
        .map_err(|err| format!("failed to create keyring entry for user '{username}': {err}"))
}

fn keyring_error_hint(error: &str) -> Option<String> {
    if error.contains("org.freedesktop.DBus.Error.ServiceUnknown") {
        return Some(
            "no Secret Service provider is available. Start GNOME Keyring or KeePassXC Secret Service. In Flatpak, ensure the app has `--talk-name=org.freedesktop.secrets`."
                .to_string(),
        );
    }
    None
}

fn format_keyring_error(operation: &str, username: &str, error: &str) -> String {
    let base = format!("{operation} failed in system keyring for user '{username}': {error}");
    match keyring_error_hint(error) {
        Some(hint) => format!("{base}. Hint: {hint}"),
        None => base,
    }
}

/// Saves the Last.fm session key for a user into the OS keyring.
pub fn set_session_key(username: &str, session_key: &str) -> Result<(), String> {
    let entry = session_entry(username)?;
    entry.set_password(session_key).map_err(|err| {
        let detail = format!("failed to set keyring password: {err}");
        format_keyring_error("save Last.fm session", username, detail.as_str())
    })
}

/// Loads the Last.fm session key for a user from the OS keyring.
pub fn get_session_key(username: &str) -> Result<Option<String>, String> {
    let entry = session_entry(username)?;
    match entry.get_password() {
        Ok(session_key) => Ok(Some(session_key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => {
            let detail = format!("failed to get keyring password: {err}");
            Err(format_keyring_error(
                "load Last.fm session",
                username,
                detail.as_str(),
            ))
        }
    }
}

/// Removes the stored Last.fm session key for a user.
pub fn delete_session_key(username: &str) -> Result<(), String> {
    let entry = session_entry(username)?;
    match entry.delete_password() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => {
            let detail = format!("failed to delete keyring password: {err}");
            Err(format_keyring_error(
                "delete Last.fm session",
                username,
                detail.as_str(),
            ))
        }
    }
}
