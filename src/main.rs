mod backends;
mod config;
mod config_coordinator;
mod config_persistence;
mod integration_keyring;
mod integration_manager;
mod library_manager;
mod media_file_discovery;
mod playback_manager;
mod protocol;
mod queue;
mod settings_store;
mod view;
mod view_manager;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use log::info;
use tokio::sync::broadcast;

use backends::lastfm::LastfmAdapter;
use config_coordinator::ConfigCoordinator;
use config_persistence::{load_config_file, persist_config_file};
use integration_manager::IntegrationManager;
use library_manager::LibraryManager;
use playback_manager::PlaybackManager;
use protocol::{ConfigMessage, Message};
use settings_store::SettingsStore;
use view_manager::ViewManager;

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

fn app_config_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base = dirs::config_dir().ok_or("could not resolve the user config directory")?;
    let dir = base.join("cadenza");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_dir = app_config_dir()?;
    let config_file = config_dir.join("config.toml");
    let settings_file = config_dir.join("settings.json");
    // Separate file so the queue and the view settings never overwrite each
    // other's write-through flushes.
    let scrobble_queue_file = config_dir.join("scrobble_queue.json");

    if !config_file.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        persist_config_file(&config::Config::default(), &config_file);
    }
    let config = load_config_file(&config_file);
    // Single owner for config state; managers merge their updates through it.
    let config_coordinator = Arc::new(ConfigCoordinator::new(config.clone(), config_file));

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    let library_bus_receiver = bus_sender.subscribe();
    let library_bus_sender = bus_sender.clone();
    let library_config_coordinator = Arc::clone(&config_coordinator);
    thread::spawn(move || {
        let mut library_manager = LibraryManager::new(
            library_bus_receiver,
            library_bus_sender,
            library_config_coordinator,
        );
        library_manager.run();
    });

    let playback_bus_receiver = bus_sender.subscribe();
    let playback_bus_sender = bus_sender.clone();
    let playback_config_coordinator = Arc::clone(&config_coordinator);
    thread::spawn(move || {
        let mut playback_manager = PlaybackManager::new(
            playback_bus_receiver,
            playback_bus_sender,
            playback_config_coordinator,
        );
        playback_manager.run();
    });

    let integration_bus_receiver = bus_sender.subscribe();
    let integration_bus_sender = bus_sender.clone();
    let integration_settings = SettingsStore::open(&scrobble_queue_file);
    let integration_config_coordinator = Arc::clone(&config_coordinator);
    thread::spawn(move || {
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut integration_manager = IntegrationManager::new(
                Box::new(LastfmAdapter::new()),
                integration_bus_receiver,
                integration_bus_sender,
                integration_settings,
                integration_config_coordinator,
            );
            integration_manager.run();
        }));
        if let Err(payload) = run_result {
            log::error!(
                "IntegrationManager thread terminated due to panic: {}",
                panic_payload_to_string(payload.as_ref())
            );
        }
    });

    let bus_sender_clone = bus_sender.clone();
    let _ = bus_sender_clone.send(Message::Config(ConfigMessage::ConfigChanged(config)));

    // The view manager runs on the main thread and keeps the process alive.
    let view_settings = SettingsStore::open(&settings_file);
    let mut view_manager = ViewManager::new(
        bus_sender.subscribe(),
        bus_sender,
        view_settings,
        config_coordinator,
    );
    view_manager.run();

    info!("Application exiting");
    Ok(())
}
