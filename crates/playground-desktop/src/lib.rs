//! Desktop shell for the LiveKit playground: an eframe window over the
//! core view-models, cpal audio and the video renderers.

use std::path::PathBuf;
use std::sync::Arc;

use playground_core::{
    AudioPlayoutBuffer, DevTokenConfig, EventEmitter, SessionOptions, SettingsStore,
};

mod app;
mod audio;
#[cfg(target_os = "macos")]
mod camera_macos;
#[cfg(all(not(target_os = "macos"), feature = "opencv-camera"))]
mod camera_opencv;
mod capture;
mod conference_screen;
mod connect_screen;
mod event_log;
mod video_view;

pub use app::{PlaygroundApp, Services};
pub use audio::{CpalAudioCapture, CpalAudioPlayout};
pub use capture::DesktopCapture;
pub use event_log::EventLog;

const APP_DIR: &str = "livekit-playground";

/// `<config_dir>/livekit-playground`, or the working directory when the
/// platform has no config directory.
pub fn settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn run() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "playground_core=info,playground_video=info,playground_desktop=info",
                )
            }),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("playground")
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    let settings = Arc::new(SettingsStore::new(settings_dir()));
    settings.override_with(|s| s.apply_env(|key| std::env::var(key).ok()));
    let dev_tokens = DevTokenConfig::from_env();
    if dev_tokens.is_some() {
        tracing::info!("development token minting enabled");
    }

    let log = Arc::new(EventLog::new());
    let emitter = EventEmitter::new();
    emitter.add_listener(log.clone());

    let playout = Arc::new(AudioPlayoutBuffer::new());
    let _speakers = match CpalAudioPlayout::start(playout.clone()) {
        Ok(speakers) => Some(speakers),
        Err(e) => {
            tracing::warn!("remote audio disabled: {e}");
            None
        }
    };

    let services = Services {
        rt: runtime.handle().clone(),
        options: SessionOptions::default(),
        settings,
        dev_tokens,
        emitter,
        backend: Arc::new(DesktopCapture::new(runtime.handle().clone())),
        playout,
        log,
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("LiveKit Playground")
            .with_inner_size([900.0, 720.0]),
        ..Default::default()
    };
    eframe::run_native(
        "LiveKit Playground",
        native_options,
        Box::new(|cc| Ok(Box::new(PlaygroundApp::new(cc, services)))),
    )
}
