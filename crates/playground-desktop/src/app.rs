use std::sync::Arc;
use std::time::Duration;

use eframe::{App, Frame, egui};
use playground_core::{
    AudioPlayoutBuffer, CaptureBackend, ConferenceViewModel, ConnectViewModel, DevTokenConfig,
    EventEmitter, JoinPreferences, SessionOptions, SettingsStore,
};
use playground_video::VideoRenderers;
use tokio::runtime::Handle;

use crate::conference_screen;
use crate::connect_screen::{self, ConnectForm};
use crate::event_log::EventLog;
use crate::video_view::{FrameMailbox, VideoViews};

/// View-model state arrives through watch channels; poll it at this rate.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything the screens share, built once in `run`.
pub struct Services {
    pub rt: Handle,
    pub options: SessionOptions,
    pub settings: Arc<SettingsStore>,
    pub dev_tokens: Option<DevTokenConfig>,
    pub emitter: EventEmitter,
    pub backend: Arc<dyn CaptureBackend>,
    pub playout: Arc<AudioPlayoutBuffer>,
    pub log: Arc<EventLog>,
}

pub struct PlaygroundApp {
    services: Services,
    connect: ConnectViewModel,
    form: ConnectForm,
    conference: Option<Arc<ConferenceViewModel>>,
    video: VideoViews,
}

impl PlaygroundApp {
    pub fn new(cc: &eframe::CreationContext<'_>, services: Services) -> Self {
        services.log.attach(cc.egui_ctx.clone());
        let connect = Self::connect_view_model(&services);
        let form = ConnectForm::new(&connect.state(), &services.settings);
        let mailbox = Arc::new(FrameMailbox::new(cc.egui_ctx.clone()));
        let video = VideoViews::new(VideoRenderers::new(services.rt.clone()), mailbox);

        Self {
            services,
            connect,
            form,
            conference: None,
            video,
        }
    }

    fn connect_view_model(services: &Services) -> ConnectViewModel {
        ConnectViewModel::new(
            services.rt.clone(),
            services.options.clone(),
            services.settings.clone(),
            services.dev_tokens.clone(),
            services.emitter.clone(),
        )
    }

    fn enter_conference(&mut self) {
        let Some(room) = self.connect.take_room() else { return };
        let stored = self.services.settings.get();
        let join = JoinPreferences {
            microphone: stored.mic_enabled_on_join,
            camera: stored.camera_enabled_on_join,
        };
        tracing::info!("entering conference on {}", room.server_url);
        self.conference = Some(ConferenceViewModel::start(
            self.services.rt.clone(),
            room,
            self.services.backend.clone(),
            self.services.playout.clone(),
            self.services.options.clone(),
            join,
            self.services.emitter.clone(),
        ));
    }

    fn leave_conference(&mut self) {
        self.video.clear();
        self.conference = None;
        // Fresh form state: the last successful connection is in the settings.
        self.connect = Self::connect_view_model(&self.services);
        self.form = ConnectForm::new(&self.connect.state(), &self.services.settings);
    }
}

impl App for PlaygroundApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        if self.conference.is_none() {
            self.enter_conference();
        }

        egui::TopBottomPanel::bottom("event_log").show(ctx, |ui| {
            self.services.log.show(ui);
        });

        match self.conference.clone() {
            Some(vm) => {
                let state = vm.state();
                if state.disconnected {
                    self.leave_conference();
                } else {
                    conference_screen::sync_renderers(&vm, &state, &mut self.video);
                    self.video.upload(ctx);
                    conference_screen::show(ctx, &vm, &state, &self.video);
                }
            }
            None => connect_screen::show(ctx, &self.connect, &self.services.settings, &mut self.form),
        }

        ctx.request_repaint_after(POLL_INTERVAL);
    }
}

impl Drop for PlaygroundApp {
    fn drop(&mut self) {
        self.video.clear();
        self.connect.cancel_in_progress_connection();
        // The runtime goes away right after the window closes, so the room
        // is closed here rather than from a spawned task.
        if let Some(vm) = self.conference.take() {
            let closed = self
                .services
                .rt
                .block_on(tokio::time::timeout(SHUTDOWN_TIMEOUT, vm.close()));
            if closed.is_err() {
                tracing::warn!("room did not close within {SHUTDOWN_TIMEOUT:?}");
            }
        }
    }
}
