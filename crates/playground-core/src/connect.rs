use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use livekit::prelude::{Room, RoomEvent};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::errors::PlaygroundError;
use crate::events::{EventEmitter, PlaygroundEvent};
use crate::options::SessionOptions;
use crate::settings::SettingsStore;
use crate::token::{DevTokenConfig, normalize_server_url};

/// A room handed from the connect screen to the conference screen.
pub struct ConnectedRoom {
    pub room: Arc<Room>,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
    pub server_url: String,
}

/// What the connect screen shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectState {
    pub server_url: String,
    pub token: String,
    pub connecting: bool,
    /// `Some` while the error alert is up.
    pub error_message: Option<String>,
}

/// The connection task currently allowed to report an outcome.
struct Attempt {
    id: u64,
    task: JoinHandle<()>,
}

/// Take the slot if `id` still owns it. Whoever takes it, the finishing
/// task or a cancel, decides the outcome.
fn claim(slot: &Mutex<Option<Attempt>>, id: u64) -> bool {
    let mut slot = slot.lock().expect("connection task lock poisoned");
    if slot.as_ref().is_some_and(|attempt| attempt.id == id) {
        slot.take();
        true
    } else {
        false
    }
}

/// View-model of the connect screen: form fields, the in-flight connection
/// and its outcome.
pub struct ConnectViewModel {
    rt: Handle,
    options: SessionOptions,
    settings: Arc<SettingsStore>,
    dev_tokens: Option<DevTokenConfig>,
    emitter: EventEmitter,
    state: Arc<watch::Sender<ConnectState>>,
    connection_task: Arc<Mutex<Option<Attempt>>>,
    attempts: AtomicU64,
    connected: Arc<Mutex<Option<ConnectedRoom>>>,
}

impl ConnectViewModel {
    pub fn new(
        rt: Handle,
        options: SessionOptions,
        settings: Arc<SettingsStore>,
        dev_tokens: Option<DevTokenConfig>,
        emitter: EventEmitter,
    ) -> Self {
        let stored = settings.get();
        let (state, _) = watch::channel(ConnectState {
            server_url: stored.server_url,
            token: stored.token,
            ..ConnectState::default()
        });
        Self {
            rt,
            options,
            settings,
            dev_tokens,
            emitter,
            state: Arc::new(state),
            connection_task: Arc::new(Mutex::new(None)),
            attempts: AtomicU64::new(0),
            connected: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> ConnectState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectState> {
        self.state.subscribe()
    }

    pub fn set_server_url(&self, server_url: impl Into<String>) {
        let server_url = server_url.into();
        self.state.send_modify(|s| s.server_url = server_url);
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.state.send_modify(|s| s.token = token);
    }

    /// Start connecting with the current form values.
    ///
    /// Returns immediately; progress and outcome are reported through the
    /// state (`connecting`, `error_message`) and [`take_room`](Self::take_room).
    pub fn connect(&self) {
        let current = self.state();
        if current.connecting {
            tracing::warn!("connect requested while a connection is in progress");
            return;
        }

        let (server_url, token) = match self.resolve(&current) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        self.state.send_modify(|s| {
            s.connecting = true;
            s.error_message = None;
        });
        self.emitter.emit(PlaygroundEvent::Connecting {
            server_url: server_url.clone(),
        });
        tracing::info!("connecting to {server_url}");

        let state = self.state.clone();
        let emitter = self.emitter.clone();
        let connected = self.connected.clone();
        let settings = self.settings.clone();
        let room_options = self.options.room_options();
        let form_url = current.server_url.clone();
        let form_token = current.token.clone();

        let slot = self.connection_task.clone();
        let id = self.attempts.fetch_add(1, Ordering::Relaxed);

        // Held until the attempt is stored so the task cannot finish first.
        let mut pending = self
            .connection_task
            .lock()
            .expect("connection task lock poisoned");
        let task = self.rt.spawn(async move {
            let result = Room::connect(&server_url, &token, room_options).await;
            if !claim(&slot, id) {
                if let Ok((room, _)) = result {
                    tracing::info!("leaving room {} joined after cancel", room.name());
                    if let Err(e) = room.close().await {
                        tracing::warn!("error closing room: {e}");
                    }
                }
                return;
            }
            match result {
                Ok((room, events)) => {
                    tracing::info!("connected to room {}", room.name());
                    settings.set_connection(&form_url, &form_token);
                    *connected.lock().expect("connected room lock poisoned") = Some(ConnectedRoom {
                        room: Arc::new(room),
                        events,
                        server_url,
                    });
                    state.send_modify(|s| s.connecting = false);
                    emitter.emit(PlaygroundEvent::Connected);
                }
                Err(e) => {
                    let message = PlaygroundError::Connection(e.to_string()).to_string();
                    tracing::warn!("{message}");
                    state.send_modify(|s| {
                        s.connecting = false;
                        s.error_message = Some(message.clone());
                    });
                    emitter.emit(PlaygroundEvent::ConnectFailed(message));
                }
            }
        });
        *pending = Some(Attempt { id, task });
    }

    /// Abort the in-flight connection, if any. No error is reported.
    ///
    /// An attempt that already finished keeps its outcome.
    pub fn cancel_in_progress_connection(&self) {
        let attempt = self
            .connection_task
            .lock()
            .expect("connection task lock poisoned")
            .take();
        let Some(attempt) = attempt else { return };
        attempt.task.abort();

        if self.state.borrow().connecting {
            self.state.send_modify(|s| s.connecting = false);
            tracing::info!("connection cancelled");
            self.emitter.emit(PlaygroundEvent::ConnectCancelled);
        }
    }

    /// Close the error alert.
    pub fn dismiss_error(&self) {
        self.state.send_modify(|s| s.error_message = None);
    }

    /// Take the connected room, once. The UI navigates on `Some`.
    pub fn take_room(&self) -> Option<ConnectedRoom> {
        self.connected
            .lock()
            .expect("connected room lock poisoned")
            .take()
    }

    fn resolve(&self, state: &ConnectState) -> Result<(String, String), PlaygroundError> {
        let server_url = normalize_server_url(&state.server_url)?;
        let token = state.token.trim();
        if !token.is_empty() {
            return Ok((server_url, token.to_string()));
        }
        match &self.dev_tokens {
            Some(config) => Ok((server_url, config.mint()?)),
            None => Err(PlaygroundError::Token("access token is empty".into())),
        }
    }

    fn fail(&self, message: String) {
        tracing::warn!("cannot connect: {message}");
        self.state.send_modify(|s| {
            s.connecting = false;
            s.error_message = Some(message.clone());
        });
        self.emitter.emit(PlaygroundEvent::ConnectFailed(message));
    }
}
