use std::fmt;
use std::sync::{Arc, RwLock};

/// Events emitted by the view-models to UI listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaygroundEvent {
    Connecting { server_url: String },
    Connected,
    ConnectFailed(String),
    ConnectCancelled,
    ConnectionStateChanged { old: ConnectionState, new: ConnectionState },
    ParticipantConnected(String),    // participant id
    ParticipantDisconnected(String), // participant id
    RemoteTrackPublished { participant_id: String, track_sid: String },
    RemoteTrackUnpublished { participant_id: String, track_sid: String },
    LocalTrackPublished(String),   // track SID
    LocalTrackUnpublished(String), // track SID
    TrackSubscribed { participant_id: String, track_sid: String },
    TrackUnsubscribed { participant_id: String, track_sid: String },
    TrackMuteChanged { participant_id: Option<String>, track_sid: String, muted: bool },
    SelectionChanged(Option<String>),
    MediaSwitchFailed { kind: MediaKind, enabled: bool, error: String },
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// The two local media kinds the conference screen can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Microphone,
    Camera,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Microphone => f.write_str("microphone"),
            MediaKind::Camera => f.write_str("camera"),
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

impl fmt::Display for PlaygroundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaygroundEvent::Connecting { server_url } => write!(f, "connecting to {server_url}"),
            PlaygroundEvent::Connected => f.write_str("connected to the room"),
            PlaygroundEvent::ConnectFailed(error) => write!(f, "connection failed: {error}"),
            PlaygroundEvent::ConnectCancelled => f.write_str("connection cancelled"),
            PlaygroundEvent::ConnectionStateChanged { old, new } => {
                write!(f, "local connection state changed: {old} -> {new}")
            }
            PlaygroundEvent::ParticipantConnected(id) => {
                write!(f, "participant {id} connected to the room")
            }
            PlaygroundEvent::ParticipantDisconnected(id) => {
                write!(f, "participant {id} disconnected from the room")
            }
            PlaygroundEvent::RemoteTrackPublished { participant_id, track_sid } => {
                write!(f, "remote participant {participant_id} published track {track_sid}")
            }
            PlaygroundEvent::RemoteTrackUnpublished { participant_id, track_sid } => {
                write!(f, "remote participant {participant_id} unpublished track {track_sid}")
            }
            PlaygroundEvent::LocalTrackPublished(sid) => {
                write!(f, "local participant published track {sid}")
            }
            PlaygroundEvent::LocalTrackUnpublished(sid) => {
                write!(f, "local participant unpublished track {sid}")
            }
            PlaygroundEvent::TrackSubscribed { participant_id, track_sid } => {
                write!(f, "subscribed to track {track_sid} of {participant_id}")
            }
            PlaygroundEvent::TrackUnsubscribed { participant_id, track_sid } => {
                write!(f, "unsubscribed from track {track_sid} of {participant_id}")
            }
            PlaygroundEvent::TrackMuteChanged { participant_id, track_sid, muted } => {
                let verb = if *muted { "muted" } else { "unmuted" };
                match participant_id {
                    Some(id) => write!(f, "remote participant {id} {verb} track {track_sid}"),
                    None => write!(f, "local participant {verb} track {track_sid}"),
                }
            }
            PlaygroundEvent::SelectionChanged(Some(id)) => write!(f, "selected participant {id}"),
            PlaygroundEvent::SelectionChanged(None) => f.write_str("selection cleared"),
            PlaygroundEvent::MediaSwitchFailed { kind, enabled, error } => {
                write!(f, "failed to switch {kind} {}: {error}", on_off(*enabled))
            }
            PlaygroundEvent::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait PlaygroundEventListener: Send + Sync {
    fn on_event(&self, event: PlaygroundEvent);
}

/// Dispatches events to every registered listener.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn PlaygroundEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn PlaygroundEventListener>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    pub fn emit(&self, event: PlaygroundEvent) {
        let listeners = self.listeners.read().expect("listener lock poisoned");
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        count: Arc<AtomicUsize>,
    }

    impl PlaygroundEventListener for CountingListener {
        fn on_event(&self, _event: PlaygroundEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct EventCapture {
        events: Arc<Mutex<Vec<PlaygroundEvent>>>,
    }

    impl PlaygroundEventListener for EventCapture {
        fn on_event(&self, event: PlaygroundEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn emitter_dispatches_to_every_listener() {
        let emitter = EventEmitter::new();
        let count1 = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::new(AtomicUsize::new(0));

        emitter.add_listener(Arc::new(CountingListener { count: count1.clone() }));
        emitter.add_listener(Arc::new(CountingListener { count: count2.clone() }));
        emitter.emit(PlaygroundEvent::Connected);

        assert_eq!(count1.load(Ordering::SeqCst), 1);
        assert_eq!(count2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cloned_emitter_shares_listeners() {
        let emitter = EventEmitter::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        emitter.add_listener(Arc::new(EventCapture { events: events.clone() }));

        let clone = emitter.clone();
        clone.emit(PlaygroundEvent::ParticipantDisconnected("bob".to_string()));

        let captured = events.lock().unwrap();
        assert_eq!(
            captured.as_slice(),
            &[PlaygroundEvent::ParticipantDisconnected("bob".to_string())]
        );
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        EventEmitter::new().emit(PlaygroundEvent::Disconnected);
    }

    #[test]
    fn events_render_as_log_lines() {
        let changed = PlaygroundEvent::ConnectionStateChanged {
            old: ConnectionState::Connected,
            new: ConnectionState::Disconnected,
        };
        assert_eq!(
            changed.to_string(),
            "local connection state changed: connected -> disconnected"
        );

        let local_mute = PlaygroundEvent::TrackMuteChanged {
            participant_id: None,
            track_sid: "TR_1".to_string(),
            muted: true,
        };
        assert_eq!(local_mute.to_string(), "local participant muted track TR_1");

        let failed = PlaygroundEvent::MediaSwitchFailed {
            kind: MediaKind::Camera,
            enabled: true,
            error: "boom".to_string(),
        };
        assert_eq!(failed.to_string(), "failed to switch camera on: boom");
    }

    #[test]
    fn reconnecting_state_shows_attempt() {
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
    }
}
