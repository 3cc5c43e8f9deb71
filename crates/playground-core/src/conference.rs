use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use livekit::ConnectionState as LkConnectionState;
use livekit::prelude::{Participant, RemoteTrack, Room, RoomEvent};
use livekit::webrtc::prelude::RtcVideoTrack;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::audio::{AudioPlayoutBuffer, spawn_playout};
use crate::connect::ConnectedRoom;
use crate::controls::{CaptureBackend, MediaControls, MediaToggle};
use crate::events::{ConnectionState, EventEmitter, MediaKind, PlaygroundEvent};
use crate::options::SessionOptions;
use crate::participants::{ParticipantInfo, ParticipantRoster};

/// What the conference screen shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceState {
    pub microphone: MediaToggle,
    pub camera: MediaToggle,
    pub local: ParticipantInfo,
    pub remotes: Vec<ParticipantInfo>,
    pub selected: Option<ParticipantInfo>,
    pub connection_state: ConnectionState,
    pub disconnected: bool,
}

/// Media to switch on right after joining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinPreferences {
    pub microphone: bool,
    pub camera: bool,
}

struct Inner {
    roster: ParticipantRoster,
    microphone: MediaToggle,
    camera: MediaToggle,
    connection_state: ConnectionState,
    reconnect_attempt: u32,
    disconnected: bool,
}

impl Inner {
    fn toggle_mut(&mut self, kind: MediaKind) -> &mut MediaToggle {
        match kind {
            MediaKind::Microphone => &mut self.microphone,
            MediaKind::Camera => &mut self.camera,
        }
    }

    fn snapshot(&self) -> ConferenceState {
        ConferenceState {
            microphone: self.microphone,
            camera: self.camera,
            local: self.roster.local().clone(),
            remotes: self.roster.remotes().to_vec(),
            selected: self.roster.selected().cloned(),
            connection_state: self.connection_state,
            disconnected: self.disconnected,
        }
    }

    /// Apply a state-changing room event.
    fn apply(&mut self, change: RoomChange) -> Applied {
        match change {
            RoomChange::ConnectionState(lk_state) => {
                let state = map_connection_state(lk_state, self.reconnect_attempt);
                let transition = self.transition(state);
                let ended = state == ConnectionState::Disconnected && self.mark_disconnected();
                Applied {
                    transition: Some(transition),
                    ended,
                }
            }
            RoomChange::Reconnecting => {
                self.reconnect_attempt += 1;
                let attempt = self.reconnect_attempt;
                Applied {
                    transition: Some(self.transition(ConnectionState::Reconnecting { attempt })),
                    ended: false,
                }
            }
            RoomChange::Reconnected => {
                self.reconnect_attempt = 0;
                Applied {
                    transition: Some(self.transition(ConnectionState::Connected)),
                    ended: false,
                }
            }
            RoomChange::Disconnected => Applied {
                transition: None,
                ended: self.mark_disconnected(),
            },
            RoomChange::ParticipantJoined { info, remotes } => {
                let id = info.id.clone();
                self.roster
                    .set_remotes(remotes.into_iter().filter(|p| p.id != id).collect());
                self.roster.participant_joined(info);
                Applied::default()
            }
            RoomChange::ParticipantLeft { id, remotes } => {
                self.roster.participant_left(&id);
                self.roster.set_remotes(remotes);
                Applied::default()
            }
        }
    }

    fn transition(&mut self, new: ConnectionState) -> (ConnectionState, ConnectionState) {
        let old = std::mem::replace(&mut self.connection_state, new);
        (old, new)
    }

    /// Returns whether the conference was still live.
    fn mark_disconnected(&mut self) -> bool {
        let newly = !self.disconnected;
        self.disconnected = true;
        self.connection_state = ConnectionState::Disconnected;
        newly
    }
}

/// Room events that change the conference state, with what the room
/// reported alongside them.
enum RoomChange {
    ConnectionState(LkConnectionState),
    Reconnecting,
    Reconnected,
    Disconnected,
    ParticipantJoined {
        info: ParticipantInfo,
        remotes: Vec<ParticipantInfo>,
    },
    ParticipantLeft {
        id: String,
        remotes: Vec<ParticipantInfo>,
    },
}

#[derive(Debug, Default, PartialEq)]
struct Applied {
    transition: Option<(ConnectionState, ConnectionState)>,
    /// The conference just ended.
    ended: bool,
}

/// View-model of the conference screen.
///
/// Relays SDK room events into [`ConferenceState`] and drives the local
/// media toggles, participant selection and disconnection.
pub struct ConferenceViewModel {
    rt: Handle,
    room: Arc<Room>,
    controls: MediaControls,
    emitter: EventEmitter,
    playout: Arc<AudioPlayoutBuffer>,
    inner: Mutex<Inner>,
    state: watch::Sender<ConferenceState>,
    audio_streams: Mutex<HashMap<String, JoinHandle<()>>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl ConferenceViewModel {
    /// Take over a freshly connected room and start relaying its events.
    pub fn start(
        rt: Handle,
        connected: ConnectedRoom,
        backend: Arc<dyn CaptureBackend>,
        playout: Arc<AudioPlayoutBuffer>,
        options: SessionOptions,
        join: JoinPreferences,
        emitter: EventEmitter,
    ) -> Arc<Self> {
        let ConnectedRoom { room, events, .. } = connected;
        let controls = MediaControls::new(room.clone(), backend, options);

        let inner = Inner {
            roster: ParticipantRoster::new(ParticipantInfo::from_local(&room.local_participant())),
            microphone: MediaToggle::new(controls.is_microphone_enabled()),
            camera: MediaToggle::new(controls.is_camera_enabled()),
            connection_state: map_connection_state(room.connection_state(), 0),
            reconnect_attempt: 0,
            disconnected: false,
        };
        let (state, _) = watch::channel(inner.snapshot());

        let vm = Arc::new(Self {
            rt: rt.clone(),
            room,
            controls,
            emitter,
            playout,
            inner: Mutex::new(inner),
            state,
            audio_streams: Mutex::new(HashMap::new()),
            relay: Mutex::new(None),
        });

        vm.subscribe_to_all_available_tracks();
        vm.refresh_local();
        vm.refresh_remotes();
        vm.update(|inner| inner.roster.select_first_with_camera());

        let relay = rt.spawn(Self::relay(Arc::downgrade(&vm), events));
        *vm.relay.lock().expect("relay lock poisoned") = Some(relay);

        if join.microphone {
            vm.set_microphone_enabled(true);
        }
        if join.camera {
            vm.set_camera_enabled(true);
        }
        vm
    }

    pub fn state(&self) -> ConferenceState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConferenceState> {
        self.state.subscribe()
    }

    pub fn set_microphone_enabled(self: &Arc<Self>, enabled: bool) {
        self.set_media_enabled(MediaKind::Microphone, enabled);
    }

    pub fn set_camera_enabled(self: &Arc<Self>, enabled: bool) {
        self.set_media_enabled(MediaKind::Camera, enabled);
    }

    /// Select a remote participant by id, or clear the selection.
    pub fn select_participant(&self, id: Option<&str>) {
        if let Err(e) = self.update(|inner| inner.roster.select(id)) {
            tracing::warn!("could not select participant: {e}");
        }
    }

    /// Leave the room. `disconnected` turns true once the room is closed.
    pub fn disconnect(self: &Arc<Self>) {
        let vm = self.clone();
        self.rt.spawn(async move { vm.close().await });
    }

    /// Close the room and wait for it. Used at shutdown, where nothing
    /// would be left to run a spawned close.
    pub async fn close(&self) {
        if let Err(e) = self.room.close().await {
            tracing::warn!("error closing room: {e}");
        }
        self.teardown();
        let ended = self.update(Inner::mark_disconnected);
        self.announce_end(ended);
    }

    /// Video track with the given SID, local or remote, for rendering.
    pub fn video_track(&self, track_sid: &str) -> Option<RtcVideoTrack> {
        let local = self.room.local_participant();
        if let Some(publication) = local
            .track_publications()
            .into_values()
            .find(|publication| publication.sid().to_string() == track_sid)
        {
            return match publication.track() {
                Some(livekit::prelude::LocalTrack::Video(track)) => Some(track.rtc_track()),
                _ => None,
            };
        }

        self.room
            .remote_participants()
            .into_values()
            .flat_map(|participant| participant.track_publications().into_values())
            .find(|publication| publication.sid().to_string() == track_sid)
            .and_then(|publication| match publication.track() {
                Some(RemoteTrack::Video(track)) => Some(track.rtc_track()),
                _ => None,
            })
    }

    /// The local camera track, for the self-view.
    pub fn local_camera_track(&self) -> Option<RtcVideoTrack> {
        self.controls.local_camera_track()
    }

    fn set_media_enabled(self: &Arc<Self>, kind: MediaKind, enabled: bool) {
        let actual = self.controls.is_enabled(kind);
        if !self.update(|inner| inner.toggle_mut(kind).request(enabled, actual)) {
            return;
        }

        let vm = self.clone();
        self.rt.spawn(async move {
            if let Err(e) = vm.controls.set_enabled(kind, enabled).await {
                tracing::warn!(
                    "error while trying to switch {kind} {}: {e}",
                    if enabled { "on" } else { "off" }
                );
                vm.emitter.emit(PlaygroundEvent::MediaSwitchFailed {
                    kind,
                    enabled,
                    error: e.to_string(),
                });
            }
            let actual = vm.controls.is_enabled(kind);
            let local = ParticipantInfo::from_local(&vm.room.local_participant());
            vm.update(|inner| {
                inner.toggle_mut(kind).finish(actual);
                inner.roster.set_local(local);
            });
        });
    }

    async fn relay(vm: Weak<Self>, mut events: mpsc::UnboundedReceiver<RoomEvent>) {
        while let Some(event) = events.recv().await {
            let Some(vm) = vm.upgrade() else { break };
            vm.handle_event(event);
        }
        tracing::info!("room event relay ended");
    }

    fn handle_event(&self, event: RoomEvent) {
        match event {
            RoomEvent::ConnectionStateChanged(lk_state) => {
                self.relay_change(RoomChange::ConnectionState(lk_state));
            }

            RoomEvent::Reconnecting => self.relay_change(RoomChange::Reconnecting),

            RoomEvent::Reconnected => self.relay_change(RoomChange::Reconnected),

            RoomEvent::Disconnected { reason } => {
                tracing::info!("room disconnected: {reason:?}");
                self.relay_change(RoomChange::Disconnected);
            }

            RoomEvent::ParticipantConnected(participant) => {
                let info = ParticipantInfo::from_remote(&participant);
                tracing::info!("participant {} connected to the room", info.id);
                self.emitter
                    .emit(PlaygroundEvent::ParticipantConnected(info.id.clone()));
                let remotes = self.project_remotes(None);
                self.relay_change(RoomChange::ParticipantJoined { info, remotes });
            }

            RoomEvent::ParticipantDisconnected(participant) => {
                let id = participant.identity().to_string();
                tracing::info!("participant {id} disconnected from the room");
                self.emitter
                    .emit(PlaygroundEvent::ParticipantDisconnected(id.clone()));
                let remotes = self.project_remotes(Some(&id));
                self.relay_change(RoomChange::ParticipantLeft { id, remotes });
            }

            RoomEvent::TrackPublished { publication, participant } => {
                let track_sid = publication.sid().to_string();
                let participant_id = participant.identity().to_string();
                tracing::info!("remote participant {participant_id} published track {track_sid}");
                publication.set_subscribed(true);
                self.emitter.emit(PlaygroundEvent::RemoteTrackPublished {
                    participant_id,
                    track_sid,
                });
            }

            RoomEvent::TrackUnpublished { publication, participant } => {
                let track_sid = publication.sid().to_string();
                let participant_id = participant.identity().to_string();
                tracing::info!("remote participant {participant_id} unpublished track {track_sid}");
                publication.set_subscribed(false);
                self.stop_playout(&track_sid);
                self.refresh_remotes();
                self.emitter.emit(PlaygroundEvent::RemoteTrackUnpublished {
                    participant_id,
                    track_sid,
                });
            }

            RoomEvent::LocalTrackPublished { publication, .. } => {
                let track_sid = publication.sid().to_string();
                tracing::info!("local participant published track {track_sid}");
                self.refresh_local();
                self.emitter
                    .emit(PlaygroundEvent::LocalTrackPublished(track_sid));
            }

            RoomEvent::LocalTrackUnpublished { publication, .. } => {
                let track_sid = publication.sid().to_string();
                tracing::info!("local participant unpublished track {track_sid}");
                self.refresh_local();
                self.emitter
                    .emit(PlaygroundEvent::LocalTrackUnpublished(track_sid));
            }

            RoomEvent::TrackSubscribed { track, publication, participant } => {
                let track_sid = publication.sid().to_string();
                let participant_id = participant.identity().to_string();
                tracing::info!("subscribed to track {track_sid} of {participant_id}");

                if let RemoteTrack::Audio(audio) = track {
                    let handle =
                        spawn_playout(&self.rt, track_sid.clone(), audio, self.playout.clone());
                    if let Some(previous) = self
                        .audio_streams
                        .lock()
                        .expect("audio streams lock poisoned")
                        .insert(track_sid.clone(), handle)
                    {
                        previous.abort();
                    }
                }

                self.refresh_remotes();
                self.emitter.emit(PlaygroundEvent::TrackSubscribed {
                    participant_id,
                    track_sid,
                });
            }

            RoomEvent::TrackUnsubscribed { publication, participant, .. } => {
                let track_sid = publication.sid().to_string();
                let participant_id = participant.identity().to_string();
                tracing::info!("unsubscribed from track {track_sid} of {participant_id}");
                self.stop_playout(&track_sid);
                self.refresh_remotes();
                self.emitter.emit(PlaygroundEvent::TrackUnsubscribed {
                    participant_id,
                    track_sid,
                });
            }

            RoomEvent::TrackMuted { participant, publication } => {
                self.handle_mute(participant, publication.sid().to_string(), true);
            }

            RoomEvent::TrackUnmuted { participant, publication } => {
                self.handle_mute(participant, publication.sid().to_string(), false);
            }

            _ => {
                tracing::debug!("unhandled room event: {event:?}");
            }
        }
    }

    fn handle_mute(&self, participant: Participant, track_sid: String, muted: bool) {
        let verb = if muted { "muted" } else { "unmuted" };
        match participant {
            Participant::Local(_) => {
                tracing::info!("local participant {verb} track {track_sid}");
                self.refresh_local();
                self.emitter.emit(PlaygroundEvent::TrackMuteChanged {
                    participant_id: None,
                    track_sid,
                    muted,
                });
            }
            Participant::Remote(remote) => {
                let participant_id = remote.identity().to_string();
                tracing::info!("remote participant {participant_id} {verb} track {track_sid}");
                self.refresh_remotes();
                self.emitter.emit(PlaygroundEvent::TrackMuteChanged {
                    participant_id: Some(participant_id),
                    track_sid,
                    muted,
                });
            }
        }
    }

    fn relay_change(&self, change: RoomChange) {
        let applied = self.update(|inner| inner.apply(change));
        if let Some((old, new)) = applied.transition {
            tracing::info!("local connection state changed: {old} -> {new}");
            self.emitter
                .emit(PlaygroundEvent::ConnectionStateChanged { old, new });
        }
        if applied.ended {
            self.teardown();
        }
        self.announce_end(applied.ended);
    }

    /// Apply `f` to the inner state, then publish a snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let (result, selection) = {
            let mut inner = self.inner.lock().expect("conference lock poisoned");
            let before = inner.roster.selected_id().map(str::to_string);
            let result = f(&mut inner);
            let after = inner.roster.selected_id().map(str::to_string);
            self.state.send_replace(inner.snapshot());
            (result, (before != after).then_some(after))
        };
        if let Some(selected) = selection {
            self.emitter.emit(PlaygroundEvent::SelectionChanged(selected));
        }
        result
    }

    fn subscribe_to_all_available_tracks(&self) {
        for participant in self.room.remote_participants().values() {
            for publication in participant.track_publications().values() {
                if publication.is_subscribed() {
                    continue;
                }
                tracing::info!(
                    "subscribing to track {} of {}",
                    publication.sid(),
                    participant.identity()
                );
                publication.set_subscribed(true);
            }
        }
    }

    fn refresh_local(&self) {
        let local = ParticipantInfo::from_local(&self.room.local_participant());
        let microphone = self.controls.is_microphone_enabled();
        let camera = self.controls.is_camera_enabled();
        self.update(|inner| {
            inner.roster.set_local(local);
            if !inner.microphone.switching {
                inner.microphone.enabled = microphone;
            }
            if !inner.camera.switching {
                inner.camera.enabled = camera;
            }
        });
    }

    fn refresh_remotes(&self) {
        let remotes = self.project_remotes(None);
        self.update(|inner| inner.roster.set_remotes(remotes));
    }

    /// Remote participants as the room reports them, minus `departed`.
    fn project_remotes(&self, departed: Option<&str>) -> Vec<ParticipantInfo> {
        self.room
            .remote_participants()
            .values()
            .map(ParticipantInfo::from_remote)
            .filter(|info| Some(info.id.as_str()) != departed)
            .collect()
    }

    fn stop_playout(&self, track_sid: &str) {
        if let Some(handle) = self
            .audio_streams
            .lock()
            .expect("audio streams lock poisoned")
            .remove(track_sid)
        {
            handle.abort();
            self.playout.remove_track(track_sid);
        }
    }

    /// Stop local capture and remote playout.
    fn teardown(&self) {
        self.controls.stop_all();
        for (_, handle) in self
            .audio_streams
            .lock()
            .expect("audio streams lock poisoned")
            .drain()
        {
            handle.abort();
        }
        self.playout.clear();
    }

    fn announce_end(&self, ended: bool) {
        if ended {
            tracing::info!("conference ended");
            self.emitter.emit(PlaygroundEvent::Disconnected);
        }
    }
}

impl Drop for ConferenceViewModel {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.lock().expect("relay lock poisoned").take() {
            relay.abort();
        }
        self.teardown();
    }
}

fn map_connection_state(state: LkConnectionState, attempt: u32) -> ConnectionState {
    match state {
        LkConnectionState::Connected => ConnectionState::Connected,
        LkConnectionState::Reconnecting => ConnectionState::Reconnecting {
            attempt: attempt.max(1),
        },
        LkConnectionState::Disconnected => ConnectionState::Disconnected,
    }
}
