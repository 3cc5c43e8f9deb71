use livekit::prelude::{LocalParticipant, RemoteParticipant};
use livekit::track::TrackSource as LkTrackSource;

use crate::errors::PlaygroundError;

/// Displayable projection of a room participant.
///
/// Two infos are equal when they describe the same participant, whatever
/// their track state.
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub id: String,
    pub name: String,
    pub camera_enabled: bool,
    pub microphone_enabled: bool,
    /// SID of the camera track that can be rendered right now.
    pub camera_track_sid: Option<String>,
}

impl PartialEq for ParticipantInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParticipantInfo {}

/// Source of a published track, reduced to what the projection cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishedSource {
    Camera,
    Microphone,
    Other,
}

impl From<LkTrackSource> for PublishedSource {
    fn from(source: LkTrackSource) -> Self {
        match source {
            LkTrackSource::Camera => PublishedSource::Camera,
            LkTrackSource::Microphone => PublishedSource::Microphone,
            _ => PublishedSource::Other,
        }
    }
}

/// One track publication as seen by the projection.
#[derive(Debug, Clone)]
pub struct PublishedTrack {
    pub sid: String,
    pub source: PublishedSource,
    pub muted: bool,
    /// The media track is available locally (always for local tracks,
    /// only once subscribed for remote ones).
    pub has_track: bool,
}

impl ParticipantInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        let name = if name.is_empty() { id.clone() } else { name };
        Self {
            id,
            name,
            camera_enabled: false,
            microphone_enabled: false,
            camera_track_sid: None,
        }
    }

    /// Build an info from the participant's publications.
    ///
    /// The first camera publication (by SID) decides the camera state.
    pub fn project(
        id: impl Into<String>,
        name: impl Into<String>,
        tracks: impl IntoIterator<Item = PublishedTrack>,
    ) -> Self {
        let mut info = Self::new(id, name);
        let mut tracks: Vec<PublishedTrack> = tracks.into_iter().collect();
        tracks.sort_by(|a, b| a.sid.cmp(&b.sid));

        if let Some(camera) = tracks.iter().find(|t| t.source == PublishedSource::Camera) {
            info.camera_enabled = !camera.muted;
            if !camera.muted && camera.has_track {
                info.camera_track_sid = Some(camera.sid.clone());
            }
        }
        info.microphone_enabled = tracks
            .iter()
            .any(|t| t.source == PublishedSource::Microphone && !t.muted);
        info
    }

    pub fn from_remote(participant: &RemoteParticipant) -> Self {
        let tracks = participant
            .track_publications()
            .values()
            .map(|publication| PublishedTrack {
                sid: publication.sid().to_string(),
                source: publication.source().into(),
                muted: publication.is_muted(),
                has_track: publication.track().is_some(),
            })
            .collect::<Vec<_>>();
        Self::project(participant.identity().to_string(), participant.name(), tracks)
    }

    pub fn from_local(participant: &LocalParticipant) -> Self {
        let tracks = participant
            .track_publications()
            .values()
            .map(|publication| PublishedTrack {
                sid: publication.sid().to_string(),
                source: publication.source().into(),
                muted: publication.is_muted(),
                has_track: publication.track().is_some(),
            })
            .collect::<Vec<_>>();
        Self::project(participant.identity().to_string(), participant.name(), tracks)
    }

    /// Letter shown in the participant bubble.
    pub fn initial(&self) -> String {
        self.name
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// Local participant, sorted remote participants and the current selection.
///
/// Updated by the conference event relay. Read by the UI through snapshots.
#[derive(Debug, Clone)]
pub struct ParticipantRoster {
    local: ParticipantInfo,
    remotes: Vec<ParticipantInfo>,
    selected_id: Option<String>,
}

impl ParticipantRoster {
    pub fn new(local: ParticipantInfo) -> Self {
        Self {
            local,
            remotes: Vec::new(),
            selected_id: None,
        }
    }

    pub fn local(&self) -> &ParticipantInfo {
        &self.local
    }

    pub fn set_local(&mut self, info: ParticipantInfo) {
        self.local = info;
    }

    pub fn remotes(&self) -> &[ParticipantInfo] {
        &self.remotes
    }

    /// Replace the remote list. A selection whose participant is gone is dropped.
    pub fn set_remotes(&mut self, mut remotes: Vec<ParticipantInfo>) {
        remotes.sort_by(|a, b| a.id.cmp(&b.id));
        remotes.dedup_by(|a, b| a.id == b.id);
        self.remotes = remotes;

        if let Some(id) = &self.selected_id {
            if !self.remotes.iter().any(|p| &p.id == id) {
                self.selected_id = None;
            }
        }
    }

    pub fn participant(&self, id: &str) -> Option<&ParticipantInfo> {
        self.remotes.iter().find(|p| p.id == id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn selected(&self) -> Option<&ParticipantInfo> {
        self.selected_id.as_deref().and_then(|id| self.participant(id))
    }

    /// Select a remote participant, or clear the selection with `None`.
    ///
    /// An unknown id leaves the selection untouched.
    pub fn select(&mut self, id: Option<&str>) -> Result<(), PlaygroundError> {
        match id {
            Some(id) => {
                if self.participant(id).is_none() {
                    return Err(PlaygroundError::UnknownParticipant(id.to_string()));
                }
                self.selected_id = Some(id.to_string());
            }
            None => self.selected_id = None,
        }
        Ok(())
    }

    /// First remote (in id order) with an enabled camera.
    pub fn first_with_camera(&self, excluding: Option<&str>) -> Option<&ParticipantInfo> {
        self.remotes
            .iter()
            .filter(|p| Some(p.id.as_str()) != excluding)
            .find(|p| p.camera_enabled)
    }

    /// Select the first camera-enabled remote, or nothing if there is none.
    pub fn select_first_with_camera(&mut self) {
        self.selected_id = self.first_with_camera(None).map(|p| p.id.clone());
    }

    /// A remote joined: add it and select it when nothing is selected.
    pub fn participant_joined(&mut self, info: ParticipantInfo) {
        let id = info.id.clone();
        if self.participant(&id).is_none() {
            let mut remotes = std::mem::take(&mut self.remotes);
            remotes.push(info);
            self.set_remotes(remotes);
        }
        if self.selected_id.is_none() {
            self.selected_id = Some(id);
        }
    }

    /// A remote left: remove it and, if it was selected, fall back to the
    /// first camera-enabled remote.
    pub fn participant_left(&mut self, id: &str) {
        let was_selected = self.selected_id.as_deref() == Some(id);
        if was_selected {
            self.selected_id = self.first_with_camera(Some(id)).map(|p| p.id.clone());
        }
        self.remotes.retain(|p| p.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_participant(id: &str, camera: bool) -> ParticipantInfo {
        let mut info = ParticipantInfo::new(id, format!("name-{id}"));
        info.camera_enabled = camera;
        info
    }

    fn track(sid: &str, source: PublishedSource, muted: bool, has_track: bool) -> PublishedTrack {
        PublishedTrack {
            sid: sid.to_string(),
            source,
            muted,
            has_track,
        }
    }

    #[test]
    fn name_falls_back_to_id() {
        let info = ParticipantInfo::new("alice", "");
        assert_eq!(info.name, "alice");
        let info = ParticipantInfo::new("alice", "Alice L.");
        assert_eq!(info.name, "Alice L.");
    }

    #[test]
    fn equality_ignores_track_state() {
        let a = ParticipantInfo::new("p1", "Alice");
        let mut b = ParticipantInfo::new("p1", "Alice");
        b.camera_track_sid = Some("TR_cam".to_string());
        assert_eq!(a, b);
        assert_ne!(a, ParticipantInfo::new("p2", "Alice"));
    }

    #[test]
    fn subscribed_unmuted_camera_is_renderable() {
        let info = ParticipantInfo::project(
            "p1",
            "Alice",
            [
                track("TR_cam", PublishedSource::Camera, false, true),
                track("TR_mic", PublishedSource::Microphone, false, true),
            ],
        );
        assert!(info.camera_enabled);
        assert!(info.microphone_enabled);
        assert_eq!(info.camera_track_sid.as_deref(), Some("TR_cam"));
    }

    #[test]
    fn muted_camera_has_no_renderable_track() {
        let info = ParticipantInfo::project(
            "p1",
            "Alice",
            [track("TR_cam", PublishedSource::Camera, true, true)],
        );
        assert!(!info.camera_enabled);
        assert!(info.camera_track_sid.is_none());
    }

    #[test]
    fn unsubscribed_camera_is_enabled_but_not_renderable() {
        let info = ParticipantInfo::project(
            "p1",
            "Alice",
            [track("TR_cam", PublishedSource::Camera, false, false)],
        );
        assert!(info.camera_enabled);
        assert!(info.camera_track_sid.is_none());
    }

    #[test]
    fn screen_share_is_not_a_camera() {
        let info = ParticipantInfo::project(
            "p1",
            "Alice",
            [track("TR_screen", PublishedSource::Other, false, true)],
        );
        assert!(!info.camera_enabled);
        assert!(!info.microphone_enabled);
    }

    #[test]
    fn initial_is_uppercased_first_letter() {
        assert_eq!(ParticipantInfo::new("p1", "bob").initial(), "B");
        assert_eq!(ParticipantInfo::new("émile", "").initial(), "É");
    }

    #[test]
    fn remotes_are_sorted_by_id() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![
            make_participant("carol", false),
            make_participant("alice", false),
            make_participant("bob", false),
        ]);
        let ids: Vec<&str> = roster.remotes().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["alice", "bob", "carol"]);
    }

    #[test]
    fn select_unknown_keeps_selection() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![make_participant("alice", true)]);
        roster.select(Some("alice")).unwrap();

        let err = roster.select(Some("nobody")).unwrap_err();
        assert!(matches!(err, PlaygroundError::UnknownParticipant(id) if id == "nobody"));
        assert_eq!(roster.selected_id(), Some("alice"));
    }

    #[test]
    fn select_none_clears_selection() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![make_participant("alice", true)]);
        roster.select(Some("alice")).unwrap();
        roster.select(None).unwrap();
        assert!(roster.selected().is_none());
    }

    #[test]
    fn first_with_camera_skips_cameraless_and_excluded() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![
            make_participant("alice", false),
            make_participant("bob", true),
            make_participant("carol", true),
        ]);
        assert_eq!(roster.first_with_camera(None).unwrap().id, "bob");
        assert_eq!(roster.first_with_camera(Some("bob")).unwrap().id, "carol");
    }

    #[test]
    fn joined_participant_is_selected_only_when_nothing_is() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.participant_joined(make_participant("bob", false));
        assert_eq!(roster.selected_id(), Some("bob"));

        roster.participant_joined(make_participant("alice", true));
        assert_eq!(roster.selected_id(), Some("bob"));
        assert_eq!(roster.remotes().len(), 2);
    }

    #[test]
    fn leaving_selected_participant_reselects_camera_enabled() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![
            make_participant("alice", true),
            make_participant("bob", false),
            make_participant("carol", true),
        ]);
        roster.select(Some("alice")).unwrap();

        roster.participant_left("alice");
        assert_eq!(roster.selected_id(), Some("carol"));
        assert!(roster.participant("alice").is_none());
    }

    #[test]
    fn leaving_selected_participant_without_cameras_clears_selection() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![make_participant("alice", true), make_participant("bob", false)]);
        roster.select(Some("alice")).unwrap();

        roster.participant_left("alice");
        assert!(roster.selected_id().is_none());
    }

    #[test]
    fn leaving_unselected_participant_keeps_selection() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![make_participant("alice", true), make_participant("bob", true)]);
        roster.select(Some("bob")).unwrap();

        roster.participant_left("alice");
        assert_eq!(roster.selected_id(), Some("bob"));
    }

    #[test]
    fn refresh_drops_vanished_selection() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![make_participant("alice", true)]);
        roster.select(Some("alice")).unwrap();

        roster.set_remotes(vec![make_participant("bob", true)]);
        assert!(roster.selected().is_none());
    }

    #[test]
    fn selected_info_follows_refresh() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![make_participant("alice", false)]);
        roster.select(Some("alice")).unwrap();

        let mut refreshed = make_participant("alice", true);
        refreshed.camera_track_sid = Some("TR_cam".to_string());
        roster.set_remotes(vec![refreshed]);

        let selected = roster.selected().unwrap();
        assert!(selected.camera_enabled);
        assert_eq!(selected.camera_track_sid.as_deref(), Some("TR_cam"));
    }

    #[test]
    fn select_first_with_camera_on_start() {
        let mut roster = ParticipantRoster::new(ParticipantInfo::new("me", "Me"));
        roster.set_remotes(vec![make_participant("alice", false), make_participant("bob", true)]);
        roster.select_first_with_camera();
        assert_eq!(roster.selected_id(), Some("bob"));

        roster.set_remotes(vec![make_participant("alice", false)]);
        roster.select_first_with_camera();
        assert!(roster.selected_id().is_none());
    }
}
