use std::sync::{Arc, Mutex};

use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::track::TrackSource as LkTrackSource;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::*;
use livekit::webrtc::video_source::native::NativeVideoSource;

use crate::audio::{CHANNELS, SAMPLE_RATE};
use crate::errors::PlaygroundError;
use crate::events::MediaKind;
use crate::options::SessionOptions;

const AUDIO_QUEUE_SIZE_MS: u32 = 100;

/// A running capture feeding a local source. Stopping it ends the feed.
pub trait CaptureHandle: Send {
    fn stop(self: Box<Self>);
}

/// Platform capture the shell plugs into the media controls.
///
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait CaptureBackend: Send + Sync {
    /// Start feeding 48 kHz mono PCM into `source`.
    fn start_microphone(
        &self,
        source: NativeAudioSource,
    ) -> Result<Box<dyn CaptureHandle>, PlaygroundError>;

    /// Start feeding frames of the given size into `source`.
    fn start_camera(
        &self,
        source: NativeVideoSource,
        resolution: VideoResolution,
        fps: u32,
    ) -> Result<Box<dyn CaptureHandle>, PlaygroundError>;
}

/// Publishes and unpublishes the local microphone and camera tracks.
pub struct MediaControls {
    room: Arc<Room>,
    backend: Arc<dyn CaptureBackend>,
    options: SessionOptions,
    microphone: Mutex<Option<Box<dyn CaptureHandle>>>,
    camera: Mutex<Option<Box<dyn CaptureHandle>>>,
}

impl MediaControls {
    pub fn new(room: Arc<Room>, backend: Arc<dyn CaptureBackend>, options: SessionOptions) -> Self {
        Self {
            room,
            backend,
            options,
            microphone: Mutex::new(None),
            camera: Mutex::new(None),
        }
    }

    /// A publication of that source exists and is not muted.
    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        let source = lk_source(kind);
        self.room
            .local_participant()
            .track_publications()
            .values()
            .any(|publication| publication.source() == source && !publication.is_muted())
    }

    pub fn is_microphone_enabled(&self) -> bool {
        self.is_enabled(MediaKind::Microphone)
    }

    pub fn is_camera_enabled(&self) -> bool {
        self.is_enabled(MediaKind::Camera)
    }

    pub async fn set_enabled(&self, kind: MediaKind, enabled: bool) -> Result<(), PlaygroundError> {
        match (kind, enabled) {
            (MediaKind::Microphone, true) => self.publish_microphone().await,
            (MediaKind::Microphone, false) => self.unpublish_microphone().await,
            (MediaKind::Camera, true) => self.publish_camera().await,
            (MediaKind::Camera, false) => self.unpublish_camera().await,
        }
    }

    /// Create a microphone track, start capturing into it and publish it.
    pub async fn publish_microphone(&self) -> Result<(), PlaygroundError> {
        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
            },
            SAMPLE_RATE,
            CHANNELS,
            AUDIO_QUEUE_SIZE_MS,
        );
        let track =
            LocalAudioTrack::create_audio_track("microphone", RtcAudioSource::Native(source.clone()));

        let capture = self.backend.start_microphone(source)?;
        let published = self
            .room
            .local_participant()
            .publish_track(
                LocalTrack::Audio(track),
                TrackPublishOptions {
                    source: LkTrackSource::Microphone,
                    ..Default::default()
                },
            )
            .await;

        match published {
            Ok(publication) => {
                tracing::info!(track_sid = %publication.sid(), "microphone track published");
                Self::replace_capture(&self.microphone, Some(capture));
                Ok(())
            }
            Err(e) => {
                capture.stop();
                Err(PlaygroundError::Room(format!("publish audio: {e}")))
            }
        }
    }

    /// Create a camera track, start capturing into it and publish it.
    pub async fn publish_camera(&self) -> Result<(), PlaygroundError> {
        let resolution = || VideoResolution {
            width: self.options.camera_width,
            height: self.options.camera_height,
        };
        let source = NativeVideoSource::new(resolution(), false);
        let track =
            LocalVideoTrack::create_video_track("camera", RtcVideoSource::Native(source.clone()));

        let capture = self
            .backend
            .start_camera(source, resolution(), self.options.camera_fps)?;
        let published = self
            .room
            .local_participant()
            .publish_track(
                LocalTrack::Video(track),
                TrackPublishOptions {
                    source: LkTrackSource::Camera,
                    simulcast: self.options.simulcast,
                    ..Default::default()
                },
            )
            .await;

        match published {
            Ok(publication) => {
                tracing::info!(track_sid = %publication.sid(), "camera track published");
                Self::replace_capture(&self.camera, Some(capture));
                Ok(())
            }
            Err(e) => {
                capture.stop();
                Err(PlaygroundError::Room(format!("publish video: {e}")))
            }
        }
    }

    pub async fn unpublish_microphone(&self) -> Result<(), PlaygroundError> {
        self.unpublish(MediaKind::Microphone).await?;
        Self::replace_capture(&self.microphone, None);
        Ok(())
    }

    pub async fn unpublish_camera(&self) -> Result<(), PlaygroundError> {
        self.unpublish(MediaKind::Camera).await?;
        Self::replace_capture(&self.camera, None);
        Ok(())
    }

    /// The local camera track, for the self-view.
    pub fn local_camera_track(&self) -> Option<RtcVideoTrack> {
        self.room
            .local_participant()
            .track_publications()
            .values()
            .filter(|publication| publication.source() == LkTrackSource::Camera)
            .find_map(|publication| match publication.track() {
                Some(LocalTrack::Video(track)) => Some(track.rtc_track()),
                _ => None,
            })
    }

    /// Stop every running capture (on disconnect).
    pub fn stop_all(&self) {
        Self::replace_capture(&self.microphone, None);
        Self::replace_capture(&self.camera, None);
    }

    async fn unpublish(&self, kind: MediaKind) -> Result<(), PlaygroundError> {
        let source = lk_source(kind);
        let local = self.room.local_participant();
        let publication = local
            .track_publications()
            .into_values()
            .find(|publication| publication.source() == source)
            .ok_or_else(|| PlaygroundError::Media(format!("no {kind} publication")))?;

        local
            .unpublish_track(&publication.sid())
            .await
            .map_err(|e| PlaygroundError::Room(format!("unpublish {kind}: {e}")))?;
        tracing::info!(track_sid = %publication.sid(), "{kind} track unpublished");
        Ok(())
    }

    fn replace_capture(
        slot: &Mutex<Option<Box<dyn CaptureHandle>>>,
        capture: Option<Box<dyn CaptureHandle>>,
    ) {
        let previous = std::mem::replace(&mut *slot.lock().expect("capture lock poisoned"), capture);
        if let Some(previous) = previous {
            previous.stop();
        }
    }
}

fn lk_source(kind: MediaKind) -> LkTrackSource {
    match kind {
        MediaKind::Microphone => LkTrackSource::Microphone,
        MediaKind::Camera => LkTrackSource::Camera,
    }
}

/// Local toggle state shown by the conference screen.
///
/// `enabled` is what the switch shows, `switching` disables it while a
/// publish or unpublish is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaToggle {
    pub enabled: bool,
    pub switching: bool,
}

impl MediaToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            switching: false,
        }
    }

    /// Record the requested state. Returns `true` when a switch must start:
    /// no switch is in flight and the actual state differs.
    pub fn request(&mut self, enabled: bool, actual: bool) -> bool {
        self.enabled = enabled;
        if self.switching || actual == enabled {
            return false;
        }
        self.switching = true;
        true
    }

    /// End of a switch: the toggle shows what is actually published.
    pub fn finish(&mut self, actual: bool) {
        self.switching = false;
        self.enabled = actual;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_starts_switch_when_state_differs() {
        let mut toggle = MediaToggle::new(false);
        assert!(toggle.request(true, false));
        assert!(toggle.enabled);
        assert!(toggle.switching);
    }

    #[test]
    fn request_matching_actual_state_does_nothing() {
        let mut toggle = MediaToggle::new(true);
        assert!(!toggle.request(true, true));
        assert!(!toggle.switching);
    }

    #[test]
    fn request_while_switching_is_ignored() {
        let mut toggle = MediaToggle::new(false);
        assert!(toggle.request(true, false));
        assert!(!toggle.request(false, false));
        assert!(toggle.switching);
    }

    #[test]
    fn finish_resyncs_to_actual_state() {
        let mut toggle = MediaToggle::new(false);
        toggle.request(true, false);
        // publishing failed: nothing is published
        toggle.finish(false);
        assert_eq!(toggle, MediaToggle::new(false));

        toggle.request(true, false);
        toggle.finish(true);
        assert_eq!(toggle, MediaToggle::new(true));
    }

    #[test]
    fn media_kinds_map_to_sdk_sources() {
        assert_eq!(lk_source(MediaKind::Microphone), LkTrackSource::Microphone);
        assert_eq!(lk_source(MediaKind::Camera), LkTrackSource::Camera);
    }
}
