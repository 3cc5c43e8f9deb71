use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::VideoResolution;
use livekit::webrtc::video_source::native::NativeVideoSource;
use playground_core::{CaptureBackend, CaptureHandle, PlaygroundError};
use playground_video::TestPattern;
use tokio::runtime::Handle;

use crate::audio::CpalAudioCapture;

/// cpal microphone and the default camera, with color bars standing in for
/// a missing camera.
pub struct DesktopCapture {
    rt: Handle,
}

impl DesktopCapture {
    pub fn new(rt: Handle) -> Self {
        Self { rt }
    }
}

struct PatternCapture(TestPattern);

impl CaptureHandle for PatternCapture {
    fn stop(self: Box<Self>) {
        self.0.stop();
    }
}

#[cfg(target_os = "macos")]
fn open_device_camera(
    source: NativeVideoSource,
    _width: u32,
    _height: u32,
) -> Result<Box<dyn CaptureHandle>, PlaygroundError> {
    Ok(Box::new(crate::camera_macos::MacCameraCapture::start(source)?))
}

#[cfg(all(not(target_os = "macos"), feature = "opencv-camera"))]
fn open_device_camera(
    source: NativeVideoSource,
    width: u32,
    height: u32,
) -> Result<Box<dyn CaptureHandle>, PlaygroundError> {
    Ok(Box::new(crate::camera_opencv::OpenCvCameraCapture::start(source, width, height)?))
}

#[cfg(all(not(target_os = "macos"), not(feature = "opencv-camera")))]
fn open_device_camera(
    _source: NativeVideoSource,
    _width: u32,
    _height: u32,
) -> Result<Box<dyn CaptureHandle>, PlaygroundError> {
    Err(PlaygroundError::Media(
        "camera: built without a capture backend (enable the opencv-camera feature)".into(),
    ))
}

/// The device camera, or the fallback when it cannot be opened.
fn device_or_fallback(
    device: impl FnOnce() -> Result<Box<dyn CaptureHandle>, PlaygroundError>,
    fallback: impl FnOnce() -> Box<dyn CaptureHandle>,
) -> Box<dyn CaptureHandle> {
    match device() {
        Ok(capture) => capture,
        Err(e) => {
            tracing::warn!("{e}; publishing a test pattern instead");
            fallback()
        }
    }
}

impl CaptureBackend for DesktopCapture {
    fn start_microphone(
        &self,
        source: NativeAudioSource,
    ) -> Result<Box<dyn CaptureHandle>, PlaygroundError> {
        Ok(Box::new(CpalAudioCapture::start(source)?))
    }

    fn start_camera(
        &self,
        source: NativeVideoSource,
        resolution: VideoResolution,
        fps: u32,
    ) -> Result<Box<dyn CaptureHandle>, PlaygroundError> {
        let (width, height) = (resolution.width, resolution.height);
        if width == 0 || height == 0 {
            return Err(PlaygroundError::Media(format!(
                "invalid camera resolution {width}x{height}"
            )));
        }
        let pattern_source = source.clone();
        Ok(device_or_fallback(
            || open_device_camera(source, width, height),
            || Box::new(PatternCapture(TestPattern::start(&self.rt, pattern_source, width, height, fps))),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counted(Arc<AtomicUsize>);

    impl CaptureHandle for Counted {
        fn stop(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stop_count(capture: Box<dyn CaptureHandle>, stops: &Arc<AtomicUsize>) -> usize {
        capture.stop();
        stops.load(Ordering::SeqCst)
    }

    #[test]
    fn device_camera_is_preferred() {
        let stops = Arc::new(AtomicUsize::new(0));
        let fallback_used = Arc::new(AtomicUsize::new(0));
        let capture = device_or_fallback(
            || Ok(Box::new(Counted(stops.clone()))),
            || {
                fallback_used.fetch_add(1, Ordering::SeqCst);
                Box::new(Counted(stops.clone()))
            },
        );
        assert_eq!(fallback_used.load(Ordering::SeqCst), 0);
        assert_eq!(stop_count(capture, &stops), 1);
    }

    #[test]
    fn missing_device_falls_back() {
        let stops = Arc::new(AtomicUsize::new(0));
        let fallback_used = Arc::new(AtomicUsize::new(0));
        let capture = device_or_fallback(
            || Err(PlaygroundError::Media("camera: no camera device found".into())),
            || {
                fallback_used.fetch_add(1, Ordering::SeqCst);
                Box::new(Counted(stops.clone()))
            },
        );
        assert_eq!(fallback_used.load(Ordering::SeqCst), 1);
        assert_eq!(stop_count(capture, &stops), 1);
    }
}
