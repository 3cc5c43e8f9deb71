//! Default camera through OpenCV's `VideoCapture` (Linux, Windows).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use livekit::webrtc::prelude::*;
use livekit::webrtc::video_source::native::NativeVideoSource;
use opencv::core::{CV_8UC3, Mat};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use playground_core::{CaptureHandle, PlaygroundError};
use playground_video::{I420PlanesMut, bgr_to_i420};

fn camera_err(context: &str, e: impl std::fmt::Display) -> PlaygroundError {
    PlaygroundError::Media(format!("camera: {context}: {e}"))
}

/// A capture thread reading device 0 until stopped.
pub struct OpenCvCameraCapture {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OpenCvCameraCapture {
    pub fn start(source: NativeVideoSource, width: u32, height: u32) -> Result<Self, PlaygroundError> {
        let running = Arc::new(AtomicBool::new(true));
        let (opened_tx, opened_rx) = mpsc::channel();

        let flag = running.clone();
        let thread = std::thread::Builder::new()
            .name("camera".into())
            .spawn(move || {
                let cam = match open_device(width, height) {
                    Ok(cam) => {
                        let _ = opened_tx.send(Ok(()));
                        cam
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(cam, &source, &flag);
            })
            .map_err(|e| camera_err("spawn capture thread", e))?;

        match opened_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("camera capture started");
                Ok(Self {
                    running,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(camera_err("capture thread exited", e)),
        }
    }
}

fn open_device(width: u32, height: u32) -> Result<VideoCapture, PlaygroundError> {
    let mut cam = VideoCapture::new(0, videoio::CAP_ANY).map_err(|e| camera_err("open device 0", e))?;
    if !cam.is_opened().unwrap_or(false) {
        return Err(PlaygroundError::Media("camera: no camera device found".into()));
    }
    // Best effort; the device picks the closest mode it supports.
    let _ = cam.set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(width));
    let _ = cam.set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(height));
    Ok(cam)
}

fn capture_loop(mut cam: VideoCapture, source: &NativeVideoSource, running: &AtomicBool) {
    let mut frame = Mat::default();
    while running.load(Ordering::Relaxed) {
        if !cam.read(&mut frame).unwrap_or(false) || frame.empty() {
            continue;
        }
        if let Err(e) = push_frame(&frame, source) {
            tracing::warn!("dropped camera frame: {e}");
        }
    }
    let _ = cam.release();
    tracing::info!("camera capture stopped");
}

fn push_frame(frame: &Mat, source: &NativeVideoSource) -> opencv::Result<()> {
    if frame.typ() != CV_8UC3 {
        return Ok(());
    }
    let continuous;
    let frame = if frame.is_continuous() {
        frame
    } else {
        continuous = frame.try_clone()?;
        &continuous
    };

    let (width, height) = (frame.cols() as u32, frame.rows() as u32);
    let mut buffer = I420Buffer::new(width, height);
    let (stride_y, stride_u, stride_v) = buffer.strides();
    let (y, u, v) = buffer.data_mut();
    bgr_to_i420(
        frame.data_bytes()?,
        width as usize * 3,
        width,
        height,
        I420PlanesMut {
            y,
            u,
            v,
            stride_y,
            stride_u,
            stride_v,
        },
    );

    source.capture_frame(&VideoFrame {
        rotation: VideoRotation::VideoRotation0,
        timestamp_us: 0,
        buffer,
    });
    Ok(())
}

impl CaptureHandle for OpenCvCameraCapture {
    fn stop(mut self: Box<Self>) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OpenCvCameraCapture {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
