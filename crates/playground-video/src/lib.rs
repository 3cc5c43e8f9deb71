//! Video frame pipeline.
//!
//! Pulls frames from LiveKit `NativeVideoStream`s, converts them to packed
//! RGB and hands them to a [`FrameSink`]. Also provides the synthetic
//! camera used when no capture device is wired in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use livekit::webrtc::prelude::RtcVideoTrack;
use livekit::webrtc::video_stream::native::NativeVideoStream;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

mod convert;
mod pattern;

pub use convert::{
    I420Planes, I420PlanesMut, RgbFrame, bgr_to_i420, i420_to_rgb, nv12_to_i420, rgb_to_yuv,
};
pub use pattern::{TestPattern, fill_color_bars};

/// Deliver every Nth decoded frame by default (~15 fps at 30 fps input).
pub const DEFAULT_FRAME_STRIDE: u64 = 2;

const HEARTBEAT: Duration = Duration::from_secs(3);

/// Receives converted frames. Called from a tokio worker.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, key: &str, frame: RgbFrame);
}

/// Per-track renderer handle.
struct TrackRenderer {
    cancel_tx: watch::Sender<bool>,
    _handle: JoinHandle<()>,
}

/// Registry of running frame loops, keyed by the caller (a track sid, or
/// `"local"` for the self-view).
pub struct VideoRenderers {
    rt: Handle,
    renderers: Mutex<HashMap<String, TrackRenderer>>,
    frame_stride: u64,
}

impl VideoRenderers {
    pub fn new(rt: Handle) -> Self {
        Self::with_frame_stride(rt, DEFAULT_FRAME_STRIDE)
    }

    pub fn with_frame_stride(rt: Handle, frame_stride: u64) -> Self {
        Self {
            rt,
            renderers: Mutex::new(HashMap::new()),
            frame_stride: frame_stride.max(1),
        }
    }

    /// Start rendering `track` into `sink` under `key`, replacing any
    /// renderer already running for that key.
    pub fn start(&self, key: &str, track: RtcVideoTrack, sink: Arc<dyn FrameSink>) {
        self.stop(key);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = self.rt.spawn(frame_loop(
            key.to_string(),
            track,
            sink,
            self.frame_stride,
            cancel_rx,
        ));

        self.renderers
            .lock()
            .expect("renderer lock poisoned")
            .insert(key.to_string(), TrackRenderer {
                cancel_tx,
                _handle: handle,
            });
    }

    /// Stop and remove the renderer for `key`. Returns whether one was running.
    pub fn stop(&self, key: &str) -> bool {
        let renderer = self
            .renderers
            .lock()
            .expect("renderer lock poisoned")
            .remove(key);
        match renderer {
            Some(renderer) => {
                let _ = renderer.cancel_tx.send(true);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<TrackRenderer> = self
            .renderers
            .lock()
            .expect("renderer lock poisoned")
            .drain()
            .map(|(_, renderer)| renderer)
            .collect();
        for renderer in drained {
            let _ = renderer.cancel_tx.send(true);
        }
    }
}

impl Drop for VideoRenderers {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn frame_loop(
    key: String,
    track: RtcVideoTrack,
    sink: Arc<dyn FrameSink>,
    frame_stride: u64,
    mut cancel_rx: watch::Receiver<bool>,
) {
    tracing::info!(key = %key, "frame loop started");
    let mut stream = NativeVideoStream::new(track);
    let mut frame_count: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => {
                tracing::debug!(key = %key, "frame loop cancelled");
                break;
            }
            _ = tokio::time::sleep(HEARTBEAT) => {
                tracing::debug!(key = %key, frames = frame_count, "still waiting for frames");
            }
            frame = stream.next() => {
                let Some(frame) = frame else {
                    tracing::info!(key = %key, "video stream ended");
                    break;
                };
                frame_count += 1;
                if frame_count == 1 {
                    tracing::info!(
                        key = %key,
                        width = frame.buffer.width(),
                        height = frame.buffer.height(),
                        "first video frame received"
                    );
                }
                if should_deliver(frame_count, frame_stride) {
                    sink.on_frame(&key, convert::frame_to_rgb(&frame));
                }
            }
        }
    }

    stream.close();
    tracing::info!(key = %key, frames = frame_count, "frame loop exited");
}

/// The first frame is always delivered so a new track shows up at once.
fn should_deliver(frame_count: u64, frame_stride: u64) -> bool {
    frame_count == 1 || frame_count % frame_stride == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stopping_unknown_key_is_a_no_op() {
        let renderers = VideoRenderers::new(Handle::current());
        assert!(!renderers.stop("TR_missing"));
        renderers.stop_all();
        assert!(renderers.renderers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn frame_stride_is_at_least_one() {
        let renderers = VideoRenderers::with_frame_stride(Handle::current(), 0);
        assert_eq!(renderers.frame_stride, 1);
        assert_eq!(
            VideoRenderers::new(Handle::current()).frame_stride,
            DEFAULT_FRAME_STRIDE
        );
    }

    #[test]
    fn delivers_first_frame_then_every_nth() {
        let delivered: Vec<u64> = (1..=7).filter(|&n| should_deliver(n, 3)).collect();
        assert_eq!(delivered, vec![1, 3, 6]);

        let all: Vec<u64> = (1..=4).filter(|&n| should_deliver(n, 1)).collect();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }
}
