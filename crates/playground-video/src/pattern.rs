//! Synthetic camera: scrolling color bars.

use std::time::Duration;

use livekit::webrtc::prelude::{I420Buffer, VideoFrame, VideoRotation};
use livekit::webrtc::video_source::native::NativeVideoSource;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::convert::rgb_to_yuv;

/// SMPTE-style bars, left to right.
const BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 16),
    (16, 235, 235),
    (16, 235, 16),
    (235, 16, 235),
    (235, 16, 16),
    (16, 16, 235),
    (16, 16, 16),
];

/// Pixels the bars move per frame.
const SCROLL_STEP: u32 = 4;

/// Paint the bars shifted left by `offset` pixels into I420 planes.
pub fn fill_color_bars(
    planes: (&mut [u8], &mut [u8], &mut [u8]),
    strides: (u32, u32, u32),
    width: u32,
    height: u32,
    offset: u32,
) {
    let (y_plane, u_plane, v_plane) = planes;
    let (stride_y, stride_u, stride_v) = strides;
    let bar_width = (width / BARS.len() as u32).max(1);
    let colors: Vec<(u8, u8, u8)> = BARS.iter().map(|&(r, g, b)| rgb_to_yuv(r, g, b)).collect();
    let color_at = |col: u32| colors[(((col + offset) / bar_width) as usize) % colors.len()];

    for row in 0..height {
        let line = (row * stride_y) as usize;
        for col in 0..width {
            y_plane[line + col as usize] = color_at(col).0;
        }
    }

    let chroma_width = width.div_ceil(2);
    for row in 0..height.div_ceil(2) {
        for col in 0..chroma_width {
            let (_, u, v) = color_at(col * 2);
            u_plane[(row * stride_u + col) as usize] = u;
            v_plane[(row * stride_v + col) as usize] = v;
        }
    }
}

/// Feeds scrolling color bars into a video source until stopped.
pub struct TestPattern {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TestPattern {
    pub fn start(rt: &Handle, source: NativeVideoSource, width: u32, height: u32, fps: u32) -> Self {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let period = Duration::from_secs(1) / fps.max(1);

        let handle = rt.spawn(async move {
            tracing::info!(width, height, fps, "test pattern started");
            let mut frame = VideoFrame {
                rotation: VideoRotation::VideoRotation0,
                timestamp_us: 0,
                buffer: I420Buffer::new(width, height),
            };
            let mut interval = tokio::time::interval(period);
            let mut tick: u32 = 0;

            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = interval.tick() => {
                        let strides = frame.buffer.strides();
                        let offset = tick.wrapping_mul(SCROLL_STEP) % width.max(1);
                        fill_color_bars(frame.buffer.data_mut(), strides, width, height, offset);
                        frame.timestamp_us = i64::from(tick) * period.as_micros() as i64;
                        source.capture_frame(&frame);
                        tick = tick.wrapping_add(1);
                    }
                }
            }
            tracing::info!("test pattern stopped");
        });

        Self { cancel_tx, handle }
    }

    pub fn stop(self) {
        let _ = self.cancel_tx.send(true);
        // The task exits on its next wakeup; abort covers a stalled source.
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Planes {
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    }

    fn paint(width: u32, height: u32, offset: u32) -> Planes {
        let cw = width.div_ceil(2);
        let ch = height.div_ceil(2);
        let mut planes = Planes {
            y: vec![0; (width * height) as usize],
            u: vec![0; (cw * ch) as usize],
            v: vec![0; (cw * ch) as usize],
        };
        fill_color_bars(
            (&mut planes.y, &mut planes.u, &mut planes.v),
            (width, cw, cw),
            width,
            height,
            offset,
        );
        planes
    }

    #[test]
    fn first_bar_is_white() {
        let planes = paint(16, 2, 0);
        let white = rgb_to_yuv(235, 235, 235);
        assert_eq!(planes.y[0], white.0);
        assert_eq!(planes.u[0], white.1);
        assert_eq!(planes.v[0], white.2);
    }

    #[test]
    fn rows_are_identical() {
        let planes = paint(16, 4, 0);
        assert_eq!(planes.y[..16], planes.y[16..32]);
        assert_eq!(planes.y[..16], planes.y[48..64]);
    }

    #[test]
    fn offset_scrolls_the_bars() {
        // 16 px wide, 8 bars: each bar is 2 px, an offset of 2 shifts by one bar
        let still = paint(16, 2, 0);
        let moved = paint(16, 2, 2);
        assert_eq!(moved.y[0], still.y[2]);
        assert_eq!(moved.y[14], still.y[0]);
    }

    #[test]
    fn narrow_frames_do_not_divide_by_zero() {
        let planes = paint(3, 1, 7);
        assert_eq!(planes.y.len(), 3);
    }
}
