use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use livekit::prelude::RemoteAudioTrack;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Sample rate of decoded remote audio and of captured microphone audio.
pub const SAMPLE_RATE: u32 = 48_000;
/// Remote audio is decoded to mono.
pub const CHANNELS: u32 = 1;

/// Thread-safe mixer for decoded remote audio.
///
/// Every remote audio track pushes i16 mono samples into its own queue;
/// the platform audio output pulls the sum of all queues. Each queue is
/// bounded, the oldest samples are dropped when a consumer falls behind.
pub struct AudioPlayoutBuffer {
    tracks: Mutex<HashMap<String, VecDeque<i16>>>,
    /// Per-track capacity in samples.
    max_samples: usize,
}

impl Default for AudioPlayoutBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlayoutBuffer {
    /// Two seconds of audio per track.
    pub fn new() -> Self {
        Self::with_capacity(SAMPLE_RATE as usize * 2)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            tracks: Mutex::new(HashMap::new()),
            max_samples,
        }
    }

    pub fn push_samples(&self, track_sid: &str, samples: &[i16]) {
        let mut tracks = self.tracks.lock().expect("playout lock poisoned");
        let queue = tracks.entry(track_sid.to_string()).or_default();
        queue.extend(samples.iter().copied());

        let overflow = queue.len().saturating_sub(self.max_samples);
        if overflow > 0 {
            queue.drain(..overflow);
        }
    }

    /// Fill `out` with the mix of every track.
    ///
    /// Returns the number of samples for which at least one track had data.
    /// The remainder of `out` is silence.
    pub fn pull_samples(&self, out: &mut [i16]) -> usize {
        out.fill(0);
        let mut tracks = self.tracks.lock().expect("playout lock poisoned");
        let mut filled = 0;
        for queue in tracks.values_mut() {
            let available = queue.len().min(out.len());
            for (slot, sample) in out.iter_mut().zip(queue.drain(..available)) {
                *slot = slot.saturating_add(sample);
            }
            filled = filled.max(available);
        }
        filled
    }

    /// Forget a track's pending samples.
    pub fn remove_track(&self, track_sid: &str) {
        self.tracks
            .lock()
            .expect("playout lock poisoned")
            .remove(track_sid);
    }

    pub fn clear(&self) {
        self.tracks.lock().expect("playout lock poisoned").clear();
    }
}

/// Decode a subscribed remote audio track into the playout buffer.
///
/// The returned task runs until the track ends or is aborted.
pub fn spawn_playout(
    rt: &Handle,
    track_sid: String,
    track: RemoteAudioTrack,
    buffer: Arc<AudioPlayoutBuffer>,
) -> JoinHandle<()> {
    let mut stream = NativeAudioStream::new(track.rtc_track(), SAMPLE_RATE as i32, CHANNELS as i32);
    rt.spawn(async move {
        tracing::info!(track_sid = %track_sid, "audio playout started");
        while let Some(frame) = stream.next().await {
            buffer.push_samples(&track_sid, &frame.data);
        }
        buffer.remove_track(&track_sid);
        tracing::info!(track_sid = %track_sid, "audio playout ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pull() {
        let buf = AudioPlayoutBuffer::new();
        buf.push_samples("TR_a", &[100, 200, 300, 400, 500]);

        let mut out = vec![0i16; 3];
        assert_eq!(buf.pull_samples(&mut out), 3);
        assert_eq!(out, vec![100, 200, 300]);

        let mut out = vec![0i16; 5];
        assert_eq!(buf.pull_samples(&mut out), 2);
        assert_eq!(out, vec![400, 500, 0, 0, 0]);
    }

    #[test]
    fn tracks_are_mixed() {
        let buf = AudioPlayoutBuffer::new();
        buf.push_samples("TR_a", &[100, 200, 300]);
        buf.push_samples("TR_b", &[1, 2]);

        let mut out = vec![0i16; 4];
        assert_eq!(buf.pull_samples(&mut out), 3);
        assert_eq!(out, vec![101, 202, 300, 0]);
    }

    #[test]
    fn mixing_saturates() {
        let buf = AudioPlayoutBuffer::new();
        buf.push_samples("TR_a", &[i16::MAX, i16::MIN]);
        buf.push_samples("TR_b", &[10, -10]);

        let mut out = vec![0i16; 2];
        buf.pull_samples(&mut out);
        assert_eq!(out, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn overflow_drops_oldest() {
        let buf = AudioPlayoutBuffer::with_capacity(4);
        buf.push_samples("TR_a", &[1, 2, 3, 4]);
        buf.push_samples("TR_a", &[5, 6]);

        let mut out = vec![0i16; 6];
        assert_eq!(buf.pull_samples(&mut out), 4);
        assert_eq!(out, vec![3, 4, 5, 6, 0, 0]);
    }

    #[test]
    fn pull_empty_returns_silence() {
        let buf = AudioPlayoutBuffer::new();
        let mut out = vec![99i16; 3];
        assert_eq!(buf.pull_samples(&mut out), 0);
        assert_eq!(out, vec![0, 0, 0]);
    }

    #[test]
    fn removed_track_is_silent() {
        let buf = AudioPlayoutBuffer::new();
        buf.push_samples("TR_a", &[1, 2, 3]);
        buf.push_samples("TR_b", &[7]);
        buf.remove_track("TR_a");

        let mut out = vec![0i16; 3];
        assert_eq!(buf.pull_samples(&mut out), 1);
        assert_eq!(out, vec![7, 0, 0]);
    }

    #[test]
    fn clear_empties_every_track() {
        let buf = AudioPlayoutBuffer::new();
        buf.push_samples("TR_a", &[1, 2, 3]);
        buf.push_samples("TR_b", &[1, 2, 3]);
        buf.clear();

        let mut out = vec![0i16; 3];
        assert_eq!(buf.pull_samples(&mut out), 0);
    }
}
