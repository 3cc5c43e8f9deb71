use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use livekit::webrtc::audio_frame::AudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use playground_core::audio::{CHANNELS, SAMPLE_RATE};
use playground_core::{AudioPlayoutBuffer, CaptureHandle, PlaygroundError};

// cpal::Stream is !Send + !Sync on some hosts. The stream never leaves the
// struct that owns it; it is only kept alive so the OS callback keeps firing.
struct SendSyncStream(cpal::Stream);
unsafe impl Send for SendSyncStream {}
unsafe impl Sync for SendSyncStream {}

fn audio_err(context: &str, e: impl std::fmt::Display) -> PlaygroundError {
    PlaygroundError::Media(format!("{context}: {e}"))
}

/// Speakers: plays the mix of every remote audio track.
pub struct CpalAudioPlayout {
    _stream: SendSyncStream,
}

impl CpalAudioPlayout {
    pub fn start(playout_buffer: Arc<AudioPlayoutBuffer>) -> Result<Self, PlaygroundError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaygroundError::Media("no output audio device available".into()))?;
        let default_cfg = device
            .default_output_config()
            .map_err(|e| audio_err("default output config", e))?;

        let device_sr = default_cfg.sample_rate().0;
        let device_ch = default_cfg.channels();
        tracing::info!(
            "audio playout: device={:?}, rate={device_sr}, channels={device_ch}",
            device.name()
        );

        let config = cpal::StreamConfig {
            channels: device_ch,
            sample_rate: cpal::SampleRate(device_sr),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let device_frames = data.len() / device_ch as usize;
                    let mut mono = vec![0i16; lk_frames_for(device_frames, device_sr)];
                    playout_buffer.pull_samples(&mut mono);
                    upmix(&mono, data, device_ch as usize);
                },
                |err| tracing::error!("audio playout stream error: {err}"),
                None,
            )
            .map_err(|e| audio_err("build output stream", e))?;

        stream.play().map_err(|e| audio_err("play output stream", e))?;
        tracing::info!("audio playout started");
        Ok(Self {
            _stream: SendSyncStream(stream),
        })
    }
}

/// Microphone: feeds the default input device into a LiveKit source.
pub struct CpalAudioCapture {
    _stream: SendSyncStream,
    running: Arc<AtomicBool>,
}

impl CpalAudioCapture {
    pub fn start(audio_source: NativeAudioSource) -> Result<Self, PlaygroundError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| PlaygroundError::Media("no input audio device available".into()))?;
        let default_cfg = device
            .default_input_config()
            .map_err(|e| audio_err("default input config", e))?;

        let device_sr = default_cfg.sample_rate().0;
        let device_ch = default_cfg.channels();
        tracing::info!(
            "audio capture: device={:?}, rate={device_sr}, channels={device_ch}",
            device.name()
        );

        let config = cpal::StreamConfig {
            channels: device_ch,
            sample_rate: cpal::SampleRate(device_sr),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = Arc::new(AtomicBool::new(true));
        let running_flag = running.clone();

        // capture_frame is async; the callback thread drives it on its own runtime.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| audio_err("audio capture runtime", e))?;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !running_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    let pcm = downmix(data, device_ch as usize, device_sr);
                    if pcm.is_empty() {
                        return;
                    }
                    let samples_per_channel = pcm.len() as u32;
                    let frame = AudioFrame {
                        data: pcm.into(),
                        sample_rate: SAMPLE_RATE,
                        num_channels: CHANNELS,
                        samples_per_channel,
                    };
                    if let Err(e) = rt.block_on(audio_source.capture_frame(&frame)) {
                        tracing::debug!("dropped microphone frame: {e}");
                    }
                },
                |err| tracing::error!("audio capture stream error: {err}"),
                None,
            )
            .map_err(|e| audio_err("build input stream", e))?;

        stream.play().map_err(|e| audio_err("play input stream", e))?;
        tracing::info!("audio capture started");
        Ok(Self {
            _stream: SendSyncStream(stream),
            running,
        })
    }
}

impl CaptureHandle for CpalAudioCapture {
    fn stop(self: Box<Self>) {
        self.running.store(false, Ordering::Relaxed);
        tracing::info!("audio capture stopped");
    }
}

/// How many 48 kHz samples cover `device_frames` frames at `device_sr`.
fn lk_frames_for(device_frames: usize, device_sr: u32) -> usize {
    if device_sr == SAMPLE_RATE {
        return device_frames;
    }
    (device_frames as u64 * SAMPLE_RATE as u64 / device_sr.max(1) as u64) as usize
}

/// Interleaved f32 at the device rate → 48 kHz mono i16.
///
/// Channels are averaged, the rate is converted by nearest neighbour.
fn downmix(data: &[f32], channels: usize, device_sr: u32) -> Vec<i16> {
    let channels = channels.max(1);
    let device_frames = data.len() / channels;
    if device_frames == 0 {
        return Vec::new();
    }
    let lk_frames = lk_frames_for(device_frames, device_sr).max(1);

    (0..lk_frames)
        .map(|i| {
            let src = (i as u64 * device_frames as u64 / lk_frames as u64) as usize;
            let frame = &data[src.min(device_frames - 1) * channels..][..channels];
            let mono = frame.iter().sum::<f32>() / channels as f32;
            (mono * 32767.0).clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// 48 kHz mono i16 → interleaved f32 filling `out`, every channel the same.
fn upmix(mono: &[i16], out: &mut [f32], channels: usize) {
    let channels = channels.max(1);
    let device_frames = out.len() / channels;
    if mono.is_empty() || device_frames == 0 {
        out.fill(0.0);
        return;
    }
    for (frame_idx, frame) in out.chunks_exact_mut(channels).enumerate() {
        let src = (frame_idx as u64 * mono.len() as u64 / device_frames as u64) as usize;
        let sample = mono[src.min(mono.len() - 1)] as f32 / 32768.0;
        frame.fill(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_scales_with_device_rate() {
        assert_eq!(lk_frames_for(480, 48_000), 480);
        assert_eq!(lk_frames_for(441, 44_100), 480);
        assert_eq!(lk_frames_for(160, 16_000), 480);
    }

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0f32, 0.0, 0.5, 0.5];
        let pcm = downmix(&stereo, 2, SAMPLE_RATE);
        assert_eq!(pcm.len(), 2);
        assert_eq!(pcm[0], (0.5 * 32767.0) as i16);
        assert_eq!(pcm[1], (0.5 * 32767.0) as i16);
    }

    #[test]
    fn downmix_clamps_and_handles_empty_input() {
        assert_eq!(downmix(&[2.0, -2.0], 1, SAMPLE_RATE), vec![32767, -32768]);
        assert!(downmix(&[], 2, SAMPLE_RATE).is_empty());
    }

    #[test]
    fn downmix_resamples_to_48k() {
        let input = vec![0.0f32; 441];
        assert_eq!(downmix(&input, 1, 44_100).len(), 480);
    }

    #[test]
    fn upmix_duplicates_mono_into_every_channel() {
        let mut out = [9.0f32; 6];
        upmix(&[16384, -16384, 0], &mut out, 2);
        assert_eq!(out, [0.5, 0.5, -0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn upmix_without_samples_is_silence() {
        let mut out = [1.0f32; 4];
        upmix(&[], &mut out, 2);
        assert_eq!(out, [0.0; 4]);
    }
}
