use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use eframe::egui;
use playground_video::{FrameSink, RgbFrame, VideoRenderers};

/// Key of the self-view renderer.
pub const LOCAL_KEY: &str = "local";

/// Latest frame per renderer key, handed from the frame loops to the UI thread.
pub struct FrameMailbox {
    ctx: egui::Context,
    pending: Mutex<HashMap<String, RgbFrame>>,
}

impl FrameMailbox {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn take_all(&self) -> HashMap<String, RgbFrame> {
        std::mem::take(&mut *self.pending.lock().expect("frame mailbox lock poisoned"))
    }

    fn discard(&self, key: &str) {
        self.pending
            .lock()
            .expect("frame mailbox lock poisoned")
            .remove(key);
    }
}

impl FrameSink for FrameMailbox {
    fn on_frame(&self, key: &str, frame: RgbFrame) {
        self.pending
            .lock()
            .expect("frame mailbox lock poisoned")
            .insert(key.to_string(), frame);
        self.ctx.request_repaint();
    }
}

/// Which track each renderer key is bound to, plus the uploaded textures.
pub struct VideoViews {
    renderers: VideoRenderers,
    mailbox: Arc<FrameMailbox>,
    bound: HashMap<String, String>,
    textures: HashMap<String, egui::TextureHandle>,
}

impl VideoViews {
    pub fn new(renderers: VideoRenderers, mailbox: Arc<FrameMailbox>) -> Self {
        Self {
            renderers,
            mailbox,
            bound: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    /// Bind `key` to the track with `track_sid`, or unbind it with `None`.
    ///
    /// `resolve` is only called when the binding changes.
    pub fn bind(
        &mut self,
        key: &str,
        track_sid: Option<&str>,
        resolve: impl FnOnce(&str) -> Option<livekit::webrtc::prelude::RtcVideoTrack>,
    ) {
        if self.bound.get(key).map(String::as_str) == track_sid {
            return;
        }
        self.unbind(key);

        let Some(track_sid) = track_sid else { return };
        match resolve(track_sid) {
            Some(track) => {
                self.renderers.start(key, track, self.mailbox.clone());
                self.bound.insert(key.to_string(), track_sid.to_string());
            }
            None => tracing::debug!(key, track_sid, "video track not available yet"),
        }
    }

    pub fn unbind(&mut self, key: &str) {
        if self.bound.remove(key).is_some() {
            self.renderers.stop(key);
        }
        self.mailbox.discard(key);
        self.textures.remove(key);
    }

    pub fn clear(&mut self) {
        self.renderers.stop_all();
        self.bound.clear();
        self.mailbox.take_all();
        self.textures.clear();
    }

    /// Upload frames received since the last call.
    pub fn upload(&mut self, ctx: &egui::Context) {
        for (key, frame) in self.mailbox.take_all() {
            if !self.bound.contains_key(&key) {
                continue;
            }
            let image = egui::ColorImage::from_rgb(
                [frame.width as usize, frame.height as usize],
                &frame.pixels,
            );
            match self.textures.get_mut(&key) {
                Some(texture) => texture.set(image, Default::default()),
                None => {
                    let texture = ctx.load_texture(format!("video-{key}"), image, Default::default());
                    self.textures.insert(key, texture);
                }
            }
        }
    }

    pub fn texture(&self, key: &str) -> Option<&egui::TextureHandle> {
        self.textures.get(key)
    }
}

/// Largest rect with the texture's aspect ratio centered in `area`.
pub fn fit_rect(area: egui::Rect, texture_size: egui::Vec2) -> egui::Rect {
    if texture_size.x <= 0.0 || texture_size.y <= 0.0 {
        return area;
    }
    let scale = (area.width() / texture_size.x).min(area.height() / texture_size.y);
    egui::Rect::from_center_size(area.center(), texture_size * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_rect_letterboxes_wide_video() {
        let area = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(700.0, 350.0));
        let fitted = fit_rect(area, egui::vec2(1920.0, 1080.0));
        assert!((fitted.width() - 350.0 * 16.0 / 9.0).abs() < 0.01);
        assert!((fitted.height() - 350.0).abs() < 0.01);
        assert_eq!(fitted.center(), area.center());
    }

    #[test]
    fn fit_rect_with_empty_texture_uses_whole_area() {
        let area = egui::Rect::from_min_size(egui::pos2(10.0, 10.0), egui::vec2(128.0, 128.0));
        assert_eq!(fit_rect(area, egui::Vec2::ZERO), area);
    }

    #[test]
    fn mailbox_keeps_only_latest_frame_per_key() {
        let mailbox = FrameMailbox::new(egui::Context::default());
        let frame = |w| RgbFrame {
            width: w,
            height: 1,
            pixels: vec![0; w as usize * 3],
        };
        mailbox.on_frame("TR_a", frame(1));
        mailbox.on_frame("TR_a", frame(2));
        mailbox.on_frame(LOCAL_KEY, frame(3));

        let pending = mailbox.take_all();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending["TR_a"].width, 2);
        assert!(mailbox.take_all().is_empty());
    }
}
