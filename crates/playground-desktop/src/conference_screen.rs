use std::sync::Arc;

use eframe::egui;
use playground_core::{ConferenceState, ConferenceViewModel, ParticipantInfo};

use crate::video_view::{LOCAL_KEY, VideoViews, fit_rect};

/// Key of the selected participant's renderer.
pub const REMOTE_KEY: &str = "remote";

const VIDEO_HEIGHT: f32 = 350.0;
const SELF_VIEW_SIZE: f32 = 128.0;
const SELF_VIEW_MARGIN: f32 = 8.0;
const BUBBLE_SIZE: f32 = 48.0;

const SELECTED_COLOR: egui::Color32 = egui::Color32::from_rgb(0x2e, 0xa0, 0x43);
const BUBBLE_COLOR: egui::Color32 = egui::Color32::from_rgb(0x1f, 0x6f, 0xeb);

/// Start, stop or swap renderers to match what the state says is visible.
pub fn sync_renderers(vm: &ConferenceViewModel, state: &ConferenceState, video: &mut VideoViews) {
    let remote_sid = state
        .selected
        .as_ref()
        .and_then(|p| p.camera_track_sid.as_deref());
    video.bind(REMOTE_KEY, remote_sid, |sid| vm.video_track(sid));

    let local_sid = state
        .camera
        .enabled
        .then_some(state.local.camera_track_sid.as_deref())
        .flatten();
    video.bind(LOCAL_KEY, local_sid, |_| vm.local_camera_track());
}

pub fn show(
    ctx: &egui::Context,
    vm: &Arc<ConferenceViewModel>,
    state: &ConferenceState,
    video: &VideoViews,
) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.heading("Conference");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(state.connection_state.to_string());
            });
        });
        ui.separator();

        video_area(ui, state, video);
        ui.add_space(8.0);
        carousel(ui, vm, state);
        ui.add_space(8.0);
        ui.separator();
        controls(ui, state).apply(vm);
    });
}

fn video_area(ui: &mut egui::Ui, state: &ConferenceState, video: &VideoViews) {
    let (area, _) = ui.allocate_exact_size(
        egui::vec2(ui.available_width(), VIDEO_HEIGHT),
        egui::Sense::hover(),
    );
    ui.painter().rect_filled(area, 0.0, egui::Color32::BLACK);

    let remote = state
        .selected
        .as_ref()
        .filter(|p| p.camera_track_sid.is_some())
        .and(video.texture(REMOTE_KEY));
    match remote {
        Some(texture) => paint_texture(ui, texture, fit_rect(area, texture.size_vec2())),
        None => {
            ui.painter().text(
                area.center(),
                egui::Align2::CENTER_CENTER,
                "No video source from remote participant",
                egui::FontId::proportional(16.0),
                egui::Color32::WHITE,
            );
        }
    }

    if state.camera.enabled {
        if let Some(texture) = video.texture(LOCAL_KEY) {
            let corner = egui::Rect::from_min_size(
                area.right_bottom() - egui::vec2(SELF_VIEW_SIZE + SELF_VIEW_MARGIN, SELF_VIEW_SIZE + SELF_VIEW_MARGIN),
                egui::vec2(SELF_VIEW_SIZE, SELF_VIEW_SIZE),
            );
            ui.painter().rect_filled(corner, 4.0, egui::Color32::from_gray(24));
            paint_texture(ui, texture, fit_rect(corner, texture.size_vec2()));
        }
    }
}

fn paint_texture(ui: &egui::Ui, texture: &egui::TextureHandle, rect: egui::Rect) {
    egui::Image::new(egui::load::SizedTexture::from_handle(texture)).paint_at(ui, rect);
}

fn carousel(ui: &mut egui::Ui, vm: &ConferenceViewModel, state: &ConferenceState) {
    if state.remotes.is_empty() {
        ui.vertical_centered(|ui| {
            ui.add_sized(egui::vec2(ui.available_width(), BUBBLE_SIZE), egui::Label::new("No participant"));
        });
        return;
    }

    egui::ScrollArea::horizontal().show(ui, |ui| {
        ui.horizontal(|ui| {
            for participant in &state.remotes {
                let selected = state.selected.as_ref() == Some(participant);
                if bubble(ui, participant, selected).clicked() {
                    vm.select_participant(Some(&participant.id));
                }
            }
        });
    });
}

fn bubble(ui: &mut egui::Ui, participant: &ParticipantInfo, selected: bool) -> egui::Response {
    let label = egui::RichText::new(participant.initial())
        .size(20.0)
        .strong()
        .color(egui::Color32::WHITE);
    let button = egui::Button::new(label)
        .fill(if selected { SELECTED_COLOR } else { BUBBLE_COLOR })
        .rounding(BUBBLE_SIZE / 2.0)
        .min_size(egui::vec2(BUBBLE_SIZE, BUBBLE_SIZE));
    ui.add(button).on_hover_text(&participant.name)
}

/// What the control row asked for this frame. Only the live call changes;
/// the join preferences stay as the connect screen left them.
#[derive(Debug, Default, PartialEq, Eq)]
struct ControlActions {
    camera: Option<bool>,
    microphone: Option<bool>,
    disconnect: bool,
}

impl ControlActions {
    fn from_inputs(state: &ConferenceState, camera: bool, microphone: bool, disconnect: bool) -> Self {
        Self {
            camera: (camera != state.camera.enabled).then_some(camera),
            microphone: (microphone != state.microphone.enabled).then_some(microphone),
            disconnect,
        }
    }

    fn apply(self, vm: &Arc<ConferenceViewModel>) {
        if let Some(enabled) = self.camera {
            vm.set_camera_enabled(enabled);
        }
        if let Some(enabled) = self.microphone {
            vm.set_microphone_enabled(enabled);
        }
        if self.disconnect {
            vm.disconnect();
        }
    }
}

fn controls(ui: &mut egui::Ui, state: &ConferenceState) -> ControlActions {
    let mut camera = state.camera.enabled;
    let mut microphone = state.microphone.enabled;
    let mut disconnect = false;

    ui.horizontal(|ui| {
        ui.add_enabled(!state.camera.switching, egui::Checkbox::new(&mut camera, "Camera"));
        ui.add_enabled(
            !state.microphone.switching,
            egui::Checkbox::new(&mut microphone, "Microphone"),
        );

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            let button = egui::Button::new(egui::RichText::new("Disconnect").color(egui::Color32::WHITE))
                .fill(egui::Color32::from_rgb(0xc9, 0x2a, 0x2a));
            disconnect = ui.add(button).clicked();
        });
    });

    ControlActions::from_inputs(state, camera, microphone, disconnect)
}

#[cfg(test)]
mod tests {
    use playground_core::{ConnectionState, MediaToggle};

    use super::*;

    fn state(camera: bool, microphone: bool) -> ConferenceState {
        ConferenceState {
            microphone: MediaToggle::new(microphone),
            camera: MediaToggle::new(camera),
            local: ParticipantInfo::new("me", "Me"),
            remotes: Vec::new(),
            selected: None,
            connection_state: ConnectionState::Connected,
            disconnected: false,
        }
    }

    #[test]
    fn untouched_controls_ask_for_nothing() {
        let actions = ControlActions::from_inputs(&state(true, false), true, false, false);
        assert_eq!(actions, ControlActions::default());
    }

    #[test]
    fn toggles_request_only_what_changed() {
        let actions = ControlActions::from_inputs(&state(false, true), true, true, false);
        assert_eq!(
            actions,
            ControlActions {
                camera: Some(true),
                microphone: None,
                disconnect: false,
            }
        );

        let actions = ControlActions::from_inputs(&state(false, true), false, false, true);
        assert_eq!(
            actions,
            ControlActions {
                camera: None,
                microphone: Some(false),
                disconnect: true,
            }
        );
    }

    #[test]
    fn rendering_the_control_row_changes_nothing() {
        let ctx = egui::Context::default();
        let mut actions = None;
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                actions = Some(controls(ui, &state(true, true)));
            });
        });
        assert_eq!(actions, Some(ControlActions::default()));
    }
}
