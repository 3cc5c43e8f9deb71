use eframe::egui;
use playground_core::{ConnectState, ConnectViewModel, SettingsStore};

/// Editable copies of the form fields, pushed to the view-model on change.
pub struct ConnectForm {
    server_url: String,
    token: String,
    mic_on_join: bool,
    camera_on_join: bool,
}

impl ConnectForm {
    pub fn new(state: &ConnectState, settings: &SettingsStore) -> Self {
        let stored = settings.get();
        Self {
            server_url: state.server_url.clone(),
            token: state.token.clone(),
            mic_on_join: stored.mic_enabled_on_join,
            camera_on_join: stored.camera_enabled_on_join,
        }
    }
}

pub fn show(
    ctx: &egui::Context,
    vm: &ConnectViewModel,
    settings: &SettingsStore,
    form: &mut ConnectForm,
) {
    let state = vm.state();

    egui::CentralPanel::default().show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.heading("LiveKit Demo");
            ui.add_space(20.0);
        });

        ui.add_enabled_ui(!state.connecting, |ui| {
            egui::Grid::new("connect_form")
                .num_columns(2)
                .spacing([12.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Server URL");
                    let url = ui.add(
                        egui::TextEdit::singleline(&mut form.server_url)
                            .hint_text("wss://example.livekit.cloud")
                            .desired_width(f32::INFINITY),
                    );
                    if url.changed() {
                        vm.set_server_url(form.server_url.clone());
                    }
                    ui.end_row();

                    ui.label("Token");
                    let token = ui.add(
                        egui::TextEdit::singleline(&mut form.token)
                            .hint_text("access token (JWT)")
                            .password(true)
                            .desired_width(f32::INFINITY),
                    );
                    if token.changed() {
                        vm.set_token(form.token.clone());
                    }
                    ui.end_row();
                });

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.checkbox(&mut form.mic_on_join, "Microphone on join").changed() {
                    settings.set_mic_enabled_on_join(form.mic_on_join);
                }
                if ui.checkbox(&mut form.camera_on_join, "Camera on join").changed() {
                    settings.set_camera_enabled_on_join(form.camera_on_join);
                }
            });

            ui.add_space(16.0);
            ui.vertical_centered(|ui| {
                let connect = egui::Button::new("Connect").min_size(egui::vec2(160.0, 32.0));
                if ui.add(connect).clicked() {
                    vm.connect();
                }
            });
        });
    });

    if state.connecting {
        egui::Window::new("Connecting")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Connecting to {}…", state.server_url));
                });
                ui.vertical_centered(|ui| {
                    if ui.button("Cancel").clicked() {
                        vm.cancel_in_progress_connection();
                    }
                });
            });
    }

    if let Some(message) = &state.error_message {
        egui::Window::new("Error")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(message);
                ui.vertical_centered(|ui| {
                    if ui.button("Ok").clicked() {
                        vm.dismiss_error();
                    }
                });
            });
    }
}
