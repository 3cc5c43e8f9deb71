use std::collections::VecDeque;
use std::sync::Mutex;

use eframe::egui;
use playground_core::{PlaygroundEvent, PlaygroundEventListener};

pub const MAX_LINES: usize = 256;

/// The last [`MAX_LINES`] events, oldest first.
#[derive(Default)]
pub struct EventLog {
    lines: Mutex<VecDeque<String>>,
    ctx: Mutex<Option<egui::Context>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repaint `ctx` whenever a line is added.
    pub fn attach(&self, ctx: egui::Context) {
        *self.ctx.lock().expect("event log lock poisoned") = Some(ctx);
    }

    pub fn push(&self, line: impl Into<String>) {
        {
            let mut lines = self.lines.lock().expect("event log lock poisoned");
            if lines.len() == MAX_LINES {
                lines.pop_front();
            }
            lines.push_back(line.into());
        }
        if let Some(ctx) = self.ctx.lock().expect("event log lock poisoned").as_ref() {
            ctx.request_repaint();
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .expect("event log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().expect("event log lock poisoned").clear();
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        egui::CollapsingHeader::new("Event log")
            .default_open(false)
            .show(ui, |ui| {
                if ui.small_button("Clear").clicked() {
                    self.clear();
                }
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .max_height(180.0)
                    .show(ui, |ui| {
                        for line in self.lines() {
                            ui.monospace(line);
                        }
                    });
            });
    }
}

impl PlaygroundEventListener for EventLog {
    fn on_event(&self, event: PlaygroundEvent) {
        self.push(event.to_string());
    }
}
