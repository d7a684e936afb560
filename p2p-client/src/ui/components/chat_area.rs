use chrono::{Local, TimeZone};
use eframe::egui;

use crate::ui::state::AppState;

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for message in &state.messages {
                let time = Local
                    .timestamp_opt(message.timestamp, 0)
                    .single()
                    .map(|t| t.format("%H:%M").to_string())
                    .unwrap_or_default();
                let (tag, color) = if message.is_p2p {
                    ("P2P", egui::Color32::LIGHT_GREEN)
                } else {
                    ("Server", egui::Color32::LIGHT_BLUE)
                };

                ui.horizontal(|ui| {
                    ui.strong(state.sender_label(message));
                    ui.label(egui::RichText::new(time).weak());
                    ui.colored_label(color, tag);
                });
                ui.label(&message.content);
                ui.add_space(4.0);
            }
        });
}
