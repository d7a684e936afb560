use eframe::egui;

use crate::ui::state::{ActivityKind, AppState};

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    ui.heading("Activity");
    ui.separator();

    if let Some(local_id) = &state.local_id {
        ui.horizontal(|ui| {
            ui.label("Local ID:");
            ui.label(egui::RichText::new(local_id).monospace());
        });
    }
    ui.horizontal(|ui| {
        ui.label("Direct sessions:");
        ui.label(state.peer_states.len().to_string());
    });

    ui.separator();

    // Hiển thị log events gần đây
    egui::ScrollArea::vertical()
        .max_height(300.0)
        .show(ui, |ui| {
            for event in state.activity.iter().rev().take(20) {
                let color = match event.kind {
                    ActivityKind::Joined => egui::Color32::GREEN,
                    ActivityKind::Left => egui::Color32::RED,
                    ActivityKind::PeerState => egui::Color32::YELLOW,
                    ActivityKind::Error => egui::Color32::LIGHT_RED,
                };

                ui.horizontal(|ui| {
                    ui.colored_label(color, format!("[{}]", event.timestamp.format("%H:%M:%S")));
                    ui.label(&event.message);
                });
            }
        });
}
