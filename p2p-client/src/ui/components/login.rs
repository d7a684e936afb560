use eframe::egui;

use crate::ui::state::AppState;

/// Returns the username once the user asks to join.
pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> Option<String> {
    let mut join = false;

    ui.vertical_centered(|ui| {
        ui.add_space(80.0);
        ui.heading("Rust P2P Chat");
        ui.label(egui::RichText::new(format!("Server: {}", state.server_url)).weak());
        ui.add_space(20.0);

        ui.label("Username:");
        let response = ui.text_edit_singleline(&mut state.username_input);
        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            join = true;
        }
        if ui.button("Join").clicked() {
            join = true;
        }

        if !state.status.is_empty() {
            ui.add_space(10.0);
            ui.label(egui::RichText::new(&state.status).weak());
        }
    });

    let username = state.username_input.trim();
    if join && !username.is_empty() {
        return Some(username.to_string());
    }
    None
}
