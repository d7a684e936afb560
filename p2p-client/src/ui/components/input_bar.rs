use eframe::egui;

pub fn render(ui: &mut egui::Ui, input_text: &mut String, enabled: bool) -> Option<String> {
    let mut send = false;
    ui.add_enabled_ui(enabled, |ui| {
        ui.horizontal(|ui| {
            let response = ui.text_edit_singleline(input_text);
            if ui.button("Send").clicked() {
                send = true;
            }

            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send = true;
            }
        });
    });

    let content = input_text.trim();
    if send && !content.is_empty() {
        let message = content.to_string();
        input_text.clear();
        return Some(message);
    }

    None
}
