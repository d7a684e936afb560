use eframe::egui;
use rtc_p2p_chat::network::ConnectionState;

use crate::ui::state::AppState;

#[derive(Default)]
pub struct SidebarActions {
    pub selected_peer: Option<String>,
    pub close_peer: Option<String>,
}

pub fn render(ui: &mut egui::Ui, state: &AppState) -> SidebarActions {
    let mut actions = SidebarActions::default();

    ui.heading("Users");
    ui.separator();

    if state.roster.users().is_empty() {
        ui.label("No other users online");
        return actions;
    }

    for user in state.roster.users() {
        let peer_state = state.peer_states.get(&user.id).copied();
        let selected = state.selected.as_deref() == Some(user.id.as_str());

        ui.horizontal(|ui| {
            // Màu trạng thái: xanh = P2P, vàng = đang đàm phán, xám = qua server
            let (color, marker) = match peer_state {
                Some(ConnectionState::Connected) => (egui::Color32::GREEN, "●"),
                Some(_) => (egui::Color32::YELLOW, "◐"),
                None => (egui::Color32::GRAY, "○"),
            };
            ui.colored_label(color, marker);

            if ui.selectable_label(selected, &user.username).clicked() {
                actions.selected_peer = Some(user.id.clone());
            }

            if let Some(peer_state) = peer_state {
                ui.label(egui::RichText::new(peer_state.to_string()).weak());
                if ui.small_button("✕").on_hover_text("Close direct channel").clicked() {
                    actions.close_peer = Some(user.id.clone());
                }
            }
        });
    }

    actions
}
