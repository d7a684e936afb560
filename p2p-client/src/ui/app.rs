use eframe::egui;
use rtc_p2p_chat::{NetworkCommand, NetworkEvent};
use tokio::sync::mpsc;

use super::components::{
    activity_panel, chat_area, input_bar, login,
    sidebar::{self, SidebarActions},
};
use super::state::{AppState, Screen};

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<NetworkCommand>,
    event_receiver: mpsc::Receiver<NetworkEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<NetworkCommand>,
        event_receiver: mpsc::Receiver<NetworkEvent>,
        server_url: String,
        username: Option<String>,
    ) -> Self {
        Self {
            state: AppState::new(server_url, username),
            command_sender,
            event_receiver,
        }
    }

    fn handle_network_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply(event);
        }
    }

    fn send_command(&mut self, command: NetworkCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to network: {err}");
        }
    }

    fn chat_screen(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Rust P2P Chat");
                ui.label(format!("as {}", self.state.username));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Disconnect").clicked() {
                        self.send_command(NetworkCommand::Disconnect);
                    }
                });
            });
        });

        egui::SidePanel::left("user_sidebar")
            .resizable(true)
            .default_width(200.0)
            .show(ctx, |ui| {
                let actions: SidebarActions = sidebar::render(ui, &self.state);
                if let Some(peer_id) = actions.selected_peer {
                    if self.state.select(&peer_id) {
                        self.send_command(NetworkCommand::ConnectToPeer { peer_id });
                    }
                }
                if let Some(peer_id) = actions.close_peer {
                    self.send_command(NetworkCommand::ClosePeer { peer_id });
                }
            });

        egui::SidePanel::right("activity_panel")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                activity_panel::render(ui, &self.state);
            });

        egui::TopBottomPanel::bottom("input_bar").show(ctx, |ui| {
            ui.label(egui::RichText::new(&self.state.status).weak());
            let enabled = self.state.selected.is_some();
            if let Some(content) = input_bar::render(ui, &mut self.state.input_text, enabled) {
                if let Some(to) = self.state.selected.clone() {
                    self.send_command(NetworkCommand::SendMessage { to, content });
                }
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            chat_area::render(ui, &self.state);
        });
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_network_events();

        match self.state.screen {
            Screen::Login | Screen::Joining => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    if self.state.screen == Screen::Joining {
                        ui.add_enabled_ui(false, |ui| login::render(ui, &mut self.state));
                    } else if let Some(username) = login::render(ui, &mut self.state) {
                        self.state.begin_join(username.clone());
                        self.send_command(NetworkCommand::Join { username });
                    }
                });
            }
            Screen::Chat => self.chat_screen(ctx),
        }

        ctx.request_repaint();
    }
}
