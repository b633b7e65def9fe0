mod screens;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use dual_sim::MoveIntent;
use glam::DVec2;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

pub use screens::Screen;

use crate::config::ClientConfig;
use crate::net::NetworkClient;

pub struct AppState {
    pub screen: Screen,
    pub connect_input: String,
    pub connect_error: Option<String>,
    pub self_entity: Option<u64>,
    pub latency_ms: u64,
    pub predicted_position: DVec2,
    pub entities: Vec<(u64, DVec2)>,
}

impl AppState {
    fn new(server_address: String) -> Self {
        Self {
            screen: Screen::Connect,
            connect_input: server_address,
            connect_error: None,
            self_entity: None,
            latency_ms: 0,
            predicted_position: DVec2::ZERO,
            entities: Vec::new(),
        }
    }
}

/// Drives the connect menu and in-game view in one loop: non-blocking key
/// polling, draining the network client's state-update channel, and a
/// fixed-rate redraw, the same pattern the server host uses for its TUI.
pub async fn run(mut config: ClientConfig) -> Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = AppState::new(config.server_address.clone());
    let mut client: Option<Arc<NetworkClient>> = None;
    let mut state_rx = None;
    let mut next_timestamp: u64 = 0;

    let result = loop {
        if event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
                    {
                        break Ok(());
                    }

                    match app.screen {
                        Screen::Connect => match key.code {
                            KeyCode::Esc => break Ok(()),
                            KeyCode::Enter => {
                                config.server_address = app.connect_input.clone();
                                let new_client = Arc::new(NetworkClient::new(
                                    config.transport_config(),
                                    config.snapshot_capacity,
                                ));
                                state_rx = new_client.state_update_channel();
                                let connecting = new_client.clone();
                                tokio::spawn(async move {
                                    let _ = connecting.connect().await;
                                });
                                client = Some(new_client);
                                app.screen = Screen::Connecting;
                                app.connect_error = None;
                            }
                            KeyCode::Backspace => {
                                app.connect_input.pop();
                            }
                            KeyCode::Char(c) => {
                                if c.is_ascii_digit() || c == '.' || c == ':' {
                                    app.connect_input.push(c);
                                }
                            }
                            _ => {}
                        },
                        Screen::Connecting => {
                            if key.code == KeyCode::Esc {
                                if let Some(client) = client.take() {
                                    client.disconnect().await;
                                }
                                app.screen = Screen::Connect;
                            }
                        }
                        Screen::Playing => {
                            if let Some(active) = client.clone() {
                                if key.code == KeyCode::Esc {
                                    active.disconnect().await;
                                    client = None;
                                    app.screen = Screen::Connect;
                                } else if let Some(intent) = key_to_intent(key.code) {
                                    next_timestamp += 1;
                                    let _ = active.send_intent(intent, next_timestamp, 0.1);
                                }
                            }
                        }
                    }
                }
            }
        }

        if let Some(active) = &client {
            if app.screen == Screen::Connecting && active.is_connected() {
                app.screen = Screen::Playing;
            }
            if let Some(rx) = state_rx.as_mut() {
                while let Ok(update) = rx.try_recv() {
                    active.ingest(update);
                }
            }
            app.self_entity = active.self_entity();
            app.latency_ms = active.latency().as_millis() as u64;
            app.predicted_position = active.predicted_state().position;
            let render_time = now_ms().saturating_sub(config.interpolation_delay.as_millis() as u64);
            app.entities = active
                .remote_entities()
                .into_iter()
                .filter_map(|id| active.interpolated_remote(id, render_time).map(|e| (id, e.position)))
                .collect();
        }

        terminal.draw(|frame| screens::render(frame, &app))?;
        tokio::time::sleep(Duration::from_millis(33)).await;
    };

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;
    result
}

fn key_to_intent(code: KeyCode) -> Option<MoveIntent> {
    let direction = match code {
        KeyCode::Up | KeyCode::Char('w') => DVec2::new(0.0, -1.0),
        KeyCode::Down | KeyCode::Char('s') => DVec2::new(0.0, 1.0),
        KeyCode::Left | KeyCode::Char('a') => DVec2::new(-1.0, 0.0),
        KeyCode::Right | KeyCode::Char('d') => DVec2::new(1.0, 0.0),
        KeyCode::Char(' ') => DVec2::ZERO,
        _ => return None,
    };
    Some(MoveIntent {
        direction,
        sprint: false,
        fire: code == KeyCode::Char(' '),
    })
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
