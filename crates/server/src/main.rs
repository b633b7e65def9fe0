mod config;
mod events;
mod server;
mod tui;

use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;

use config::ServerConfig;
use events::ServerEvent;
use server::GameServer;
use tui::TuiState;

#[derive(Parser)]
#[command(name = "dual-server")]
#[command(about = "Dual game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = 7777)]
    port: u16,

    #[arg(short, long, default_value_t = 20)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 64)]
    max_players: usize,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Widen lag-compensation clamp for long-haul connections")]
    high_latency_profile: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServerConfig {
        bind_address: format!("{}:{}", args.bind, args.port),
        tick_rate: args.tick_rate,
        max_players: args.max_players,
        high_latency_profile: args.high_latency_profile,
        ..Default::default()
    };

    let mut server = GameServer::new(config);
    server.start().await?;

    let (events_tx, events_rx) = mpsc::channel(256);

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("server listening");
        run_headless(&mut server, events_tx, events_rx).await
    } else {
        run_with_tui(&mut server, events_tx, events_rx, args.max_players).await
    }
}

async fn run_headless(
    server: &mut GameServer,
    events_tx: mpsc::Sender<ServerEvent>,
    mut events_rx: mpsc::Receiver<ServerEvent>,
) -> Result<()> {
    let drain = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            log::info!("{event:?}");
        }
    });

    tokio::select! {
        result = server.run(events_tx) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    server.stop().await;
    drain.abort();
    Ok(())
}

async fn run_with_tui(
    server: &mut GameServer,
    events_tx: mpsc::Sender<ServerEvent>,
    mut events_rx: mpsc::Receiver<ServerEvent>,
    max_players: usize,
) -> Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut tui_state = TuiState::new();
    tui_state.log("server listening");

    let run_result = tokio::select! {
        result = drive_tui(server, &mut terminal, &mut tui_state, &mut events_rx, max_players) => result,
        result = server.run(events_tx) => result,
    };

    server.stop().await;
    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    run_result
}

async fn drive_tui(
    server: &GameServer,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    tui_state: &mut TuiState,
    events_rx: &mut mpsc::Receiver<ServerEvent>,
    max_players: usize,
) -> Result<()> {
    loop {
        while let Ok(event) = events_rx.try_recv() {
            tui_state.log(describe_event(&event));
        }

        if event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    return Ok(());
                }
            }
        }

        let stats = server.stats();
        terminal.draw(|frame| tui::render(frame, tui_state, &stats, max_players))?;

        tokio::time::sleep(Duration::from_millis(33)).await;
    }
}

fn describe_event(event: &ServerEvent) -> String {
    match event {
        ServerEvent::PlayerJoined { player_id, entity_id } => {
            format!("player {player_id} joined as entity {entity_id}")
        }
        ServerEvent::PlayerLeft { player_id } => format!("player {player_id} left"),
        ServerEvent::Error { message } => format!("error: {message}"),
    }
}
