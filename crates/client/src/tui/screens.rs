use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph};
use ratatui::Frame;

use super::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Connect,
    Connecting,
    Playing,
}

pub fn render(frame: &mut Frame, app: &AppState) {
    let area = frame.area();

    let block = Block::default()
        .title(" Dual ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(block, area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([Constraint::Min(0)])
        .split(area)[0];

    match app.screen {
        Screen::Connect => render_connect(frame, inner, app),
        Screen::Connecting => render_connecting(frame, inner, app),
        Screen::Playing => render_playing(frame, inner, app),
    }
}

fn render_connect(frame: &mut Frame, area: Rect, app: &AppState) {
    let dialog_area = centered_rect(50, 10, area);
    frame.render_widget(Clear, dialog_area);

    let dialog = Block::default()
        .title(" Connect to Server ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(dialog, dialog_area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(dialog_area);

    let label = Paragraph::new("Server Address:").style(Style::default().fg(Color::White));
    frame.render_widget(label, inner[0]);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let input_text = Paragraph::new(format!("{}_", app.connect_input))
        .style(Style::default().fg(Color::White))
        .block(input_block);
    frame.render_widget(input_text, inner[1]);

    if let Some(err) = &app.connect_error {
        let error_text = Paragraph::new(err.as_str())
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center);
        frame.render_widget(error_text, inner[2]);
    }

    let help = Paragraph::new("Enter Connect  Esc Quit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, inner[3]);
}

fn render_connecting(frame: &mut Frame, area: Rect, _app: &AppState) {
    let dialog_area = centered_rect(40, 6, area);
    frame.render_widget(Clear, dialog_area);

    let dialog = Block::default()
        .title(" Connecting ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    frame.render_widget(dialog, dialog_area);

    let inner = Layout::default()
        .margin(1)
        .constraints([Constraint::Min(0)])
        .split(dialog_area);

    let text = Paragraph::new("Please wait...")
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center);
    frame.render_widget(text, inner[0]);
}

fn render_playing(frame: &mut Frame, area: Rect, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    render_status(frame, chunks[0], app);
    render_entities(frame, chunks[1], app);
}

fn render_status(frame: &mut Frame, area: Rect, app: &AppState) {
    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let predicted = app.predicted_position;
    let lines = vec![
        Line::from(vec![
            Span::styled("Entity: ", Style::default().fg(Color::Gray)),
            Span::styled(
                app.self_entity
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                Style::default().fg(Color::White),
            ),
            Span::raw("   "),
            Span::styled("Latency: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}ms", app.latency_ms),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Predicted position: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("({:.2}, {:.2})", predicted.x, predicted.y),
                Style::default().fg(Color::White),
            ),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_entities(frame: &mut Frame, area: Rect, app: &AppState) {
    let block = Block::default()
        .title(" Entities ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let items: Vec<ListItem> = app
        .entities
        .iter()
        .map(|(id, pos)| {
            let is_self = Some(*id) == app.self_entity;
            let marker = if is_self { "*" } else { " " };
            let style = if is_self {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Line::from(Span::styled(
                format!("{marker} entity {id}: ({:.2}, {:.2})", pos.x, pos.y),
                style,
            )))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}
