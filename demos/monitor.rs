use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use odio_remote::{
    Entity, OdioConfig, OdioRemote, PlaybackStatus, UpdateReceiver,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;

struct App {
    remote: OdioRemote,
    selected_index: usize,
    status_message: String,
    updates: UpdateReceiver,
}

impl App {
    fn new(remote: OdioRemote) -> Self {
        let updates = remote.subscribe();
        let hostname = remote.server_info().hostname.clone();
        Self {
            remote,
            selected_index: 0,
            status_message: format!(
                "Connected to {}. j/k select, +/- volume, m mute, q quit",
                hostname
            ),
            updates,
        }
    }

    fn entities(&self) -> Vec<Entity> {
        self.remote.entities()
    }

    fn selected_entity(&self) -> Option<Entity> {
        self.entities().into_iter().nth(self.selected_index)
    }

    fn select_next(&mut self) {
        let count = self.entities().len();
        if count > 0 {
            self.selected_index = (self.selected_index + 1) % count;
        }
    }

    fn select_previous(&mut self) {
        let count = self.entities().len();
        if count > 0 {
            if self.selected_index == 0 {
                self.selected_index = count - 1;
            } else {
                self.selected_index -= 1;
            }
        }
    }

    async fn adjust_volume(&mut self, delta: f64) {
        if let Some(entity) = self.selected_entity() {
            let current = entity.state().volume.unwrap_or(0.5);
            let new_volume = (current + delta).clamp(0.0, 1.0);
            match entity.set_volume(new_volume).await {
                Ok(()) => {
                    self.status_message =
                        format!("{}: volume {:.0}%", entity.display_name(), new_volume * 100.0);
                }
                Err(e) => self.status_message = format!("Failed to set volume: {}", e),
            }
        }
    }

    async fn toggle_mute(&mut self) {
        if let Some(entity) = self.selected_entity() {
            let muted = entity.state().muted.unwrap_or(false);
            match entity.set_muted(!muted).await {
                Ok(()) => {
                    self.status_message = format!(
                        "{}: mute {}",
                        entity.display_name(),
                        if !muted { "ON" } else { "OFF" }
                    );
                }
                Err(e) => self.status_message = format!("Failed to set mute: {}", e),
            }
        }
    }

    fn drain_updates(&mut self) {
        while let Ok(Some(key)) = self.updates.try_recv() {
            self.status_message = format!("Updated: {}", key);
        }
    }
}

fn status_style(status: PlaybackStatus) -> Style {
    match status {
        PlaybackStatus::Playing => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        PlaybackStatus::Paused => Style::default().fg(Color::Yellow),
        PlaybackStatus::Idle => Style::default().fg(Color::Cyan),
        PlaybackStatus::Off => Style::default().fg(Color::Gray),
        PlaybackStatus::Unavailable => Style::default().fg(Color::Red),
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    render_hub(f, app, chunks[0]);
    render_entities(f, app, chunks[1]);
    render_status(f, app, chunks[2]);
}

fn render_hub(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(" {} ", app.remote.server_info().hostname))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let state = app.remote.hub().state();
    let volume = state
        .volume
        .map(|v| format!("{:.0}%", v * 100.0))
        .unwrap_or_else(|| "--".to_string());

    let lines = vec![
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Yellow)),
            Span::styled(state.status.to_string(), status_style(state.status)),
        ]),
        Line::from(vec![
            Span::styled("Volume: ", Style::default().fg(Color::Yellow)),
            Span::raw(volume),
            Span::raw("   "),
            Span::styled("Muted: ", Style::default().fg(Color::Yellow)),
            Span::raw(if state.muted.unwrap_or(false) { "yes" } else { "no" }),
        ]),
        Line::from(vec![
            Span::styled("Reachable: ", Style::default().fg(Color::Yellow)),
            Span::raw(if app.remote.is_reachable() { "yes" } else { "no" }),
        ]),
    ];

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_entities(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Entities ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let entities = app.entities();
    if entities.is_empty() {
        let text = Paragraph::new("No entities yet.\n\nWaiting for services and remote clients.")
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = entities
        .iter()
        .map(|entity| {
            let state = entity.state();
            let volume = state
                .volume
                .map(|v| format!("{:>4.0}%", v * 100.0))
                .unwrap_or_else(|| "   --".to_string());
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<12}", state.status.to_string()),
                    status_style(state.status),
                ),
                Span::raw(volume),
                Span::raw("  "),
                Span::raw(entity.display_name()),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.selected_index));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut state);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let text = Paragraph::new(app.status_message.clone())
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(text, area);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8096".to_string());

    let remote = OdioRemote::connect(OdioConfig::new(base_url)).await?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(remote);
    let res = run_app(&mut terminal, &mut app).await;

    app.remote.shutdown().await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {}", err);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        app.drain_updates();
        terminal.draw(|f| ui(f, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                        KeyCode::Char('+') | KeyCode::Char('=') => {
                            app.adjust_volume(0.05).await;
                        }
                        KeyCode::Char('-') | KeyCode::Char('_') => {
                            app.adjust_volume(-0.05).await;
                        }
                        KeyCode::Char('m') => {
                            app.toggle_mute().await;
                        }
                        KeyCode::Char('r') => {
                            app.remote.refresh();
                            app.status_message = "Refresh requested".to_string();
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
