// src/tui.rs
//
// Terminal UI. Three panes mirroring the service's layout: history on the
// left, the analysis report in the middle, live chat on the right, plus
// login/signup screens and small overlays for compose/upload/email actions.
//
// The UI owns no subsystem state: it renders snapshots and reacts to the
// event bus. Network calls run on spawned tasks that report back through an
// internal channel so the interface never blocks.

use crate::api::{self, ReviewRecord};
use crate::chat::{controller, ChatMessage, Sender};
use crate::events::{self, AppEvent};
use crate::session::{self, AuthSession};
use crate::settings::{self, AppSettings};
use crate::{credentials, store_manager};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{execute, terminal};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io::Stdout;
use std::path::PathBuf;
use tokio::sync::mpsc;

// ============================================================================
// App State
// ============================================================================

#[derive(Clone, Copy, PartialEq)]
enum View {
    Login,
    Signup,
    Main,
}

#[derive(Clone, Copy, PartialEq)]
enum Focus {
    History,
    Chat,
}

/// Modal input boxes layered over the main view.
enum Overlay {
    Compose { text: String },
    UploadPath { path: String },
    EmailTo { address: String },
    ConfirmWithdraw,
}

/// Results of spawned API tasks, delivered back to the UI loop.
enum UiMsg {
    LoginDone(Result<AuthSession, String>),
    SignupDone(Result<(), String>),
    LogoutDone,
    WithdrawDone(Result<(), String>),
    HistoryLoaded(Result<Vec<ReviewRecord>, String>),
    AnalysisDone(Result<String, String>),
    Selected(Result<(), String>),
    ReportSaved(Result<PathBuf, String>),
    EmailSent(Result<(), String>),
}

struct App {
    settings: AppSettings,
    view: View,
    focus: Focus,
    status: String,
    busy: bool,
    should_quit: bool,

    // Login / signup fields
    email_input: String,
    password_input: String,
    nickname_input: String,
    auth_field: usize,
    remember: bool,

    // Main view state
    history: Vec<ReviewRecord>,
    history_state: ListState,
    selected_id: Option<i64>,
    report: String,
    report_scroll: u16,
    chat_messages: Vec<ChatMessage>,
    chat_input: String,
    overlay: Option<Overlay>,
}

impl App {
    fn new(settings: AppSettings) -> Self {
        Self {
            settings,
            view: View::Login,
            focus: Focus::History,
            status: String::new(),
            busy: false,
            should_quit: false,
            email_input: String::new(),
            password_input: String::new(),
            nickname_input: String::new(),
            auth_field: 0,
            remember: false,
            history: Vec::new(),
            history_state: ListState::default(),
            selected_id: None,
            report: String::new(),
            report_scroll: 0,
            chat_messages: Vec::new(),
            chat_input: String::new(),
            overlay: None,
        }
    }

    fn reset_main_state(&mut self) {
        self.history.clear();
        self.history_state = ListState::default();
        self.selected_id = None;
        self.report.clear();
        self.report_scroll = 0;
        self.chat_messages.clear();
        self.chat_input.clear();
        self.overlay = None;
    }
}

type Tx = mpsc::UnboundedSender<UiMsg>;

// ============================================================================
// Entry Point
// ============================================================================

pub async fn run(settings: AppSettings) -> Result<(), String> {
    terminal::enable_raw_mode().map_err(|e| format!("Failed to enter raw mode: {}", e))?;
    let mut stdout = std::io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen)
        .map_err(|e| format!("Failed to enter alternate screen: {}", e))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal =
        Terminal::new(backend).map_err(|e| format!("Failed to create terminal: {}", e))?;

    let result = run_app(&mut terminal, settings).await;

    terminal::disable_raw_mode().ok();
    execute!(terminal.backend_mut(), terminal::LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    settings: AppSettings,
) -> Result<(), String> {
    let mut app = App::new(settings);
    let mut term_events = EventStream::new();
    let mut bus = events::subscribe();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiMsg>();

    if session::is_authenticated() {
        // Restored session: land on the main view. No record is selected and
        // no channel exists until the user picks one.
        app.view = View::Main;
        if let Some(session) = session::current() {
            app.status = format!("Welcome back, {}", session.nickname);
        }
        refresh_history(&mut app, &ui_tx);
    } else if let Some(email) = app.settings.remember_email.clone() {
        app.email_input = email.clone();
        if let Ok(Some(password)) = credentials::get_credential(&email, "password") {
            app.password_input = password;
            app.remember = true;
        }
    }

    loop {
        terminal
            .draw(|frame| draw(frame, &mut app))
            .map_err(|e| format!("Draw failed: {}", e))?;

        if app.should_quit {
            break;
        }

        tokio::select! {
            maybe_event = term_events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        handle_key(&mut app, key, &ui_tx).await;
                    }
                    Some(Ok(_)) => {} // resize etc. - redraw happens anyway
                    Some(Err(e)) => return Err(format!("Terminal event error: {}", e)),
                    None => break,
                }
            }
            app_event = bus.recv() => {
                if let Ok(event) = app_event {
                    handle_app_event(&mut app, event).await;
                }
            }
            Some(msg) = ui_rx.recv() => {
                handle_ui_msg(&mut app, msg, &ui_tx);
            }
        }
    }

    // Quitting the app is a selection clear: any open channel closes with it
    controller::clear_selection().await;
    let _ = store_manager::flush();
    Ok(())
}

// ============================================================================
// Event Handling
// ============================================================================

async fn handle_app_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::ChatMessage { .. } => {
            // Re-read the authoritative log snapshot
            app.chat_messages = controller::chat_messages().await;
        }
        AppEvent::ChannelState { current, .. } => {
            if current == crate::chat::ChannelState::Running {
                app.status = "Chat connected".to_string();
            }
        }
        AppEvent::ChannelEnded { reason, .. } => {
            if reason == "disconnected" {
                app.status = "Chat disconnected - re-select the record to reconnect".to_string();
            }
        }
        AppEvent::SessionError { message, .. } => {
            app.status = message;
        }
        AppEvent::AuthChanged { authenticated } => {
            if !authenticated && app.view == View::Main {
                app.reset_main_state();
                app.view = View::Login;
            }
        }
    }
}

async fn handle_key(app: &mut App, key: KeyEvent, ui_tx: &Tx) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }

    if let Some(overlay) = app.overlay.take() {
        app.overlay = handle_overlay_key(app, overlay, key, ui_tx);
        return;
    }

    match app.view {
        View::Login => handle_login_key(app, key, ui_tx),
        View::Signup => handle_signup_key(app, key, ui_tx),
        View::Main => handle_main_key(app, key, ui_tx).await,
    }
}

fn handle_login_key(app: &mut App, key: KeyEvent, ui_tx: &Tx) {
    match key.code {
        KeyCode::Tab | KeyCode::Down | KeyCode::Up => app.auth_field = (app.auth_field + 1) % 2,
        KeyCode::F(2) => {
            app.view = View::Signup;
            app.auth_field = 0;
            app.status = String::new();
        }
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.remember = !app.remember;
        }
        KeyCode::Char(c) => {
            match app.auth_field {
                0 => app.email_input.push(c),
                _ => app.password_input.push(c),
            };
        }
        KeyCode::Backspace => {
            match app.auth_field {
                0 => app.email_input.pop(),
                _ => app.password_input.pop(),
            };
        }
        KeyCode::Enter => {
            if app.email_input.trim().is_empty() || app.password_input.is_empty() {
                app.status = "Enter email and password".to_string();
                return;
            }
            app.busy = true;
            app.status = "Logging in...".to_string();
            let email = app.email_input.trim().to_string();
            let password = app.password_input.clone();
            let tx = ui_tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(UiMsg::LoginDone(session::login(&email, &password).await));
            });
        }
        _ => {}
    }
}

fn handle_signup_key(app: &mut App, key: KeyEvent, ui_tx: &Tx) {
    match key.code {
        KeyCode::Esc => {
            app.view = View::Login;
            app.auth_field = 0;
        }
        KeyCode::Tab | KeyCode::Down => app.auth_field = (app.auth_field + 1) % 3,
        KeyCode::Up => app.auth_field = (app.auth_field + 2) % 3,
        KeyCode::Char(c) => {
            match app.auth_field {
                0 => app.email_input.push(c),
                1 => app.password_input.push(c),
                _ => app.nickname_input.push(c),
            };
        }
        KeyCode::Backspace => {
            match app.auth_field {
                0 => app.email_input.pop(),
                1 => app.password_input.pop(),
                _ => app.nickname_input.pop(),
            };
        }
        KeyCode::Enter => {
            if app.email_input.trim().is_empty()
                || app.password_input.is_empty()
                || app.nickname_input.trim().is_empty()
            {
                app.status = "All fields are required".to_string();
                return;
            }
            app.busy = true;
            app.status = "Creating account...".to_string();
            let email = app.email_input.trim().to_string();
            let password = app.password_input.clone();
            let nickname = app.nickname_input.trim().to_string();
            let tx = ui_tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(UiMsg::SignupDone(
                    session::signup(&email, &password, &nickname).await,
                ));
            });
        }
        _ => {}
    }
}

async fn handle_main_key(app: &mut App, key: KeyEvent, ui_tx: &Tx) {
    match key.code {
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::History => Focus::Chat,
                Focus::Chat => Focus::History,
            };
        }
        KeyCode::F(5) => refresh_history(app, ui_tx),
        KeyCode::F(6) => app.overlay = Some(Overlay::Compose {
            text: String::new(),
        }),
        KeyCode::F(7) => app.overlay = Some(Overlay::UploadPath {
            path: String::new(),
        }),
        KeyCode::F(8) => {
            if let Some(record_id) = app.selected_id {
                let reports_dir = PathBuf::from(&app.settings.reports_dir);
                app.status = "Downloading report...".to_string();
                let tx = ui_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(UiMsg::ReportSaved(
                        api::save_report_pdf(record_id, &reports_dir).await,
                    ));
                });
            } else {
                app.status = "Select a record first".to_string();
            }
        }
        KeyCode::F(9) => {
            if app.report.is_empty() {
                app.status = "Nothing to email yet".to_string();
            } else {
                let address = session::current().map(|s| s.email).unwrap_or_default();
                app.overlay = Some(Overlay::EmailTo { address });
            }
        }
        KeyCode::F(10) => {
            app.status = "Logging out...".to_string();
            let tx = ui_tx.clone();
            tokio::spawn(async move {
                let _ = session::logout().await;
                let _ = tx.send(UiMsg::LogoutDone);
            });
        }
        KeyCode::F(12) => app.overlay = Some(Overlay::ConfirmWithdraw),
        KeyCode::PageUp => app.report_scroll = app.report_scroll.saturating_sub(5),
        KeyCode::PageDown => app.report_scroll = app.report_scroll.saturating_add(5),
        _ => match app.focus {
            Focus::History => handle_history_key(app, key, ui_tx),
            Focus::Chat => handle_chat_key(app, key).await,
        },
    }
}

fn handle_history_key(app: &mut App, key: KeyEvent, ui_tx: &Tx) {
    match key.code {
        KeyCode::Up => {
            let i = app.history_state.selected().unwrap_or(0);
            if !app.history.is_empty() {
                app.history_state.select(Some(i.saturating_sub(1)));
            }
        }
        KeyCode::Down => {
            if !app.history.is_empty() {
                let i = app.history_state.selected().unwrap_or(0);
                app.history_state
                    .select(Some((i + 1).min(app.history.len() - 1)));
            }
        }
        KeyCode::Enter => select_highlighted_record(app, ui_tx),
        _ => {}
    }
}

async fn handle_chat_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char(c) => app.chat_input.push(c),
        KeyCode::Backspace => {
            app.chat_input.pop();
        }
        KeyCode::Enter => {
            let content = app.chat_input.trim().to_string();
            if content.is_empty() {
                return;
            }
            if app.selected_id.is_none() {
                // Send is disabled without a selection
                app.status = "Select a record before chatting".to_string();
                return;
            }
            match controller::send_chat_message(&content).await {
                Ok(()) => {
                    app.chat_input.clear();
                    app.chat_messages = controller::chat_messages().await;
                }
                Err(e) => app.status = e,
            }
        }
        _ => {}
    }
}

/// Handle a key while an overlay is open. Returns the overlay to keep open.
fn handle_overlay_key(
    app: &mut App,
    overlay: Overlay,
    key: KeyEvent,
    ui_tx: &Tx,
) -> Option<Overlay> {
    match overlay {
        Overlay::Compose { mut text } => match key.code {
            KeyCode::Esc => None,
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if text.trim().is_empty() {
                    app.status = "Nothing to analyse".to_string();
                    return Some(Overlay::Compose { text });
                }
                app.busy = true;
                app.status = "Analysing...".to_string();
                let tx = ui_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(UiMsg::AnalysisDone(api::resume_check(&text).await));
                });
                None
            }
            KeyCode::Enter => {
                text.push('\n');
                Some(Overlay::Compose { text })
            }
            KeyCode::Char(c) => {
                text.push(c);
                Some(Overlay::Compose { text })
            }
            KeyCode::Backspace => {
                text.pop();
                Some(Overlay::Compose { text })
            }
            _ => Some(Overlay::Compose { text }),
        },
        Overlay::UploadPath { mut path } => match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter => {
                let trimmed = path.trim().to_string();
                match std::fs::read(&trimmed) {
                    Ok(bytes) => {
                        let file_name = std::path::Path::new(&trimmed)
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| "resume.pdf".to_string());
                        app.busy = true;
                        app.status = "Uploading and analysing...".to_string();
                        let tx = ui_tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(UiMsg::AnalysisDone(
                                api::upload_resume(&file_name, bytes).await,
                            ));
                        });
                        None
                    }
                    Err(e) => {
                        app.status = format!("Cannot read '{}': {}", trimmed, e);
                        Some(Overlay::UploadPath { path })
                    }
                }
            }
            KeyCode::Char(c) => {
                path.push(c);
                Some(Overlay::UploadPath { path })
            }
            KeyCode::Backspace => {
                path.pop();
                Some(Overlay::UploadPath { path })
            }
            _ => Some(Overlay::UploadPath { path }),
        },
        Overlay::EmailTo { mut address } => match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter => {
                let to = address.trim().to_string();
                if to.is_empty() {
                    return Some(Overlay::EmailTo { address });
                }
                let content = app.report.clone();
                app.status = format!("Emailing report to {}...", to);
                let tx = ui_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(UiMsg::EmailSent(api::send_email(&to, &content).await));
                });
                None
            }
            KeyCode::Char(c) => {
                address.push(c);
                Some(Overlay::EmailTo { address })
            }
            KeyCode::Backspace => {
                address.pop();
                Some(Overlay::EmailTo { address })
            }
            _ => Some(Overlay::EmailTo { address }),
        },
        Overlay::ConfirmWithdraw => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                app.status = "Deleting account...".to_string();
                let tx = ui_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(UiMsg::WithdrawDone(session::withdraw().await));
                });
                None
            }
            _ => None,
        },
    }
}

fn handle_ui_msg(app: &mut App, msg: UiMsg, ui_tx: &Tx) {
    app.busy = false;
    match msg {
        UiMsg::LoginDone(Ok(auth)) => {
            app.status = format!("Welcome, {}", auth.nickname);
            app.view = View::Main;
            persist_remembered_login(app, &auth.email);
            if !app.remember {
                app.password_input.clear();
            }
            refresh_history(app, ui_tx);
        }
        UiMsg::LoginDone(Err(e)) => app.status = e,
        UiMsg::SignupDone(Ok(())) => {
            app.view = View::Login;
            app.auth_field = 0;
            app.status = "Account created - log in to continue".to_string();
        }
        UiMsg::SignupDone(Err(e)) => app.status = e,
        UiMsg::LogoutDone => {
            app.reset_main_state();
            app.view = View::Login;
            app.password_input.clear();
            app.status = "Logged out".to_string();
        }
        UiMsg::WithdrawDone(Ok(())) => {
            app.reset_main_state();
            app.view = View::Login;
            app.email_input.clear();
            app.password_input.clear();
            app.status = "Account deleted".to_string();
        }
        UiMsg::WithdrawDone(Err(e)) => app.status = e,
        UiMsg::HistoryLoaded(Ok(records)) => {
            match app.history_state.selected() {
                None if !records.is_empty() => app.history_state.select(Some(0)),
                Some(i) if i >= records.len() => {
                    app.history_state
                        .select(records.len().checked_sub(1));
                }
                _ => {}
            }
            app.history = records;
            if app.status.starts_with("Loading history") {
                app.status = format!("{} review(s) on record", app.history.len());
            }
        }
        UiMsg::HistoryLoaded(Err(e)) => app.status = e,
        UiMsg::AnalysisDone(Ok(content)) => {
            app.report = content;
            app.report_scroll = 0;
            app.status = "Analysis complete".to_string();
            refresh_history(app, ui_tx);
        }
        UiMsg::AnalysisDone(Err(e)) => app.status = e,
        UiMsg::Selected(Ok(())) => {}
        UiMsg::Selected(Err(e)) => app.status = e,
        UiMsg::ReportSaved(Ok(path)) => {
            app.status = format!("Report saved to {}", path.display());
        }
        UiMsg::ReportSaved(Err(e)) => app.status = e,
        UiMsg::EmailSent(Ok(())) => app.status = "Report emailed".to_string(),
        UiMsg::EmailSent(Err(e)) => app.status = e,
    }
}

fn persist_remembered_login(app: &mut App, email: &str) {
    if app.remember {
        app.settings.remember_email = Some(email.to_string());
        if let Err(e) = credentials::store_credential(email, "password", &app.password_input) {
            tlog!("[tui] Failed to store password in keyring: {}", e);
        }
    } else {
        app.settings.remember_email = None;
        let _ = credentials::delete_credential(email, "password");
    }
    if let Err(e) = settings::save_settings(&app.settings) {
        tlog!("[tui] Failed to save settings: {}", e);
    }
}

fn refresh_history(app: &mut App, ui_tx: &Tx) {
    app.status = "Loading history...".to_string();
    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(UiMsg::HistoryLoaded(api::history().await));
    });
}

/// Select the highlighted history record: show its stored report immediately
/// and rebind the chat channel to it.
fn select_highlighted_record(app: &mut App, ui_tx: &Tx) {
    let Some(index) = app.history_state.selected() else {
        return;
    };
    let Some(record) = app.history.get(index).cloned() else {
        return;
    };

    app.selected_id = Some(record.id);
    app.report = record.ai_response.clone();
    app.report_scroll = 0;
    app.chat_messages.clear();

    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let result = controller::select_record(Some(record.id)).await;
        let _ = tx.send(UiMsg::Selected(result));
    });
}

// ============================================================================
// Rendering
// ============================================================================

fn draw(frame: &mut Frame, app: &mut App) {
    match app.view {
        View::Login | View::Signup => draw_auth(frame, app),
        View::Main => draw_main(frame, app),
    }
    if app.overlay.is_some() {
        draw_overlay(frame, app);
    }
}

fn field_style(active: bool) -> Style {
    if active {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn draw_auth(frame: &mut Frame, app: &App) {
    let area = centered_rect(60, 50, frame.area());
    frame.render_widget(Clear, area);

    let signup = app.view == View::Signup;
    let title = if signup {
        " ResumeDesk - Sign Up "
    } else {
        " ResumeDesk - Log In "
    };

    let masked: String = "*".repeat(app.password_input.chars().count());
    let mut lines = vec![
        Line::from(""),
        Line::styled(
            format!("  Email:    {}", app.email_input),
            field_style(app.auth_field == 0),
        ),
        Line::styled(
            format!("  Password: {}", masked),
            field_style(app.auth_field == 1),
        ),
    ];
    if signup {
        lines.push(Line::styled(
            format!("  Nickname: {}", app.nickname_input),
            field_style(app.auth_field == 2),
        ));
    }
    lines.push(Line::from(""));
    if !signup {
        lines.push(Line::from(format!(
            "  [{}] remember password (Ctrl-R)",
            if app.remember { "x" } else { " " }
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(if signup {
        "  Enter: create account   Esc: back to login"
    } else {
        "  Enter: log in   F2: sign up   Ctrl-C: quit"
    }));
    if !app.status.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            format!("  {}", app.status),
            Style::default().fg(Color::Yellow),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Center);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_main(frame: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(1)])
        .split(frame.area());

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(28),
            Constraint::Percentage(40),
            Constraint::Percentage(32),
        ])
        .split(rows[0]);

    draw_history(frame, app, panes[0]);
    draw_report(frame, app, panes[1]);
    draw_chat(frame, app, panes[2]);
    draw_status_bar(frame, app, rows[1]);
}

fn draw_history(frame: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .history
        .iter()
        .map(|record| {
            let marker = if Some(record.id) == app.selected_id {
                "> "
            } else {
                "  "
            };
            let preview: String = record.user_resume.chars().take(28).collect();
            ListItem::new(vec![
                Line::styled(
                    format!("{}{}", marker, api::format_created_at(&record.created_at)),
                    Style::default().fg(Color::DarkGray),
                ),
                Line::from(format!("  {}", preview)),
            ])
        })
        .collect();

    let focused = app.focus == Focus::History;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" History ")
        .border_style(field_style(focused));

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(list, area, &mut app.history_state);
}

fn draw_report(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Report ");
    let text = if app.report.is_empty() {
        Text::styled(
            "\n  Submit a resume (F6 text, F7 PDF) or pick a past review.",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Text::from(app.report.as_str())
    };
    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.report_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn draw_chat(frame: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let focused = app.focus == Focus::Chat;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" AI Chat ")
        .border_style(field_style(focused));

    let inner_width = rows[0].width.saturating_sub(2).max(1) as usize;
    let inner_height = rows[0].height.saturating_sub(2) as usize;

    let mut lines: Vec<Line> = Vec::new();
    if app.chat_messages.is_empty() {
        lines.push(Line::styled(
            if app.selected_id.is_some() {
                "Ask anything about this report."
            } else {
                "Select a record to start chatting."
            },
            Style::default().fg(Color::DarkGray),
        ));
    }
    for message in &app.chat_messages {
        let (prefix, style) = match message.sender {
            Sender::User => ("You: ", Style::default().fg(Color::Green)),
            Sender::Ai => ("AI:  ", Style::default().fg(Color::Cyan)),
        };
        for (i, wrapped) in wrap_text(&message.content, inner_width.saturating_sub(5)).into_iter().enumerate()
        {
            if i == 0 {
                lines.push(Line::from(vec![
                    Span::styled(prefix, style.add_modifier(Modifier::BOLD)),
                    Span::raw(wrapped),
                ]));
            } else {
                lines.push(Line::from(format!("     {}", wrapped)));
            }
        }
    }

    // Follow the tail of the conversation
    let skip = lines.len().saturating_sub(inner_height);
    let visible: Vec<Line> = lines.into_iter().skip(skip).collect();
    frame.render_widget(Paragraph::new(visible).block(block), rows[0]);

    let input_title = if app.selected_id.is_some() {
        " Message (Enter to send) "
    } else {
        " Select a record first "
    };
    let input = Paragraph::new(app.chat_input.as_str())
        .block(Block::default().borders(Borders::ALL).title(input_title));
    frame.render_widget(input, rows[1]);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let hints =
        "Tab:focus  F5:refresh  F6:analyse  F7:upload  F8:save PDF  F9:email  F10:logout  F12:delete acct";
    let text = if app.status.is_empty() {
        hints.to_string()
    } else if app.busy {
        format!("{}  |  {}", app.status, "working...")
    } else {
        format!("{}  |  {}", app.status, hints)
    };
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn draw_overlay(frame: &mut Frame, app: &App) {
    let Some(overlay) = &app.overlay else {
        return;
    };
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);

    let (title, body, footer) = match overlay {
        Overlay::Compose { text } => (
            " Analyse resume text ",
            text.clone(),
            "Ctrl-S: submit   Esc: cancel",
        ),
        Overlay::UploadPath { path } => (
            " Upload a PDF resume ",
            format!("Path: {}", path),
            "Enter: upload   Esc: cancel",
        ),
        Overlay::EmailTo { address } => (
            " Email this report ",
            format!("To: {}", address),
            "Enter: send   Esc: cancel",
        ),
        Overlay::ConfirmWithdraw => (
            " Delete account ",
            "This permanently deletes your account and history.".to_string(),
            "y: confirm   any other key: cancel",
        ),
    };

    let mut text_widget = Text::from(body);
    text_widget.push_line(Line::from(""));
    text_widget.push_line(Line::styled(
        footer,
        Style::default().fg(Color::Yellow),
    ));

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Center);
    frame.render_widget(
        Paragraph::new(text_widget)
            .block(block)
            .wrap(Wrap { trim: false }),
        area,
    );
}

/// Centered sub-rectangle, sized as percentages of the parent.
fn centered_rect(percent_x: u16, percent_y: u16, parent: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(parent);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}

/// Greedy soft-wrap on spaces, falling back to hard breaks for long runs.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for raw_line in text.split('\n') {
        if raw_line.is_empty() {
            out.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in raw_line.split(' ') {
            let mut word = word;
            // Hard-break words longer than the full width
            while word.chars().count() > width {
                let head: String = word.chars().take(width).collect();
                let head_len = head.len();
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                out.push(head);
                word = &word[head_len..];
            }
            let needed = word.chars().count() + if current.is_empty() { 0 } else { 1 };
            if current.chars().count() + needed > width && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_splits_on_spaces() {
        assert_eq!(
            wrap_text("the quick brown fox", 10),
            vec!["the quick", "brown fox"]
        );
    }

    #[test]
    fn test_wrap_text_hard_breaks_long_words() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_wrap_text_keeps_blank_lines() {
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
    }

    #[test]
    fn test_centered_rect_is_inside_parent() {
        let parent = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(60, 50, parent);
        assert!(inner.x >= parent.x && inner.right() <= parent.right());
        assert!(inner.y >= parent.y && inner.bottom() <= parent.bottom());
    }
}
