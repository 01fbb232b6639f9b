use std::io::{self, Stdout};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::Runtime;
use userdesk_core::controller::{
    prompt_for, ActionOutcome, NamePrompt, Notification, Severity, UserAction, UserController,
};
use userdesk_core::gateway::StoreBackend;
use userdesk_core::view_model::UserListView;

const APP_TITLE: &str = "User Viewer";
const ID_COLUMN_WIDTH: u16 = 8;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Browse,
    Prompt,
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    Invoke(UserAction),
    Navigate(DirectionKey),
    ClearSelection,
    Type(char),
    Backspace,
    Confirm,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PromptState {
    prompt: NamePrompt,
    input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    Prompt(PromptState),
    Notice(Notification),
}

struct TuiApp<'rt, B: StoreBackend> {
    controller: UserController<B>,
    runtime: &'rt Runtime,
    view: UserListView,
    modal: Option<Modal>,
    show_help: bool,
    should_quit: bool,
    status_line: String,
}

impl<'rt, B: StoreBackend> TuiApp<'rt, B> {
    fn new(controller: UserController<B>, runtime: &'rt Runtime) -> Self {
        Self {
            controller,
            runtime,
            view: UserListView::new(),
            modal: None,
            show_help: false,
            should_quit: false,
            status_line: "a: add  d: delete  e: edit  r: refresh".to_string(),
        }
    }

    fn input_mode(&self) -> InputMode {
        match self.modal {
            None => InputMode::Browse,
            Some(Modal::Prompt(_)) => InputMode::Prompt,
            Some(Modal::Notice(_)) => InputMode::Notice,
        }
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::Invoke(action) => self.invoke(action),
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::ClearSelection => {
                self.view.clear_selection();
                self.status_line = "Selection cleared".to_string();
            }
            Msg::Type(ch) => {
                if let Some(Modal::Prompt(state)) = &mut self.modal {
                    state.input.push(ch);
                }
            }
            Msg::Backspace => {
                if let Some(Modal::Prompt(state)) = &mut self.modal {
                    state.input.pop();
                }
            }
            Msg::Confirm => match self.modal.take() {
                Some(Modal::Prompt(state)) => self.submit_prompt(&state.prompt, Some(&state.input)),
                Some(Modal::Notice(_)) | None => {}
            },
            Msg::Dismiss => match self.modal.take() {
                Some(Modal::Prompt(state)) => self.submit_prompt(&state.prompt, None),
                Some(Modal::Notice(_)) | None => {}
            },
        }
    }

    fn invoke(&mut self, action: UserAction) {
        match prompt_for(action, &self.view) {
            Err(notice) => self.modal = Some(Modal::Notice(notice)),
            Ok(Some(prompt)) => {
                let input = prompt.initial_value.clone();
                self.modal = Some(Modal::Prompt(PromptState { prompt, input }));
            }
            Ok(None) => {
                let outcome = match action {
                    UserAction::Delete => self.runtime.block_on(self.controller.delete(&mut self.view)),
                    UserAction::Refresh => {
                        self.runtime.block_on(self.controller.refresh(&mut self.view))
                    }
                    UserAction::Add | UserAction::Edit => ActionOutcome::Skipped,
                };
                self.apply_outcome(action, outcome);
            }
        }
    }

    fn submit_prompt(&mut self, prompt: &NamePrompt, input: Option<&str>) {
        let outcome = match prompt.action {
            UserAction::Add => self
                .runtime
                .block_on(self.controller.add(&mut self.view, input)),
            UserAction::Edit => self
                .runtime
                .block_on(self.controller.edit(&mut self.view, input)),
            UserAction::Delete | UserAction::Refresh => ActionOutcome::Skipped,
        };
        self.apply_outcome(prompt.action, outcome);
    }

    fn apply_outcome(&mut self, action: UserAction, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Completed => {
                self.status_line = format!("{}: done ({} users)", action.title(), self.view.len());
            }
            ActionOutcome::Skipped => {
                self.status_line = format!("{}: nothing changed", action.title());
            }
            ActionOutcome::Notify(notice) => {
                tracing::debug!(title = %notice.title, "showing notification");
                self.status_line = notice.title.clone();
                self.modal = Some(Modal::Notice(notice));
            }
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        if self.view.is_empty() {
            self.status_line = "No users loaded".to_string();
            return;
        }

        match direction {
            DirectionKey::Up => self.view.select_previous(),
            DirectionKey::Down => self.view.select_next(),
        }

        if let Some(selected) = self.view.selected() {
            self.status_line = format!("Selected user #{} `{}`", selected.id, selected.name);
        }
    }
}

/// Runs the terminal shell until the user quits. Store calls block the
/// event loop on `runtime`, so actions never overlap.
pub fn run<B: StoreBackend>(
    controller: UserController<B>,
    runtime: &Runtime,
) -> Result<(), TuiError> {
    let mut app = TuiApp::new(controller, runtime);
    app.invoke(UserAction::Refresh);

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B: StoreBackend>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut TuiApp<'_, B>,
) -> Result<(), TuiError> {
    loop {
        terminal.draw(|frame| render(frame, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                if let Some(message) = map_key_event(key, app.input_mode()) {
                    app.handle(message);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn render<B: StoreBackend>(frame: &mut Frame<'_>, app: &TuiApp<'_, B>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let config = app.controller.repository().gateway().config();
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " User List ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!(
            "Store: {}@{}:{}/{}",
            config.user, config.host, config.port, config.database
        )),
        Span::raw(" | "),
        Span::raw(format!("Rows: {}", app.view.len())),
    ]))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title(APP_TITLE));
    frame.render_widget(header, chunks[0]);

    let rows = app.view.rows().iter().map(|record| {
        Row::new(vec![
            Cell::from(record.id.to_string()),
            Cell::from(record.name.as_str()),
        ])
    });
    let table = Table::new(
        rows,
        [Constraint::Length(ID_COLUMN_WIDTH), Constraint::Min(10)],
    )
    .header(
        Row::new(vec!["ID", "Name"]).style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .highlight_symbol("> ")
    .block(Block::default().borders(Borders::ALL).title("Users"));
    let mut table_state = TableState::default().with_selected(app.view.selected_index());
    frame.render_stateful_widget(table, chunks[1], &mut table_state);

    let footer_line = UserAction::ALL
        .iter()
        .map(|action| format!("{}:{}", action_key(*action), action.title()))
        .collect::<Vec<_>>()
        .join(" | ");
    let footer = Paragraph::new(vec![
        Line::from(format!("{footer_line} | ?:help | q:quit")),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Actions"));
    frame.render_widget(footer, chunks[2]);

    match &app.modal {
        Some(Modal::Prompt(state)) => render_prompt(frame, state),
        Some(Modal::Notice(notice)) => render_notice(frame, notice),
        None => {}
    }

    if app.show_help {
        render_help_popup(frame);
    }
}

fn render_prompt(frame: &mut Frame<'_>, state: &PromptState) {
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);
    let prompt = Paragraph::new(vec![
        Line::from(state.prompt.label.as_str()),
        Line::from(""),
        Line::from(Span::styled(
            format!("{}_", state.input),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(""),
        Line::from("Enter: OK | Esc: Cancel"),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(state.prompt.title.as_str()),
    );
    frame.render_widget(prompt, area);
}

fn render_notice(frame: &mut Frame<'_>, notice: &Notification) {
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);
    let color = match notice.severity {
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    };
    let body = Paragraph::new(vec![
        Line::from(notice.message.as_str()),
        Line::from(""),
        Line::from("Enter / Esc: close"),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(notice.title.as_str()),
    );
    frame.render_widget(body, area);
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Keymap"),
        Line::from("a: add user"),
        Line::from("d: delete selected user"),
        Line::from("e: edit selected user"),
        Line::from("r: refresh list"),
        Line::from("Arrows or jk: move selection"),
        Line::from("Esc: clear selection"),
        Line::from("?: toggle help"),
        Line::from("q: quit"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn action_key(action: UserAction) -> char {
    match action {
        UserAction::Add => 'a',
        UserAction::Delete => 'd',
        UserAction::Edit => 'e',
        UserAction::Refresh => 'r',
    }
}

fn map_key_event(key: KeyEvent, mode: InputMode) -> Option<Msg> {
    match mode {
        InputMode::Prompt => match (key.modifiers, key.code) {
            (_, KeyCode::Enter) => Some(Msg::Confirm),
            (_, KeyCode::Esc) => Some(Msg::Dismiss),
            (_, KeyCode::Backspace) => Some(Msg::Backspace),
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(Msg::Dismiss),
            (_, KeyCode::Char(ch)) => Some(Msg::Type(ch)),
            _ => None,
        },
        InputMode::Notice => match key.code {
            KeyCode::Enter | KeyCode::Esc => Some(Msg::Dismiss),
            _ => None,
        },
        InputMode::Browse => match (key.modifiers, key.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                Some(Msg::Quit)
            }
            (_, KeyCode::Char('?')) => Some(Msg::ToggleHelp),
            (_, KeyCode::Char('a')) => Some(Msg::Invoke(UserAction::Add)),
            (_, KeyCode::Char('d') | KeyCode::Delete) => Some(Msg::Invoke(UserAction::Delete)),
            (_, KeyCode::Char('e') | KeyCode::Enter) => Some(Msg::Invoke(UserAction::Edit)),
            (_, KeyCode::Char('r') | KeyCode::F(5)) => Some(Msg::Invoke(UserAction::Refresh)),
            (_, KeyCode::Up | KeyCode::Char('k')) => Some(Msg::Navigate(DirectionKey::Up)),
            (_, KeyCode::Down | KeyCode::Char('j')) => Some(Msg::Navigate(DirectionKey::Down)),
            (_, KeyCode::Esc) => Some(Msg::ClearSelection),
            _ => None,
        },
    }
}
