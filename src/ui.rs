use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gazetteer_edit::{
    Aggregate, AggregateType, ChangeType, Choice, ConfirmVariant, ConfirmationRequest, ConfirmationService,
    EditController, ErrorEntry, FocusOutcome, MemoryClipboard, NavigationAction, NavigationOutcome,
    NotificationKind, RecordStore, RecordType, SubRecord,
};
use gazetteer_edit::records::{Descriptor, Lpi};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type Shared<S> = Arc<Mutex<EditController<S>>>;

/// What the screen shows; refreshed whenever the controller is not busy
#[derive(Debug, Default, Clone)]
struct View {
    label: Option<String>,
    focus: Option<RecordType>,
    changed: Vec<RecordType>,
    errors: Vec<(RecordType, ErrorEntry)>,
    notification: Option<(NotificationKind, String)>,
}

pub struct App<S: RecordStore + Send + 'static> {
    controller: Shared<S>,
    runtime: Handle,
    save_confirm: ConfirmationService,
    discard_confirm: ConfirmationService,
    navigation: Option<(NavigationAction, JoinHandle<NavigationOutcome>)>,
    focusing: Option<JoinHandle<FocusOutcome>>,
    clipboard: MemoryClipboard,
    view: View,
    pub list_kind: AggregateType,
    pub keys: Vec<i64>,
    pub list_state: TableState,
    pub error_state: TableState,
    pub cascade: bool,
    pub status: String,
    quit_requested: bool,
}

impl<S: RecordStore + Send + 'static> App<S> {
    pub fn new(controller: EditController<S>, runtime: Handle) -> Self {
        let save_confirm = controller.save_confirmation();
        let discard_confirm = controller.discard_confirmation();
        let mut app = App {
            controller: Arc::new(Mutex::new(controller)),
            runtime,
            save_confirm,
            discard_confirm,
            navigation: None,
            focusing: None,
            clipboard: MemoryClipboard::default(),
            view: View::default(),
            list_kind: AggregateType::Street,
            keys: Vec::new(),
            list_state: TableState::default(),
            error_state: TableState::default(),
            cascade: false,
            status: String::new(),
            quit_requested: false,
        };
        app.reload_keys();
        app
    }

    fn busy(&self) -> bool {
        self.navigation.is_some() || self.focusing.is_some()
    }

    /// The open dialog, if any
    fn request(&self) -> Option<ConfirmationRequest> {
        self.save_confirm
            .current_request()
            .or_else(|| self.discard_confirm.current_request())
    }

    fn service_for(&self, variant: ConfirmVariant) -> &ConfirmationService {
        match variant {
            ConfirmVariant::Save => &self.save_confirm,
            ConfirmVariant::Discard => &self.discard_confirm,
        }
    }

    pub fn reload_keys(&mut self) {
        let keys = match self.controller.try_lock() {
            Ok(controller) => controller.store().keys(self.list_kind),
            Err(_) => return,
        };
        match keys {
            Ok(keys) => {
                self.keys = keys;
                let selected = if self.keys.is_empty() { None } else { Some(0) };
                self.list_state.select(selected);
            }
            Err(e) => self.status = format!("Could not list records: {}", e),
        }
    }

    fn refresh_view(&mut self) {
        let controller = match self.controller.try_lock() {
            Ok(controller) => controller,
            Err(_) => return,
        };
        let session = controller.session();
        let errors = controller.errors();

        self.view = View {
            label: session.working_copy().map(|a| a.label()),
            focus: session.is_active().then(|| session.focus()),
            changed: session.changed_record_types(),
            errors: errors
                .record_types()
                .into_iter()
                .flat_map(|rt| errors.entries(rt).iter().cloned().map(move |e| (rt, e)))
                .collect(),
            notification: controller
                .notifications()
                .current(Utc::now())
                .map(|n| (n.kind, n.message.clone())),
        };
    }

    /// Collect results of finished background work
    fn poll_tasks(&mut self) {
        if self.navigation.as_ref().map_or(false, |(_, h)| h.is_finished()) {
            if let Some((action, handle)) = self.navigation.take() {
                match self.runtime.block_on(handle) {
                    Ok(outcome) => self.after_navigation(action, outcome),
                    Err(e) => self.status = format!("Navigation failed: {}", e),
                }
            }
        }

        if self.focusing.as_ref().map_or(false, |h| h.is_finished()) {
            if let Some(handle) = self.focusing.take() {
                self.status = match self.runtime.block_on(handle) {
                    Ok(FocusOutcome::Moved { focus, .. }) => format!("Moved to {}", focus.record_type.title()),
                    Ok(FocusOutcome::Cancelled) => "Stayed on the current record".to_string(),
                    Ok(FocusOutcome::Inactive) => "Nothing is open".to_string(),
                    Err(e) => format!("Focus failed: {}", e),
                };
            }
        }
    }

    fn after_navigation(&mut self, action: NavigationAction, outcome: NavigationOutcome) {
        self.status = match &outcome {
            NavigationOutcome::Proceed { discarded: true, .. } => "Changes discarded".to_string(),
            NavigationOutcome::Proceed { saved: true, .. } => "Changes saved".to_string(),
            NavigationOutcome::Proceed { .. } => format!("{:?}", action),
            NavigationOutcome::Blocked(reason) => format!("Blocked: {:?}", reason),
            NavigationOutcome::Cancelled => "Navigation cancelled".to_string(),
        };
        if !outcome.proceeded() {
            self.quit_requested = false;
        }
        self.reload_keys();
    }

    pub fn navigate(&mut self, action: NavigationAction) {
        if self.busy() {
            return;
        }
        let controller = Arc::clone(&self.controller);
        let task_action = action.clone();
        let handle = self.runtime.spawn(async move {
            let mut controller = controller.lock().await;
            controller.navigate(task_action).await
        });
        self.cascade = false;
        self.navigation = Some((action, handle));
    }

    fn open_selected(&mut self) {
        let key = match self.list_state.selected().and_then(|i| self.keys.get(i)) {
            Some(key) => *key,
            None => return,
        };
        let action = match self.list_kind {
            AggregateType::Street => NavigationAction::OpenStreet(key),
            AggregateType::Property => NavigationAction::OpenProperty(key),
        };
        self.navigate(action);
    }

    /// Jump to the record behind the selected error
    fn jump_to_error(&mut self) {
        if self.busy() {
            return;
        }
        let (record_type, entry) = match self.error_state.selected().and_then(|i| self.view.errors.get(i)) {
            Some(selected) => selected.clone(),
            None => return,
        };
        let controller = Arc::clone(&self.controller);
        self.focusing = Some(self.runtime.spawn(async move {
            let mut controller = controller.lock().await;
            let target = controller.errors().jump_target(record_type, &entry);
            controller.focus_record(target).await
        }));
    }

    /// Stand-in for a form edit: touch the first descriptor or LPI
    fn edit_first_record(&mut self, blank: bool) {
        let mut controller = match self.controller.try_lock() {
            Ok(controller) => controller,
            Err(_) => return,
        };
        let record = match controller.session().working_copy() {
            Some(Aggregate::Street(street)) => {
                let mut descriptor = street.descriptors.first().cloned().unwrap_or_else(|| {
                    let mut d = Descriptor::new(-1, street.usrn, "New Street", "ENG");
                    d.change_type = ChangeType::Insert;
                    d.town_ref = Some(1);
                    d
                });
                descriptor.description = if blank {
                    String::new()
                } else {
                    format!("{} Edited", descriptor.description.trim())
                };
                SubRecord::Descriptor(descriptor)
            }
            Some(Aggregate::Property(property)) => {
                let mut lpi = property.lpis.first().cloned().unwrap_or_else(|| {
                    let mut l = Lpi::new(-1, property.uprn, 1, "ENG");
                    l.change_type = ChangeType::Insert;
                    l
                });
                if blank {
                    lpi.pao_start_number = None;
                    lpi.pao_text = None;
                } else {
                    lpi.pao_start_number = Some(lpi.pao_start_number.unwrap_or(0) + 1);
                }
                SubRecord::Lpi(lpi)
            }
            None => {
                self.status = "Open a street or property first".to_string();
                return;
            }
        };
        controller.session_mut().edit_record(record);
        self.status = "Form edited".to_string();
    }

    fn save_now(&mut self) {
        let result = match self.controller.try_lock() {
            Ok(mut controller) => controller.save_now(false),
            Err(_) => return,
        };
        self.status = match result {
            Ok(saved) => format!("Saved {}", saved.label()),
            Err(reason) => format!("Not saved: {:?}", reason),
        };
        self.reload_keys();
    }

    fn validate(&mut self) {
        let report = match self.controller.try_lock() {
            Ok(mut controller) => controller.validate_current(),
            Err(_) => return,
        };
        self.status = match report {
            Some(report) if report.is_valid() => "No issues".to_string(),
            Some(report) => format!("{} issue(s)", report.error_count()),
            None => "Nothing is open".to_string(),
        };
    }

    fn copy_errors(&mut self) {
        let controller = match self.controller.try_lock() {
            Ok(controller) => controller,
            Err(_) => return,
        };
        let label = self.view.label.clone().unwrap_or_default();
        self.status = match controller.errors().copy_to(&mut self.clipboard, &label, Utc::now()) {
            Ok(()) => format!("Copied {} issue(s)", controller.errors().count()),
            Err(e) => format!("Copy failed: {}", e),
        };
    }

    fn respond(&mut self, choice: Option<Choice>) {
        let request = match self.request() {
            Some(request) => request,
            None => return,
        };
        let service = self.service_for(request.variant);
        match choice {
            Some(choice) => service.respond(choice),
            None => service.cancel(),
        };
        self.cascade = false;
    }

    fn next_row(state: &mut TableState, len: usize) {
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    fn previous_row(state: &mut TableState, len: usize) {
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }
}

pub fn run_ui<S: RecordStore + Send + 'static>(app: &mut App<S>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend, S: RecordStore + Send + 'static>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> io::Result<()> {
    loop {
        app.poll_tasks();
        if app.quit_requested && !app.busy() {
            return Ok(());
        }
        app.refresh_view();
        terminal.draw(|f| ui(f, app))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let key = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => key,
            _ => continue,
        };

        // Dialog keys take over while a confirmation is open
        if app.request().is_some() {
            match key.code {
                KeyCode::Char('s') => {
                    let cascade = app.cascade;
                    app.respond(Some(Choice::Save { cascade }));
                }
                KeyCode::Char('d') => app.respond(Some(Choice::Discard)),
                KeyCode::Char(' ') => app.cascade = !app.cascade,
                KeyCode::Esc => app.respond(None),
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') => {
                app.quit_requested = true;
                app.navigate(NavigationAction::Home);
            }
            KeyCode::Char('h') => app.navigate(NavigationAction::Home),
            KeyCode::Char('b') => app.navigate(NavigationAction::BackToList),
            KeyCode::Char('n') => app.navigate(NavigationAction::CreateStreet),
            KeyCode::Char('p') => app.navigate(NavigationAction::CreateProperty),
            KeyCode::Enter => app.open_selected(),
            KeyCode::Tab => {
                app.list_kind = match app.list_kind {
                    AggregateType::Street => AggregateType::Property,
                    AggregateType::Property => AggregateType::Street,
                };
                app.reload_keys();
            }
            KeyCode::Down | KeyCode::Char('j') => App::<S>::next_row(&mut app.list_state, app.keys.len()),
            KeyCode::Up | KeyCode::Char('k') => App::<S>::previous_row(&mut app.list_state, app.keys.len()),
            KeyCode::Char(']') => App::<S>::next_row(&mut app.error_state, app.view.errors.len()),
            KeyCode::Char('[') => App::<S>::previous_row(&mut app.error_state, app.view.errors.len()),
            KeyCode::Char('g') => app.jump_to_error(),
            KeyCode::Char('e') => app.edit_first_record(false),
            KeyCode::Char('x') => app.edit_first_record(true),
            KeyCode::Char('w') => app.save_now(),
            KeyCode::Char('v') => app.validate(),
            KeyCode::Char('c') => app.copy_errors(),
            _ => {}
        }
    }
}

fn ui<S: RecordStore + Send + 'static>(f: &mut Frame, app: &mut App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[1]);
    render_list(f, content[0], app);
    render_session(f, content[1], app);

    render_status_bar(f, chunks[2], app);

    if let Some(request) = app.request() {
        render_confirmation(f, &request, app.cascade);
    }
}

fn render_header<S: RecordStore + Send + 'static>(f: &mut Frame, area: Rect, app: &App<S>) {
    let mut spans = vec![Span::styled(
        "Gazetteer Editor",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::raw("  |  "));
    match &app.view.label {
        Some(label) => {
            spans.push(Span::styled(label.clone(), Style::default().fg(Color::White)));
            if !app.view.changed.is_empty() {
                spans.push(Span::styled(" (modified)", Style::default().fg(Color::Red)));
            }
        }
        None => spans.push(Span::styled("No record open", Style::default().fg(Color::DarkGray))),
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(header, area);
}

fn render_list<S: RecordStore + Send + 'static>(f: &mut Frame, area: Rect, app: &mut App<S>) {
    let (title, column) = match app.list_kind {
        AggregateType::Street => (" Streets ", "USRN"),
        AggregateType::Property => (" Properties ", "UPRN"),
    };
    let header = Row::new(vec![Cell::from(column)
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))])
    .style(Style::default().bg(Color::DarkGray));
    let rows = app.keys.iter().map(|key| Row::new(vec![Cell::from(key.to_string())]));

    let table = Table::new(rows, [Constraint::Min(10)])
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.list_state);
}

fn render_session<S: RecordStore + Send + 'static>(f: &mut Frame, area: Rect, app: &mut App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    let focus = app
        .view
        .focus
        .map(|rt| rt.title().to_string())
        .unwrap_or_else(|| "-".to_string());
    let changed = if app.view.changed.is_empty() {
        "none".to_string()
    } else {
        app.view
            .changed
            .iter()
            .map(|rt| rt.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let details = vec![
        Line::from(vec![Span::styled("Editing: ", Style::default().fg(Color::Cyan)), Span::raw(focus)]),
        Line::from(vec![Span::styled("Changed: ", Style::default().fg(Color::Cyan)), Span::raw(changed)]),
    ];
    let panel = Paragraph::new(details).block(Block::default().borders(Borders::ALL).title(" Record "));
    f.render_widget(panel, chunks[0]);

    let rows = app.view.errors.iter().map(|(rt, entry)| {
        Row::new(vec![
            Cell::from(rt.title()),
            Cell::from(entry.field.clone()),
            Cell::from(entry.errors.join("; ").replace('¬', ",")).style(Style::default().fg(Color::Red)),
        ])
    });
    let errors = Table::new(
        rows,
        [Constraint::Length(22), Constraint::Length(16), Constraint::Min(20)],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Issues ({}) ", app.view.errors.len())),
    )
    .highlight_style(Style::default().bg(Color::DarkGray))
    .highlight_symbol("→ ");

    f.render_stateful_widget(errors, chunks[1], &mut app.error_state);
}

fn render_status_bar<S: RecordStore + Send + 'static>(f: &mut Frame, area: Rect, app: &App<S>) {
    let mut spans = Vec::new();
    if let Some((kind, message)) = &app.view.notification {
        let color = if kind.is_error() { Color::Red } else { Color::Green };
        spans.push(Span::styled(format!(" {} ", message), Style::default().fg(color)));
        spans.push(Span::raw(" | "));
    } else if !app.status.is_empty() {
        spans.push(Span::styled(format!(" {} ", app.status), Style::default().fg(Color::Cyan)));
        spans.push(Span::raw(" | "));
    }

    for (key, label) in [
        ("Enter", " Open"),
        ("Tab", " List"),
        ("n/p", " New"),
        ("e/x", " Edit"),
        ("w", " Save"),
        ("v", " Check"),
        ("g", " Go to issue"),
        ("h", " Home"),
    ] {
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(label));
        spans.push(Span::raw(" | "));
    }
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(Block::default().borders(Borders::ALL));
    f.render_widget(status_bar, area);
}

fn render_confirmation(f: &mut Frame, request: &ConfirmationRequest, cascade: bool) {
    let area = centered(f.size(), 60, 9);
    let title = match request.variant {
        ConfirmVariant::Save => " Unsaved changes ",
        ConfirmVariant::Discard => " Keep changes? ",
    };
    let (save, discard) = match request.variant {
        ConfirmVariant::Save => ("s Save", "d Discard"),
        ConfirmVariant::Discard => ("s Keep", "d Discard"),
    };

    let mut lines = vec![Line::from(request.prompt.message(request.variant)), Line::from("")];
    if request.cascade_offered {
        let mark = if cascade { "[x]" } else { "[ ]" };
        lines.push(Line::from(format!("{} Apply address change to child properties (space)", mark)));
        lines.push(Line::from(""));
    }
    lines.push(Line::from(vec![
        Span::styled(save, Style::default().fg(Color::Green)),
        Span::raw("   "),
        Span::styled(discard, Style::default().fg(Color::Red)),
        Span::raw("   "),
        Span::styled("Esc Cancel", Style::default().fg(Color::DarkGray)),
    ]));

    let dialog = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(title),
    );
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
