use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::database::TaskStore;
use crate::engine::TaskListEngine;
use crate::models::{Task, FILTER_ALL, SUGGESTED_LABELS};

#[derive(Debug, Clone, Copy, PartialEq)]
enum InputMode {
    Normal,
    Search,
    AddTask,
}

pub struct App {
    engine: Arc<TaskListEngine>,
    visible_rx: watch::Receiver<Vec<Task>>,
    all_rx: watch::Receiver<Vec<Task>>,
    pub visible: Vec<Task>,
    pub list_state: ListState,
    input_mode: InputMode,
    search_buffer: String,
    add_title: String,
    add_label_index: usize,
    add_priority: i64,
    // Single-level undo: replaced by a newer delete, taken by undo.
    recently_deleted: Option<Task>,
    status: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(engine: Arc<TaskListEngine>, store: Arc<TaskStore>) -> Self {
        let visible_rx = engine.observe_visible();
        let all_rx = store.observe_all();
        let visible = visible_rx.borrow().clone();

        App {
            engine,
            visible_rx,
            all_rx,
            visible,
            list_state: ListState::default(),
            input_mode: InputMode::Normal,
            search_buffer: String::new(),
            add_title: String::new(),
            add_label_index: 0,
            add_priority: 0,
            recently_deleted: None,
            status: None,
            should_quit: false,
        }
    }

    /// Pull the latest derived list out of the watch channel and keep the
    /// selection inside it.
    pub fn sync_visible(&mut self) {
        self.visible = self.visible_rx.borrow().clone();
        if self.visible.is_empty() {
            self.list_state.select(None);
        } else if let Some(i) = self.list_state.selected() {
            if i >= self.visible.len() {
                self.list_state.select(Some(self.visible.len() - 1));
            }
        }
    }

    pub fn next_item(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => {
                if i >= self.visible.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn previous_item(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => {
                if i == 0 {
                    self.visible.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn selected_task(&self) -> Option<Task> {
        self.list_state
            .selected()
            .and_then(|i| self.visible.get(i))
            .cloned()
    }

    fn cycle_filter(&mut self) {
        let options = filter_options(&self.all_rx.borrow());
        let current = self.engine.filter_label();
        let idx = options.iter().position(|l| *l == current).unwrap_or(0);
        let next = options[(idx + 1) % options.len()].clone();
        self.engine.set_filter(&next);
    }

    fn cycle_sort(&mut self) {
        let next = self.engine.sort_mode().next();
        self.engine.set_sort_mode(next);
    }

    fn toggle_selected(&mut self) {
        if let Some(task) = self.selected_task() {
            if let Err(e) = self.engine.toggle_completion(&task) {
                self.status = Some(format!("Error: {}", e));
            }
        }
    }

    fn delete_selected(&mut self) {
        if let Some(task) = self.selected_task() {
            match self.engine.delete(&task) {
                Ok(()) => {
                    self.status = Some(format!("Deleted '{}' (press u to undo)", task.title));
                    self.recently_deleted = Some(task);
                }
                Err(e) => {
                    self.status = Some(format!("Error: {}", e));
                }
            }
        }
    }

    fn undo_delete(&mut self) {
        match self.recently_deleted.take() {
            Some(task) => match self.engine.restore(&task) {
                Ok(()) => {
                    self.status = Some(format!("Restored '{}'", task.title));
                }
                Err(e) => {
                    self.status = Some(format!("Error: {}", e));
                }
            },
            None => {
                self.status = Some("Nothing to undo".to_string());
            }
        }
    }

    fn open_add_popup(&mut self) {
        self.input_mode = InputMode::AddTask;
        self.add_title.clear();
        self.add_label_index = 0;
        self.add_priority = 0;
    }

    fn submit_add(&mut self) {
        if self.add_title.trim().is_empty() {
            self.status = Some("Title must not be empty".to_string());
            return;
        }
        let label = SUGGESTED_LABELS[self.add_label_index];
        match self
            .engine
            .create(self.add_title.trim(), label, self.add_priority)
        {
            Ok(saved) => {
                self.status = Some(format!("Added '{}'", saved.title));
                self.input_mode = InputMode::Normal;
            }
            Err(e) => {
                self.status = Some(format!("Error: {}", e));
            }
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match self.input_mode {
            InputMode::Search => match code {
                KeyCode::Esc => {
                    self.search_buffer.clear();
                    self.engine.set_search_query("");
                    self.input_mode = InputMode::Normal;
                }
                KeyCode::Enter => {
                    self.input_mode = InputMode::Normal;
                }
                KeyCode::Backspace => {
                    self.search_buffer.pop();
                    self.engine.set_search_query(&self.search_buffer);
                }
                KeyCode::Char(c) => {
                    self.search_buffer.push(c);
                    self.engine.set_search_query(&self.search_buffer);
                }
                _ => {}
            },
            InputMode::AddTask => match code {
                KeyCode::Esc => {
                    self.input_mode = InputMode::Normal;
                }
                KeyCode::Enter => {
                    self.submit_add();
                }
                KeyCode::Tab => {
                    self.add_label_index = (self.add_label_index + 1) % SUGGESTED_LABELS.len();
                }
                KeyCode::Left => {
                    if self.add_priority > 0 {
                        self.add_priority -= 1;
                    }
                }
                KeyCode::Right => {
                    if self.add_priority < 2 {
                        self.add_priority += 1;
                    }
                }
                KeyCode::Backspace => {
                    self.add_title.pop();
                }
                KeyCode::Char(c) => {
                    self.add_title.push(c);
                }
                _ => {}
            },
            InputMode::Normal => match code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.next_item();
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    self.previous_item();
                }
                KeyCode::Char(' ') => {
                    self.toggle_selected();
                }
                KeyCode::Char('a') => {
                    self.open_add_popup();
                }
                KeyCode::Char('d') => {
                    self.delete_selected();
                }
                KeyCode::Char('u') => {
                    self.undo_delete();
                }
                KeyCode::Char('/') => {
                    self.input_mode = InputMode::Search;
                }
                KeyCode::Char('f') => {
                    self.cycle_filter();
                }
                KeyCode::Char('s') => {
                    self.cycle_sort();
                }
                _ => {}
            },
        }
    }
}

/// Filter cycle: the "All" sentinel, the suggested labels, then any label
/// present in the store that the suggestions don't cover.
fn filter_options(tasks: &[Task]) -> Vec<String> {
    let mut options: Vec<String> = Vec::with_capacity(SUGGESTED_LABELS.len() + 1);
    options.push(FILTER_ALL.to_string());
    for label in SUGGESTED_LABELS {
        options.push((*label).to_string());
    }
    for task in tasks {
        if !options.iter().any(|l| *l == task.label) {
            options.push(task.label.clone());
        }
    }
    options
}

pub fn run_tui(engine: Arc<TaskListEngine>, store: Arc<TaskStore>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(engine, store);
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        app.sync_visible();
        terminal.draw(|f| ui(f, app))?;

        // Poll with a timeout so writes from other processes (forwarded by
        // the store follower) show up without a keypress.
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_task_list(f, app, chunks[1]);
    render_footer(f, app, chunks[2]);

    if app.input_mode == InputMode::AddTask {
        render_add_popup(f, app);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let filter = app.engine.filter_label();
    let sort = app.engine.sort_mode().label();
    let search = if app.search_buffer.is_empty() {
        "-".to_string()
    } else {
        format!("'{}'", app.search_buffer)
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled("Filter: ", Style::default().fg(Color::DarkGray)),
        Span::styled(filter, Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled("Sort: ", Style::default().fg(Color::DarkGray)),
        Span::styled(sort, Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled("Search: ", Style::default().fg(Color::DarkGray)),
        Span::styled(search, Style::default().fg(Color::Cyan)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Taskpad"));

    f.render_widget(header, area);
}

fn render_task_list(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .visible
        .iter()
        .map(|task| {
            let checkbox = if task.is_done { "[x] " } else { "[ ] " };
            let title_style = if task.is_done {
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::CROSSED_OUT)
            } else {
                Style::default().fg(Color::White)
            };

            ListItem::new(vec![Line::from(vec![
                Span::styled(checkbox, Style::default().fg(Color::White)),
                Span::styled(format!("{} ", task.title), title_style),
                Span::styled(
                    format!("[{}] ", task.label),
                    Style::default().fg(label_color(&task.label)),
                ),
                Span::styled(
                    format!("[{}] ", task.priority_text()),
                    Style::default().fg(priority_color(task.priority)),
                ),
                Span::styled(
                    task.created_at_text(),
                    Style::default().fg(Color::DarkGray),
                ),
            ])])
        })
        .collect();

    let count_title = format!("Tasks ({})", app.visible.len());
    let task_list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(count_title))
        .highlight_style(
            Style::default()
                .bg(Color::LightGreen)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(task_list, area, &mut app.list_state);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let text = match app.input_mode {
        InputMode::Search => format!("Search: {}_  (Enter: keep, Esc: clear)", app.search_buffer),
        _ => match &app.status {
            Some(status) => status.clone(),
            None => {
                "a: add | space: toggle | d: delete | u: undo | /: search | f: filter | s: sort | q: quit"
                    .to_string()
            }
        },
    };

    let footer = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::White));

    f.render_widget(footer, area);
}

fn render_add_popup(f: &mut Frame, app: &App) {
    let popup_area = centered_rect(60, 30, f.area());
    let block = Block::default()
        .title("Add Task")
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::DarkGray));

    let label = SUGGESTED_LABELS[app.add_label_index];
    let priority = match app.add_priority {
        2 => "High",
        1 => "Medium",
        _ => "Low",
    };
    let content = Paragraph::new(format!(
        "Title: {}_\n\nLabel (Tab to cycle): {}\nPriority (←/→): {}\n\nPress ENTER to save\nPress ESC to cancel",
        app.add_title, label, priority
    ))
    .block(block)
    .alignment(ratatui::layout::Alignment::Center)
    .style(Style::default().fg(Color::White));

    f.render_widget(content, popup_area);
}

// Same color every time for a given category label.
fn label_color(label: &str) -> Color {
    match label {
        "Personal" => Color::Magenta,
        "Work" => Color::Blue,
        "Study" => Color::Cyan,
        "Groceries" => Color::Green,
        "Health" => Color::Red,
        _ => Color::White,
    }
}

fn priority_color(priority: i64) -> Color {
    match priority {
        2 => Color::Red,
        1 => Color::Yellow,
        _ => Color::Green,
    }
}

// Helper function to create centered rectangles for popups
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
