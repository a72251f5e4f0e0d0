use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

use crate::config::Config;
use crate::error::Result;
use crate::extract::Extractor;
use crate::kanban_board::{BoardEvent, KanbanBoard, Reply, Stats, Transition};
use crate::sync::{Saved, Source, TaskSync};
use crate::task::{Assignee, Priority, Task, TaskStatus};

const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Add,
    Reply,
}

pub struct App {
    board: KanbanBoard,
    sync: TaskSync,
    extractor: Extractor,
    events: broadcast::Receiver<BoardEvent>,
    stats: Stats,
    poll_interval: Duration,
    selected_status: usize,
    selected_task: usize,
    mode: Mode,
    input: String,
    message: Option<String>,
    should_quit: bool,
}

impl App {
    pub async fn new(config: &Config, sync: TaskSync) -> Result<Self> {
        let (tasks, source) = sync.load().await?;
        let board = KanbanBoard::with_tasks(config.board_rules(), tasks);
        let events = board.subscribe();
        let stats = board.stats();
        Ok(Self {
            board,
            sync,
            extractor: config.extractor(),
            events,
            stats,
            poll_interval: config.poll_interval(),
            selected_status: 1,
            selected_task: 0,
            mode: Mode::Normal,
            input: String::new(),
            message: offline_notice(source),
            should_quit: false,
        })
    }

    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut last_reload = Instant::now();
        loop {
            self.drain_events();
            terminal.draw(|f| self.render(f))?;

            if event::poll(INPUT_POLL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code).await?;
                    }
                }
            }

            if self.should_quit {
                return Ok(());
            }

            // Other processes write the same slot; pick their changes up.
            if self.mode == Mode::Normal && last_reload.elapsed() >= self.poll_interval {
                self.reload().await;
                last_reload = Instant::now();
            }
        }
    }

    fn drain_events(&mut self) {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if changed {
            self.stats = self.board.stats();
        }
    }

    /// Keeps the current board when nothing can be read.
    async fn reload(&mut self) {
        let (tasks, source) = match self.sync.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Reload failed: {}", e);
                self.message = Some(format!("Reload failed: {e}"));
                return;
            }
        };
        if tasks != self.board.tasks() {
            self.board.replace_all(tasks);
        }
        if let Some(notice) = offline_notice(source) {
            self.message = Some(notice);
        }
    }

    async fn persist(&mut self) {
        match self.sync.save(self.board.tasks()).await {
            Ok(Saved::Everywhere) => {}
            Ok(Saved::MirrorOnly) => {
                self.message = Some("Saved locally only, remote unavailable".to_string());
            }
            Err(e) => self.message = Some(format!("Save failed: {e}")),
        }
    }

    fn column(&self) -> TaskStatus {
        TaskStatus::COLUMNS[self.selected_status]
    }

    fn selected_id(&self) -> Option<String> {
        let tasks = self.board.get_tasks_by_status(self.column());
        let idx = self.selected_task.min(tasks.len().checked_sub(1)?);
        tasks.get(idx).map(|t| t.id.clone())
    }

    async fn handle_key(&mut self, code: KeyCode) -> Result<()> {
        match self.mode {
            Mode::Normal => self.handle_normal_key(code).await,
            Mode::Add | Mode::Reply => {
                match code {
                    KeyCode::Esc => {
                        self.mode = Mode::Normal;
                        self.input.clear();
                    }
                    KeyCode::Backspace => {
                        self.input.pop();
                    }
                    KeyCode::Char(c) => self.input.push(c),
                    KeyCode::Enter => self.submit().await,
                    _ => {}
                }
                Ok(())
            }
        }
    }

    async fn handle_normal_key(&mut self, code: KeyCode) -> Result<()> {
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('a') => {
                self.mode = Mode::Add;
                self.message = None;
            }
            KeyCode::Char('r') => {
                self.mode = Mode::Reply;
                self.message = None;
            }
            KeyCode::Left => {
                if self.selected_status > 0 {
                    self.selected_status -= 1;
                    self.selected_task = 0;
                }
            }
            KeyCode::Right => {
                if self.selected_status < TaskStatus::COLUMNS.len() - 1 {
                    self.selected_status += 1;
                    self.selected_task = 0;
                }
            }
            KeyCode::Up => {
                self.selected_task = self.selected_task.saturating_sub(1);
            }
            KeyCode::Down => {
                let max_tasks = self.board.get_tasks_by_status(self.column()).len();
                if self.selected_task + 1 < max_tasks {
                    self.selected_task += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char('b') => {
                if let Some(id) = self.selected_id() {
                    let outcome = if code == KeyCode::Enter {
                        self.board.advance(&id)
                    } else {
                        self.board.retreat(&id)
                    };
                    match outcome {
                        Transition::Applied => self.persist().await,
                        Transition::Rejected => {
                            self.message = Some("That move is not allowed".to_string());
                        }
                        Transition::Unchanged | Transition::UnknownTask => {}
                    }
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.selected_id() {
                    if self.board.delete(&id) {
                        self.selected_task = self.selected_task.saturating_sub(1);
                        self.persist().await;
                    }
                }
            }
            KeyCode::Char('g') => self.reload().await,
            _ => {}
        }
        Ok(())
    }

    async fn submit(&mut self) {
        let input = std::mem::take(&mut self.input);
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        match mode {
            Mode::Add => {
                let draft = self.extractor.extract(&input, Local::now().date_naive());
                match self.board.create(draft) {
                    Ok(task) => {
                        self.message = Some(format!("Added \"{}\" to {}", task.text, task.status));
                        self.persist().await;
                    }
                    Err(e) => self.message = Some(e.to_string()),
                }
            }
            Mode::Reply => {
                let reply = self.board.apply_reply(&input);
                self.message = Some(match &reply {
                    Reply::Confirmed(_) => "Confirmed, moved to TODO".to_string(),
                    Reply::Cancelled(_) => "Cancelled and removed".to_string(),
                    Reply::NothingPending => "Nothing is waiting for confirmation".to_string(),
                    Reply::Ignored => "Reply with yes/go/proceed or cancel/stop/nevermind".to_string(),
                });
                if matches!(reply, Reply::Confirmed(_) | Reply::Cancelled(_)) {
                    self.persist().await;
                }
            }
            Mode::Normal => {}
        }
    }

    fn render(&self, f: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(f.area());

        let header = Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" Open {} ", self.stats.open()),
                Style::default().fg(Color::Yellow),
            ),
            Span::styled(
                format!(" Done {} ", self.stats.done),
                Style::default().fg(Color::Green),
            ),
            Span::styled(
                format!(" Awaiting confirmation {} ", self.stats.pending),
                Style::default().fg(Color::Magenta),
            ),
        ]))
        .block(Block::default().title("taskdash").borders(Borders::ALL));
        f.render_widget(header, rows[0]);

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Percentage(25); TaskStatus::COLUMNS.len()])
            .split(rows[1]);

        for (i, status) in TaskStatus::COLUMNS.iter().enumerate() {
            let tasks = self.board.get_tasks_by_status(*status);
            let items: Vec<ListItem> = tasks.iter().map(|t| task_item(t)).collect();

            let list = List::new(items)
                .block(
                    Block::default()
                        .title(format!("{} ({})", status.label(), tasks.len()))
                        .borders(Borders::ALL)
                        .border_style(if self.selected_status == i {
                            Style::default().fg(Color::Cyan)
                        } else {
                            Style::default()
                        }),
                )
                .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED));

            let mut state = ListState::default();
            if self.selected_status == i && !tasks.is_empty() {
                state.select(Some(self.selected_task.min(tasks.len() - 1)));
            }
            f.render_stateful_widget(list, chunks[i], &mut state);
        }

        let footer = match self.mode {
            Mode::Add => Paragraph::new(format!("> {}", self.input))
                .block(Block::default().title("New task").borders(Borders::ALL)),
            Mode::Reply => Paragraph::new(format!("> {}", self.input))
                .block(Block::default().title("Reply").borders(Borders::ALL)),
            Mode::Normal => Paragraph::new(self.message.clone().unwrap_or_else(|| {
                "a add  r reply  enter next  b back  d delete  g reload  q quit".to_string()
            }))
            .block(Block::default().borders(Borders::ALL)),
        };
        f.render_widget(footer, rows[2]);
    }
}

fn offline_notice(source: Source) -> Option<String> {
    match source {
        Source::Remote => None,
        Source::Mirror => Some("Offline: showing the local copy".to_string()),
    }
}

fn task_item(task: &Task) -> ListItem<'_> {
    let marker = match task.priority {
        Priority::High => Style::default().fg(Color::Red),
        Priority::Medium => Style::default().fg(Color::Yellow),
        Priority::Low => Style::default().fg(Color::DarkGray),
    };
    let mut spans = vec![
        Span::styled("● ", marker),
        Span::styled(task.text.as_str(), Style::default().fg(Color::White)),
    ];
    if let Some(due) = task.due_date {
        spans.push(Span::raw(format!(" (Due: {})", due)));
    }
    if task.assignee == Some(Assignee::Agent) {
        spans.push(Span::styled(" [agent]", Style::default().fg(Color::Magenta)));
    }
    ListItem::new(Line::from(spans))
}

pub async fn run(config: &Config, sync: TaskSync) -> Result<()> {
    let mut app = App::new(config, sync).await?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app.run(&mut terminal).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kv::{KvStore, MemoryKv};
    use crate::sync::{KvRemote, LocalMirror, Remote};
    use crate::task::Task;
    use async_trait::async_trait;
    use ratatui::backend::TestBackend;
    use std::path::Path;
    use std::sync::Arc;

    async fn app(dir: &Path) -> App {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let sync = TaskSync::new(
            Box::new(KvRemote::new(kv)),
            LocalMirror::new(dir.join("tasks.json")),
        );
        App::new(&Config::default(), sync).await.unwrap()
    }

    struct Offline;

    #[async_trait]
    impl Remote for Offline {
        async fn fetch(&self) -> Result<Vec<Task>> {
            Err(Error::NotConfigured("remote"))
        }

        async fn store(&self, _tasks: &[Task]) -> Result<()> {
            Err(Error::NotConfigured("remote"))
        }
    }

    async fn type_line(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyCode::Char(c)).await.unwrap();
        }
        app.handle_key(KeyCode::Enter).await.unwrap();
    }

    #[tokio::test]
    async fn adds_and_advances_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path()).await;

        app.handle_key(KeyCode::Char('a')).await.unwrap();
        type_line(&mut app, "quickly call the vendor").await;
        assert!(!app.should_quit);
        assert_eq!(app.board.get_tasks_by_status(TaskStatus::Todo).len(), 1);

        app.handle_key(KeyCode::Enter).await.unwrap();
        assert_eq!(app.board.get_tasks_by_status(TaskStatus::InProgress).len(), 1);
        assert_eq!(app.sync.mirror().read().await.unwrap(), app.board.tasks());

        app.handle_key(KeyCode::Right).await.unwrap();
        app.handle_key(KeyCode::Char('d')).await.unwrap();
        assert!(app.board.tasks().is_empty());
    }

    #[tokio::test]
    async fn reply_confirms_agent_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path()).await;

        app.handle_key(KeyCode::Char('a')).await.unwrap();
        type_line(&mut app, "jarvis book flights").await;
        assert_eq!(app.board.get_tasks_by_status(TaskStatus::Pending).len(), 1);

        app.handle_key(KeyCode::Char('r')).await.unwrap();
        type_line(&mut app, "yes").await;
        assert_eq!(app.board.get_tasks_by_status(TaskStatus::Todo).len(), 1);
        assert_eq!(app.message.as_deref(), Some("Confirmed, moved to TODO"));
    }

    #[tokio::test]
    async fn escape_discards_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path()).await;

        app.handle_key(KeyCode::Char('a')).await.unwrap();
        app.handle_key(KeyCode::Char('x')).await.unwrap();
        app.handle_key(KeyCode::Esc).await.unwrap();
        assert_eq!(app.mode, Mode::Normal);
        assert!(app.input.is_empty());
        assert!(app.board.tasks().is_empty());

        app.handle_key(KeyCode::Char('q')).await.unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn renders_columns_with_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path()).await;
        app.handle_key(KeyCode::Char('a')).await.unwrap();
        type_line(&mut app, "call the vendor").await;
        app.drain_events();

        let mut terminal = Terminal::new(TestBackend::new(120, 20)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("TODO (1)"));
        assert!(screen.contains("DOING (0)"));
        assert!(screen.contains("Open 1"));
        assert!(screen.contains("Call the vendor"));
    }

    #[tokio::test]
    async fn unreadable_reload_keeps_the_board_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path()).await;
        app.handle_key(KeyCode::Char('a')).await.unwrap();
        type_line(&mut app, "call the vendor").await;

        let mirror = dir.path().join("broken.json");
        std::fs::write(&mirror, "[{\"id\": \"half").unwrap();
        app.sync = TaskSync::new(Box::new(Offline), LocalMirror::new(mirror.clone()));

        app.handle_key(KeyCode::Char('g')).await.unwrap();
        assert!(!app.should_quit);
        assert_eq!(app.board.tasks().len(), 1);
        assert!(app
            .message
            .as_deref()
            .is_some_and(|m| m.starts_with("Reload failed")));
    }
}
