use std::mem;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use crossterm::event::KeyCode;
use log::info;
use open::that as open_link;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use rusqlite::Connection;

use super::helpers::{centered_rect, offset_index, surface_error};
use super::screens::{LibraryPane, ProjectionPane};
use crate::db::DbSongSource;
use crate::models::{ScreenDescriptor, SelectedSong, SessionCursor};
use crate::projection::sequence::preview;
use crate::projection::{LoadPath, NavCommand, ProjectionController, SessionEvent};
use crate::selection::Selection;

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows moved by PageUp/PageDown in the library.
const PAGE: isize = 10;

/// Pane receiving keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Library,
    Selection,
    Projection,
}

enum Mode {
    Normal,
    Filtering { query: String },
    ChoosingScreen { selected: usize },
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central state of the controller TUI.
pub struct App {
    conn: Connection,
    notes_dir: Option<PathBuf>,
    library: LibraryPane,
    selection: Selection,
    selection_cursor: usize,
    /// Enumerated once at start-up.
    screens: Vec<ScreenDescriptor>,
    screen_index: usize,
    projection: ProjectionController,
    projection_pane: ProjectionPane,
    focus: Focus,
    mode: Mode,
    status: Option<StatusMessage>,
}

impl App {
    pub fn new(
        conn: Connection,
        projection: ProjectionController,
        screens: Vec<ScreenDescriptor>,
        notes_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let library = LibraryPane::load(&conn, "")?;
        // Prefer a secondary screen: the primary one usually shows this TUI.
        let screen_index = screens.iter().position(|screen| !screen.is_primary).unwrap_or(0);
        Ok(Self {
            conn,
            notes_dir,
            library,
            selection: Selection::new(),
            selection_cursor: 0,
            screens,
            screen_index,
            projection,
            projection_pane: ProjectionPane::default(),
            focus: Focus::Library,
            mode: Mode::Normal,
            status: None,
        })
    }

    /// Drive the projection session: state reports and the liveness poll.
    pub fn tick(&mut self, now: Instant) {
        match self.projection.tick(now) {
            Some(SessionEvent::CursorReported(cursor)) => {
                self.projection_pane.follow(cursor, self.projection.songs());
            }
            Some(SessionEvent::SurfaceClosed) => {
                self.leave_projection_focus();
                match self.projection.error().map(str::to_string) {
                    Some(text) => self.set_status(text, StatusKind::Error),
                    None => self.set_status("Projection window closed.", StatusKind::Info),
                }
            }
            None => {}
        }
    }

    /// Close any open projection before the controller exits.
    pub fn shutdown(&mut self) {
        self.projection.close();
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mode = mem::replace(&mut self.mode, Mode::Normal);

        self.mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::Filtering { query } => self.handle_filter(code, query),
            Mode::ChoosingScreen { selected } => self.handle_choose_screen(code, selected),
        };
        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Char('q') => {
                *exit = true;
                return Ok(Mode::Normal);
            }
            KeyCode::Tab => {
                self.cycle_focus();
                return Ok(Mode::Normal);
            }
            KeyCode::Char('p') | KeyCode::Char('P') => return Ok(self.request_projection()),
            KeyCode::Char('x') | KeyCode::Char('X') => {
                if self.projection.is_open() {
                    self.projection.close();
                    self.leave_projection_focus();
                    self.set_status("Projection closed.", StatusKind::Info);
                }
                return Ok(Mode::Normal);
            }
            _ => {}
        }

        match self.focus {
            Focus::Library => match code {
                KeyCode::Up => self.library.move_selection(-1),
                KeyCode::Down => self.library.move_selection(1),
                KeyCode::PageUp => self.library.move_selection(-PAGE),
                KeyCode::PageDown => self.library.move_selection(PAGE),
                KeyCode::Home => self.library.selected = 0,
                KeyCode::End => self.library.move_selection(isize::MAX / 2),
                KeyCode::Enter | KeyCode::Char(' ') => self.toggle_current_song(),
                KeyCode::Char('f') | KeyCode::Char('/') => {
                    self.clear_status();
                    return Ok(Mode::Filtering {
                        query: self.library.filter.clone(),
                    });
                }
                KeyCode::Char('o') => {
                    if let Some(song) = self.library.current_song() {
                        let selected = song.to_selected();
                        self.open_notes(&selected);
                    }
                }
                KeyCode::Esc if !self.library.filter.is_empty() => {
                    self.library.filter.clear();
                    self.reload_library();
                }
                _ => {}
            },
            Focus::Selection => match code {
                KeyCode::Up => {
                    self.selection_cursor = offset_index(self.selection_cursor, -1, self.selection.len())
                }
                KeyCode::Down => {
                    self.selection_cursor = offset_index(self.selection_cursor, 1, self.selection.len())
                }
                KeyCode::Char('d') | KeyCode::Delete | KeyCode::Backspace => {
                    if let Some(id) = self.selection.get(self.selection_cursor).map(|song| song.id) {
                        if let Some(song) = self.selection.remove(id) {
                            self.set_status(format!("Removed {song}."), StatusKind::Info);
                        }
                        self.selection_cursor = offset_index(self.selection_cursor, 0, self.selection.len());
                    }
                }
                KeyCode::Char('c') => {
                    self.selection.clear();
                    self.selection_cursor = 0;
                    self.set_status("Selection cleared.", StatusKind::Info);
                }
                KeyCode::Char('o') => {
                    if let Some(song) = self.selection.get(self.selection_cursor).cloned() {
                        self.open_notes(&song);
                    }
                }
                _ => {}
            },
            Focus::Projection => self.handle_projection_key(code),
        }
        Ok(Mode::Normal)
    }

    fn handle_projection_key(&mut self, code: KeyCode) {
        let command = match code {
            KeyCode::Right => Some(NavCommand::NextVerse),
            KeyCode::Left => Some(NavCommand::PrevVerse),
            KeyCode::PageDown => Some(NavCommand::NextSong),
            KeyCode::PageUp => Some(NavCommand::PrevSong),
            _ => None,
        };
        if let Some(command) = command {
            if self.projection.navigate(command) {
                self.projection_pane
                    .follow(self.projection.cursor(), self.projection.songs());
            }
            return;
        }

        match code {
            KeyCode::Up => self.projection_pane.move_browse(-1, self.projection.songs()),
            KeyCode::Down => self.projection_pane.move_browse(1, self.projection.songs()),
            KeyCode::Enter => {
                if let Some(target) = self.projection_pane.browsed(self.projection.songs()) {
                    self.projection.jump(target);
                }
            }
            KeyCode::Esc => self.focus = Focus::Library,
            _ => {}
        }
    }

    fn handle_filter(&mut self, code: KeyCode, mut query: String) -> Mode {
        match code {
            KeyCode::Esc => {
                self.library.filter.clear();
                self.reload_library();
                return Mode::Normal;
            }
            KeyCode::Enter => return Mode::Normal,
            KeyCode::Backspace => {
                query.pop();
            }
            KeyCode::Char(ch) => query.push(ch),
            _ => return Mode::Filtering { query },
        }
        self.library.filter = query.clone();
        self.reload_library();
        Mode::Filtering { query }
    }

    fn handle_choose_screen(&mut self, code: KeyCode, selected: usize) -> Mode {
        match code {
            KeyCode::Up => Mode::ChoosingScreen {
                selected: offset_index(selected, -1, self.screens.len()),
            },
            KeyCode::Down => Mode::ChoosingScreen {
                selected: offset_index(selected, 1, self.screens.len()),
            },
            KeyCode::Enter => {
                self.screen_index = selected;
                self.start_projection();
                Mode::Normal
            }
            KeyCode::Esc => Mode::Normal,
            _ => Mode::ChoosingScreen { selected },
        }
    }

    /// Ask for a screen when there is a choice, otherwise project right away.
    fn request_projection(&mut self) -> Mode {
        if self.projection.is_open() {
            // Let the controller produce its own rejection message.
            self.start_projection();
            return Mode::Normal;
        }
        if self.screens.len() > 1 && !self.selection.is_empty() {
            return Mode::ChoosingScreen {
                selected: self.screen_index,
            };
        }
        self.start_projection();
        Mode::Normal
    }

    fn start_projection(&mut self) {
        let Some(screen) = self.screens.get(self.screen_index).cloned() else {
            self.set_status("No screen available for projection.", StatusKind::Error);
            return;
        };

        let mut source = DbSongSource::new(&self.conn);
        let result = self.projection.request_projection(
            self.selection.as_slice(),
            &screen,
            &mut source,
            Instant::now(),
        );
        match result {
            Ok(()) if self.projection.is_open() => {
                self.projection_pane = ProjectionPane::default();
                self.focus = Focus::Projection;
                let degraded = self.projection.degraded();
                let mut text = if degraded.is_empty() {
                    format!("Projecting {} song(s) on {}.", self.selection.len(), screen.label)
                } else {
                    format!("Projecting; no lyrics for {}.", degraded.join(", "))
                };
                if self.projection.load_path() == Some(LoadPath::Direct) {
                    text.push_str(" Document written directly.");
                }
                self.set_status(text, StatusKind::Info);
            }
            Ok(()) => self.set_status("Projection window closed before it was ready.", StatusKind::Info),
            Err(err) => {
                let text = self
                    .projection
                    .error()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.user_message());
                self.set_status(text, StatusKind::Error);
            }
        }
    }

    fn toggle_current_song(&mut self) {
        let Some(song) = self.library.current_song() else {
            self.set_status("No song selected.", StatusKind::Error);
            return;
        };
        let selected = song.to_selected();
        if self.selection.remove(selected.id).is_some() {
            self.selection_cursor = offset_index(self.selection_cursor, 0, self.selection.len());
            self.set_status(format!("Removed {selected}."), StatusKind::Info);
        } else {
            self.set_status(format!("Added {selected}."), StatusKind::Info);
            self.selection.add(selected);
        }
    }

    fn open_notes(&mut self, song: &SelectedSong) {
        let Some(filename) = song.filename.as_deref().filter(|_| song.has_notes) else {
            self.set_status("This song does not have notes.", StatusKind::Error);
            return;
        };
        let path = match &self.notes_dir {
            Some(dir) => dir.join(filename),
            None => PathBuf::from(filename),
        };
        info!("opening notes {}", path.display());
        match open_link(&path) {
            Ok(()) => self.set_status(format!("Opened notes for {song}."), StatusKind::Info),
            Err(err) => self.set_status(format!("Failed to open notes: {err}"), StatusKind::Error),
        }
    }

    fn reload_library(&mut self) {
        if let Err(err) = self.library.reload(&self.conn) {
            self.set_status(surface_error(&err), StatusKind::Error);
        }
    }

    fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Library => Focus::Selection,
            Focus::Selection if self.projection.is_open() => Focus::Projection,
            Focus::Selection | Focus::Projection => Focus::Library,
        };
    }

    fn leave_projection_focus(&mut self) {
        if self.focus == Focus::Projection {
            self.focus = Focus::Library;
        }
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
        self.projection.clear_error();
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let footer_height = FOOTER_HEIGHT.min(area.height);

        let (content_area, footer_area) = if area.height > footer_height {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(footer_height)])
                .split(area);
            (chunks[0], chunks[1])
        } else {
            (area, area)
        };

        let constraints = if self.projection.is_open() {
            vec![Constraint::Percentage(30), Constraint::Percentage(25), Constraint::Percentage(45)]
        } else {
            vec![Constraint::Percentage(55), Constraint::Percentage(45)]
        };
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(content_area);

        self.draw_library(frame, columns[0]);
        self.draw_selection(frame, columns[1]);
        if let Some(area) = columns.get(2) {
            self.draw_projection(frame, *area);
        }

        if area.height >= footer_height {
            self.draw_footer(frame, footer_area);
        }

        match &self.mode {
            Mode::Filtering { query } => self.draw_filter_bar(frame, content_area, query),
            Mode::ChoosingScreen { selected } => self.draw_screen_picker(frame, area, *selected),
            Mode::Normal => {}
        }
    }

    fn pane_block(&self, title: String, focus: Focus) -> Block<'static> {
        let style = if self.focus == focus {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        Block::default().borders(Borders::ALL).border_style(style).title(title)
    }

    fn draw_library(&self, frame: &mut Frame, area: Rect) {
        let title = if self.library.filter.is_empty() {
            "Library".to_string()
        } else {
            format!("Library [{}]", self.library.filter)
        };
        let items: Vec<ListItem> = self
            .library
            .songs
            .iter()
            .map(|song| {
                let marker = if self.selection.contains(song.id) { "+ " } else { "  " };
                let notes = if song.notes_file.is_some() { " \u{266a}" } else { "" };
                ListItem::new(format!("{marker}{:>4}  {}{notes}", song.entry, song.title))
            })
            .collect();

        let mut state = ListState::default();
        if !self.library.songs.is_empty() {
            state.select(Some(self.library.selected));
        }
        let list = List::new(items)
            .block(self.pane_block(title, Focus::Library))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_selection(&self, frame: &mut Frame, area: Rect) {
        let target = self
            .screens
            .get(self.screen_index)
            .map(|screen| format!(" -> {}", screen.label))
            .unwrap_or_default();
        let title = match self.selection.with_notes().count() {
            0 => format!("Selection ({}){target}", self.selection.len()),
            notes => format!("Selection ({}, {notes} with notes){target}", self.selection.len()),
        };
        let items: Vec<ListItem> = self
            .selection
            .iter()
            .enumerate()
            .map(|(idx, song)| ListItem::new(format!("{}. {song}", idx + 1)))
            .collect();

        let mut state = ListState::default();
        if !self.selection.is_empty() && self.focus == Focus::Selection {
            state.select(Some(self.selection_cursor));
        }
        let list = List::new(items)
            .block(self.pane_block(title, Focus::Selection))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_projection(&self, frame: &mut Frame, area: Rect) {
        let songs = self.projection.songs();
        let cursor = self.projection.cursor();
        let browsed = self.projection_pane.browsed(songs);
        let shown_style = Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD);

        let mut items = Vec::new();
        let mut browsed_item = None;
        for (song_index, song) in songs.iter().enumerate() {
            items.push(ListItem::new(Line::from(Span::styled(
                song.song.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ))));
            if song.sequence.is_empty() {
                items.push(ListItem::new(Span::styled(
                    "    (no lyrics)",
                    Style::default().fg(Color::DarkGray),
                )));
            }
            for (verse_index, name) in song.sequence.names().iter().enumerate() {
                let text = song
                    .verse_at(verse_index)
                    .map(|verse| preview(&verse.lines))
                    .unwrap_or_default();
                let slot = SessionCursor::new(song_index, verse_index);
                if browsed == Some(slot) {
                    browsed_item = Some(items.len());
                }
                let item = ListItem::new(format!("  {name:<4} {text}"));
                items.push(if slot == cursor { item.style(shown_style) } else { item });
            }
        }

        let mut state = ListState::default();
        if self.focus == Focus::Projection {
            state.select(browsed_item);
        }
        let list = List::new(items)
            .block(self.pane_block("Projection".to_string(), Focus::Projection))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let paragraph =
            Paragraph::new(vec![status_line, self.footer_instructions()]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn draw_filter_bar(&self, frame: &mut Frame, area: Rect, query: &str) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title("Filter");
        let paragraph = Paragraph::new(Span::raw(format!("Filter: {query}")))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Filter: ".len() as u16 + query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }

    fn draw_screen_picker(&self, frame: &mut Frame, area: Rect, selected: usize) {
        let popup_area = centered_rect(50, 40, area);
        frame.render_widget(Clear, popup_area);

        let items: Vec<ListItem> = self
            .screens
            .iter()
            .map(|screen| ListItem::new(screen.to_string()))
            .collect();
        let mut state = ListState::default();
        state.select(Some(selected));
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Project on"))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_stateful_widget(list, popup_area, &mut state);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let keys: &[(&str, &str)] = match (&self.mode, self.focus) {
            (Mode::Filtering { .. }, _) => &[("[Enter]", " Keep   "), ("[Esc]", " Clear")],
            (Mode::ChoosingScreen { .. }, _) => &[
                ("[\u{2191}\u{2193}]", " Choose   "),
                ("[Enter]", " Project   "),
                ("[Esc]", " Cancel"),
            ],
            (Mode::Normal, Focus::Library) => &[
                ("[Enter]", " Toggle   "),
                ("[f]", " Filter   "),
                ("[o]", " Notes   "),
                ("[p]", " Project   "),
                ("[Tab]", " Pane   "),
                ("[q]", " Quit"),
            ],
            (Mode::Normal, Focus::Selection) => &[
                ("[d]", " Remove   "),
                ("[c]", " Clear   "),
                ("[o]", " Notes   "),
                ("[p]", " Project   "),
                ("[Tab]", " Pane   "),
                ("[q]", " Quit"),
            ],
            (Mode::Normal, Focus::Projection) => &[
                ("[\u{2190}\u{2192}]", " Verse   "),
                ("[PgUp/PgDn]", " Song   "),
                ("[\u{2191}\u{2193}]", " Browse   "),
                ("[Enter]", " Show   "),
                ("[x]", " Close   "),
                ("[Tab]", " Pane"),
            ],
        };
        Line::from(
            keys.iter()
                .flat_map(|(key, label)| [Span::styled(*key, key_style), Span::raw(*label)])
                .collect::<Vec<_>>(),
        )
    }
}
