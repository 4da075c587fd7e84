//! The projection display process: the audience-facing side of a session.
//!
//! It keeps its own cursor, which is the ground truth for what is shown, and
//! reports it to the controller after every command, jump or key press.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ipc_channel::ipc::{self, IpcSender};
use log::{debug, info, warn};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};
use ratatui::Frame as TuiFrame;

use super::channel::{self, Channel, ChannelMessage, Endpoint, NavCommand};
use super::document::{splash_logo, ProjectionDocument, Theme};
use super::process_host::{Bootstrap, Frame, FrameReceiver, FrameSender};
use super::sequence::{resolve_all, ResolvedSong};
use crate::models::SessionCursor;
use crate::ui::terminal::{init_terminal, restore_terminal};

/// Input poll timeout; also bounds how long a command waits to be shown.
const INPUT_POLL: Duration = Duration::from_millis(50);

/// What a key press on the display asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKey {
    Navigate(NavCommand),
    Close,
}

pub fn map_key(code: KeyCode) -> Option<DisplayKey> {
    match code {
        KeyCode::Right | KeyCode::Down | KeyCode::Char(' ') => Some(DisplayKey::Navigate(NavCommand::NextVerse)),
        KeyCode::Left | KeyCode::Up => Some(DisplayKey::Navigate(NavCommand::PrevVerse)),
        KeyCode::PageDown | KeyCode::Char('n') => Some(DisplayKey::Navigate(NavCommand::NextSong)),
        KeyCode::PageUp | KeyCode::Char('p') => Some(DisplayKey::Navigate(NavCommand::PrevSong)),
        KeyCode::Char('q') | KeyCode::Esc => Some(DisplayKey::Close),
        _ => None,
    }
}

/// Loaded document plus the display's own cursor.
#[derive(Debug, Default)]
pub struct DisplayState {
    document: Option<ProjectionDocument>,
    songs: Vec<ResolvedSong>,
    cursor: SessionCursor,
}

impl DisplayState {
    pub fn load(&mut self, document: ProjectionDocument) {
        info!("loaded document with {} song(s)", document.songs.len());
        self.songs = resolve_all(document.songs.clone());
        self.document = Some(document);
        self.cursor = SessionCursor::default();
    }

    pub fn cursor(&self) -> SessionCursor {
        self.cursor
    }

    fn sequence_lens(&self) -> Vec<usize> {
        self.songs.iter().map(|song| song.sequence.len()).collect()
    }

    pub fn navigate(&mut self, command: NavCommand) -> SessionCursor {
        self.cursor = channel::navigate(self.cursor, command, &self.sequence_lens());
        self.cursor
    }

    pub fn jump(&mut self, target: SessionCursor) -> SessionCursor {
        self.cursor = channel::clamp(target, &self.sequence_lens());
        self.cursor
    }

    /// Handle a message from the controller. Returns the cursor to report,
    /// or `None` for messages the display does not act on.
    pub fn apply(&mut self, message: ChannelMessage) -> Option<SessionCursor> {
        match message {
            ChannelMessage::Command { command } => Some(self.navigate(command)),
            ChannelMessage::Jump {
                song_index,
                verse_index,
            } => Some(self.jump(SessionCursor::new(song_index, verse_index))),
            ChannelMessage::State { .. } => None,
        }
    }

    pub fn current_song(&self) -> Option<&ResolvedSong> {
        self.songs.get(self.cursor.song_index)
    }

    /// Text of the current slot; `None` when the slot resolves to no verse.
    pub fn current_lines(&self) -> Option<&str> {
        self.current_song()?
            .verse_at(self.cursor.verse_index)
            .map(|verse| verse.lines.as_str())
    }

    fn draw(&self, frame: &mut TuiFrame) {
        let area = frame.area();
        match &self.document {
            Some(document) if !self.songs.is_empty() => self.draw_song(frame, area, document),
            Some(document) => draw_logo(frame, area, &document.logo, "No songs to show.", &document.theme),
            None => draw_logo(frame, area, splash_logo(), "Waiting for songs...", &Theme::default()),
        }
    }

    fn draw_song(&self, frame: &mut TuiFrame, area: Rect, document: &ProjectionDocument) {
        let Some(song) = self.current_song() else {
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(1), Constraint::Length(2)])
            .split(area);

        let title_style = Style::default()
            .fg(parse_color(&document.theme.title, Color::Yellow))
            .add_modifier(Modifier::BOLD);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(song.song.title.clone(), title_style)))
                .alignment(Alignment::Center),
            chunks[0],
        );

        let verse_style = Style::default().fg(parse_color(&document.theme.verse, Color::White));
        let lines: Vec<Line> = self
            .current_lines()
            .unwrap_or_default()
            .lines()
            .map(|line| Line::from(Span::styled(line.to_string(), verse_style)))
            .collect();
        let body_height = lines.len() as u16;
        let top_pad = chunks[1].height.saturating_sub(body_height) / 2;
        let body = Rect {
            y: chunks[1].y + top_pad,
            height: chunks[1].height - top_pad,
            ..chunks[1]
        };
        frame.render_widget(
            Paragraph::new(lines)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: false }),
            body,
        );

        let hint_style = Style::default().fg(parse_color(&document.theme.hint, Color::DarkGray));
        let position = format!(
            "song {}/{}  verse {}/{} {}",
            self.cursor.song_index + 1,
            self.songs.len(),
            (self.cursor.verse_index + 1).min(song.sequence.len()),
            song.sequence.len(),
            song.sequence.name(self.cursor.verse_index).unwrap_or_default(),
        );
        frame.render_widget(
            Paragraph::new(vec![
                Line::from(Span::styled(position, hint_style)),
                Line::from(Span::styled(document.hints.clone(), hint_style)),
            ])
            .alignment(Alignment::Center),
            chunks[2],
        );
    }
}

fn draw_logo(frame: &mut TuiFrame, area: Rect, logo: &str, caption: &str, theme: &Theme) {
    let mut lines: Vec<Line> = logo
        .lines()
        .map(|line| {
            Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(parse_color(&theme.title, Color::Yellow)),
            ))
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        caption.to_string(),
        Style::default().fg(parse_color(&theme.hint, Color::DarkGray)),
    )));
    let top_pad = area.height.saturating_sub(lines.len() as u16) / 2;
    let body = Rect {
        y: area.y + top_pad,
        height: area.height - top_pad,
        ..area
    };
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), body);
}

fn parse_color(name: &str, fallback: Color) -> Color {
    name.parse().unwrap_or(fallback)
}

/// Outgoing side of the link plus messages received but not yet read.
struct Mailbox {
    to_controller: FrameSender,
    inbox: VecDeque<String>,
}

impl Endpoint for Mailbox {
    fn post(&mut self, message: &str) -> bool {
        self.to_controller
            .send(Frame::Message(message.to_string()))
            .is_ok()
    }

    fn poll(&mut self) -> Option<String> {
        self.inbox.pop_front()
    }
}

/// Connect to the controller's one-shot server and hand it our endpoints.
fn connect(server_name: &str) -> Result<(FrameSender, FrameReceiver)> {
    let (to_display, from_controller) = ipc::channel::<Frame>().context("failed to create IPC channel")?;
    let (to_controller, from_display) = ipc::channel::<Frame>().context("failed to create IPC channel")?;
    let bootstrap = IpcSender::<Bootstrap>::connect(server_name.to_string())
        .context("failed to connect to the controller")?;
    bootstrap
        .send((to_display, from_display))
        .map_err(|err| anyhow!("failed to send bootstrap: {err:?}"))?;
    Ok((to_controller, from_controller))
}

fn load_frame(frame: Frame) -> Result<Option<ProjectionDocument>> {
    match frame {
        Frame::Navigate(path) => Ok(Some(read_document(&path)?)),
        Frame::Write(document) => Ok(Some(ProjectionDocument::parse(&document)?)),
        _ => Ok(None),
    }
}

fn read_document(path: &Path) -> Result<ProjectionDocument> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    ProjectionDocument::parse(&raw)
}

/// Entry point of `choir-projector display <SERVER>`.
pub fn run(server_name: &str) -> Result<()> {
    let (to_controller, from_controller) = connect(server_name)?;
    info!("connected to controller");

    let mut terminal = init_terminal()?;
    let mut state = DisplayState::default();
    let mut mailbox = Mailbox {
        to_controller,
        inbox: VecDeque::new(),
    };
    let channel = Channel::attached();

    let result = loop {
        if let Err(err) = terminal.draw(|frame| state.draw(frame)) {
            break Err(err).context("failed to draw frame");
        }

        let mut controller_gone = false;
        loop {
            match from_controller.try_recv() {
                Ok(Frame::Message(message)) => mailbox.inbox.push_back(message),
                Ok(Frame::Close) => {
                    debug!("controller closed the display");
                    controller_gone = true;
                    break;
                }
                Ok(frame) => match load_frame(frame) {
                    Ok(Some(document)) => {
                        state.load(document);
                        channel.send(&mut mailbox, &ChannelMessage::state(state.cursor()));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!("failed to load document: {err:#}");
                        let _ = mailbox.to_controller.send(Frame::Rejected(format!("{err:#}")));
                    }
                },
                Err(ipc::TryRecvError::Empty) => break,
                Err(err) => {
                    info!("controller link lost: {err:?}");
                    controller_gone = true;
                    break;
                }
            }
        }
        if controller_gone {
            break Ok(());
        }

        for message in channel.receive_all(&mut mailbox) {
            if let Some(cursor) = state.apply(message) {
                channel.send(&mut mailbox, &ChannelMessage::state(cursor));
            }
        }

        match poll_key() {
            Ok(Some(DisplayKey::Navigate(command))) => {
                let cursor = state.navigate(command);
                channel.send(&mut mailbox, &ChannelMessage::state(cursor));
            }
            Ok(Some(DisplayKey::Close)) => {
                let _ = mailbox.to_controller.send(Frame::Close);
                break Ok(());
            }
            Ok(None) => {}
            Err(err) => break Err(err),
        }
    };

    restore_terminal(&mut terminal)?;
    result
}

fn poll_key() -> Result<Option<DisplayKey>> {
    if !event::poll(INPUT_POLL).context("event polling failed")? {
        return Ok(None);
    }
    match event::read().context("failed to read event")? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(map_key(key.code)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectionSong, Verse};
    use crate::projection::{codec, document::render_document};

    fn loaded() -> DisplayState {
        let songs = vec![
            ProjectionSong {
                title: "1: Amazing Grace".into(),
                verse_order: "v1 v2 v1 missing".into(),
                verses: vec![Verse::new("v1", "L1\nL2"), Verse::new("v2", "L3")],
            },
            ProjectionSong::degraded("2: Unavailable"),
        ];
        let document = render_document(&codec::encode(&songs).unwrap());
        let mut state = DisplayState::default();
        state.load(ProjectionDocument::parse(&document).unwrap());
        state
    }

    #[test]
    fn unreadable_document_file_fails_where_written_text_loads() {
        let songs = vec![ProjectionSong::degraded("1: Only")];
        let document = render_document(&codec::encode(&songs).unwrap());

        assert!(load_frame(Frame::Navigate("/nonexistent/projection-x.html".into())).is_err());
        let written = load_frame(Frame::Write(document)).unwrap().unwrap();
        assert_eq!(written.songs, songs);
        assert!(load_frame(Frame::Message("{}".into())).unwrap().is_none());
    }

    #[test]
    fn commands_move_own_cursor_and_are_reported() {
        let mut state = loaded();
        let report = state.apply(ChannelMessage::Command {
            command: NavCommand::NextVerse,
        });
        assert_eq!(report, Some(SessionCursor::new(0, 1)));
        assert_eq!(state.current_lines(), Some("L3"));
        assert_eq!(state.apply(ChannelMessage::state(SessionCursor::new(1, 0))), None);
    }

    #[test]
    fn unresolved_slot_shows_nothing_but_counts() {
        let mut state = loaded();
        assert_eq!(state.jump(SessionCursor::new(0, 9)), SessionCursor::new(0, 3));
        assert_eq!(state.current_lines(), None);
        assert_eq!(state.jump(SessionCursor::new(0, 2)), SessionCursor::new(0, 2));
        assert_eq!(state.current_lines(), Some("L1\nL2"));
    }

    #[test]
    fn degraded_song_is_navigable() {
        let mut state = loaded();
        assert_eq!(state.navigate(NavCommand::NextSong), SessionCursor::new(1, 0));
        assert_eq!(state.navigate(NavCommand::NextVerse), SessionCursor::new(1, 0));
        assert_eq!(state.current_lines(), None);
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(map_key(KeyCode::Char(' ')), Some(DisplayKey::Navigate(NavCommand::NextVerse)));
        assert_eq!(map_key(KeyCode::PageUp), Some(DisplayKey::Navigate(NavCommand::PrevSong)));
        assert_eq!(map_key(KeyCode::Esc), Some(DisplayKey::Close));
        assert_eq!(map_key(KeyCode::Char('z')), None);
    }
}
