//! Session lifecycle of the projection controller.
//!
//! ```text
//! Idle -> Opening -> Open -> Closed
//!            \______________/^
//! ```
//!
//! A session owns its surface manager and channel; both are dropped on any
//! transition into `Closed`, which also stops the liveness poll. A new
//! projection request from `Closed` starts a fresh session with a new surface.

use std::mem;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::assembly::{assemble_songs, SongSource};
use super::channel::{self, Channel, ChannelMessage, NavCommand};
use super::codec;
use super::document::render_document;
use super::sequence::{resolve_all, ResolvedSong};
use super::surface::{Closure, LoadPath, SurfaceHost, SurfaceManager};
use crate::error::ProjectionError;
use crate::models::{ScreenDescriptor, SelectedSong, SessionCursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Open,
    Closed,
}

/// Something the UI may want to react to after a [`ProjectionController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The display reported its cursor; the mirror now holds it.
    CursorReported(SessionCursor),
    /// The display surface went away without the controller closing it.
    SurfaceClosed,
}

struct Session {
    surface: SurfaceManager,
    channel: Channel,
    loaded_via: LoadPath,
}

/// `Opening` only lasts for the duration of a `request_projection` call.
enum Phase {
    Idle,
    Opening,
    Open(Session),
    Closed,
}

pub struct ProjectionController {
    host: Box<dyn SurfaceHost>,
    poll_interval: Duration,
    phase: Phase,
    songs: Vec<ResolvedSong>,
    cursor: SessionCursor,
    error: Option<String>,
    degraded: Vec<String>,
}

impl ProjectionController {
    pub fn new(host: Box<dyn SurfaceHost>, poll_interval: Duration) -> Self {
        Self {
            host,
            poll_interval,
            phase: Phase::Idle,
            songs: Vec::new(),
            cursor: SessionCursor::default(),
            error: None,
            degraded: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Opening => SessionState::Opening,
            Phase::Open(_) => SessionState::Open,
            Phase::Closed => SessionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open(_))
    }

    /// Mirrored cursor: the controller's view of what the audience sees.
    pub fn cursor(&self) -> SessionCursor {
        self.cursor
    }

    pub fn songs(&self) -> &[ResolvedSong] {
        &self.songs
    }

    /// Session-scoped error message, if the last operation failed. Cleared
    /// when the session ends or a new one starts.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Dismiss the error once the UI no longer shows it.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Titles of songs whose verse data could not be loaded this session.
    pub fn degraded(&self) -> &[String] {
        &self.degraded
    }

    /// How the open session's document reached the display.
    pub fn load_path(&self) -> Option<LoadPath> {
        match &self.phase {
            Phase::Open(session) => Some(session.loaded_via),
            _ => None,
        }
    }

    /// Whether a liveness poll timer is currently running.
    pub fn is_polling(&self) -> bool {
        match &self.phase {
            Phase::Open(session) => session.surface.is_polling(),
            _ => false,
        }
    }

    fn sequence_lens(&self) -> Vec<usize> {
        self.songs.iter().map(|song| song.sequence.len()).collect()
    }

    /// Open a display on `screen` and project `selection`. Rejected while a
    /// session is open; that session is left untouched.
    pub fn request_projection(
        &mut self,
        selection: &[SelectedSong],
        screen: &ScreenDescriptor,
        source: &mut dyn SongSource,
        now: Instant,
    ) -> Result<(), ProjectionError> {
        if self.is_open() {
            let err = ProjectionError::AlreadyOpen;
            self.error = Some(err.user_message());
            return Err(err);
        }
        if selection.is_empty() {
            let err = ProjectionError::EmptySelection;
            self.error = Some(err.user_message());
            return Err(err);
        }

        info!("opening projection of {} song(s)", selection.len());
        self.phase = Phase::Opening;
        self.error = None;
        self.songs.clear();
        self.degraded.clear();
        self.cursor = SessionCursor::default();

        let mut surface = match SurfaceManager::open(self.host.as_mut(), screen, self.poll_interval, now) {
            Ok(surface) => surface,
            Err(err) => return Err(self.fail(ProjectionError::SurfaceRefused(err))),
        };

        let assembled = assemble_songs(selection, source);
        if !surface.is_alive() {
            info!("display closed while songs were loading; discarding them");
            self.phase = Phase::Closed;
            return Ok(());
        }

        let payload = match codec::encode(&assembled.songs) {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(err.into())),
        };
        let loaded_via = match surface.load(&render_document(&payload)) {
            Ok(path) => path,
            Err(err) => return Err(self.fail(ProjectionError::InjectionFailed(err))),
        };

        let songs = resolve_all(assembled.songs);
        for song in &songs {
            let duplicates = song.duplicate_names();
            if !duplicates.is_empty() {
                warn!("{} has duplicate verse names {duplicates:?}; the first of each is shown", song.song.title);
            }
        }
        self.songs = songs;
        self.degraded = assembled.degraded;
        self.phase = Phase::Open(Session {
            surface,
            channel: Channel::attached(),
            loaded_via,
        });
        info!("projection open ({loaded_via:?} document)");
        Ok(())
    }

    fn fail(&mut self, err: ProjectionError) -> ProjectionError {
        warn!("projection failed: {err}");
        self.error = Some(err.user_message());
        self.phase = Phase::Closed;
        err
    }

    /// Apply a command to the mirror right away and forward it to the
    /// display. Does nothing unless a session is open.
    pub fn navigate(&mut self, command: NavCommand) -> bool {
        let lens = self.sequence_lens();
        let Phase::Open(session) = &mut self.phase else {
            return false;
        };
        self.cursor = channel::navigate(self.cursor, command, &lens);
        session
            .channel
            .send(&mut session.surface, &ChannelMessage::Command { command });
        true
    }

    /// Show a specific verse. Indices are clamped to the session's songs.
    pub fn jump(&mut self, target: SessionCursor) -> bool {
        let lens = self.sequence_lens();
        let Phase::Open(session) = &mut self.phase else {
            return false;
        };
        self.cursor = channel::clamp(target, &lens);
        session
            .channel
            .send(&mut session.surface, &ChannelMessage::jump(self.cursor));
        true
    }

    /// Drain state reports and run the liveness poll. Called from the UI
    /// loop; the latest report always replaces the mirror.
    pub fn tick(&mut self, now: Instant) -> Option<SessionEvent> {
        let lens = self.sequence_lens();
        let Phase::Open(session) = &mut self.phase else {
            return None;
        };

        let report = session.channel.latest_report(&mut session.surface);
        if let Some(closure) = session.surface.check_liveness(now) {
            self.end_session();
            if let Closure::Failed(err) = closure {
                self.fail(ProjectionError::InjectionFailed(err));
            }
            return Some(SessionEvent::SurfaceClosed);
        }

        report.map(|reported| {
            self.cursor = channel::clamp(reported, &lens);
            SessionEvent::CursorReported(self.cursor)
        })
    }

    /// Close the display. Idempotent; does nothing without an open session.
    pub fn close(&mut self) {
        if self.is_open() {
            info!("closing projection");
            self.end_session();
        }
    }

    fn end_session(&mut self) {
        if let Phase::Open(mut session) = mem::replace(&mut self.phase, Phase::Closed) {
            session.channel.detach();
            session.surface.close();
        }
        self.songs.clear();
        self.cursor = SessionCursor::default();
        self.error = None;
    }
}
