//! In-memory stand-ins for the display host and the song store.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Result};

use choir_projector::error::SurfaceError;
use choir_projector::projection::channel::ChannelMessage;
use choir_projector::projection::{Endpoint, SongSource, SongVerseData, Surface, SurfaceHost, UnloadHook};
use choir_projector::{ScreenDescriptor, SelectedSong, SessionCursor, Verse};

/// What the fake surfaces were asked to do, and switches to make them fail.
#[derive(Default)]
pub struct SurfaceLog {
    pub refuse: bool,
    pub reject_navigate: bool,
    pub reject_write: bool,
    pub opened: usize,
    pub closed: bool,
    pub close_calls: usize,
    /// Paths navigated to, with the document found there at the time.
    pub navigated: Vec<(PathBuf, String)>,
    pub written: Vec<String>,
    pub posted: Vec<String>,
    /// Messages the "display" has sent back.
    pub inbox: VecDeque<String>,
    /// Reason the display gave up on its document, reported once closed.
    pub failure: Option<String>,
}

pub type Shared = Rc<RefCell<SurfaceLog>>;

pub fn shared_log() -> Shared {
    Rc::new(RefCell::new(SurfaceLog::default()))
}

pub struct FakeHost {
    pub log: Shared,
}

impl SurfaceHost for FakeHost {
    fn open_surface(&mut self, _screen: &ScreenDescriptor) -> Result<Box<dyn Surface>, SurfaceError> {
        let mut log = self.log.borrow_mut();
        if log.refuse {
            return Err(SurfaceError::Refused("popup blocked".into()));
        }
        log.opened += 1;
        log.closed = false;
        Ok(Box::new(FakeSurface {
            log: Rc::clone(&self.log),
            hooks: Vec::new(),
        }))
    }
}

pub struct FakeSurface {
    log: Shared,
    hooks: Vec<UnloadHook>,
}

impl FakeSurface {
    fn run_hooks(&mut self) {
        for hook in self.hooks.drain(..) {
            hook();
        }
    }
}

impl Endpoint for FakeSurface {
    fn post(&mut self, message: &str) -> bool {
        let mut log = self.log.borrow_mut();
        if log.closed {
            return false;
        }
        log.posted.push(message.to_string());
        true
    }

    fn poll(&mut self) -> Option<String> {
        self.log.borrow_mut().inbox.pop_front()
    }
}

impl Surface for FakeSurface {
    fn navigate(&mut self, location: &Path) -> Result<(), SurfaceError> {
        let document = fs::read_to_string(location)?;
        let mut log = self.log.borrow_mut();
        log.navigated.push((location.to_path_buf(), document));
        if log.reject_navigate {
            return Err(SurfaceError::Rejected("navigation blocked".into()));
        }
        Ok(())
    }

    fn write_document(&mut self, document: &str) -> Result<(), SurfaceError> {
        let mut log = self.log.borrow_mut();
        if log.reject_write {
            return Err(SurfaceError::Rejected("write blocked".into()));
        }
        log.written.push(document.to_string());
        Ok(())
    }

    fn on_unload(&mut self, hook: UnloadHook) {
        self.hooks.push(hook);
    }

    fn is_closed(&mut self) -> bool {
        let closed = self.log.borrow().closed;
        if closed {
            self.run_hooks();
        }
        closed
    }

    fn close(&mut self) {
        {
            let mut log = self.log.borrow_mut();
            log.close_calls += 1;
            log.closed = true;
        }
        self.run_hooks();
    }

    fn take_failure(&mut self) -> Option<SurfaceError> {
        self.log.borrow_mut().failure.take().map(SurfaceError::Rejected)
    }
}

/// Song store keyed by id. Missing ids fail the fetch.
#[derive(Default)]
pub struct MapSource {
    pub songs: HashMap<i64, SongVerseData>,
    /// Simulates the display being closed while songs are still loading.
    pub close_on_fetch: Option<Shared>,
}

impl SongSource for MapSource {
    fn fetch_song_verse_data(&mut self, song_id: i64) -> Result<SongVerseData> {
        if let Some(log) = &self.close_on_fetch {
            log.borrow_mut().closed = true;
        }
        self.songs
            .get(&song_id)
            .cloned()
            .ok_or_else(|| anyhow!("song {song_id} not found"))
    }
}

pub fn selected(id: i64, entry: i64, title: &str) -> SelectedSong {
    SelectedSong {
        id,
        entry,
        title: title.into(),
        filename: None,
        has_notes: false,
    }
}

pub fn amazing_grace() -> SongVerseData {
    SongVerseData::Structured {
        verse_order: "v1 v2 v1".into(),
        verses: vec![Verse::new("v1", "L1\nL2"), Verse::new("v2", "L3")],
    }
}

pub fn screen() -> ScreenDescriptor {
    ScreenDescriptor {
        left: 1920,
        top: 0,
        width: 1280,
        height: 720,
        is_primary: false,
        label: "Display 2".into(),
    }
}

pub fn state_report(song_index: usize, verse_index: usize) -> String {
    serde_json::to_string(&ChannelMessage::state(SessionCursor::new(song_index, verse_index)))
        .expect("state message serializes")
}
