//! Domain models shared by the song store, the controller TUI and the
//! projection display. These stay light-weight data holders; persistence and
//! projection logic live in their own modules.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Library row shown in the song list. Mirrors the `songs` table without the
/// verse payload, which is only fetched when a projection session opens.
pub struct SongHeader {
    /// Primary key from the SQLite store.
    pub id: i64,
    /// Hymnal entry number printed next to the title.
    pub entry: i64,
    /// Title displayed in lists and search results.
    pub title: String,
    /// Optional file name of the printable notation sheet.
    pub notes_file: Option<String>,
}

impl SongHeader {
    /// Build the selection record carried into a projection session.
    pub fn to_selected(&self) -> SelectedSong {
        SelectedSong {
            id: self.id,
            entry: self.entry,
            title: self.title.clone(),
            filename: self.notes_file.clone(),
            has_notes: self
                .notes_file
                .as_deref()
                .is_some_and(|name| !name.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One song chosen for a projection session. Owned by the
/// [`Selection`](crate::selection::Selection); `id` is unique within it.
pub struct SelectedSong {
    pub id: i64,
    /// Display number.
    pub entry: i64,
    pub title: String,
    /// Notation asset. Irrelevant to projection but carried through so the
    /// same selection can open printable notes.
    pub filename: Option<String>,
    pub has_notes: bool,
}

impl SelectedSong {
    /// Pre-formatted title used on the projection display, e.g. `12: Title`.
    pub fn projection_title(&self) -> String {
        format!("{}: {}", self.entry, self.title)
    }
}

impl fmt::Display for SelectedSong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.entry, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A named block of lyrics. `lines` keeps the raw multi-line text.
pub struct Verse {
    pub name: String,
    pub lines: String,
}

impl Verse {
    pub fn new(name: impl Into<String>, lines: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: lines.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Per-song payload sent to the display surface. Derived once when a session
/// opens and never mutated afterwards.
pub struct ProjectionSong {
    pub title: String,
    /// Raw order string, possibly empty.
    #[serde(default)]
    pub verse_order: String,
    #[serde(default)]
    pub verses: Vec<Verse>,
}

impl ProjectionSong {
    /// Entry used when a song's verse data could not be fetched. The title is
    /// kept so indices of the following songs do not shift.
    pub fn degraded(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            verse_order: String::new(),
            verses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// `{songIndex, verseIndex}` identifying what the audience currently sees.
pub struct SessionCursor {
    pub song_index: usize,
    pub verse_index: usize,
}

impl SessionCursor {
    pub const fn new(song_index: usize, verse_index: usize) -> Self {
        Self {
            song_index,
            verse_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Geometry of one physical screen, used to place a new display surface.
pub struct ScreenDescriptor {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
    pub label: String,
}

impl fmt::Display for ScreenDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_primary {
            write!(f, "{} (primary) - {}x{}", self.label, self.width, self.height)
        } else {
            write!(f, "{} - {}x{}", self.label, self.width, self.height)
        }
    }
}
