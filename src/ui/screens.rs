use anyhow::Result;
use rusqlite::Connection;

use super::helpers::offset_index;
use crate::db::fetch_song_headers;
use crate::models::{SessionCursor, SongHeader};
use crate::projection::ResolvedSong;

/// The song library list with its active filter.
pub(crate) struct LibraryPane {
    pub(crate) songs: Vec<SongHeader>,
    pub(crate) filter: String,
    pub(crate) selected: usize,
}

impl LibraryPane {
    pub(crate) fn load(conn: &Connection, filter: &str) -> Result<Self> {
        let mut pane = Self {
            songs: Vec::new(),
            filter: filter.to_string(),
            selected: 0,
        };
        pane.reload(conn)?;
        Ok(pane)
    }

    /// Re-query with the current filter, keeping the cursor on the same song
    /// when it is still listed.
    pub(crate) fn reload(&mut self, conn: &Connection) -> Result<()> {
        let focus_id = self.current_song().map(|song| song.id);
        self.songs = fetch_song_headers(conn, &self.filter)?;
        self.selected = focus_id
            .and_then(|id| self.songs.iter().position(|song| song.id == id))
            .unwrap_or(0);
        Ok(())
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        self.selected = offset_index(self.selected, offset, self.songs.len());
    }

    pub(crate) fn current_song(&self) -> Option<&SongHeader> {
        self.songs.get(self.selected)
    }
}

/// One navigable row of the projection pane: a slot of a song's sequence.
pub(crate) fn slot_rows(songs: &[ResolvedSong]) -> Vec<SessionCursor> {
    songs
        .iter()
        .enumerate()
        .flat_map(|(song_index, song)| {
            (0..song.sequence.len()).map(move |verse_index| SessionCursor::new(song_index, verse_index))
        })
        .collect()
}

/// Browse cursor over the slots of an open session.
#[derive(Default)]
pub(crate) struct ProjectionPane {
    pub(crate) browse: usize,
}

impl ProjectionPane {
    pub(crate) fn move_browse(&mut self, offset: isize, songs: &[ResolvedSong]) {
        self.browse = offset_index(self.browse, offset, slot_rows(songs).len());
    }

    pub(crate) fn browsed(&self, songs: &[ResolvedSong]) -> Option<SessionCursor> {
        slot_rows(songs).get(self.browse).copied()
    }

    /// Put the browse cursor on the row showing `cursor`, if it has one.
    pub(crate) fn follow(&mut self, cursor: SessionCursor, songs: &[ResolvedSong]) {
        if let Some(row) = slot_rows(songs).iter().position(|slot| *slot == cursor) {
            self.browse = row;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{apply_schema, seed_demo_songs};
    use crate::models::{ProjectionSong, Verse};
    use crate::projection::sequence::resolve_all;

    fn songs() -> Vec<ResolvedSong> {
        resolve_all(vec![
            ProjectionSong {
                title: "1: A".into(),
                verse_order: "v1 v2 v1".into(),
                verses: vec![Verse::new("v1", "x"), Verse::new("v2", "y")],
            },
            ProjectionSong::degraded("2: B"),
            ProjectionSong {
                title: "3: C".into(),
                verse_order: String::new(),
                verses: vec![Verse::new("v1", "z")],
            },
        ])
    }

    #[test]
    fn slot_rows_skip_songs_without_sequence() {
        let rows = slot_rows(&songs());
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3], SessionCursor::new(2, 0));
    }

    #[test]
    fn browse_follows_reported_cursor() {
        let songs = songs();
        let mut pane = ProjectionPane::default();
        pane.follow(SessionCursor::new(2, 0), &songs);
        assert_eq!(pane.browse, 3);
        pane.move_browse(5, &songs);
        assert_eq!(pane.browsed(&songs), Some(SessionCursor::new(2, 0)));
        pane.follow(SessionCursor::new(1, 0), &songs);
        assert_eq!(pane.browse, 3);
    }

    #[test]
    fn library_reload_keeps_focus() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        seed_demo_songs(&conn).unwrap();

        let mut pane = LibraryPane::load(&conn, "").unwrap();
        pane.move_selection(2);
        let focused = pane.current_song().unwrap().id;
        pane.filter = "vision".into();
        pane.reload(&conn).unwrap();
        assert_eq!(pane.current_song().map(|song| song.id), Some(focused));
    }
}
