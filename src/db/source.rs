use anyhow::{anyhow, Result};
use rusqlite::Connection;

use super::songs::{fetch_song_lyrics, fetch_song_projection};
use crate::projection::{SongSource, SongVerseData};

/// Serves verse data for projection straight from the song store.
pub struct DbSongSource<'a> {
    conn: &'a Connection,
}

impl<'a> DbSongSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SongSource for DbSongSource<'_> {
    /// Verse rows win over legacy lyrics. A song with neither is an error so
    /// the session shows it as unavailable.
    fn fetch_song_verse_data(&mut self, song_id: i64) -> Result<SongVerseData> {
        let projection =
            fetch_song_projection(self.conn, song_id)?.ok_or_else(|| anyhow!("Song {song_id} not found"))?;
        if !projection.verses.is_empty() {
            return Ok(SongVerseData::Structured {
                verse_order: projection.verse_order,
                verses: projection.verses,
            });
        }
        match fetch_song_lyrics(self.conn, song_id)? {
            Some(text) => Ok(SongVerseData::RawText(text)),
            None => Err(anyhow!("Song {song_id} has no lyrics")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_verse, apply_schema, create_song};
    use crate::models::Verse;

    #[test]
    fn prefers_verses_then_lyrics() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        let structured = create_song(&conn, 1, "A", "v1", None, Some("ignored")).unwrap();
        add_verse(&conn, structured.id, "v1", "line").unwrap();
        let raw = create_song(&conn, 2, "B", "", None, Some("x === y")).unwrap();
        let empty = create_song(&conn, 3, "C", "", None, None).unwrap();

        let mut source = DbSongSource::new(&conn);
        assert_eq!(
            source.fetch_song_verse_data(structured.id).unwrap(),
            SongVerseData::Structured {
                verse_order: "v1".into(),
                verses: vec![Verse::new("v1", "line")],
            }
        );
        assert_eq!(
            source.fetch_song_verse_data(raw.id).unwrap(),
            SongVerseData::RawText("x === y".into())
        );
        assert!(source.fetch_song_verse_data(empty.id).is_err());
        assert!(source.fetch_song_verse_data(99).is_err());
    }
}
