use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{SongHeader, Verse};

/// Structured verse data of one song, verses in stored order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongProjection {
    pub verse_order: String,
    pub verses: Vec<Verse>,
}

/// List songs for the library pane. A blank filter returns everything; a
/// numeric filter also matches the entry number exactly. The filter is
/// matched literally, wildcards included.
pub fn fetch_song_headers(conn: &Connection, filter: &str) -> Result<Vec<SongHeader>> {
    let filter = filter.trim();
    let entry: Option<i64> = filter.parse().ok();
    let pattern = format!("%{}%", escape_like(filter));

    let mut stmt = conn
        .prepare(
            "SELECT id, entry, title, notes_file
             FROM songs
             WHERE ?1 = '' OR title LIKE ?2 ESCAPE '\\' OR entry = ?3
             ORDER BY entry, title COLLATE NOCASE",
        )
        .context("failed to prepare song headers query")?;

    let songs = stmt
        .query_map(params![filter, pattern, entry], |row| {
            Ok(SongHeader {
                id: row.get(0)?,
                entry: row.get(1)?,
                title: row.get(2)?,
                notes_file: row.get(3)?,
            })
        })
        .context("failed to iterate songs")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect songs")?;

    Ok(songs)
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Verse order and verse rows of a song. `Ok(None)` when the song does not
/// exist; an existing song may have no verse rows at all.
pub fn fetch_song_projection(conn: &Connection, song_id: i64) -> Result<Option<SongProjection>> {
    let verse_order: Option<String> = conn
        .query_row(
            "SELECT verse_order FROM songs WHERE id = ?1",
            [song_id],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query verse order")?;
    let Some(verse_order) = verse_order else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare("SELECT name, lines FROM verses WHERE song_id = ?1 ORDER BY id")
        .context("failed to prepare verses query")?;
    let verses = stmt
        .query_map([song_id], |row| Ok(Verse::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("failed to iterate verses")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect verses")?;

    Ok(Some(SongProjection { verse_order, verses }))
}

/// Legacy plain lyrics, verses separated by `===`.
pub fn fetch_song_lyrics(conn: &Connection, song_id: i64) -> Result<Option<String>> {
    let lyrics: Option<Option<String>> = conn
        .query_row("SELECT lyrics FROM songs WHERE id = ?1", [song_id], |row| row.get(0))
        .optional()
        .context("failed to query lyrics")?;
    Ok(lyrics.flatten().filter(|text| !text.trim().is_empty()))
}

/// Insert a song and echo its library header.
pub fn create_song(
    conn: &Connection,
    entry: i64,
    title: &str,
    verse_order: &str,
    notes_file: Option<&str>,
    lyrics: Option<&str>,
) -> Result<SongHeader> {
    conn.execute(
        "INSERT INTO songs (entry, title, verse_order, notes_file, lyrics) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![entry, title, verse_order, notes_file, lyrics],
    )
    .context("failed to insert song")?;

    Ok(SongHeader {
        id: conn.last_insert_rowid(),
        entry,
        title: title.to_string(),
        notes_file: notes_file.map(str::to_string),
    })
}

pub fn add_verse(conn: &Connection, song_id: i64, name: &str, lines: &str) -> Result<i64> {
    let inserted = conn
        .execute(
            "INSERT INTO verses (song_id, name, lines)
             SELECT id, ?2, ?3 FROM songs WHERE id = ?1",
            params![song_id, name, lines],
        )
        .context("failed to insert verse")?;

    if inserted == 0 {
        Err(anyhow!("Song not found"))
    } else {
        Ok(conn.last_insert_rowid())
    }
}

pub fn count_songs(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))
        .context("failed to count songs")
}

/// Fill an empty store with a few songs so a first run has something to
/// project. Returns how many songs were inserted.
pub fn seed_demo_songs(conn: &Connection) -> Result<usize> {
    if count_songs(conn)? > 0 {
        return Ok(0);
    }

    let grace = create_song(conn, 1, "Amazing Grace", "v1 v2 v1", Some("amazing-grace.pdf"), None)?;
    add_verse(
        conn,
        grace.id,
        "v1",
        "Amazing grace! How sweet the sound\nThat saved a wretch like me!\nI once was lost, but now am found;\nWas blind, but now I see.",
    )?;
    add_verse(
        conn,
        grace.id,
        "v2",
        "'Twas grace that taught my heart to fear,\nAnd grace my fears relieved;\nHow precious did that grace appear\nThe hour I first believed.",
    )?;

    let doxology = create_song(conn, 2, "Doxology", "", None, None)?;
    add_verse(
        conn,
        doxology.id,
        "v1",
        "Praise God, from whom all blessings flow;\nPraise Him, all creatures here below;\nPraise Him above, ye heavenly host;\nPraise Father, Son, and Holy Ghost.",
    )?;

    create_song(
        conn,
        3,
        "Be Thou My Vision",
        "",
        Some("be-thou-my-vision.pdf"),
        Some(
            "Be Thou my Vision, O Lord of my heart;\nNaught be all else to me, save that Thou art.\n===\nBe Thou my Wisdom, and Thou my true Word;\nI ever with Thee and Thou with me, Lord.",
        ),
    )?;

    Ok(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::apply_schema;

    fn memory_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn headers_filter_by_title_or_entry() {
        let conn = memory_store();
        seed_demo_songs(&conn).unwrap();

        assert_eq!(fetch_song_headers(&conn, "").unwrap().len(), 3);
        let by_title = fetch_song_headers(&conn, "grace").unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].title, "Amazing Grace");
        let by_entry = fetch_song_headers(&conn, "2").unwrap();
        assert_eq!(by_entry[0].title, "Doxology");
    }

    #[test]
    fn wildcards_in_the_filter_match_literally() {
        let conn = memory_store();
        seed_demo_songs(&conn).unwrap();
        create_song(&conn, 50, "100% Joy", "", None, None).unwrap();
        create_song(&conn, 51, "Snake_case Hymn", "", None, None).unwrap();

        let percent = fetch_song_headers(&conn, "%").unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].title, "100% Joy");
        let underscore = fetch_song_headers(&conn, "e_c").unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].title, "Snake_case Hymn");
        assert!(fetch_song_headers(&conn, "\\").unwrap().is_empty());
    }

    #[test]
    fn projection_lists_verses_in_stored_order() {
        let conn = memory_store();
        let song = create_song(&conn, 7, "Song", "b a", None, None).unwrap();
        add_verse(&conn, song.id, "b", "second").unwrap();
        add_verse(&conn, song.id, "a", "first").unwrap();

        let projection = fetch_song_projection(&conn, song.id).unwrap().unwrap();
        assert_eq!(projection.verse_order, "b a");
        assert_eq!(projection.verses[0], Verse::new("b", "second"));
        assert!(fetch_song_projection(&conn, song.id + 1).unwrap().is_none());
    }

    #[test]
    fn verse_requires_existing_song() {
        let conn = memory_store();
        assert!(add_verse(&conn, 42, "v1", "text").is_err());
    }

    #[test]
    fn seeding_only_fills_an_empty_store() {
        let conn = memory_store();
        assert_eq!(seed_demo_songs(&conn).unwrap(), 3);
        assert_eq!(seed_demo_songs(&conn).unwrap(), 0);
        assert_eq!(count_songs(&conn).unwrap(), 3);
    }

    #[test]
    fn deleting_a_song_removes_its_verses() {
        let conn = memory_store();
        let song = create_song(&conn, 1, "Song", "", None, None).unwrap();
        add_verse(&conn, song.id, "v1", "text").unwrap();
        conn.execute("DELETE FROM songs WHERE id = ?1", [song.id]).unwrap();

        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM verses", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }
}
