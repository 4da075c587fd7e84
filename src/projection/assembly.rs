//! Builds the projection payload from the selection, one independent fetch per
//! song.

use anyhow::Result;
use log::{debug, warn};

use crate::models::{ProjectionSong, SelectedSong, Verse};

/// Separator between verses in legacy raw lyrics.
const RAW_VERSE_SEPARATOR: &str = "===";

/// Verse data for one song as delivered by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongVerseData {
    Structured { verse_order: String, verses: Vec<Verse> },
    /// Plain lyrics with verses separated by `===`.
    RawText(String),
}

/// Boundary to the application's song store.
pub trait SongSource {
    fn fetch_song_verse_data(&mut self, song_id: i64) -> Result<SongVerseData>;
}

/// Payload songs in selection order plus the titles that had to be degraded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembled {
    pub songs: Vec<ProjectionSong>,
    pub degraded: Vec<String>,
}

/// Fetch every selected song. A failed fetch becomes an empty entry with the
/// title preserved, so later songs keep their index.
pub fn assemble_songs<'a, I>(selection: I, source: &mut dyn SongSource) -> Assembled
where
    I: IntoIterator<Item = &'a SelectedSong>,
{
    let mut assembled = Assembled::default();
    for selected in selection {
        let title = selected.projection_title();
        match source.fetch_song_verse_data(selected.id) {
            Ok(data) => {
                debug!("fetched verse data for song {}", selected.id);
                assembled.songs.push(from_verse_data(title, data));
            }
            Err(err) => {
                warn!("verse data for song {} unavailable: {err:#}", selected.id);
                assembled.degraded.push(title.clone());
                assembled.songs.push(ProjectionSong::degraded(title));
            }
        }
    }
    assembled
}

fn from_verse_data(title: String, data: SongVerseData) -> ProjectionSong {
    match data {
        SongVerseData::Structured { verse_order, verses } => ProjectionSong {
            title,
            verse_order,
            verses,
        },
        SongVerseData::RawText(text) => {
            let verses: Vec<Verse> = text
                .split(RAW_VERSE_SEPARATOR)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .enumerate()
                .map(|(idx, lines)| Verse::new(format!("v{}", idx + 1), lines))
                .collect();
            let verse_order = verses
                .iter()
                .map(|verse| verse.name.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            ProjectionSong {
                title,
                verse_order,
                verses,
            }
        }
    }
}
