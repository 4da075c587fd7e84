//! Song store, split across logical submodules.

mod connection;
mod songs;
mod source;

pub use connection::{apply_schema, ensure_schema};
pub use songs::{
    add_verse, count_songs, create_song, fetch_song_headers, fetch_song_lyrics, fetch_song_projection,
    seed_demo_songs, SongProjection,
};
pub use source::DbSongSource;
