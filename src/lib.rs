//! Core library surface for the choir projector.
//!
//! The controller TUI picks songs from the SQLite store and drives a
//! projection display running as a second process; both sides live in this
//! crate so the binary can start either one.
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod projection;
pub mod selection;
pub mod ui;

pub use config::Config;
pub use db::{ensure_schema, seed_demo_songs};
pub use error::{CodecError, ProjectionError, SurfaceError};
pub use models::{ProjectionSong, ScreenDescriptor, SelectedSong, SessionCursor, SongHeader, Verse};
pub use projection::{ProjectionController, SessionState};
pub use selection::Selection;
pub use ui::{run_app, App};
