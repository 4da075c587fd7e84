//! Ratatui front-end of the controller: song library, selection and the
//! remote for an open projection.

mod app;
mod helpers;
mod screens;
pub(crate) mod terminal;

pub use app::App;
pub use terminal::run_app;
