//! The self-contained document loaded into a display surface: a static shell
//! with one substitution point for the encoded songs and one for the logo.

use anyhow::{anyhow, Context, Result};

use super::codec;
use crate::models::ProjectionSong;

const TEMPLATE: &str = include_str!("../../assets/projection.html");
const LOGO: &str = include_str!("../../assets/logo.txt");

const SONGS_PLACEHOLDER: &str = "{{SONGS_DATA}}";
const LOGO_PLACEHOLDER: &str = "{{LOGO}}";

const LOGO_OPEN: &str = "<pre id=\"logo\">";
const LOGO_CLOSE: &str = "</pre>";
const HINTS_OPEN: &str = "<nav id=\"hints\">";
const HINTS_CLOSE: &str = "</nav>";
const DATA_MARKER: &str = "id=\"songs-data\">";
const SCRIPT_CLOSE: &str = "</script";

/// Substitute an encoded payload (see [`codec::encode`]) into the shell.
pub fn render_document(payload: &str) -> String {
    TEMPLATE
        .replacen(LOGO_PLACEHOLDER, LOGO.trim_end_matches('\n'), 1)
        .replacen(SONGS_PLACEHOLDER, payload, 1)
}

/// Colours named in the document's style block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub title: String,
    pub verse: String,
    pub hint: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            title: "yellow".into(),
            verse: "white".into(),
            hint: "darkgray".into(),
        }
    }
}

/// What the display extracts from a loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionDocument {
    pub theme: Theme,
    pub logo: String,
    pub hints: String,
    pub songs: Vec<ProjectionSong>,
}

impl ProjectionDocument {
    pub fn parse(document: &str) -> Result<Self> {
        let payload = data_block(document).ok_or_else(|| anyhow!("document has no songs data block"))?;
        let songs = codec::decode(payload.trim()).context("failed to decode songs data")?;

        let defaults = Theme::default();
        let theme = Theme {
            title: style_var(document, "--title").unwrap_or(defaults.title),
            verse: style_var(document, "--verse").unwrap_or(defaults.verse),
            hint: style_var(document, "--hint").unwrap_or(defaults.hint),
        };

        Ok(Self {
            theme,
            logo: between(document, LOGO_OPEN, LOGO_CLOSE).unwrap_or_default().to_string(),
            hints: between(document, HINTS_OPEN, HINTS_CLOSE).unwrap_or_default().trim().to_string(),
            songs,
        })
    }
}

/// The logo shown before any document has been loaded.
pub fn splash_logo() -> &'static str {
    LOGO
}

fn between<'a>(document: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = document.find(open)? + open.len();
    let end = document[start..].find(close)? + start;
    Some(&document[start..end])
}

/// Data block contents. Like a markup parser, the block ends at the first
/// `</script`, whatever its letter case.
fn data_block(document: &str) -> Option<&str> {
    let start = document.find(DATA_MARKER)? + DATA_MARKER.len();
    let lowered = document[start..].to_ascii_lowercase();
    let end = lowered.find(SCRIPT_CLOSE)? + start;
    Some(&document[start..end])
}

fn style_var(document: &str, name: &str) -> Option<String> {
    let style = between(document, "<style>", "</style>")?;
    let start = style.find(&format!("{name}:"))? + name.len() + 1;
    let end = style[start..].find(';')? + start;
    let value = style[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}
