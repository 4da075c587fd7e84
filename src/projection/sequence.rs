//! Verse sequencing: turns a song's verses and optional order string into the
//! navigation order used by both the controller and the display.

use std::collections::HashSet;

use crate::models::{ProjectionSong, Verse};

/// Characters shown from a verse's first line in the controller's list.
const PREVIEW_CHARS: usize = 40;

/// Resolved navigation order of one song: a list of verse names, possibly with
/// repeats and names that match no verse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerseSequence {
    names: Vec<String>,
}

impl VerseSequence {
    /// Use the order string verbatim when it is non-blank, otherwise the
    /// verses' stored order.
    pub fn resolve(verse_order: &str, verses: &[Verse]) -> Self {
        let names = if verse_order.trim().is_empty() {
            verses.iter().map(|verse| verse.name.clone()).collect()
        } else {
            verse_order.split_whitespace().map(str::to_string).collect()
        };
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }

    /// Verse shown for `slot`: the first verse with that name, else the verse
    /// at the same position, else nothing. The slot still counts towards the
    /// sequence length either way.
    pub fn verse_at<'a>(&self, verses: &'a [Verse], slot: usize) -> Option<&'a Verse> {
        let name = self.names.get(slot)?;
        verses
            .iter()
            .find(|verse| &verse.name == name)
            .or_else(|| verses.get(slot))
    }
}

/// A payload song together with its sequence, computed once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSong {
    pub song: ProjectionSong,
    pub sequence: VerseSequence,
}

impl ResolvedSong {
    pub fn new(song: ProjectionSong) -> Self {
        let sequence = VerseSequence::resolve(&song.verse_order, &song.verses);
        Self { song, sequence }
    }

    pub fn verse_at(&self, slot: usize) -> Option<&Verse> {
        self.sequence.verse_at(&self.song.verses, slot)
    }

    /// Names used by more than one verse. Lookup picks the first of them.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for verse in &self.song.verses {
            if !seen.insert(verse.name.as_str()) && !duplicates.contains(&verse.name.as_str()) {
                duplicates.push(verse.name.as_str());
            }
        }
        duplicates
    }
}

/// Resolve every song of a session, in order.
pub fn resolve_all(songs: Vec<ProjectionSong>) -> Vec<ResolvedSong> {
    songs.into_iter().map(ResolvedSong::new).collect()
}

/// First line of a verse, cut to a short preview.
pub fn preview(lines: &str) -> String {
    let first = lines.lines().next().unwrap_or_default();
    if first.chars().count() > PREVIEW_CHARS {
        let cut: String = first.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        first.to_string()
    }
}
