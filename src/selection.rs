//! The songs chosen for the next projection session, in projection order.

use crate::models::SelectedSong;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    songs: Vec<SelectedSong>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a song. Returns `false` if a song with the same id is already
    /// selected.
    pub fn add(&mut self, song: SelectedSong) -> bool {
        if self.contains(song.id) {
            return false;
        }
        self.songs.push(song);
        true
    }

    pub fn remove(&mut self, id: i64) -> Option<SelectedSong> {
        let idx = self.songs.iter().position(|song| song.id == id)?;
        Some(self.songs.remove(idx))
    }

    pub fn clear(&mut self) {
        self.songs.clear();
    }

    pub fn contains(&self, id: i64) -> bool {
        self.songs.iter().any(|song| song.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&SelectedSong> {
        self.songs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectedSong> {
        self.songs.iter()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn as_slice(&self) -> &[SelectedSong] {
        &self.songs
    }

    /// Selected songs that have a notation sheet.
    pub fn with_notes(&self) -> impl Iterator<Item = &SelectedSong> {
        self.songs.iter().filter(|song| song.has_notes)
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a SelectedSong;
    type IntoIter = std::slice::Iter<'a, SelectedSong>;

    fn into_iter(self) -> Self::IntoIter {
        self.songs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: i64, has_notes: bool) -> SelectedSong {
        SelectedSong {
            id,
            entry: id * 10,
            title: format!("Song {id}"),
            filename: has_notes.then(|| format!("song-{id}.pdf")),
            has_notes,
        }
    }

    #[test]
    fn keeps_insertion_order_and_rejects_duplicates() {
        let mut selection = Selection::new();
        assert!(selection.add(song(3, false)));
        assert!(selection.add(song(1, true)));
        assert!(!selection.add(song(3, true)));

        let ids: Vec<i64> = selection.iter().map(|song| song.id).collect();
        assert_eq!(ids, [3, 1]);
        assert!(!selection.get(0).unwrap().has_notes);
    }

    #[test]
    fn remove_and_clear() {
        let mut selection = Selection::new();
        selection.add(song(1, true));
        selection.add(song(2, false));

        assert_eq!(selection.remove(1).map(|song| song.id), Some(1));
        assert_eq!(selection.remove(1), None);
        assert_eq!(selection.len(), 1);
        selection.clear();
        assert!(selection.is_empty());
    }

    #[test]
    fn notes_filter() {
        let mut selection = Selection::new();
        selection.add(song(1, true));
        selection.add(song(2, false));
        let with_notes: Vec<i64> = selection.with_notes().map(|song| song.id).collect();
        assert_eq!(with_notes, [1]);
    }
}
