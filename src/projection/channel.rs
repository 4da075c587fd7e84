//! Cross-context messaging between the controller and the display.
//!
//! Messages are JSON snapshots carried by an [`Endpoint`]. Delivery is best
//! effort: nothing is acknowledged and a report may be lost or arrive after a
//! newer local change. Reports are whole cursor values, so the receiver keeps
//! only the latest one.

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::models::SessionCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavCommand {
    NextVerse,
    PrevVerse,
    NextSong,
    PrevSong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChannelMessage {
    /// Controller to display.
    Command { command: NavCommand },
    /// Controller to display.
    #[serde(rename_all = "camelCase")]
    Jump { song_index: usize, verse_index: usize },
    /// Display to controller, after every cursor change on the display.
    #[serde(rename_all = "camelCase")]
    State { song_index: usize, verse_index: usize },
}

impl ChannelMessage {
    pub fn state(cursor: SessionCursor) -> Self {
        ChannelMessage::State {
            song_index: cursor.song_index,
            verse_index: cursor.verse_index,
        }
    }

    pub fn jump(cursor: SessionCursor) -> Self {
        ChannelMessage::Jump {
            song_index: cursor.song_index,
            verse_index: cursor.verse_index,
        }
    }
}

/// Transport under a [`Channel`]. Implementations never fail loudly: a
/// message for a peer that is gone is simply not delivered.
pub trait Endpoint {
    fn post(&mut self, message: &str) -> bool;
    fn poll(&mut self) -> Option<String>;
}

/// Protocol side of the channel: serialisation and listener state.
#[derive(Debug, Default)]
pub struct Channel {
    listening: bool,
}

impl Channel {
    pub fn attached() -> Self {
        Self { listening: true }
    }

    /// Stop sending and receiving. Messages already queued in the transport
    /// are left unread.
    pub fn detach(&mut self) {
        self.listening = false;
    }

    pub fn send(&self, endpoint: &mut dyn Endpoint, message: &ChannelMessage) -> bool {
        if !self.listening {
            return false;
        }
        match serde_json::to_string(message) {
            Ok(json) => {
                trace!("channel send {json}");
                endpoint.post(&json)
            }
            Err(err) => {
                warn!("dropping unserialisable channel message: {err}");
                false
            }
        }
    }

    /// Every well-formed message waiting in the transport, oldest first.
    pub fn receive_all(&self, endpoint: &mut dyn Endpoint) -> Vec<ChannelMessage> {
        let mut messages = Vec::new();
        if !self.listening {
            return messages;
        }
        while let Some(raw) = endpoint.poll() {
            trace!("channel recv {raw}");
            match serde_json::from_str(&raw) {
                Ok(message) => messages.push(message),
                Err(err) => warn!("ignoring malformed channel message {raw:?}: {err}"),
            }
        }
        messages
    }

    /// The newest state report waiting in the transport, if any.
    pub fn latest_report(&self, endpoint: &mut dyn Endpoint) -> Option<SessionCursor> {
        self.receive_all(endpoint)
            .into_iter()
            .filter_map(|message| match message {
                ChannelMessage::State {
                    song_index,
                    verse_index,
                } => Some(SessionCursor::new(song_index, verse_index)),
                _ => None,
            })
            .last()
    }
}

/// Apply a navigation command. `sequence_lens[i]` is the length of song
/// `i`'s verse sequence. Verse moves stay inside the current song; song moves
/// reset the verse. Out-of-range results are clamped, never wrapped.
pub fn navigate(cursor: SessionCursor, command: NavCommand, sequence_lens: &[usize]) -> SessionCursor {
    let song_index = cursor.song_index;
    match command {
        NavCommand::NextVerse => clamp(SessionCursor::new(song_index, cursor.verse_index + 1), sequence_lens),
        NavCommand::PrevVerse => clamp(
            SessionCursor::new(song_index, cursor.verse_index.saturating_sub(1)),
            sequence_lens,
        ),
        NavCommand::NextSong => clamp(SessionCursor::new(song_index + 1, 0), sequence_lens),
        NavCommand::PrevSong => clamp(SessionCursor::new(song_index.saturating_sub(1), 0), sequence_lens),
    }
}

/// Bring a cursor inside the song list and the song's sequence.
pub fn clamp(cursor: SessionCursor, sequence_lens: &[usize]) -> SessionCursor {
    if sequence_lens.is_empty() {
        return SessionCursor::default();
    }
    let song_index = cursor.song_index.min(sequence_lens.len() - 1);
    let verse_index = cursor
        .verse_index
        .min(sequence_lens[song_index].saturating_sub(1));
    SessionCursor::new(song_index, verse_index)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    struct Loopback {
        sent: Vec<String>,
        inbox: VecDeque<String>,
    }

    impl Endpoint for Loopback {
        fn post(&mut self, message: &str) -> bool {
            self.sent.push(message.to_string());
            true
        }

        fn poll(&mut self) -> Option<String> {
            self.inbox.pop_front()
        }
    }

    #[test]
    fn wire_shapes() {
        let command = ChannelMessage::Command {
            command: NavCommand::NextVerse,
        };
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"kind":"command","command":"nextVerse"}"#
        );
        assert_eq!(
            serde_json::to_string(&ChannelMessage::jump(SessionCursor::new(1, 2))).unwrap(),
            r#"{"kind":"jump","songIndex":1,"verseIndex":2}"#
        );
        let state: ChannelMessage =
            serde_json::from_str(r#"{"kind":"state","songIndex":3,"verseIndex":0}"#).unwrap();
        assert_eq!(state, ChannelMessage::state(SessionCursor::new(3, 0)));
    }

    #[test]
    fn verse_moves_clamp_inside_song() {
        let lens = [3, 2];
        let mut cursor = SessionCursor::default();
        cursor = navigate(cursor, NavCommand::NextVerse, &lens);
        cursor = navigate(cursor, NavCommand::NextVerse, &lens);
        assert_eq!(cursor, SessionCursor::new(0, 2));
        cursor = navigate(cursor, NavCommand::NextVerse, &lens);
        assert_eq!(cursor, SessionCursor::new(0, 2));

        let start = SessionCursor::new(1, 0);
        assert_eq!(navigate(start, NavCommand::PrevVerse, &lens), start);
    }

    #[test]
    fn song_moves_clamp_and_reset_verse() {
        let lens = [3, 2];
        let last = SessionCursor::new(1, 1);
        assert_eq!(navigate(last, NavCommand::NextSong, &lens), SessionCursor::new(1, 0));
        assert_eq!(
            navigate(SessionCursor::new(0, 2), NavCommand::PrevSong, &lens),
            SessionCursor::new(0, 0)
        );
        assert_eq!(
            navigate(SessionCursor::new(0, 2), NavCommand::NextSong, &lens),
            SessionCursor::new(1, 0)
        );
    }

    #[test]
    fn empty_inputs_stay_at_origin() {
        assert_eq!(navigate(SessionCursor::new(4, 4), NavCommand::NextVerse, &[]), SessionCursor::default());
        assert_eq!(navigate(SessionCursor::default(), NavCommand::NextVerse, &[0]), SessionCursor::default());
        assert_eq!(clamp(SessionCursor::new(9, 9), &[0, 5]), SessionCursor::new(1, 4));
    }

    #[test]
    fn latest_report_wins() {
        let channel = Channel::attached();
        let mut endpoint = Loopback::default();
        endpoint.inbox.extend([
            r#"{"kind":"state","songIndex":0,"verseIndex":2}"#.to_string(),
            "garbage".to_string(),
            r#"{"kind":"command","command":"nextSong"}"#.to_string(),
            r#"{"kind":"state","songIndex":0,"verseIndex":1}"#.to_string(),
        ]);
        assert_eq!(channel.latest_report(&mut endpoint), Some(SessionCursor::new(0, 1)));
        assert_eq!(channel.latest_report(&mut endpoint), None);
    }

    #[test]
    fn detached_channel_is_silent() {
        let mut channel = Channel::attached();
        channel.detach();
        let mut endpoint = Loopback::default();
        endpoint.inbox.push_back(r#"{"kind":"state","songIndex":1,"verseIndex":1}"#.to_string());
        assert!(!channel.send(&mut endpoint, &ChannelMessage::state(SessionCursor::default())));
        assert!(endpoint.sent.is_empty());
        assert_eq!(channel.latest_report(&mut endpoint), None);
    }
}
