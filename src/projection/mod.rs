//! Projection sessions: assembling the selected songs, handing them to a
//! display surface and keeping the controller's cursor in step with it.

pub mod assembly;
pub mod channel;
pub mod codec;
pub mod controller;
pub mod display;
pub mod document;
pub mod process_host;
pub mod screens;
pub mod sequence;
pub mod surface;

pub use assembly::{assemble_songs, Assembled, SongSource, SongVerseData};
pub use channel::{Channel, ChannelMessage, Endpoint, NavCommand};
pub use controller::{ProjectionController, SessionEvent, SessionState};
pub use process_host::ProcessHost;
pub use screens::{enumerate, HostScreens, ScreenList, ScreenProbe};
pub use sequence::{ResolvedSong, VerseSequence};
pub use surface::{Closure, LoadPath, Surface, SurfaceHost, SurfaceManager, UnloadHook};
