//! Display surface management: opening a surface, loading the projection
//! document into it, watching for external closure and closing it.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tempfile::{Builder, TempPath};

use super::channel::Endpoint;
use crate::error::SurfaceError;
use crate::models::ScreenDescriptor;

/// Callback run once when a surface unloads, for whatever reason.
pub type UnloadHook = Box<dyn FnOnce()>;

/// A top-level display surface created by a [`SurfaceHost`]. It also carries
/// the cross-context messages of its session.
pub trait Surface: Endpoint {
    /// Point the surface at a document resource.
    fn navigate(&mut self, location: &Path) -> Result<(), SurfaceError>;
    /// Write a whole document into the surface directly.
    fn write_document(&mut self, document: &str) -> Result<(), SurfaceError>;
    fn on_unload(&mut self, hook: UnloadHook);
    /// Liveness check. Closure may happen at any time outside our control.
    fn is_closed(&mut self) -> bool;
    /// Must be safe to call on a surface that is already closed.
    fn close(&mut self);
    /// Why the surface closed itself, when it did so because a document
    /// could not be loaded after [`Surface::navigate`] had already returned.
    fn take_failure(&mut self) -> Option<SurfaceError> {
        None
    }
}

pub trait SurfaceHost {
    fn open_surface(&mut self, screen: &ScreenDescriptor) -> Result<Box<dyn Surface>, SurfaceError>;
}

/// Which loading path a document took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    /// A disposable document file the surface navigated to.
    Resource,
    /// The document was written into the surface directly.
    Direct,
}

/// How a surface was found closed by the liveness poll.
#[derive(Debug)]
pub enum Closure {
    /// Closed from outside, typically by the audience-side user.
    External,
    /// The surface gave up because the document never loaded.
    Failed(SurfaceError),
}

/// Interval timer driving the liveness poll.
#[derive(Debug)]
struct LivenessPoll {
    interval: Duration,
    next_due: Instant,
}

impl LivenessPoll {
    fn due(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.interval;
        true
    }
}

/// Exclusive owner of one session's surface handle. Created when a session
/// starts opening and dropped when it closes; dropping closes the surface.
pub struct SurfaceManager {
    handle: Option<Box<dyn Surface>>,
    poll: Option<LivenessPoll>,
}

impl SurfaceManager {
    /// Ask the host for a surface placed on `screen` and start the liveness
    /// poll. A refusal maps to [`SurfaceError::Refused`].
    pub fn open(
        host: &mut dyn SurfaceHost,
        screen: &ScreenDescriptor,
        poll_interval: Duration,
        now: Instant,
    ) -> Result<Self, SurfaceError> {
        let handle = host.open_surface(screen)?;
        info!(
            "opened display surface on {} at {}x{}+{}+{}",
            screen.label, screen.width, screen.height, screen.left, screen.top
        );
        Ok(Self {
            handle: Some(handle),
            poll: Some(LivenessPoll {
                interval: poll_interval,
                next_due: now + poll_interval,
            }),
        })
    }

    /// Load `document`, preferring a disposable file the surface navigates
    /// to, and falling back to writing it directly. When both paths fail the
    /// file is released and the handle is invalidated.
    pub fn load(&mut self, document: &str) -> Result<LoadPath, SurfaceError> {
        let handle = self.handle.as_mut().ok_or(SurfaceError::Closed)?;

        let resource = match disposable_document(document) {
            Ok(path) => match handle.navigate(&path) {
                Ok(()) => {
                    debug!("document loaded from {}", path.display());
                    handle.on_unload(Box::new(move || release(path)));
                    return Ok(LoadPath::Resource);
                }
                Err(err) => {
                    warn!("surface rejected document resource: {err}");
                    Some(path)
                }
            },
            Err(err) => {
                warn!("could not create document resource: {err}");
                None
            }
        };

        match handle.write_document(document) {
            Ok(()) => {
                debug!("document written directly");
                if let Some(path) = resource {
                    release(path);
                }
                Ok(LoadPath::Direct)
            }
            Err(err) => {
                if let Some(path) = resource {
                    release(path);
                }
                self.close();
                Err(err)
            }
        }
    }

    /// Run the liveness check when the poll interval has elapsed. Returns a
    /// closure exactly once, when it is first detected.
    pub fn check_liveness(&mut self, now: Instant) -> Option<Closure> {
        let poll = self.poll.as_mut()?;
        if !poll.due(now) {
            return None;
        }
        let closure = match self.handle.as_mut() {
            Some(handle) => {
                if !handle.is_closed() {
                    return None;
                }
                handle.take_failure().map_or(Closure::External, Closure::Failed)
            }
            None => Closure::External,
        };
        match &closure {
            Closure::External => info!("display surface was closed externally"),
            Closure::Failed(err) => warn!("display surface gave up on the document: {err}"),
        }
        self.close();
        Some(closure)
    }

    /// Immediate liveness check, outside the poll schedule.
    pub fn is_alive(&mut self) -> bool {
        self.handle.as_mut().is_some_and(|handle| !handle.is_closed())
    }

    /// Idempotent: stops the poll and closes the handle if one is left.
    pub fn close(&mut self) {
        self.poll = None;
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }
}

impl Endpoint for SurfaceManager {
    fn post(&mut self, message: &str) -> bool {
        match self.handle.as_mut() {
            Some(handle) => handle.post(message),
            None => false,
        }
    }

    fn poll(&mut self) -> Option<String> {
        self.handle.as_mut()?.poll()
    }
}

impl Drop for SurfaceManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn disposable_document(document: &str) -> Result<TempPath, SurfaceError> {
    let file = Builder::new()
        .prefix("projection-")
        .suffix(".html")
        .tempfile()?;
    fs::write(file.path(), document)?;
    Ok(file.into_temp_path())
}

fn release(path: TempPath) {
    if let Err(err) = path.close() {
        warn!("failed to remove document resource: {err}");
    }
}
