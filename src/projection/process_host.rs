//! Display surfaces backed by a separate process.
//!
//! The controller owns the terminal it runs in, so each projection display is
//! this executable running in `display` mode inside a new terminal window.
//! The two processes talk over `ipc-channel`:
//!
//! ```text
//! controller: IpcOneShotServer --(name on the command line)--> display
//! display:    IpcSender::connect(name).send((to_display, from_display))
//! controller: reader thread: from_display -> mpsc -> ProcessSurface
//! ```
//!
//! Terminal launchers often fork and exit right away, so the launcher
//! process is only a weak liveness signal. The IPC link is the real one.

use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ipc_channel::ipc::{self, IpcOneShotServer, IpcReceiver, IpcSender};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use super::channel::Endpoint;
use super::surface::{Surface, SurfaceHost, UnloadHook};
use crate::config::Config;
use crate::error::SurfaceError;
use crate::models::ScreenDescriptor;

/// Everything exchanged between controller and display processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Load the document stored at this path.
    Navigate(PathBuf),
    /// Load this document text.
    Write(String),
    /// A JSON-encoded channel message, in either direction.
    Message(String),
    /// Display to controller: the last document frame could not be loaded.
    Rejected(String),
    /// Controller to display: close the window. Display to controller: the
    /// window is closing.
    Close,
}

pub type FrameSender = IpcSender<Frame>;
pub type FrameReceiver = IpcReceiver<Frame>;
/// Sent once by the display: a sender into the display and a receiver of the
/// display's frames.
pub type Bootstrap = (FrameSender, FrameReceiver);

/// Name of the thread waiting for a display process to connect.
const ACCEPT_THREAD: &str = "display-accept";

/// Opens display surfaces by launching `<launcher...> <exe> display <server>`.
pub struct ProcessHost {
    launcher: Vec<String>,
    program: PathBuf,
    cell_width: u32,
    cell_height: u32,
    connect_timeout: Duration,
}

impl ProcessHost {
    pub fn from_config(config: &Config) -> Result<Self> {
        let program = env::current_exe().context("failed to locate the running executable")?;
        Ok(Self {
            launcher: config.launcher.clone(),
            program,
            cell_width: config.cell_width.max(1),
            cell_height: config.cell_height.max(1),
            connect_timeout: config.connect_timeout(),
        })
    }

    fn command(&self, screen: &ScreenDescriptor, server_name: &str) -> Result<Command, SurfaceError> {
        let (launcher, launcher_args) = self
            .launcher
            .split_first()
            .ok_or_else(|| SurfaceError::Refused("no terminal launcher configured".into()))?;

        let cols = (screen.width / self.cell_width).max(20);
        let rows = (screen.height / self.cell_height).max(5);
        let fill = |arg: &str| {
            arg.replace("{left}", &screen.left.to_string())
                .replace("{top}", &screen.top.to_string())
                .replace("{width}", &screen.width.to_string())
                .replace("{height}", &screen.height.to_string())
                .replace("{cols}", &cols.to_string())
                .replace("{rows}", &rows.to_string())
        };

        let mut command = Command::new(launcher);
        command
            .args(launcher_args.iter().map(|arg| fill(arg)))
            .arg(&self.program)
            .args(["display", server_name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Ok(command)
    }
}

impl SurfaceHost for ProcessHost {
    fn open_surface(&mut self, screen: &ScreenDescriptor) -> Result<Box<dyn Surface>, SurfaceError> {
        let (server, server_name) = IpcOneShotServer::<Bootstrap>::new()
            .map_err(|err| SurfaceError::Refused(format!("could not create IPC server: {err}")))?;
        let mut command = self.command(screen, &server_name)?;
        let mut launcher = command
            .spawn()
            .map_err(|err| SurfaceError::Refused(format!("{:?}: {err}", command.get_program())))?;
        info!("launched display process {} via {:?}", launcher.id(), command.get_program());

        let (link_tx, link_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(ACCEPT_THREAD.into())
            .spawn(move || accept_display(server, link_tx));
        if let Err(err) = spawned {
            let _ = launcher.kill();
            let _ = launcher.wait();
            return Err(err.into());
        }

        Ok(Box::new(ProcessSurface::new(
            launcher,
            server_name,
            link_rx,
            self.connect_timeout,
        )))
    }
}

/// Established connection to a display process.
struct Link {
    to_display: FrameSender,
    from_display: Receiver<Frame>,
}

/// Wait for the display to connect, then forward its frames until it goes
/// away. Dropping `inbound` is what tells the surface the link is gone.
///
/// A surface that gives up on its display connects a throwaway bootstrap of
/// its own, so `accept` returns and the `link_tx` send fails.
fn accept_display(server: IpcOneShotServer<Bootstrap>, link_tx: Sender<Link>) {
    let (to_display, from_display) = match server.accept() {
        Ok((_, bootstrap)) => bootstrap,
        Err(err) => {
            warn!("display process never connected: {err:?}");
            return;
        }
    };
    let (inbound, inbound_rx) = mpsc::channel();
    let link = Link {
        to_display,
        from_display: inbound_rx,
    };
    if link_tx.send(link).is_err() {
        debug!("no surface is waiting for this display any more");
        return;
    }
    debug!("display process connected");
    while let Ok(frame) = from_display.recv() {
        if inbound.send(frame).is_err() {
            break;
        }
    }
    debug!("display link closed");
}

pub struct ProcessSurface {
    launcher: Child,
    launched_at: Instant,
    connect_timeout: Duration,
    server_name: String,
    pending: Option<Receiver<Link>>,
    link: Option<Link>,
    /// Document frames waiting for the link.
    outbox: Vec<Frame>,
    /// Document file last navigated to, until the display loads it or the
    /// direct write replaces it.
    resource: Option<PathBuf>,
    inbox: VecDeque<String>,
    hooks: Vec<UnloadHook>,
    failure: Option<SurfaceError>,
    closed: bool,
}

impl ProcessSurface {
    fn new(launcher: Child, server_name: String, pending: Receiver<Link>, connect_timeout: Duration) -> Self {
        Self {
            launcher,
            launched_at: Instant::now(),
            connect_timeout,
            server_name,
            pending: Some(pending),
            link: None,
            outbox: Vec::new(),
            resource: None,
            inbox: VecDeque::new(),
            hooks: Vec::new(),
            failure: None,
            closed: false,
        }
    }

    /// Pick up the link once it exists and drain frames from it.
    fn pump(&mut self) {
        if self.closed {
            return;
        }
        if self.link.is_none() {
            self.await_link();
            if self.link.is_none() {
                return;
            }
        }

        let mut lost = false;
        let mut rejected = None;
        if let Some(link) = &self.link {
            loop {
                match link.from_display.try_recv() {
                    Ok(Frame::Message(message)) => self.inbox.push_back(message),
                    Ok(Frame::Rejected(reason)) => rejected = Some(reason),
                    Ok(Frame::Close) => {
                        debug!("display announced it is closing");
                        lost = true;
                        break;
                    }
                    Ok(other) => trace!("ignoring unexpected frame from display: {other:?}"),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        lost = true;
                        break;
                    }
                }
            }
        }
        if let Some(reason) = rejected {
            self.fall_back_to_write(reason);
        }
        if lost {
            self.mark_closed();
        }
    }

    /// The display could not load the document. Send the file's contents
    /// instead when it was a navigation; give up on the surface otherwise.
    fn fall_back_to_write(&mut self, reason: String) {
        warn!("display rejected the document: {reason}");
        let result = match self.resource.take() {
            Some(path) => fs::read_to_string(&path)
                .map_err(SurfaceError::from)
                .and_then(|document| self.send_now(Frame::Write(document))),
            None => Err(SurfaceError::Rejected(reason)),
        };
        match result {
            Ok(()) => debug!("document re-sent for direct write"),
            Err(err) => {
                self.failure = Some(err);
                self.close();
            }
        }
    }

    fn send_now(&self, frame: Frame) -> Result<(), SurfaceError> {
        let link = self.link.as_ref().ok_or(SurfaceError::Closed)?;
        link.to_display
            .send(frame)
            .map_err(|err| SurfaceError::Rejected(format!("{err:?}")))
    }

    fn await_link(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        match pending.try_recv() {
            Ok(link) => {
                self.pending = None;
                for frame in self.outbox.drain(..) {
                    if let Err(err) = link.to_display.send(frame) {
                        warn!("failed to deliver queued frame: {err:?}");
                    }
                }
                self.link = Some(link);
            }
            Err(TryRecvError::Empty) => {
                let launcher_failed = matches!(self.launcher.try_wait(), Ok(Some(status)) if !status.success());
                if launcher_failed || self.launched_at.elapsed() >= self.connect_timeout {
                    warn!("display process did not connect");
                    self.mark_closed();
                }
            }
            Err(TryRecvError::Disconnected) => self.mark_closed(),
        }
    }

    fn send_or_queue(&mut self, frame: Frame) -> Result<(), SurfaceError> {
        self.pump();
        if self.closed {
            return Err(SurfaceError::Closed);
        }
        if self.link.is_some() {
            self.send_now(frame)
        } else {
            self.outbox.push(frame);
            Ok(())
        }
    }

    fn mark_closed(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let never_connected = self.link.take().is_none();
        if self.pending.take().is_some() {
            self.release_acceptor();
        }
        self.outbox.clear();
        self.resource = None;
        if never_connected && matches!(self.launcher.try_wait(), Ok(None)) {
            let _ = self.launcher.kill();
            let _ = self.launcher.wait();
        } else {
            let _ = self.launcher.try_wait();
        }
        for hook in self.hooks.drain(..) {
            hook();
        }
    }

    /// Unpark the accept thread of a display that never connected.
    fn release_acceptor(&self) {
        let unblock = || -> Result<()> {
            let (to_nowhere, _) = ipc::channel::<Frame>()?;
            let (_, from_nowhere) = ipc::channel::<Frame>()?;
            IpcSender::<Bootstrap>::connect(self.server_name.clone())?.send((to_nowhere, from_nowhere))?;
            Ok(())
        };
        if let Err(err) = unblock() {
            debug!("accept thread already gone: {err:#}");
        }
    }
}

impl Endpoint for ProcessSurface {
    fn post(&mut self, message: &str) -> bool {
        match &self.link {
            Some(link) if !self.closed => link.to_display.send(Frame::Message(message.to_string())).is_ok(),
            _ => false,
        }
    }

    fn poll(&mut self) -> Option<String> {
        self.pump();
        self.inbox.pop_front()
    }
}

impl Surface for ProcessSurface {
    fn navigate(&mut self, location: &Path) -> Result<(), SurfaceError> {
        self.send_or_queue(Frame::Navigate(location.to_path_buf()))?;
        self.resource = Some(location.to_path_buf());
        Ok(())
    }

    fn write_document(&mut self, document: &str) -> Result<(), SurfaceError> {
        self.resource = None;
        self.send_or_queue(Frame::Write(document.to_string()))
    }

    fn on_unload(&mut self, hook: UnloadHook) {
        if self.closed {
            hook();
        } else {
            self.hooks.push(hook);
        }
    }

    fn is_closed(&mut self) -> bool {
        self.pump();
        self.closed
    }

    fn take_failure(&mut self) -> Option<SurfaceError> {
        self.failure.take()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(link) = &self.link {
            let _ = link.to_display.send(Frame::Close);
        }
        self.mark_closed();
    }
}

impl Drop for ProcessSurface {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::Write;
    use std::rc::Rc;

    use tempfile::NamedTempFile;

    use super::*;

    fn host(launcher: &[&str]) -> ProcessHost {
        ProcessHost {
            launcher: launcher.iter().map(|arg| arg.to_string()).collect(),
            program: PathBuf::from("/usr/bin/choir-projector"),
            cell_width: 10,
            cell_height: 20,
            connect_timeout: Duration::ZERO,
        }
    }

    fn second_screen() -> ScreenDescriptor {
        ScreenDescriptor {
            left: 1920,
            top: 0,
            width: 1280,
            height: 720,
            is_primary: false,
            label: "Display 2".into(),
        }
    }

    #[test]
    fn launcher_placeholders_follow_the_screen() {
        let command = host(&["xterm", "-geometry", "{cols}x{rows}+{left}+{top}", "-e"])
            .command(&second_screen(), "server-1")
            .unwrap();
        let args: Vec<String> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(command.get_program(), "xterm");
        assert_eq!(
            args,
            ["-geometry", "128x36+1920+0", "-e", "/usr/bin/choir-projector", "display", "server-1"]
        );
    }

    #[test]
    fn missing_launcher_is_a_refusal() {
        assert!(matches!(
            host(&[]).command(&second_screen(), "server-1"),
            Err(SurfaceError::Refused(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn display_that_never_connects_is_closed_once() {
        let launcher = Command::new("sleep").arg("30").spawn().unwrap();
        let (_link_tx, link_rx) = mpsc::channel();
        let mut surface = ProcessSurface::new(launcher, String::new(), link_rx, Duration::ZERO);

        let unloads = Rc::new(Cell::new(0));
        let counter = Rc::clone(&unloads);
        surface.on_unload(Box::new(move || counter.set(counter.get() + 1)));

        assert!(surface.is_closed());
        assert!(surface.launcher.try_wait().unwrap().is_some());
        assert!(!surface.post("{}"));
        surface.close();
        assert_eq!(unloads.get(), 1);
    }

    #[cfg(target_os = "linux")]
    fn accept_threads() -> usize {
        fs::read_dir("/proc/self/task")
            .unwrap()
            .filter_map(|task| fs::read_to_string(task.ok()?.path().join("comm")).ok())
            .filter(|name| name.trim_end() == ACCEPT_THREAD)
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_opens_do_not_leave_accept_threads_behind() {
        let mut host = host(&["false"]);
        for _ in 0..5 {
            let mut surface = host.open_surface(&second_screen()).unwrap();
            assert!(surface.is_closed());
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while accept_threads() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(accept_threads(), 0);
    }

    /// Surface already linked to an in-test "display": frames sent to the
    /// display arrive on the returned receiver, frames pushed into the
    /// returned sender look like they came from it.
    #[cfg(unix)]
    fn linked_surface() -> (ProcessSurface, FrameReceiver, Sender<Frame>) {
        let launcher = Command::new("true").spawn().unwrap();
        let (to_display, display_rx) = ipc::channel::<Frame>().unwrap();
        let (inbound, from_display) = mpsc::channel();
        let (link_tx, link_rx) = mpsc::channel();
        link_tx
            .send(Link {
                to_display,
                from_display,
            })
            .unwrap();
        let surface = ProcessSurface::new(launcher, String::new(), link_rx, Duration::from_secs(60));
        (surface, display_rx, inbound)
    }

    #[cfg(unix)]
    #[test]
    fn rejected_navigation_is_resent_as_direct_write() {
        let (mut surface, display_rx, inbound) = linked_surface();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"<html>songs</html>").unwrap();

        surface.navigate(file.path()).unwrap();
        assert_eq!(display_rx.recv().unwrap(), Frame::Navigate(file.path().to_path_buf()));

        inbound.send(Frame::Rejected("permission denied".into())).unwrap();
        assert!(!surface.is_closed());
        assert_eq!(display_rx.recv().unwrap(), Frame::Write("<html>songs</html>".into()));
        assert!(surface.take_failure().is_none());

        inbound.send(Frame::Rejected("not a projection document".into())).unwrap();
        assert!(surface.is_closed());
        assert!(matches!(surface.take_failure(), Some(SurfaceError::Rejected(_))));
        assert_eq!(display_rx.recv().unwrap(), Frame::Close);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_fallback_document_closes_the_surface() {
        let (mut surface, display_rx, inbound) = linked_surface();
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        surface.navigate(&path).unwrap();
        assert_eq!(display_rx.recv().unwrap(), Frame::Navigate(path));
        drop(file);

        inbound.send(Frame::Rejected("no such file".into())).unwrap();
        assert!(surface.is_closed());
        assert!(matches!(surface.take_failure(), Some(SurfaceError::Io(_))));
    }
}
