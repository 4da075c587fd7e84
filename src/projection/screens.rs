//! Screen enumeration for placing the display surface.
//!
//! The host is asked for detailed screen geometry first. When that capability
//! is missing, the primary display's size is used, with a synthesized second
//! screen to its right if the host reports an extended desktop. Errors only
//! ever reduce the list; it is never empty.

use std::cell::OnceCell;
use std::io::ErrorKind;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};

use crate::config::ScreenConfig;
use crate::models::ScreenDescriptor;

/// Placement used when not even the primary display size is known.
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;

/// A screen as reported by a detailed enumeration, label optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedScreen {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
    pub label: Option<String>,
}

/// Host capabilities consulted by [`enumerate`].
pub trait ScreenProbe {
    /// `Ok(None)` when the host has no detailed enumeration at all, `Err` when
    /// it has one but it failed (for example, permission denied).
    fn detailed_screens(&self) -> Result<Option<Vec<DetectedScreen>>>;
    fn primary_size(&self) -> Option<(u32, u32)>;
    fn is_extended(&self) -> bool;
}

pub fn enumerate(probe: &dyn ScreenProbe) -> Vec<ScreenDescriptor> {
    match probe.detailed_screens() {
        Ok(Some(screens)) if !screens.is_empty() => screens
            .into_iter()
            .enumerate()
            .map(|(idx, screen)| ScreenDescriptor {
                left: screen.left,
                top: screen.top,
                width: screen.width,
                height: screen.height,
                is_primary: screen.is_primary,
                label: screen
                    .label
                    .filter(|label| !label.trim().is_empty())
                    .unwrap_or_else(|| format!("Display {}", idx + 1)),
            })
            .collect(),
        Ok(_) => {
            debug!("detailed screen enumeration unavailable, using primary display");
            from_primary(probe)
        }
        Err(err) => {
            warn!("screen enumeration failed: {err:#}");
            let (width, height) = probe.primary_size().unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
            vec![ScreenDescriptor {
                left: 0,
                top: 0,
                width,
                height,
                is_primary: true,
                label: "Display 1".to_string(),
            }]
        }
    }
}

fn from_primary(probe: &dyn ScreenProbe) -> Vec<ScreenDescriptor> {
    let Some((width, height)) = probe.primary_size() else {
        return vec![ScreenDescriptor {
            left: 0,
            top: 0,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            is_primary: true,
            label: "Display 1".to_string(),
        }];
    };

    let primary = ScreenDescriptor {
        left: 0,
        top: 0,
        width,
        height,
        is_primary: true,
        label: "Primary Display".to_string(),
    };
    if !probe.is_extended() {
        return vec![primary];
    }
    let secondary = ScreenDescriptor {
        left: i32::try_from(width).unwrap_or(i32::MAX),
        top: 0,
        width,
        height,
        is_primary: false,
        label: "Secondary Display".to_string(),
    };
    vec![primary, secondary]
}

/// Screens computed on first use and kept for the controller's lifetime.
pub struct ScreenList<P> {
    probe: P,
    screens: OnceCell<Vec<ScreenDescriptor>>,
}

impl<P: ScreenProbe> ScreenList<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            screens: OnceCell::new(),
        }
    }

    pub fn screens(&self) -> &[ScreenDescriptor] {
        self.screens.get_or_init(|| enumerate(&self.probe))
    }
}

/// Probe backed by `xrandr --listmonitors` and the configured fallback.
pub struct HostScreens {
    fallback: ScreenConfig,
}

impl HostScreens {
    pub fn new(fallback: ScreenConfig) -> Self {
        Self { fallback }
    }
}

impl ScreenProbe for HostScreens {
    fn detailed_screens(&self) -> Result<Option<Vec<DetectedScreen>>> {
        let output = match Command::new("xrandr").arg("--listmonitors").output() {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).context("failed to run xrandr"),
        };
        if !output.status.success() {
            return Err(anyhow!(
                "xrandr exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(Some(parse_monitors(&String::from_utf8_lossy(&output.stdout))))
    }

    fn primary_size(&self) -> Option<(u32, u32)> {
        self.fallback.width.zip(self.fallback.height)
    }

    fn is_extended(&self) -> bool {
        self.fallback.extended
    }
}

/// Parse `xrandr --listmonitors` lines such as
/// ` 0: +*DP-1 1920/527x1080/296+0+0  DP-1`.
pub fn parse_monitors(listing: &str) -> Vec<DetectedScreen> {
    listing.lines().filter_map(parse_monitor_line).collect()
}

fn parse_monitor_line(line: &str) -> Option<DetectedScreen> {
    let (_, rest) = line.trim().split_once(": ")?;
    let mut fields = rest.split_whitespace();
    let flagged_name = fields.next()?;
    let geometry = fields.next()?;
    let label = fields.next().map(str::to_string);

    let is_primary = flagged_name.trim_start_matches('+').starts_with('*');
    let (width_part, rest) = geometry.split_once('x')?;
    let mut offsets = rest.splitn(3, '+');
    let height_part = offsets.next()?;
    let left = offsets.next()?.parse().ok()?;
    let top = offsets.next()?.parse().ok()?;
    let width = width_part.split('/').next()?.parse().ok()?;
    let height = height_part.split('/').next()?.parse().ok()?;

    Some(DetectedScreen {
        left,
        top,
        width,
        height,
        is_primary,
        label,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct FakeProbe {
        detailed: fn() -> Result<Option<Vec<DetectedScreen>>>,
        primary: Option<(u32, u32)>,
        extended: bool,
        calls: Cell<usize>,
    }

    impl FakeProbe {
        fn new(detailed: fn() -> Result<Option<Vec<DetectedScreen>>>) -> Self {
            Self {
                detailed,
                primary: Some((1920, 1080)),
                extended: false,
                calls: Cell::new(0),
            }
        }
    }

    impl ScreenProbe for FakeProbe {
        fn detailed_screens(&self) -> Result<Option<Vec<DetectedScreen>>> {
            self.calls.set(self.calls.get() + 1);
            (self.detailed)()
        }

        fn primary_size(&self) -> Option<(u32, u32)> {
            self.primary
        }

        fn is_extended(&self) -> bool {
            self.extended
        }
    }

    fn two_screens() -> Result<Option<Vec<DetectedScreen>>> {
        Ok(Some(vec![
            DetectedScreen {
                left: 0,
                top: 0,
                width: 1920,
                height: 1080,
                is_primary: true,
                label: Some("DP-1".into()),
            },
            DetectedScreen {
                left: 1920,
                top: 0,
                width: 1280,
                height: 1024,
                is_primary: false,
                label: None,
            },
        ]))
    }

    #[test]
    fn detailed_screens_are_used_first() {
        let screens = enumerate(&FakeProbe::new(two_screens));
        assert_eq!(screens.len(), 2);
        assert_eq!(screens[0].label, "DP-1");
        assert_eq!(screens[1].label, "Display 2");
        assert_eq!(screens[1].left, 1920);
    }

    #[test]
    fn unsupported_enumeration_uses_primary_and_extension() {
        let mut probe = FakeProbe::new(|| Ok(None));
        assert_eq!(enumerate(&probe).len(), 1);
        probe.extended = true;
        let screens = enumerate(&probe);
        assert_eq!(screens.len(), 2);
        assert_eq!(screens[1].label, "Secondary Display");
        assert_eq!(screens[1].left, 1920);
        assert!(!screens[1].is_primary);
    }

    #[test]
    fn failures_degrade_to_one_screen() {
        let mut probe = FakeProbe::new(|| Err(anyhow!("permission denied")));
        probe.extended = true;
        let screens = enumerate(&probe);
        assert_eq!(screens.len(), 1);
        assert_eq!(screens[0].label, "Display 1");
        assert_eq!((screens[0].width, screens[0].height), (1920, 1080));

        probe.primary = None;
        let screens = enumerate(&probe);
        assert_eq!((screens[0].width, screens[0].height), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
    }

    #[test]
    fn unknown_primary_size_gives_default_placement() {
        let mut probe = FakeProbe::new(|| Ok(Some(Vec::new())));
        probe.primary = None;
        let screens = enumerate(&probe);
        assert_eq!(screens.len(), 1);
        assert_eq!(screens[0].width, DEFAULT_WIDTH);
    }

    #[test]
    fn list_is_computed_once() {
        let list = ScreenList::new(FakeProbe::new(two_screens));
        assert_eq!(list.screens().len(), 2);
        assert!(list.screens().get(1).is_some());
        assert_eq!(list.probe.calls.get(), 1);
    }

    #[test]
    fn parses_xrandr_listing() {
        let listing = "Monitors: 2\n 0: +*DP-1 1920/527x1080/296+0+0  DP-1\n 1: +HDMI-1 1280/338x1024/270+1920+0  HDMI-1\n";
        let screens = parse_monitors(listing);
        assert_eq!(screens.len(), 2);
        assert!(screens[0].is_primary);
        assert_eq!((screens[1].left, screens[1].width, screens[1].height), (1920, 1280, 1024));
        assert_eq!(screens[1].label.as_deref(), Some("HDMI-1"));
        assert!(!screens[1].is_primary);
    }
}
