use crate::engine::EngineError;
use anyhow::{Context, Result};
use evdev::{AttributeSetRef, Device, InputEvent, Key};
use mowz_core::bindings::{CHORD_MODIFIER, STEP_MODIFIER, TOGGLE_KEY};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The physical keyboard as seen by the translation loop.
pub trait KeyboardSource {
    /// Fail if this keyboard cannot produce the toggle chord.
    fn check_ready(&self) -> Result<(), EngineError>;
    /// Block until the next event arrives.
    fn read_event(&mut self) -> io::Result<InputEvent>;
    /// Withhold (true) or restore (false) this keyboard's events from the
    /// rest of the system.
    fn set_exclusive_capture(&mut self, grab: bool) -> io::Result<()>;
}

/// An evdev keyboard opened for blocking reads.
pub struct Keyboard {
    dev: Device,
    path: PathBuf,
    /// Events from the last kernel read not yet handed out.
    pending: VecDeque<InputEvent>,
}

impl Keyboard {
    pub fn open(path: &Path) -> Result<Self> {
        let dev = Device::open(path).with_context(|| format!("opening {}", path.display()))?;
        info!(device = %dev.name().unwrap_or("unknown"), path = %path.display(), "opened keyboard");
        Ok(Self {
            dev,
            path: path.to_path_buf(),
            pending: VecDeque::new(),
        })
    }
}

impl KeyboardSource for Keyboard {
    fn check_ready(&self) -> Result<(), EngineError> {
        match self.dev.supported_keys().map(missing_chord_key) {
            None => Err(EngineError::DeviceNotReady(format!(
                "{} reports no keys",
                self.path.display()
            ))),
            Some(Some(code)) => Err(EngineError::DeviceNotReady(format!(
                "{} has no key {}",
                self.path.display(),
                code
            ))),
            Some(None) => Ok(()),
        }
    }

    fn read_event(&mut self) -> io::Result<InputEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            self.pending.extend(self.dev.fetch_events()?);
        }
    }

    fn set_exclusive_capture(&mut self, grab: bool) -> io::Result<()> {
        if grab {
            self.dev.grab()
        } else {
            self.dev.ungrab()
        }
    }
}

/// Pick the keyboard to read: the configured path if any, otherwise the
/// lowest-numbered event node that can type the toggle chord and is not our
/// own virtual pointer.
pub fn select_keyboard(configured: Option<&Path>, own_name: &str) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    evdev::enumerate()
        .filter(|(path, dev)| {
            let usable = dev.name() != Some(own_name)
                && dev
                    .supported_keys()
                    .is_some_and(|keys| missing_chord_key(keys).is_none());
            debug!(path = %path.display(), name = ?dev.name(), usable, "checked input device");
            usable
        })
        .map(|(path, _)| path)
        .min_by_key(|path| event_index(path))
        .context("no keyboard found: check permissions or set device.keyboard in the config")
}

/// First key of the toggle chord that `keys` lacks.
fn missing_chord_key(keys: &AttributeSetRef<Key>) -> Option<u16> {
    [STEP_MODIFIER, CHORD_MODIFIER, TOGGLE_KEY]
        .into_iter()
        .find(|&code| !keys.contains(Key::new(code)))
}

/// `event12` sorts after `event3`.
fn event_index(path: &Path) -> (u32, PathBuf) {
    let index = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("event"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX);
    (index, path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::AttributeSet;

    #[test]
    fn configured_keyboard_wins_over_detection() {
        let path = Path::new("/dev/input/event3");
        assert_eq!(select_keyboard(Some(path), "mowz").unwrap(), path);
    }

    #[test]
    fn event_nodes_sort_numerically() {
        let mut paths = vec![
            PathBuf::from("/dev/input/event12"),
            PathBuf::from("/dev/input/event3"),
            PathBuf::from("/dev/input/event0"),
        ];
        paths.sort_by_key(|p| event_index(p));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/dev/input/event0"),
                PathBuf::from("/dev/input/event3"),
                PathBuf::from("/dev/input/event12"),
            ]
        );
    }

    #[test]
    fn full_keyboard_has_every_chord_key() {
        let keys: AttributeSet<Key> = [Key::KEY_A, Key::KEY_LEFTCTRL, Key::KEY_LEFTALT, Key::KEY_M]
            .into_iter()
            .collect();
        assert_eq!(missing_chord_key(&keys), None);
    }

    #[test]
    fn media_pad_without_toggle_key_is_rejected() {
        let keys: AttributeSet<Key> = [Key::KEY_LEFTCTRL, Key::KEY_LEFTALT, Key::KEY_VOLUMEUP]
            .into_iter()
            .collect();
        assert_eq!(missing_chord_key(&keys), Some(TOGGLE_KEY));
    }

    #[test]
    fn pointer_buttons_alone_are_rejected() {
        // What our own virtual device reports.
        let keys: AttributeSet<Key> = [Key::BTN_LEFT, Key::BTN_RIGHT, Key::BTN_MIDDLE]
            .into_iter()
            .collect();
        assert_eq!(missing_chord_key(&keys), Some(STEP_MODIFIER));
    }

    #[test]
    fn chord_keys_are_evdev_codes() {
        assert_eq!(Key::new(STEP_MODIFIER), Key::KEY_LEFTCTRL);
        assert_eq!(Key::new(CHORD_MODIFIER), Key::KEY_LEFTALT);
        assert_eq!(Key::new(TOGGLE_KEY), Key::KEY_M);
    }
}
