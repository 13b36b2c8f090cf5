use crate::emitter::{self, EventEmitter};
use crate::keyboard::KeyboardSource;
use evdev::{EventType, InputEvent, RelativeAxisType};
use mowz_core::bindings::{
    self, Binding, ScrollAxis, BASE_STEP, CHORD_MODIFIER, FAST_STEP, STEP_MODIFIER, TOGGLE_KEY,
};
use nix::errno::Errno;
use std::convert::Infallible;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

const KEY_RELEASED: i32 = 0;
const KEY_DEPRESSED: i32 = 1;
const KEY_REPEAT: i32 = 2;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The keyboard handed to `run` cannot drive the engine.
    #[error("device not ready: {0}")]
    DeviceNotReady(String),
    /// The keyboard handle went away (unplugged, closed).
    #[error("keyboard device lost")]
    DeviceLost(#[source] io::Error),
}

/// Actions that the engine wants the caller to perform, in order.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    /// Write the event to the virtual device, followed by a SYN_REPORT.
    Emit(InputEvent),
    /// Grab (true) or release (false) the physical keyboard.
    Capture(bool),
}

/// Session state for one keyboard.
#[derive(Debug)]
pub struct Engine {
    grabbed: bool,
    ctrl_held: bool,
    alt_held: bool,
    step: i32,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            grabbed: false,
            ctrl_held: false,
            alt_held: false,
            step: BASE_STEP,
        }
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Process an input event, returning actions for the caller.
    pub fn process_event(&mut self, event: InputEvent) -> Vec<Action> {
        // SYN and MSC records interleaved by the keyboard carry no key state
        if event.event_type() != EventType::KEY {
            return Vec::new();
        }

        let code = event.code();
        let value = event.value(); // 0=release, 1=press, 2=repeat
        let mut actions = Vec::new();

        match code {
            STEP_MODIFIER => {
                if value == KEY_DEPRESSED {
                    self.ctrl_held = true;
                    self.step = FAST_STEP;
                } else if value == KEY_RELEASED {
                    self.ctrl_held = false;
                    self.step = BASE_STEP;
                }
            }
            CHORD_MODIFIER => {
                if value == KEY_DEPRESSED {
                    self.alt_held = true;
                } else if value == KEY_RELEASED {
                    self.alt_held = false;
                }
            }
            TOGGLE_KEY => {
                if value == KEY_DEPRESSED && self.ctrl_held && self.alt_held {
                    self.grabbed = !self.grabbed;
                    info!(grabbed = self.grabbed, "grab toggled");
                    // The chord press belongs to the toggle, not to the key's binding.
                    return actions;
                } else if value == KEY_RELEASED {
                    // Capture follows the flag as it stands now, not at press time.
                    actions.push(Action::Capture(self.grabbed));
                }
            }
            _ => {}
        }

        if !self.grabbed {
            return actions;
        }

        match value {
            KEY_DEPRESSED | KEY_REPEAT => self.handle_press(code, value, &mut actions),
            KEY_RELEASED => self.handle_release(code, &mut actions),
            _ => {}
        }
        actions
    }

    fn handle_press(&self, code: u16, value: i32, actions: &mut Vec<Action>) {
        match bindings::lookup(code) {
            Binding::Move { dx, dy } => {
                if dx != 0 {
                    actions.push(Action::Emit(rel(RelativeAxisType::REL_X, dx * self.step)));
                }
                if dy != 0 {
                    actions.push(Action::Emit(rel(RelativeAxisType::REL_Y, dy * self.step)));
                }
            }
            // Buttons are edge-triggered: autorepeat must not re-press them.
            Binding::Button(button) => {
                if value == KEY_DEPRESSED {
                    actions.push(Action::Emit(button_event(button, KEY_DEPRESSED)));
                }
            }
            Binding::Scroll { axis, delta } => {
                let axis = match axis {
                    ScrollAxis::Vertical => RelativeAxisType::REL_WHEEL,
                    ScrollAxis::Horizontal => RelativeAxisType::REL_HWHEEL,
                };
                actions.push(Action::Emit(rel(axis, delta)));
            }
            Binding::Unbound => {}
        }
    }

    fn handle_release(&self, code: u16, actions: &mut Vec<Action>) {
        if let Binding::Button(button) = bindings::lookup(code) {
            actions.push(Action::Emit(button_event(button, KEY_RELEASED)));
        }
    }
}

fn rel(axis: RelativeAxisType, value: i32) -> InputEvent {
    InputEvent::new(EventType::RELATIVE, axis.0, value)
}

fn button_event(button: u16, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, button, value)
}

/// Errors after which the keyboard handle is unusable.
fn is_handle_gone(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error().map(Errno::from_raw),
        Some(Errno::ENODEV) | Some(Errno::EBADF)
    )
}

/// Translate keyboard events into pointer events until the keyboard fails.
///
/// Never returns `Ok`. Read, write and grab failures inside the loop are
/// logged and skipped; only an unusable keyboard ends it.
pub fn run(
    keyboard: &mut impl KeyboardSource,
    vdev: &mut impl EventEmitter,
) -> Result<Infallible, EngineError> {
    keyboard.check_ready()?;

    let mut engine = Engine::new();
    info!("translation loop running");

    loop {
        let event = match keyboard.read_event() {
            Ok(event) => event,
            Err(e) if is_handle_gone(&e) => return Err(EngineError::DeviceLost(e)),
            Err(e) => {
                warn!(error = %e, "keyboard read failed, discarding");
                continue;
            }
        };

        let actions = engine.process_event(event);
        if !actions.is_empty() {
            debug!(
                code = event.code(),
                value = event.value(),
                grabbed = engine.is_grabbed(),
                step = engine.step(),
                count = actions.len(),
                "dispatching"
            );
        }
        dispatch(keyboard, vdev, actions);
    }
}

fn dispatch(keyboard: &mut impl KeyboardSource, vdev: &mut impl EventEmitter, actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::Emit(event) => emitter::emit(vdev, event),
            Action::Capture(grab) => match keyboard.set_exclusive_capture(grab) {
                Ok(()) => info!(grab, "keyboard capture updated"),
                Err(e) => warn!(grab, error = %e, "capture request failed"),
            },
        }
    }
}
