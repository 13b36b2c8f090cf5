//! The fixed key binding table shared by the daemon and the control tool.
//!
//! Key codes are the raw values from Linux `input-event-codes.h`, so this
//! crate does not need to link against evdev.

/// Keyboard key codes referenced by the bindings.
pub mod keys {
    pub const KEY_Y: u16 = 21;
    pub const KEY_U: u16 = 22;
    pub const KEY_I: u16 = 23;
    pub const KEY_LEFTCTRL: u16 = 29;
    pub const KEY_H: u16 = 35;
    pub const KEY_J: u16 = 36;
    pub const KEY_K: u16 = 37;
    pub const KEY_L: u16 = 38;
    pub const KEY_B: u16 = 48;
    pub const KEY_N: u16 = 49;
    pub const KEY_M: u16 = 50;
    pub const KEY_COMMA: u16 = 51;
    pub const KEY_DOT: u16 = 52;
    pub const KEY_LEFTALT: u16 = 56;
    pub const KEY_SPACE: u16 = 57;
    pub const KEY_RIGHTALT: u16 = 100;
}

/// Pointer button codes advertised by the virtual device.
pub mod buttons {
    pub const BTN_LEFT: u16 = 0x110;
    pub const BTN_RIGHT: u16 = 0x111;
    pub const BTN_MIDDLE: u16 = 0x112;
}

/// Key that toggles grabbing when pressed with left-ctrl and left-alt held.
pub const TOGGLE_KEY: u16 = keys::KEY_M;
/// Modifier that speeds up movement while held; also part of the toggle chord.
pub const STEP_MODIFIER: u16 = keys::KEY_LEFTCTRL;
/// Second modifier of the toggle chord.
pub const CHORD_MODIFIER: u16 = keys::KEY_LEFTALT;

/// Pointer displacement per directional key event.
pub const BASE_STEP: i32 = 10;
/// Pointer displacement per directional key event while left-ctrl is held.
pub const FAST_STEP: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    /// REL_WHEEL
    Vertical,
    /// REL_HWHEEL
    Horizontal,
}

/// What a key does while the keyboard is grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Unit direction, scaled by the current step. X is emitted before Y.
    Move { dx: i32, dy: i32 },
    /// Edge-triggered pointer button.
    Button(u16),
    /// One wheel detent per press or repeat.
    Scroll { axis: ScrollAxis, delta: i32 },
    Unbound,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyBinding {
    pub code: u16,
    pub label: &'static str,
    pub binding: Binding,
    pub description: &'static str,
}

const fn bind(code: u16, label: &'static str, binding: Binding, description: &'static str) -> KeyBinding {
    KeyBinding { code, label, binding, description }
}

pub static BINDINGS: [KeyBinding; 14] = [
    bind(keys::KEY_H, "h", Binding::Move { dx: -1, dy: 0 }, "move left"),
    bind(keys::KEY_J, "j", Binding::Move { dx: 0, dy: 1 }, "move down"),
    bind(keys::KEY_K, "k", Binding::Move { dx: 0, dy: -1 }, "move up"),
    bind(keys::KEY_L, "l", Binding::Move { dx: 1, dy: 0 }, "move right"),
    bind(keys::KEY_U, "u", Binding::Move { dx: -1, dy: -1 }, "move upper left"),
    bind(keys::KEY_I, "i", Binding::Move { dx: 1, dy: -1 }, "move upper right"),
    bind(keys::KEY_N, "n", Binding::Move { dx: -1, dy: 1 }, "move lower left"),
    bind(keys::KEY_M, "m", Binding::Move { dx: 1, dy: 1 }, "move lower right"),
    bind(keys::KEY_SPACE, "spacebar", Binding::Button(buttons::BTN_LEFT), "left-click"),
    bind(keys::KEY_RIGHTALT, "right_alt", Binding::Button(buttons::BTN_RIGHT), "right-click"),
    bind(keys::KEY_Y, "y", Binding::Scroll { axis: ScrollAxis::Vertical, delta: 1 }, "scroll up"),
    bind(keys::KEY_B, "b", Binding::Scroll { axis: ScrollAxis::Vertical, delta: -1 }, "scroll down"),
    bind(keys::KEY_COMMA, ",", Binding::Scroll { axis: ScrollAxis::Horizontal, delta: -1 }, "scroll left"),
    bind(keys::KEY_DOT, ".", Binding::Scroll { axis: ScrollAxis::Horizontal, delta: 1 }, "scroll right"),
];

/// Look up the action bound to a key code.
pub fn lookup(code: u16) -> Binding {
    BINDINGS
        .iter()
        .find(|b| b.code == code)
        .map(|b| b.binding)
        .unwrap_or(Binding::Unbound)
}

/// Commands and bindings, as printed by `mowzctl` with no arguments.
pub fn help_text() -> String {
    let mut out = String::new();
    out.push_str("    mowz: friendly mouse movement with keyboard input\n\n");
    out.push_str("    --commands:\n");
    out.push_str("\tsudo mowzctl start: start the mowz daemon\n");
    out.push_str("\tsudo mowzctl stop: stop the mowz daemon\n");
    out.push_str("\tmowzctl status: show whether the daemon is running\n");
    out.push_str("\tmowzctl / mowzctl bindings: show commands and bindings\n\n");
    out.push_str("    --bindings:\n");
    out.push_str("\tleft_ctl + left_alt + m: toggle keyboard grabbing\n");
    out.push_str(&format!(
        "\tleft_ctl (hold): increase step from {} to {}\n",
        BASE_STEP, FAST_STEP
    ));
    for b in &BINDINGS {
        out.push_str(&format!("\t{}: {}\n", b.label, b.description));
    }
    out
}
