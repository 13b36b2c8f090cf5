use anyhow::{Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, InputEvent, InputId, Key, RelativeAxisType};
use mowz_core::bindings::buttons::{BTN_LEFT, BTN_MIDDLE, BTN_RIGHT};
use tracing::{info, warn};

/// Sink for synthetic pointer events.
///
/// Every call writes `events` and then a SYN_REPORT record. An empty slice
/// writes the SYN_REPORT alone.
pub trait EventEmitter {
    fn emit_events(&mut self, events: &[InputEvent]) -> Result<()>;
}

impl EventEmitter for VirtualDevice {
    fn emit_events(&mut self, events: &[InputEvent]) -> Result<()> {
        self.emit(events)?;
        Ok(())
    }
}

pub fn create_virtual_device(name: &str) -> Result<VirtualDevice> {
    let mut axes = AttributeSet::<RelativeAxisType>::new();
    for axis in [
        RelativeAxisType::REL_X,
        RelativeAxisType::REL_Y,
        RelativeAxisType::REL_WHEEL,
        RelativeAxisType::REL_HWHEEL,
    ] {
        axes.insert(axis);
    }

    let mut buttons = AttributeSet::<Key>::new();
    for code in [BTN_LEFT, BTN_RIGHT, BTN_MIDDLE] {
        buttons.insert(Key::new(code));
    }

    let vdev = VirtualDeviceBuilder::new()
        .context("creating VirtualDeviceBuilder")?
        .name(name)
        .input_id(InputId::new(BusType::BUS_USB, 0x1, 0x1, 1))
        .with_keys(&buttons)
        .context("setting buttons")?
        .with_relative_axes(&axes)
        .context("setting relative axes")?
        .build()
        .context("building virtual device")?;

    info!(name, "virtual pointer device created");
    Ok(vdev)
}

/// Write one synthetic event and its SYN_REPORT. Failures are logged, never
/// returned: delivery is best effort.
pub fn emit(emitter: &mut impl EventEmitter, event: InputEvent) {
    if let Err(e) = emitter.emit_events(&[event]) {
        warn!(code = event.code(), value = event.value(), error = %e, "write error");
        // Still close the frame so a half-written batch is not left open.
        if let Err(e) = emitter.emit_events(&[]) {
            warn!(error = %e, "sync error");
        }
    }
}
