// Simbind uinput Key Output
// Virtual keyboard device and key event emission

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent};

use super::{KeySink, SynthError};
use crate::{Key, Transition};

/// Virtual uinput keyboard the key actions type on
pub struct VirtualKeyboard {
    device: VirtualDevice,
}

impl VirtualKeyboard {
    /// Create a new virtual uinput keyboard
    pub fn new() -> Result<Self, SynthError> {
        let mut keys = AttributeSet::new();
        for code in 0..256u16 {
            keys.insert(evdev::Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(|e: std::io::Error| SynthError::DeviceCreation(e.to_string()))?
            .name("Simbind (virtual) Keyboard")
            .with_keys(&keys)
            .map_err(|e: std::io::Error| SynthError::DeviceCreation(e.to_string()))?
            .build()
            .map_err(|e: std::io::Error| SynthError::DeviceCreation(e.to_string()))?;

        Ok(Self { device })
    }
}

impl KeySink for VirtualKeyboard {
    fn send_key(&mut self, key: Key, transition: Transition) -> Result<(), SynthError> {
        let value = match transition {
            Transition::Press => 1,
            Transition::Release => 0,
            Transition::Repeat => 2,
        };

        let key_event = InputEvent::new(EventType::KEY, key.code(), value);
        // SYN is required for the kernel to process the key event
        let syn_event = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);

        self.device
            .emit(&[key_event, syn_event])
            .map_err(|e: std::io::Error| SynthError::WriteError(e.to_string()))
    }
}
