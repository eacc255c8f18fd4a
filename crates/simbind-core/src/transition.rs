use std::fmt;

/// Represents the semantic edge of a button event reported by a module.
///
/// Module firmware reports the raw button state with these "magic numbers":
///   0 == 'pressed'
///   1 == 'released'
///   2 == 'repeated' (held past the firmware repeat delay)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Transition {
    Press = 0,
    Release = 1,
    Repeat = 2,
}

impl Transition {
    /// Returns true only for a PRESS edge (not REPEAT)
    pub fn is_press(self) -> bool {
        matches!(self, Transition::Press)
    }

    /// Returns true if this is a RELEASE edge
    pub fn is_release(self) -> bool {
        matches!(self, Transition::Release)
    }

    /// Returns true if this is a REPEAT edge
    pub fn is_repeat(self) -> bool {
        matches!(self, Transition::Repeat)
    }

    /// Create a Transition from the raw module value
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Transition::Press),
            1 => Some(Transition::Release),
            2 => Some(Transition::Repeat),
            _ => None,
        }
    }

    /// Convert to the raw module value
    pub fn to_raw(self) -> i32 {
        self as i32
    }

    /// Parse the lowercase name used in replay scripts and logs
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "press" | "pressed" => Some(Transition::Press),
            "release" | "released" => Some(Transition::Release),
            "repeat" | "repeated" => Some(Transition::Repeat),
            _ => None,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Press => write!(f, "press"),
            Transition::Release => write!(f, "release"),
            Transition::Repeat => write!(f, "repeat"),
        }
    }
}

/// A transient button event produced by the device layer. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub module_serial: String,
    pub pin_id: u32,
    pub transition: Transition,
    pub raw_value: i32,
}

impl DeviceEvent {
    pub fn new(module_serial: impl Into<String>, pin_id: u32, transition: Transition) -> Self {
        Self {
            module_serial: module_serial.into(),
            pin_id,
            transition,
            raw_value: transition.to_raw(),
        }
    }

    /// Build an event from the raw firmware value, if it maps to a transition
    pub fn from_raw(module_serial: impl Into<String>, pin_id: u32, raw_value: i32) -> Option<Self> {
        let transition = Transition::from_raw(raw_value)?;
        Some(Self {
            module_serial: module_serial.into(),
            pin_id,
            transition,
            raw_value,
        })
    }
}
