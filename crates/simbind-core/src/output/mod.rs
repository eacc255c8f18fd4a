// Simbind Output Configuration
// Offset source, comparison and display target of an output binding

mod cache;
mod compare;
mod lcd;
mod sink;

pub use cache::DisplayCache;
pub use compare::Comparison;
pub use lcd::LcdDisplay;
pub use sink::{LogOutputSink, OutputSink, RecordingOutputSink, SinkCall, SinkError};

use crate::sim::{OffsetWidth, SimError, Snapshot};

/// Where an output reads its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSource {
    pub offset: u32,
    pub width: OffsetWidth,
    pub mask: Option<u64>,
}

impl OffsetSource {
    pub fn new(offset: u32, width: OffsetWidth) -> Self {
        Self {
            offset,
            width,
            mask: None,
        }
    }

    pub fn read(&self, snapshot: &Snapshot) -> Result<u64, SimError> {
        let value = snapshot.read(self.offset, self.width)?;
        Ok(match self.mask {
            Some(mask) => value & mask,
            None => value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayTarget {
    Pin { pin: String },
    Lcd(LcdDisplay),
}

impl DisplayTarget {
    /// Persisted `type` attribute
    pub fn type_name(&self) -> &'static str {
        match self {
            DisplayTarget::Pin { .. } => "Pin",
            DisplayTarget::Lcd(_) => "Lcd",
        }
    }
}

/// Module and device an output drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDisplay {
    pub serial: String,
    pub trigger: String,
    pub target: DisplayTarget,
}

impl OutputDisplay {
    pub const DEFAULT_TRIGGER: &'static str = "normal";

    pub fn pin(serial: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            trigger: Self::DEFAULT_TRIGGER.to_string(),
            target: DisplayTarget::Pin { pin: pin.into() },
        }
    }

    pub fn lcd(serial: impl Into<String>, lcd: LcdDisplay) -> Self {
        Self {
            serial: serial.into(),
            trigger: Self::DEFAULT_TRIGGER.to_string(),
            target: DisplayTarget::Lcd(lcd),
        }
    }

    /// Send a frame to the module through `sink`
    pub fn send(&self, frame: &OutputFrame, sink: &mut dyn OutputSink) -> Result<(), SinkError> {
        match (&self.target, frame) {
            (DisplayTarget::Pin { pin }, OutputFrame::Pin { on }) => {
                sink.set_pin(&self.serial, pin, *on)
            }
            (DisplayTarget::Lcd(lcd), OutputFrame::Lcd { lines }) => {
                sink.set_lcd(&self.serial, &lcd.address, lines)
            }
            _ => Err(SinkError::FrameMismatch(format!(
                "{} {}",
                self.serial,
                self.target.type_name()
            ))),
        }
    }
}

/// Concrete state pushed to a display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFrame {
    Pin { on: bool },
    Lcd { lines: Vec<String> },
}

/// Full configuration of one output binding
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub source: OffsetSource,
    pub comparison: Comparison,
    pub display: OutputDisplay,
}

impl OutputConfig {
    pub fn new(source: OffsetSource, display: OutputDisplay) -> Self {
        Self {
            source,
            comparison: Comparison::default(),
            display,
        }
    }

    /// Display value for the given offset image
    pub fn evaluate(&self, snapshot: &Snapshot) -> Result<String, SimError> {
        let raw = self.source.read(snapshot)?;
        Ok(self.comparison.apply(&raw.to_string()))
    }

    /// Frame showing `value` on this output's display
    pub fn frame(&self, value: &str) -> OutputFrame {
        match &self.display.target {
            DisplayTarget::Pin { .. } => OutputFrame::Pin {
                on: is_truthy(value),
            },
            DisplayTarget::Lcd(lcd) => OutputFrame::Lcd {
                lines: lcd.render(value),
            },
        }
    }

    pub fn test_frame(&self) -> OutputFrame {
        match &self.display.target {
            DisplayTarget::Pin { .. } => OutputFrame::Pin { on: true },
            DisplayTarget::Lcd(lcd) => OutputFrame::Lcd {
                lines: lcd.test_pattern(),
            },
        }
    }

    pub fn blank_frame(&self) -> OutputFrame {
        match &self.display.target {
            DisplayTarget::Pin { .. } => OutputFrame::Pin { on: false },
            DisplayTarget::Lcd(lcd) => OutputFrame::Lcd { lines: lcd.blank() },
        }
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    match value.parse::<f64>() {
        Ok(number) => number != 0.0,
        Err(_) => !value.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::CompareOp;

    fn gear_lamp() -> OutputConfig {
        let mut config = OutputConfig::new(
            OffsetSource {
                offset: 0x0BE8,
                width: OffsetWidth::Four,
                mask: Some(0xFFFF),
            },
            OutputDisplay::pin("ABC123", "5"),
        );
        config.comparison = Comparison::new(CompareOp::Eq, "16383", "1", "0");
        config
    }

    #[test]
    fn test_evaluate_with_mask_and_comparison() {
        let config = gear_lamp();
        let mut snapshot = Snapshot::zeroed();
        assert_eq!(config.evaluate(&snapshot).unwrap(), "0");
        snapshot
            .store(0x0BE8, OffsetWidth::Four, 0xABCD_3FFF)
            .unwrap();
        assert_eq!(config.evaluate(&snapshot).unwrap(), "1");
    }

    #[test]
    fn test_pin_frames() {
        let config = gear_lamp();
        assert_eq!(config.frame("1"), OutputFrame::Pin { on: true });
        assert_eq!(config.frame("0"), OutputFrame::Pin { on: false });
        assert_eq!(config.frame(""), OutputFrame::Pin { on: false });
        assert_eq!(config.test_frame(), OutputFrame::Pin { on: true });
        assert_eq!(config.blank_frame(), OutputFrame::Pin { on: false });
    }

    #[test]
    fn test_send_routes_to_sink() {
        let config = gear_lamp();
        let mut sink = RecordingOutputSink::new();
        config
            .display
            .send(&config.frame("1"), &mut sink)
            .unwrap();
        assert_eq!(
            sink.calls(),
            &[SinkCall::Pin {
                serial: "ABC123".to_string(),
                pin: "5".to_string(),
                on: true
            }]
        );
        let mismatch = OutputFrame::Lcd { lines: Vec::new() };
        assert!(matches!(
            config.display.send(&mismatch, &mut sink),
            Err(SinkError::FrameMismatch(_))
        ));
    }

    #[test]
    fn test_lcd_frame() {
        let lcd = LcdDisplay::new("0x27", 8, 1).with_lines(["HDG $$$"]);
        let config = OutputConfig::new(
            OffsetSource::new(0x0580, OffsetWidth::Two),
            OutputDisplay::lcd("ABC123", lcd),
        );
        assert_eq!(
            config.frame("90"),
            OutputFrame::Lcd {
                lines: vec!["HDG  90 ".to_string()]
            }
        );
    }
}
