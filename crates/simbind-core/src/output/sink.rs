// Simbind Output Sinks
// Destinations for pin and LCD frames on the hardware modules

/// Errors from sending a frame to a module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Module {0} is not connected")]
    ModuleNotConnected(String),

    #[error("Frame does not fit display {0}")]
    FrameMismatch(String),

    #[error("Module write failed: {0}")]
    WriteError(String),
}

/// Hardware output boundary
pub trait OutputSink: Send {
    fn set_pin(&mut self, serial: &str, pin: &str, on: bool) -> Result<(), SinkError>;

    fn set_lcd(&mut self, serial: &str, address: &str, lines: &[String]) -> Result<(), SinkError>;
}

/// One call made on a `RecordingOutputSink`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Pin {
        serial: String,
        pin: String,
        on: bool,
    },
    Lcd {
        serial: String,
        address: String,
        lines: Vec<String>,
    },
}

/// Output sink that records calls. Used offline and in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingOutputSink {
    calls: Vec<SinkCall>,
    failing: bool,
}

impl RecordingOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    pub fn take(&mut self) -> Vec<SinkCall> {
        std::mem::take(&mut self.calls)
    }

    fn check(&self, serial: &str) -> Result<(), SinkError> {
        if self.failing {
            return Err(SinkError::ModuleNotConnected(serial.to_string()));
        }
        Ok(())
    }
}

impl OutputSink for RecordingOutputSink {
    fn set_pin(&mut self, serial: &str, pin: &str, on: bool) -> Result<(), SinkError> {
        self.check(serial)?;
        self.calls.push(SinkCall::Pin {
            serial: serial.to_string(),
            pin: pin.to_string(),
            on,
        });
        Ok(())
    }

    fn set_lcd(&mut self, serial: &str, address: &str, lines: &[String]) -> Result<(), SinkError> {
        self.check(serial)?;
        self.calls.push(SinkCall::Lcd {
            serial: serial.to_string(),
            address: address.to_string(),
            lines: lines.to_vec(),
        });
        Ok(())
    }
}

/// Output sink that only logs frames
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutputSink;

impl OutputSink for LogOutputSink {
    fn set_pin(&mut self, serial: &str, pin: &str, on: bool) -> Result<(), SinkError> {
        log::info!("{} pin {} -> {}", serial, pin, if on { "on" } else { "off" });
        Ok(())
    }

    fn set_lcd(&mut self, serial: &str, address: &str, lines: &[String]) -> Result<(), SinkError> {
        log::info!("{} lcd {}:", serial, address);
        for line in lines {
            log::info!("  |{}|", line);
        }
        Ok(())
    }
}
