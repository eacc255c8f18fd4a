// Simbind Key Synthesis
// Sinks that place synthesized keystrokes on the OS input queue

#[cfg(feature = "uinput")]
mod uinput;

#[cfg(feature = "uinput")]
pub use uinput::VirtualKeyboard;

use crate::{Key, Transition};

/// Error types for key synthesis
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthError {
    #[error("Failed to create virtual keyboard: {0}")]
    DeviceCreation(String),

    #[error("Failed to write key event: {0}")]
    WriteError(String),

    #[error("Key synthesis refused for {0}")]
    Refused(Key),
}

/// Destination for synthesized key edges
pub trait KeySink: Send {
    fn send_key(&mut self, key: Key, transition: Transition) -> Result<(), SynthError>;

    /// Press then release
    fn tap(&mut self, key: Key) -> Result<(), SynthError> {
        self.send_key(key, Transition::Press)?;
        self.send_key(key, Transition::Release)
    }
}

/// Key sink that records every edge. Used offline and in tests.
///
/// `refuse` makes the sink reject a key, simulating an OS that refuses
/// synthesis.
#[derive(Debug, Default, Clone)]
pub struct RecordingKeySink {
    sent: Vec<(Key, Transition)>,
    refuse: Option<Key>,
}

impl RecordingKeySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any edge for `key`
    pub fn refusing(key: Key) -> Self {
        Self {
            sent: Vec::new(),
            refuse: Some(key),
        }
    }

    pub fn sent(&self) -> &[(Key, Transition)] {
        &self.sent
    }

    pub fn take(&mut self) -> Vec<(Key, Transition)> {
        std::mem::take(&mut self.sent)
    }
}

impl KeySink for RecordingKeySink {
    fn send_key(&mut self, key: Key, transition: Transition) -> Result<(), SynthError> {
        if self.refuse == Some(key) {
            return Err(SynthError::Refused(key));
        }
        log::trace!("key {} {}", key, transition);
        self.sent.push((key, transition));
        Ok(())
    }
}
