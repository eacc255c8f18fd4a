// Simbind Simulator State
// The boundary to the simulator's offset cache: snapshots, writes and events

mod cache;

pub use cache::OffsetCache;

use std::sync::Arc;

use strum_macros::{Display, EnumString};

/// Size of the addressable offset space
pub const OFFSET_SPACE: usize = 0x1_0000;

/// Link state reported by the simulator transport or the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum ConnectionStatus {
    Connected,
    Lost,
    Closed,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Byte width of an offset value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OffsetWidth {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl OffsetWidth {
    pub fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(OffsetWidth::One),
            2 => Some(OffsetWidth::Two),
            4 => Some(OffsetWidth::Four),
            8 => Some(OffsetWidth::Eight),
            _ => None,
        }
    }

    pub fn bytes(self) -> u8 {
        self as u8
    }

    /// All-ones mask covering this width
    pub fn mask(self) -> u64 {
        match self {
            OffsetWidth::Eight => u64::MAX,
            other => (1u64 << (other.bytes() as u32 * 8)) - 1,
        }
    }

    /// Truncate a (possibly negative) value to this width, two's complement
    pub fn truncate(self, value: i64) -> u64 {
        (value as u64) & self.mask()
    }
}

/// A single queued offset write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetWrite {
    pub address: u32,
    pub width: OffsetWidth,
    pub value: u64,
}

/// A queued simulator event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimEvent {
    pub event_id: u32,
    pub param: i32,
}

/// Errors raised by the simulator state boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("Simulator is not connected")]
    NotConnected,

    #[error("Offset 0x{offset:04X} ({width} bytes) is outside the offset space")]
    OutOfRange { offset: u32, width: u8 },

    #[error("Simulator rejected the request: {0}")]
    Rejected(String),
}

/// Immutable image of the offset space at one refresh.
///
/// Readers hold an `Arc<Snapshot>` for the length of a dispatch, so a
/// refresh swapping in a new image never tears a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Vec<u8>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Snapshot {
    pub fn zeroed() -> Self {
        Self {
            bytes: vec![0; OFFSET_SPACE],
        }
    }

    fn range(offset: u32, width: OffsetWidth) -> Result<std::ops::Range<usize>, SimError> {
        let start = offset as usize;
        let end = start + width.bytes() as usize;
        if end > OFFSET_SPACE {
            return Err(SimError::OutOfRange {
                offset,
                width: width.bytes(),
            });
        }
        Ok(start..end)
    }

    /// Read a little-endian value
    pub fn read(&self, offset: u32, width: OffsetWidth) -> Result<u64, SimError> {
        let range = Self::range(offset, width)?;
        let value = self.bytes[range]
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64);
        Ok(value)
    }

    /// Store a little-endian value (used when building a new image)
    pub fn store(&mut self, offset: u32, width: OffsetWidth, value: u64) -> Result<(), SimError> {
        let range = Self::range(offset, width)?;
        for (i, byte) in self.bytes[range].iter_mut().enumerate() {
            *byte = (value >> (i * 8)) as u8;
        }
        Ok(())
    }

    /// Apply a write to this image
    pub fn apply(&mut self, write: &OffsetWrite) -> Result<(), SimError> {
        self.store(write.address, write.width, write.value)
    }
}

/// Process-wide handle to the live simulator connection.
///
/// The engine reads and writes through this handle but never owns its
/// lifecycle. Implementations synchronize internally; `write` and
/// `fire_event` only enqueue.
pub trait SimulatorState: Send + Sync {
    /// Current link status
    fn status(&self) -> ConnectionStatus;

    fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// The most recent complete refresh of the offset space
    fn snapshot(&self) -> Arc<Snapshot>;

    /// Enqueue an offset write
    fn write(&self, write: OffsetWrite) -> Result<(), SimError>;

    /// Enqueue a simulator event
    fn fire_event(&self, event_id: u32, param: i32) -> Result<(), SimError>;
}
