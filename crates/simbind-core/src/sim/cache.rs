// Simbind Offset Cache
// In-process simulator state: atomic snapshot swap plus queued writes/events

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{
    ConnectionStatus, OffsetWrite, SimError, SimEvent, SimulatorState, Snapshot,
};

/// In-process `SimulatorState`.
///
/// A transport (or the offline runner) refreshes the snapshot and drains the
/// queues; the engine only reads snapshots and enqueues.
#[derive(Debug)]
pub struct OffsetCache {
    status: RwLock<ConnectionStatus>,
    snapshot: RwLock<Arc<Snapshot>>,
    writes: Mutex<Vec<OffsetWrite>>,
    events: Mutex<Vec<SimEvent>>,
}

impl Default for OffsetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetCache {
    /// Create a closed cache with a zeroed offset space
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ConnectionStatus::Closed),
            snapshot: RwLock::new(Arc::new(Snapshot::zeroed())),
            writes: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Create a cache that reports itself connected (offline mode)
    pub fn connected() -> Self {
        let cache = Self::new();
        cache.set_status(ConnectionStatus::Connected);
        cache
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }

    /// Swap in a complete new image in one step
    pub fn refresh(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Build a new image from the current one and swap it in
    pub fn update<F>(&self, f: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut Snapshot) -> Result<(), SimError>,
    {
        let mut next = (**self.snapshot.read()).clone();
        f(&mut next)?;
        self.refresh(next);
        Ok(())
    }

    /// Take all queued writes
    pub fn drain_writes(&self) -> Vec<OffsetWrite> {
        std::mem::take(&mut *self.writes.lock())
    }

    /// Take all queued events
    pub fn drain_events(&self) -> Vec<SimEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Queued writes, without draining
    pub fn pending_writes(&self) -> Vec<OffsetWrite> {
        self.writes.lock().clone()
    }

    /// Queued events, without draining
    pub fn pending_events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }

    /// Apply every queued write to a new snapshot, as a transport would after
    /// the simulator acknowledged them. Returns the applied writes.
    pub fn flush(&self) -> Result<Vec<OffsetWrite>, SimError> {
        let writes = self.drain_writes();
        if writes.is_empty() {
            return Ok(writes);
        }
        self.update(|snapshot| {
            for write in &writes {
                snapshot.apply(write)?;
            }
            Ok(())
        })?;
        Ok(writes)
    }
}

impl SimulatorState for OffsetCache {
    fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn write(&self, write: OffsetWrite) -> Result<(), SimError> {
        if !self.is_connected() {
            return Err(SimError::NotConnected);
        }
        self.writes.lock().push(write);
        Ok(())
    }

    fn fire_event(&self, event_id: u32, param: i32) -> Result<(), SimError> {
        if !self.is_connected() {
            return Err(SimError::NotConnected);
        }
        self.events.lock().push(SimEvent { event_id, param });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::OffsetWidth;

    #[test]
    fn test_writes_rejected_when_closed() {
        let cache = OffsetCache::new();
        let write = OffsetWrite {
            address: 0x0C02,
            width: OffsetWidth::Two,
            value: 1,
        };
        assert_eq!(cache.write(write), Err(SimError::NotConnected));
        assert!(cache.pending_writes().is_empty());
    }

    #[test]
    fn test_flush_applies_writes() {
        let cache = OffsetCache::connected();
        cache
            .write(OffsetWrite {
                address: 0x0C02,
                width: OffsetWidth::Two,
                value: 0x0102,
            })
            .unwrap();
        let before = cache.snapshot();
        let applied = cache.flush().unwrap();
        assert_eq!(applied.len(), 1);
        assert!(cache.pending_writes().is_empty());
        assert_eq!(cache.snapshot().read(0x0C02, OffsetWidth::Two).unwrap(), 0x0102);
        // readers holding the old image are unaffected
        assert_eq!(before.read(0x0C02, OffsetWidth::Two).unwrap(), 0);
    }

    #[test]
    fn test_events_queue() {
        let cache = OffsetCache::connected();
        cache.fire_event(65752, 0).unwrap();
        assert_eq!(
            cache.drain_events(),
            vec![SimEvent {
                event_id: 65752,
                param: 0
            }]
        );
        assert!(cache.drain_events().is_empty());
    }
}
