// Simbind Batch Input Processing
// Drain queued engine inputs in batches between ticks

/// Batch of queued engine inputs
///
/// The runner collects everything already waiting on the channel and
/// processes it in one pass before the next tick.
#[derive(Debug, Clone)]
pub struct EventBatch<T> {
    events: Vec<T>,
}

impl<T> EventBatch<T> {
    /// Create a new empty batch
    pub fn new() -> Self {
        Self::with_capacity(batch_config::DEFAULT_READ_BATCH)
    }

    /// Create a batch with a pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Add an event to the batch
    pub fn push(&mut self, event: T) {
        self.events.push(event);
    }

    /// Extend the batch, stopping at `batch_config::MAX_BATCH_SIZE`
    pub fn extend(&mut self, events: impl IntoIterator<Item = T>) {
        let room = batch_config::MAX_BATCH_SIZE.saturating_sub(self.events.len());
        self.events.extend(events.into_iter().take(room));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= batch_config::MAX_BATCH_SIZE
    }

    /// Take the events out in arrival order, leaving the batch empty
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.events.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.events.iter()
    }
}

impl<T> Default for EventBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch size configuration
pub mod batch_config {
    /// Default batch capacity
    pub const DEFAULT_READ_BATCH: usize = 32;

    /// Maximum inputs processed between two ticks
    pub const MAX_BATCH_SIZE: usize = 256;
}
