// Simbind Output Value Cache
// Last value sent per output, so unchanged values are not resent

use std::collections::HashMap;

use crate::document::BindingId;

/// Last display value sent for each output binding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayCache {
    last_sent: HashMap<BindingId, String>,
}

impl DisplayCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `value` differs from what was last sent for `id`
    pub fn is_changed(&self, id: &BindingId, value: &str) -> bool {
        self.last_sent.get(id).map(String::as_str) != Some(value)
    }

    /// Record a value as sent
    pub fn record(&mut self, id: BindingId, value: String) {
        self.last_sent.insert(id, value);
    }

    pub fn get(&self, id: &BindingId) -> Option<&str> {
        self.last_sent.get(id).map(String::as_str)
    }

    pub fn remove(&mut self, id: &BindingId) {
        self.last_sent.remove(id);
    }

    /// Forget everything, so the next evaluation resends all outputs
    pub fn clear(&mut self) {
        self.last_sent.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }
}
