// Simbind Event Action
// Fire a named or numbered simulator event

use std::collections::HashMap;
use std::fmt;

use super::{ActionContext, ActionError};

/// Simulator event names and their numeric ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCatalog {
    events: HashMap<String, u32>,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, id: u32) {
        self.events.insert(name.into(), id);
    }

    /// Resolve a catalog name or a numeric id
    pub fn resolve(&self, event: &str) -> Option<u32> {
        let event = event.trim();
        if let Ok(id) = event.parse::<u32>() {
            return Some(id);
        }
        self.events.get(event).copied()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.events.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

impl FromIterator<(String, u32)> for EventCatalog {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIdAction {
    /// Catalog name or numeric id
    pub event: String,
    pub param: Option<i32>,
}

impl EventIdAction {
    pub fn new(event: impl Into<String>, param: Option<i32>) -> Self {
        Self {
            event: event.into(),
            param,
        }
    }

    pub fn validate(&self, catalog: &EventCatalog) -> Result<(), ActionError> {
        catalog
            .resolve(&self.event)
            .map(|_| ())
            .ok_or_else(|| ActionError::UnknownEvent(self.event.clone()))
    }

    pub fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        let id = ctx
            .catalog
            .resolve(&self.event)
            .ok_or_else(|| ActionError::UnknownEvent(self.event.clone()))?;
        if !ctx.sim.is_connected() {
            return Err(ActionError::NotConnected);
        }
        log::debug!("Fire event {} ({}) param {:?}", self.event, id, self.param);
        ctx.sim.fire_event(id, self.param.unwrap_or(0))?;
        Ok(())
    }
}

impl fmt::Display for EventIdAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.param {
            Some(param) => write!(f, "{} {}", self.event, param),
            None => write!(f, "{}", self.event),
        }
    }
}
