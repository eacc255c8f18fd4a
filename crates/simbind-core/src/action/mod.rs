// Simbind Input Actions
// The closed set of things a button edge can do to the simulator

mod event_id;
pub mod expr;
mod key;
mod legacy;
mod offset;

pub use event_id::{EventCatalog, EventIdAction};
pub use expr::{CompareOp, ExprError, ValueExpr};
pub use key::KeyAction;
pub use legacy::LegacyDeviceAction;
pub use offset::OffsetAction;

use std::fmt;

use strum_macros::{Display, EnumIter, EnumString};

use crate::sim::{SimError, SimulatorState, Snapshot};
use crate::synth::{KeySink, SynthError};

/// Variant tag of an `InputAction`. The string form is the persisted `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum ActionKind {
    #[strum(serialize = "KeyAction")]
    Key,
    #[strum(serialize = "EventIdAction")]
    EventId,
    #[strum(serialize = "OffsetAction")]
    Offset,
    #[strum(serialize = "LegacyDeviceAction")]
    LegacyDevice,
}

/// Errors raised while validating or executing an action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Simulator is not connected")]
    NotConnected,

    #[error("Unknown simulator event: {0}")]
    UnknownEvent(String),

    #[error("Simulator error: {0}")]
    Sim(SimError),

    #[error("Key synthesis failed: {0}")]
    Synth(#[from] SynthError),

    #[error("Value expression failed: {0}")]
    Expr(#[from] ExprError),
}

impl From<SimError> for ActionError {
    fn from(err: SimError) -> Self {
        match err {
            SimError::NotConnected => ActionError::NotConnected,
            other => ActionError::Sim(other),
        }
    }
}

/// Everything an action may touch during one dispatch
pub struct ActionContext<'a> {
    pub sim: &'a dyn SimulatorState,
    /// Consistent offset image taken once for the whole dispatch
    pub snapshot: &'a Snapshot,
    pub keys: &'a mut dyn KeySink,
    pub catalog: &'a EventCatalog,
}

/// A configured action bound to one button slot
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Key(KeyAction),
    EventId(EventIdAction),
    Offset(OffsetAction),
    LegacyDevice(LegacyDeviceAction),
}

impl InputAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            InputAction::Key(_) => ActionKind::Key,
            InputAction::EventId(_) => ActionKind::EventId,
            InputAction::Offset(_) => ActionKind::Offset,
            InputAction::LegacyDevice(_) => ActionKind::LegacyDevice,
        }
    }

    /// Perform the action. Only enqueues; never waits on the simulator.
    pub fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        match self {
            InputAction::Key(action) => action.execute(ctx),
            InputAction::EventId(action) => action.execute(ctx),
            InputAction::Offset(action) => action.execute(ctx),
            InputAction::LegacyDevice(action) => action.execute(ctx),
        }
    }

    /// Bind-time check against the event catalog
    pub fn validate(&self, catalog: &EventCatalog) -> Result<(), ActionError> {
        match self {
            InputAction::EventId(action) => action.validate(catalog),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for InputAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputAction::Key(action) => write!(f, "{}({})", self.kind(), action),
            InputAction::EventId(action) => write!(f, "{}({})", self.kind(), action),
            InputAction::Offset(action) => write!(f, "{}({})", self.kind(), action),
            InputAction::LegacyDevice(action) => write!(f, "{}({})", self.kind(), action.offset()),
        }
    }
}

impl From<KeyAction> for InputAction {
    fn from(action: KeyAction) -> Self {
        InputAction::Key(action)
    }
}

impl From<EventIdAction> for InputAction {
    fn from(action: EventIdAction) -> Self {
        InputAction::EventId(action)
    }
}

impl From<OffsetAction> for InputAction {
    fn from(action: OffsetAction) -> Self {
        InputAction::Offset(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{OffsetCache, OffsetWidth};
    use crate::synth::RecordingKeySink;
    use crate::Key;
    use strum::IntoEnumIterator;

    #[test]
    fn test_kind_names() {
        let names: Vec<String> = ActionKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec!["KeyAction", "EventIdAction", "OffsetAction", "LegacyDeviceAction"]
        );
        assert_eq!("OffsetAction".parse::<ActionKind>(), Ok(ActionKind::Offset));
        assert!("MacroAction".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = InputAction::Offset(OffsetAction::new(
            0x0C02,
            OffsetWidth::Two,
            ValueExpr::constant(1),
            None,
        ));
        let mut copy = original.clone();
        if let InputAction::Offset(action) = &mut copy {
            action.address = 0x0D00;
        }
        assert_ne!(original, copy);
        match original {
            InputAction::Offset(action) => assert_eq!(action.address, 0x0C02),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_only_checks_events() {
        let catalog = EventCatalog::new();
        let key = InputAction::Key(KeyAction::new(Key::from(30)));
        assert!(key.validate(&catalog).is_ok());
        let event = InputAction::EventId(EventIdAction::new("GEAR_TOGGLE", None));
        assert_eq!(
            event.validate(&catalog),
            Err(ActionError::UnknownEvent("GEAR_TOGGLE".to_string()))
        );
    }

    #[test]
    fn test_execute_dispatches_to_variant() {
        let sim = OffsetCache::connected();
        let snapshot = sim.snapshot();
        let mut keys = RecordingKeySink::new();
        let catalog = EventCatalog::new();
        let mut ctx = ActionContext {
            sim: &sim,
            snapshot: &snapshot,
            keys: &mut keys,
            catalog: &catalog,
        };
        InputAction::EventId(EventIdAction::new("65752", Some(1)))
            .execute(&mut ctx)
            .unwrap();
        InputAction::Key(KeyAction::new(Key::from(30)))
            .execute(&mut ctx)
            .unwrap();
        assert_eq!(sim.pending_events().len(), 1);
        assert_eq!(keys.sent().len(), 2);
    }
}
