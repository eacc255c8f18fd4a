// Simbind Bindings
// Input and output bindings as stored in a document

use strum_macros::{Display, EnumIter, EnumString};

use crate::action::{ActionContext, ActionError, EventCatalog, InputAction};
use crate::document::xml::XmlNode;
use crate::document::BindingId;
use crate::output::OutputConfig;
use crate::Transition;

/// Action slot of a button. The string form is the persisted element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Slot {
    #[strum(serialize = "onPress")]
    OnPress,
    #[strum(serialize = "onRelease")]
    OnRelease,
}

/// Per-edge actions of one button. Either slot may be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ButtonBinding {
    pub on_press: Option<InputAction>,
    pub on_release: Option<InputAction>,
}

impl ButtonBinding {
    pub fn new(on_press: Option<InputAction>, on_release: Option<InputAction>) -> Self {
        Self {
            on_press,
            on_release,
        }
    }

    pub fn slot(&self, slot: Slot) -> Option<&InputAction> {
        match slot {
            Slot::OnPress => self.on_press.as_ref(),
            Slot::OnRelease => self.on_release.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut Option<InputAction> {
        match slot {
            Slot::OnPress => &mut self.on_press,
            Slot::OnRelease => &mut self.on_release,
        }
    }

    /// Slot that handles `transition`.
    ///
    /// Repeat edges go to the press slot only when auto-repeat is enabled.
    pub fn slot_for(transition: Transition, auto_repeat: bool) -> Option<Slot> {
        match transition {
            Transition::Press => Some(Slot::OnPress),
            Transition::Release => Some(Slot::OnRelease),
            Transition::Repeat if auto_repeat => Some(Slot::OnPress),
            Transition::Repeat => None,
        }
    }

    pub fn select(&self, transition: Transition, auto_repeat: bool) -> Option<(Slot, &InputAction)> {
        let slot = Self::slot_for(transition, auto_repeat)?;
        self.slot(slot).map(|action| (slot, action))
    }

    /// Run at most one action for `transition`. `None` when nothing ran.
    pub fn dispatch(
        &self,
        transition: Transition,
        auto_repeat: bool,
        ctx: &mut ActionContext<'_>,
    ) -> Option<(Slot, Result<(), ActionError>)> {
        let (slot, action) = self.select(transition, auto_repeat)?;
        Some((slot, action.execute(ctx)))
    }

    /// Clear slots whose action fails validation; returns what was cleared
    pub fn validate(&mut self, catalog: &EventCatalog) -> Vec<(Slot, ActionError)> {
        let mut cleared = Vec::new();
        for slot in [Slot::OnPress, Slot::OnRelease] {
            let entry = self.slot_mut(slot);
            let failed = entry.as_ref().and_then(|action| action.validate(catalog).err());
            if let Some(err) = failed {
                *entry = None;
                cleared.push((slot, err));
            }
        }
        cleared
    }
}

/// Physical input that triggers a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputTrigger {
    pub serial: String,
    pub pin: u32,
}

impl InputTrigger {
    pub fn new(serial: impl Into<String>, pin: u32) -> Self {
        Self {
            serial: serial.into(),
            pin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    pub id: BindingId,
    pub description: String,
    pub active: bool,
    pub trigger: InputTrigger,
    pub button: ButtonBinding,
    /// Settings element that failed to decode, written back unchanged on
    /// save. The binding never runs while this is set.
    pub unparsed: Option<XmlNode>,
}

impl InputBinding {
    pub fn new(description: impl Into<String>, trigger: InputTrigger, button: ButtonBinding) -> Self {
        Self {
            id: BindingId::generate(),
            description: description.into(),
            active: true,
            trigger,
            button,
            unparsed: None,
        }
    }

    /// Active and fully decoded
    pub fn is_runnable(&self) -> bool {
        self.active && self.unparsed.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    pub id: BindingId,
    pub description: String,
    pub active: bool,
    pub config: OutputConfig,
    /// Settings element that failed to decode, written back unchanged on
    /// save. `config` is a placeholder while this is set.
    pub unparsed: Option<XmlNode>,
}

impl OutputBinding {
    pub fn new(description: impl Into<String>, config: OutputConfig) -> Self {
        Self {
            id: BindingId::generate(),
            description: description.into(),
            active: true,
            config,
            unparsed: None,
        }
    }

    /// Active and fully decoded
    pub fn is_runnable(&self) -> bool {
        self.active && self.unparsed.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EventIdAction, KeyAction};
    use crate::sim::{OffsetCache, SimulatorState};
    use crate::synth::RecordingKeySink;
    use crate::Key;

    fn button() -> ButtonBinding {
        ButtonBinding::new(
            Some(InputAction::EventId(EventIdAction::new("65570", None))),
            Some(InputAction::Key(KeyAction::new(Key::from(30)))),
        )
    }

    #[test]
    fn test_select_by_transition() {
        let button = button();
        assert_eq!(
            button.select(Transition::Press, false).map(|(s, _)| s),
            Some(Slot::OnPress)
        );
        assert_eq!(
            button.select(Transition::Release, false).map(|(s, _)| s),
            Some(Slot::OnRelease)
        );
        assert!(button.select(Transition::Repeat, false).is_none());
        assert_eq!(
            button.select(Transition::Repeat, true).map(|(s, _)| s),
            Some(Slot::OnPress)
        );
    }

    #[test]
    fn test_empty_slot_is_noop() {
        let button = ButtonBinding::new(None, None);
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
        assert!(button.dispatch(Transition::Press, false, &mut ctx).is_none());
        assert!(sim.pending_writes().is_empty());
    }

    #[test]
    fn test_dispatch_runs_exactly_one_action() {
        let button = button();
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
        let (slot, result) = button.dispatch(Transition::Release, false, &mut ctx).unwrap();
        assert_eq!(slot, Slot::OnRelease);
        assert!(result.is_ok());
        assert!(sim.pending_events().is_empty());
        assert_eq!(keys.sent().len(), 2);
    }

    #[test]
    fn test_validate_clears_unknown_events() {
        let mut button = ButtonBinding::new(
            Some(InputAction::EventId(EventIdAction::new("NOPE", None))),
            Some(InputAction::EventId(EventIdAction::new("12", None))),
        );
        let cleared = button.validate(&EventCatalog::new());
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].0, Slot::OnPress);
        assert!(button.on_press.is_none());
        assert!(button.on_release.is_some());
    }

    #[test]
    fn test_slot_names() {
        assert_eq!(Slot::OnPress.to_string(), "onPress");
        assert_eq!("onRelease".parse::<Slot>(), Ok(Slot::OnRelease));
    }
}
