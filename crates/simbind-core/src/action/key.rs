// Simbind Key Action
// Synthesize a key chord on the OS input queue

use std::fmt;

use super::{ActionContext, ActionError};
use crate::modifier::{KeyModifier, ModifierSet};
use crate::synth::KeySink;
use crate::{Key, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAction {
    pub key: Key,
    pub modifiers: ModifierSet,
}

impl KeyAction {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: ModifierSet::new(),
        }
    }

    pub fn with_modifiers(key: Key, modifiers: &[KeyModifier]) -> Self {
        Self {
            key,
            modifiers: modifiers.iter().copied().collect(),
        }
    }

    /// Press modifiers, tap the key, release modifiers in reverse order.
    ///
    /// If synthesis fails midway the modifiers already down are released
    /// before the error is returned.
    pub fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        log::debug!("Key chord {}", self);
        let keys: &mut dyn KeySink = &mut *ctx.keys;

        let mut pressed = 0usize;
        let mut result = Ok(());
        for modifier in &self.modifiers {
            if let Err(e) = keys.send_key(modifier.key(), Transition::Press) {
                result = Err(e);
                break;
            }
            pressed += 1;
        }
        if result.is_ok() {
            result = keys.tap(self.key);
        }

        for modifier in self.modifiers[..pressed].iter().rev() {
            if let Err(e) = keys.send_key(modifier.key(), Transition::Release) {
                log::warn!("Failed to release {}: {}", modifier, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result.map_err(ActionError::from)
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}+{}", KeyModifier::format_list(&self.modifiers), self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::EventCatalog;
    use crate::sim::{OffsetCache, SimulatorState};
    use crate::synth::{RecordingKeySink, SynthError};

    fn run(action: &KeyAction, keys: &mut RecordingKeySink) -> Result<(), ActionError> {
        let sim = OffsetCache::connected();
        let snapshot = sim.snapshot();
        let catalog = EventCatalog::new();
        let mut ctx = ActionContext {
            sim: &sim,
            snapshot: &snapshot,
            keys,
            catalog: &catalog,
        };
        action.execute(&mut ctx)
    }

    #[test]
    fn test_chord_order() {
        let action = KeyAction::with_modifiers(Key::from(30), &[KeyModifier::Ctrl, KeyModifier::Shift]);
        let mut keys = RecordingKeySink::new();
        run(&action, &mut keys).unwrap();
        assert_eq!(
            keys.sent(),
            &[
                (Key::from(29), Transition::Press),
                (Key::from(42), Transition::Press),
                (Key::from(30), Transition::Press),
                (Key::from(30), Transition::Release),
                (Key::from(42), Transition::Release),
                (Key::from(29), Transition::Release),
            ]
        );
    }

    #[test]
    fn test_failure_releases_held_modifiers() {
        let action = KeyAction::with_modifiers(Key::from(30), &[KeyModifier::Alt]);
        let mut keys = RecordingKeySink::refusing(Key::from(30));
        let err = run(&action, &mut keys).unwrap_err();
        assert_eq!(err, ActionError::Synth(SynthError::Refused(Key::from(30))));
        assert_eq!(
            keys.sent(),
            &[
                (Key::from(56), Transition::Press),
                (Key::from(56), Transition::Release),
            ]
        );
    }

    #[test]
    fn test_display() {
        let action = KeyAction::with_modifiers(Key::from(34), &[KeyModifier::Ctrl]);
        assert_eq!(action.to_string(), "Ctrl+G");
        assert_eq!(KeyAction::new(Key::from(28)).to_string(), "ENTER");
    }
}
