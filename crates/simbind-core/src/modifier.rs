// Simbind Modifier System
// Chord modifiers (Ctrl, Shift, Alt) held while a key action taps its key

use smallvec::SmallVec;
use strum_macros::{Display, EnumIter, EnumString};

use crate::Key;

/// A chord modifier. Each maps to the left-hand physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum KeyModifier {
    #[strum(to_string = "Ctrl", serialize = "Control")]
    Ctrl,
    Shift,
    Alt,
}

/// Modifier list of a key chord, in press order
pub type ModifierSet = SmallVec<[KeyModifier; 3]>;

/// Errors from parsing a modifier list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModifierError {
    #[error("Unknown modifier: {0}")]
    Unknown(String),

    #[error("Modifier listed twice: {0}")]
    Duplicate(KeyModifier),
}

impl KeyModifier {
    /// The physical key pressed for this modifier
    pub fn key(self) -> Key {
        match self {
            KeyModifier::Ctrl => Key::from(29),
            KeyModifier::Shift => Key::from(42),
            KeyModifier::Alt => Key::from(56),
        }
    }

    /// Parse a `+` separated modifier list such as `Ctrl+Shift`
    pub fn parse_list(list: &str) -> Result<ModifierSet, ModifierError> {
        let mut out = ModifierSet::new();
        for part in list.split('+').map(str::trim).filter(|p| !p.is_empty()) {
            let modifier: KeyModifier = part
                .parse()
                .map_err(|_| ModifierError::Unknown(part.to_string()))?;
            if out.contains(&modifier) {
                return Err(ModifierError::Duplicate(modifier));
            }
            out.push(modifier);
        }
        Ok(out)
    }

    /// Format a modifier list the way `parse_list` reads it
    pub fn format_list(modifiers: &[KeyModifier]) -> String {
        modifiers
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join("+")
    }
}
