// Simbind Binding Document
// Ordered input/output binding collections and their persistence

mod codec;
pub mod envelope;
mod id;
pub mod xml;

pub use codec::{load_file, load_str, save_file, to_xml_string, CURRENT_VERSION};
pub use envelope::EnvelopeError;
pub use id::BindingId;

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::binding::{InputBinding, OutputBinding};
use crate::migrate::{MigrationError, MigrationStep};

/// Suffix appended to the description of a duplicated binding
pub const COPY_SUFFIX: &str = " (copy)";

/// Errors that abort loading or saving a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Invalid document version '{0}'")]
    InvalidVersion(String),

    #[error("Document version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Migration failed: {0}")]
    Migration(#[from] MigrationError),
}

/// Non-fatal problem found while loading. The rest of the document loads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadWarning {
    #[error("Input {id}: button disabled: {error}")]
    Envelope { id: BindingId, error: EnvelopeError },

    #[error("Input {index} disabled: {reason}")]
    InvalidInput { index: usize, reason: String },

    #[error("Output {index} disabled: {reason}")]
    InvalidOutput { index: usize, reason: String },

    #[error("Invalid id '{raw}' replaced by {replacement}")]
    InvalidId { raw: String, replacement: BindingId },

    #[error("Duplicate id {id} replaced by {replacement}")]
    DuplicateId { id: BindingId, replacement: BindingId },
}

/// Result of a successful load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub document: Document,
    pub warnings: Vec<LoadWarning>,
    /// Migration steps applied, oldest first
    pub migrations: Vec<MigrationStep>,
}

/// A module serial referenced by bindings but not connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedSerial {
    pub serial: String,
    pub outputs: Vec<BindingId>,
    pub inputs: Vec<BindingId>,
}

impl OrphanedSerial {
    fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }
}

/// The two binding collections, in user order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    outputs: IndexMap<BindingId, OutputBinding>,
    inputs: IndexMap<BindingId, InputBinding>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input. An id already present is regenerated; the final id
    /// is returned.
    pub fn push_input(&mut self, mut binding: InputBinding) -> BindingId {
        while self.inputs.contains_key(&binding.id) {
            binding.id = BindingId::generate();
        }
        let id = binding.id;
        self.inputs.insert(id, binding);
        id
    }

    /// Append an output. An id already present is regenerated; the final id
    /// is returned.
    pub fn push_output(&mut self, mut binding: OutputBinding) -> BindingId {
        while self.outputs.contains_key(&binding.id) {
            binding.id = BindingId::generate();
        }
        let id = binding.id;
        self.outputs.insert(id, binding);
        id
    }

    pub fn input(&self, id: &BindingId) -> Option<&InputBinding> {
        self.inputs.get(id)
    }

    pub fn input_mut(&mut self, id: &BindingId) -> Option<&mut InputBinding> {
        self.inputs.get_mut(id)
    }

    pub fn output(&self, id: &BindingId) -> Option<&OutputBinding> {
        self.outputs.get(id)
    }

    pub fn output_mut(&mut self, id: &BindingId) -> Option<&mut OutputBinding> {
        self.outputs.get_mut(id)
    }

    /// Remove an input, keeping the order of the rest
    pub fn remove_input(&mut self, id: &BindingId) -> Option<InputBinding> {
        self.inputs.shift_remove(id)
    }

    /// Remove an output, keeping the order of the rest
    pub fn remove_output(&mut self, id: &BindingId) -> Option<OutputBinding> {
        self.outputs.shift_remove(id)
    }

    /// Deep copy an input directly after the source, under a fresh id
    pub fn duplicate_input(&mut self, id: &BindingId) -> Option<BindingId> {
        let index = self.inputs.get_index_of(id)?;
        let mut copy = self.inputs[index].clone();
        copy.id = self.fresh_input_id();
        copy.description.push_str(COPY_SUFFIX);
        let new_id = copy.id;
        self.inputs.shift_insert(index + 1, new_id, copy);
        Some(new_id)
    }

    /// Deep copy an output directly after the source, under a fresh id
    pub fn duplicate_output(&mut self, id: &BindingId) -> Option<BindingId> {
        let index = self.outputs.get_index_of(id)?;
        let mut copy = self.outputs[index].clone();
        copy.id = self.fresh_output_id();
        copy.description.push_str(COPY_SUFFIX);
        let new_id = copy.id;
        self.outputs.shift_insert(index + 1, new_id, copy);
        Some(new_id)
    }

    /// Append every binding of `other`, regenerating ids that collide
    pub fn merge(&mut self, other: Document) {
        for (_, output) in other.outputs {
            self.push_output(output);
        }
        for (_, input) in other.inputs {
            self.push_input(input);
        }
    }

    pub fn clear(&mut self) {
        self.outputs.clear();
        self.inputs.clear();
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputBinding> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputBinding> {
        self.outputs.values()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// Serials used by bindings but missing from `connected`, in document
    /// order. Bindings without a serial are ignored.
    pub fn orphaned_serials<S: AsRef<str>>(&self, connected: &[S]) -> Vec<OrphanedSerial> {
        let is_connected = |serial: &str| connected.iter().any(|c| c.as_ref() == serial);
        let mut orphans: IndexMap<&str, OrphanedSerial> = IndexMap::new();

        for output in self.outputs.values() {
            let serial = output.config.display.serial.as_str();
            if serial.is_empty() || is_connected(serial) {
                continue;
            }
            orphans
                .entry(serial)
                .or_insert_with(|| OrphanedSerial::new(serial))
                .outputs
                .push(output.id);
        }
        for input in self.inputs.values() {
            let serial = input.trigger.serial.as_str();
            if serial.is_empty() || is_connected(serial) {
                continue;
            }
            orphans
                .entry(serial)
                .or_insert_with(|| OrphanedSerial::new(serial))
                .inputs
                .push(input.id);
        }

        orphans.into_values().collect()
    }

    /// Move every binding on module `from` to module `to`; returns how many
    /// bindings changed
    pub fn reassign_serial(&mut self, from: &str, to: &str) -> usize {
        let mut changed = 0;
        for output in self.outputs.values_mut() {
            if output.config.display.serial != from {
                continue;
            }
            output.config.display.serial = to.to_string();
            if let Some(display) = output
                .unparsed
                .as_mut()
                .and_then(|settings| settings.child_mut("display"))
            {
                display.set_attr("serial", to);
            }
            changed += 1;
        }
        for input in self.inputs.values_mut() {
            if input.trigger.serial != from {
                continue;
            }
            input.trigger.serial = to.to_string();
            if let Some(settings) = input.unparsed.as_mut() {
                settings.set_attr("serial", to);
            }
            changed += 1;
        }
        changed
    }

    fn fresh_input_id(&self) -> BindingId {
        loop {
            let id = BindingId::generate();
            if !self.inputs.contains_key(&id) {
                return id;
            }
        }
    }

    fn fresh_output_id(&self) -> BindingId {
        loop {
            let id = BindingId::generate();
            if !self.outputs.contains_key(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{InputAction, OffsetAction, ValueExpr};
    use crate::binding::{ButtonBinding, InputTrigger};
    use crate::output::{OffsetSource, OutputConfig, OutputDisplay};
    use crate::sim::OffsetWidth;

    fn input(description: &str, pin: u32) -> InputBinding {
        InputBinding::new(
            description,
            InputTrigger::new("ABC123", pin),
            ButtonBinding::new(
                Some(InputAction::Offset(OffsetAction::new(
                    0x0C02,
                    OffsetWidth::Two,
                    ValueExpr::constant(1),
                    None,
                ))),
                None,
            ),
        )
    }

    #[test]
    fn test_push_regenerates_duplicate_id() {
        let mut doc = Document::new();
        let first = input("a", 1);
        let mut second = input("b", 2);
        second.id = first.id;
        let a = doc.push_input(first);
        let b = doc.push_input(second);
        assert_ne!(a, b);
        assert_eq!(doc.input_count(), 2);
    }

    #[test]
    fn test_duplicate_inserts_after_source() {
        let mut doc = Document::new();
        let a = doc.push_input(input("a", 1));
        let c = doc.push_input(input("c", 3));
        let copy = doc.duplicate_input(&a).unwrap();
        let order: Vec<_> = doc.inputs().map(|b| b.id).collect();
        assert_eq!(order, vec![a, copy, c]);
        assert_eq!(doc.input(&copy).unwrap().description, "a (copy)");
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut doc = Document::new();
        let a = doc.push_input(input("a", 1));
        let copy = doc.duplicate_input(&a).unwrap();
        doc.input_mut(&copy).unwrap().button.on_press = None;
        assert!(doc.input(&a).unwrap().button.on_press.is_some());
    }

    #[test]
    fn test_duplicate_output() {
        let mut doc = Document::new();
        let id = doc.push_output(OutputBinding::new(
            "lamp",
            OutputConfig::new(
                OffsetSource::new(0x0BE8, OffsetWidth::Four),
                OutputDisplay::pin("ABC123", "5"),
            ),
        ));
        let copy = doc.duplicate_output(&id).unwrap();
        assert_ne!(copy, id);
        assert_eq!(doc.output(&copy).unwrap().description, "lamp (copy)");
        assert!(doc.duplicate_output(&BindingId::generate()).is_none());
    }

    #[test]
    fn test_merge_regenerates_collisions() {
        let mut doc = Document::new();
        let a = doc.push_input(input("a", 1));
        let mut other = Document::new();
        let mut clash = input("b", 2);
        clash.id = a;
        other.push_input(clash);
        doc.merge(other);
        assert_eq!(doc.input_count(), 2);
        assert_eq!(doc.input(&a).unwrap().description, "a");
    }

    fn lamp(serial: &str) -> OutputBinding {
        OutputBinding::new(
            "lamp",
            OutputConfig::new(
                OffsetSource::new(0x0BE8, OffsetWidth::Four),
                OutputDisplay::pin(serial, "5"),
            ),
        )
    }

    #[test]
    fn test_orphaned_serials() {
        let mut doc = Document::new();
        let lamp_id = doc.push_output(lamp("XYZ789"));
        doc.push_output(lamp(""));
        let a = doc.push_input(input("a", 1));
        let mut other = input("b", 2);
        other.trigger.serial = "XYZ789".to_string();
        let b = doc.push_input(other);

        let orphans = doc.orphaned_serials(&["ABC123"]);
        assert_eq!(
            orphans,
            vec![OrphanedSerial {
                serial: "XYZ789".to_string(),
                outputs: vec![lamp_id],
                inputs: vec![b],
            }]
        );

        let orphans = doc.orphaned_serials::<&str>(&[]);
        let serials: Vec<_> = orphans.iter().map(|o| o.serial.as_str()).collect();
        assert_eq!(serials, vec!["XYZ789", "ABC123"]);
        assert_eq!(orphans[1].inputs, vec![a]);

        assert!(doc.orphaned_serials(&["ABC123", "XYZ789"]).is_empty());
    }

    #[test]
    fn test_reassign_serial() {
        let mut doc = Document::new();
        doc.push_output(lamp("XYZ789"));
        let a = doc.push_input(input("a", 1));
        assert_eq!(doc.reassign_serial("XYZ789", "ABC123"), 1);
        assert!(doc.orphaned_serials(&["ABC123"]).is_empty());
        assert_eq!(doc.input(&a).unwrap().trigger.serial, "ABC123");
        assert_eq!(doc.reassign_serial("NOPE", "ABC123"), 0);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut doc = Document::new();
        let a = doc.push_input(input("a", 1));
        let b = doc.push_input(input("b", 2));
        let c = doc.push_input(input("c", 3));
        doc.remove_input(&b);
        let order: Vec<_> = doc.inputs().map(|x| x.id).collect();
        assert_eq!(order, vec![a, c]);
        doc.clear();
        assert!(doc.is_empty());
    }
}
