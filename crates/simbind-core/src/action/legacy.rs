// Simbind Legacy Device Action
// Offset writes carried over from the previous module protocol generation

use super::{ActionContext, ActionError, OffsetAction};

/// An offset write that came from an older document generation.
///
/// Behaves exactly like `OffsetAction` but keeps its own tag so documents
/// round-trip. Only the document reader constructs one.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyDeviceAction {
    inner: OffsetAction,
}

impl LegacyDeviceAction {
    pub(crate) fn from_offset(inner: OffsetAction) -> Self {
        Self { inner }
    }

    pub fn offset(&self) -> &OffsetAction {
        &self.inner
    }

    /// Convert into a current-generation offset action
    pub fn into_offset(self) -> OffsetAction {
        self.inner
    }

    pub fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        self.inner.execute(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EventCatalog, ValueExpr};
    use crate::sim::{OffsetCache, OffsetWidth, SimulatorState};
    use crate::synth::RecordingKeySink;

    #[test]
    fn test_executes_like_offset_action() {
        let offset = OffsetAction::new(0x66C0, OffsetWidth::One, ValueExpr::constant(3), None);
        let legacy = LegacyDeviceAction::from_offset(offset.clone());

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
        legacy.execute(&mut ctx).unwrap();
        offset.execute(&mut ctx).unwrap();

        let writes = sim.drain_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], writes[1]);
        assert_eq!(legacy.into_offset(), offset);
    }
}
