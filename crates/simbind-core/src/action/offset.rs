// Simbind Offset Action
// Masked, width-truncated writes into the simulator offset space

use std::fmt;

use super::{ActionContext, ActionError, ValueExpr};
use crate::sim::{OffsetWidth, OffsetWrite, Snapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct OffsetAction {
    pub address: u32,
    pub width: OffsetWidth,
    pub value: ValueExpr,
    pub mask: Option<u64>,
}

impl OffsetAction {
    pub fn new(address: u32, width: OffsetWidth, value: ValueExpr, mask: Option<u64>) -> Self {
        Self {
            address,
            width,
            value,
            mask,
        }
    }

    /// Compute the write this action would enqueue against `snapshot`
    pub fn compute(&self, snapshot: &Snapshot) -> Result<OffsetWrite, ActionError> {
        let current = snapshot.read(self.address, self.width)?;
        let evaluated = self.width.truncate(self.value.eval(current as i64)?);
        let value = match self.mask {
            Some(mask) => (current & !mask) | (evaluated & mask),
            None => evaluated,
        };
        Ok(OffsetWrite {
            address: self.address,
            width: self.width,
            value: value & self.width.mask(),
        })
    }

    pub fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if !ctx.sim.is_connected() {
            return Err(ActionError::NotConnected);
        }
        let write = self.compute(ctx.snapshot)?;
        log::debug!(
            "Offset write 0x{:04X} ({} bytes) = {}",
            write.address,
            write.width.bytes(),
            write.value
        );
        ctx.sim.write(write)?;
        Ok(())
    }
}

impl fmt::Display for OffsetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}:{} = {}", self.address, self.width.bytes(), self.value)?;
        if let Some(mask) = self.mask {
            write!(f, " & 0x{:X}", mask)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EventCatalog, ExprError};
    use crate::sim::{ConnectionStatus, OffsetCache, SimulatorState};
    use crate::synth::RecordingKeySink;

    fn exec(sim: &OffsetCache, action: &OffsetAction) -> Result<(), ActionError> {
        let snapshot = sim.snapshot();
        let mut keys = RecordingKeySink::new();
        let catalog = EventCatalog::new();
        let mut ctx = ActionContext {
            sim,
            snapshot: &snapshot,
            keys: &mut keys,
            catalog: &catalog,
        };
        action.execute(&mut ctx)
    }

    fn action(address: u32, width: OffsetWidth, value: &str, mask: Option<u64>) -> OffsetAction {
        OffsetAction::new(address, width, ValueExpr::parse(value).unwrap(), mask)
    }

    #[test]
    fn test_plain_write() {
        let sim = OffsetCache::connected();
        exec(&sim, &action(0x0C02, OffsetWidth::Two, "1", None)).unwrap();
        assert_eq!(
            sim.drain_writes(),
            vec![OffsetWrite {
                address: 0x0C02,
                width: OffsetWidth::Two,
                value: 1
            }]
        );
    }

    #[test]
    fn test_masked_write_keeps_other_bits() {
        let sim = OffsetCache::connected();
        sim.update(|s| s.store(0x0D0C, OffsetWidth::Two, 0b1010_0000))
            .unwrap();
        exec(&sim, &action(0x0D0C, OffsetWidth::Two, "0x0F", Some(0x03))).unwrap();
        assert_eq!(sim.drain_writes()[0].value, 0b1010_0011);
    }

    #[test]
    fn test_toggle_reads_snapshot() {
        let sim = OffsetCache::connected();
        let toggle = action(0x0BE8, OffsetWidth::Four, "if($=0,16383,0)", None);
        exec(&sim, &toggle).unwrap();
        sim.flush().unwrap();
        exec(&sim, &toggle).unwrap();
        assert_eq!(sim.drain_writes()[0].value, 0);
    }

    #[test]
    fn test_truncates_to_width() {
        let sim = OffsetCache::connected();
        exec(&sim, &action(0x0100, OffsetWidth::One, "-1", None)).unwrap();
        exec(&sim, &action(0x0100, OffsetWidth::One, "0x1FF", None)).unwrap();
        let values: Vec<u64> = sim.drain_writes().iter().map(|w| w.value).collect();
        assert_eq!(values, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_not_connected_writes_nothing() {
        let sim = OffsetCache::connected();
        sim.set_status(ConnectionStatus::Lost);
        assert_eq!(
            exec(&sim, &action(0x0C02, OffsetWidth::Two, "1", None)),
            Err(ActionError::NotConnected)
        );
        assert!(sim.pending_writes().is_empty());
    }

    #[test]
    fn test_division_by_zero_is_execute_error() {
        let sim = OffsetCache::connected();
        assert_eq!(
            exec(&sim, &action(0x0C02, OffsetWidth::Two, "1/$", None)),
            Err(ActionError::Expr(ExprError::DivisionByZero))
        );
    }
}
