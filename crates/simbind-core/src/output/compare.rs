// Simbind Output Comparison
// Maps a raw offset value onto the value shown on an output

use crate::action::CompareOp;

/// Optional comparison stage between the offset value and the display.
///
/// Compares numerically when both sides parse as numbers, otherwise as
/// strings (where only `=` and `!=` can match). The chosen branch may use
/// `$` for the value itself; an empty branch passes the value through.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub active: bool,
    pub operand: CompareOp,
    pub value: String,
    pub if_value: String,
    pub else_value: String,
}

impl Default for Comparison {
    fn default() -> Self {
        Self {
            active: false,
            operand: CompareOp::Eq,
            value: String::new(),
            if_value: String::new(),
            else_value: String::new(),
        }
    }
}

impl Comparison {
    pub fn new(
        operand: CompareOp,
        value: impl Into<String>,
        if_value: impl Into<String>,
        else_value: impl Into<String>,
    ) -> Self {
        Self {
            active: true,
            operand,
            value: value.into(),
            if_value: if_value.into(),
            else_value: else_value.into(),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match (value.trim().parse::<f64>(), self.value.trim().parse::<f64>()) {
            (Ok(lhs), Ok(rhs)) => self.operand.holds(lhs, rhs),
            _ => match self.operand {
                CompareOp::Eq => value == self.value,
                CompareOp::Ne => value != self.value,
                _ => false,
            },
        }
    }

    pub fn apply(&self, value: &str) -> String {
        if !self.active {
            return value.to_string();
        }
        let branch = if self.matches(value) {
            &self.if_value
        } else {
            &self.else_value
        };
        if branch.is_empty() {
            value.to_string()
        } else {
            branch.replace('$', value)
        }
    }
}
