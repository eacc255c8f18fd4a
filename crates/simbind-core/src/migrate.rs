// Simbind Document Migration
// Upgrades older document generations to the current layout, oldest step first

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::document::envelope::{format_hex, parse_hex, parse_number, parse_width};
use crate::document::xml::XmlNode;

const CURRENT_ROOT: &str = "BindingDocument";
const LEGACY_ROOT: &str = "BridgeConfig";
const LEGACY_SETTINGS: &str = "BridgeItem";

/// Flat columns of a generation 1 output row
const FLAT_COLUMNS: &[&str] = &[
    "offset",
    "size",
    "mask",
    "comparison",
    "comparisonValue",
    "converter",
    "trigger",
    "pin",
    "serial",
];

/// One upgrade in the chain. Variant order is chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum MigrationStep {
    /// Root element renamed from `BridgeConfig`
    LegacyRoot,
    /// Output rows stored as flat columns instead of a `settings` tree
    FlatOutputRows,
    /// `BridgeItem` elements renamed to `settings`
    BridgeItemSettings,
}

impl MigrationStep {
    /// Document generation this step upgrades from
    pub fn generation(self) -> u32 {
        match self {
            MigrationStep::LegacyRoot | MigrationStep::FlatOutputRows => 1,
            MigrationStep::BridgeItemSettings => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("Unrecognized document root <{0}>")]
    UnknownRoot(String),

    #[error("Output row {index} has none of the expected columns")]
    EmptyRow { index: usize },

    #[error("Output row {index}: invalid {column} '{value}'")]
    InvalidColumn {
        index: usize,
        column: &'static str,
        value: String,
    },
}

/// Upgrade `root` to the current layout, running each step of the chain in
/// order. Returns the steps that changed something.
pub(crate) fn upgrade(root: &mut XmlNode) -> Result<Vec<MigrationStep>, MigrationError> {
    let mut applied = Vec::new();
    for step in MigrationStep::iter() {
        if step.apply(root)? {
            log::debug!("Migration step {} applied", step);
            applied.push(step);
        }
    }
    if root.name != CURRENT_ROOT {
        return Err(MigrationError::UnknownRoot(root.name.clone()));
    }
    Ok(applied)
}

impl MigrationStep {
    fn apply(self, root: &mut XmlNode) -> Result<bool, MigrationError> {
        match self {
            MigrationStep::LegacyRoot => {
                if root.name != LEGACY_ROOT {
                    return Ok(false);
                }
                root.name = CURRENT_ROOT.to_string();
                Ok(true)
            }
            MigrationStep::FlatOutputRows => expand_flat_rows(root),
            MigrationStep::BridgeItemSettings => {
                Ok(rename_all(root, LEGACY_SETTINGS, "settings") > 0)
            }
        }
    }
}

/// Rename every element named exactly `from`; returns how many were renamed
fn rename_all(node: &mut XmlNode, from: &str, to: &str) -> usize {
    let mut renamed = 0;
    if node.name == from {
        node.name = to.to_string();
        renamed += 1;
    }
    for child in &mut node.children {
        renamed += rename_all(child, from, to);
    }
    renamed
}

fn expand_flat_rows(root: &mut XmlNode) -> Result<bool, MigrationError> {
    if root.name != CURRENT_ROOT {
        return Ok(false);
    }
    let Some(outputs) = root.child_mut("outputs") else {
        return Ok(false);
    };

    let mut rewrote = false;
    for (index, row) in outputs
        .children
        .iter_mut()
        .filter(|c| c.name == "output")
        .enumerate()
    {
        if row.child("settings").is_none() && row.child(LEGACY_SETTINGS).is_none() {
            expand_flat_row(index, row)?;
            rewrote = true;
        }
    }
    Ok(rewrote)
}

/// Build the `settings` tree of one flat output row in place
fn expand_flat_row(index: usize, row: &mut XmlNode) -> Result<(), MigrationError> {
    if !FLAT_COLUMNS.iter().any(|c| row.child(c).is_some()) {
        return Err(MigrationError::EmptyRow { index });
    }

    // Row metadata moves to attributes
    for (column, attr) in [("guid", "id"), ("active", "active"), ("description", "description")] {
        if let Some(cell) = row.take_child(column) {
            if row.attr(attr).is_none() {
                row.set_attr(attr, cell.text);
            }
        }
    }

    let mut column = |name: &str| row.take_child(name).map(|cell| cell.text.trim().to_string());
    let offset = column("offset");
    let size = column("size");
    let mask = column("mask");
    let comparison = column("comparison");
    let comparison_value = column("comparisonValue");
    let converter = column("converter");
    let trigger = column("trigger");
    let pin = column("pin");
    let serial = column("serial");

    let invalid = |column: &'static str, value: &str| MigrationError::InvalidColumn {
        index,
        column,
        value: value.to_string(),
    };

    let offset_value = match offset.as_deref() {
        None | Some("") => 0,
        Some(raw) => parse_hex(raw).ok_or_else(|| invalid("offset", raw))?,
    };
    let width = match size.as_deref() {
        None | Some("") => 1,
        Some(raw) => parse_width(raw).ok_or_else(|| invalid("size", raw))?.bytes(),
    };
    let mut source = XmlNode::new("source")
        .with_attr("offset", format_hex(offset_value, 4))
        .with_attr("width", width.to_string());
    match mask.as_deref() {
        None | Some("") => {}
        Some(raw) => {
            let mask = parse_number(raw).ok_or_else(|| invalid("mask", raw))?;
            source.set_attr("mask", format_hex(mask, 0));
        }
    }

    let (if_value, else_value) = match converter.as_deref() {
        Some("Boolean") => ("1", "0"),
        _ => ("", ""),
    };
    let operand = comparison.as_deref().filter(|op| !op.is_empty()).unwrap_or("=");
    let comparison = XmlNode::new("comparison")
        .with_attr("active", comparison.is_some().to_string())
        .with_attr("operand", operand)
        .with_attr("value", comparison_value.unwrap_or_default())
        .with_attr("ifValue", if_value)
        .with_attr("elseValue", else_value);

    let display = XmlNode::new("display")
        .with_attr("type", "Pin")
        .with_attr("serial", serial.unwrap_or_default())
        .with_attr(
            "trigger",
            trigger.filter(|t| !t.is_empty()).unwrap_or_else(|| "normal".to_string()),
        )
        .with_attr("pin", pin.unwrap_or_default());

    row.children.push(
        XmlNode::new("settings")
            .with_child(source)
            .with_child(comparison)
            .with_child(display),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        let steps: Vec<_> = MigrationStep::iter().collect();
        let mut sorted = steps.clone();
        sorted.sort();
        assert_eq!(steps, sorted);
        assert!(steps.windows(2).all(|w| w[0].generation() <= w[1].generation()));
    }

    #[test]
    fn test_steps_applied_oldest_first() {
        let mut root = XmlNode::parse(
            "<BridgeConfig><outputs>\
               <output><offset>0BE8</offset><pin>5</pin></output>\
               <output><BridgeItem><source offset=\"0x0BE8\" width=\"1\"/></BridgeItem></output>\
             </outputs><inputs><input><BridgeItem/></input></inputs></BridgeConfig>",
        )
        .unwrap();
        let applied = upgrade(&mut root).unwrap();
        assert_eq!(
            applied,
            vec![
                MigrationStep::LegacyRoot,
                MigrationStep::FlatOutputRows,
                MigrationStep::BridgeItemSettings
            ]
        );
        let outputs: Vec<_> = root.child("outputs").unwrap().children_named("output").collect();
        assert!(outputs.iter().all(|o| o.child("settings").is_some()));
        let input = root.child("inputs").unwrap().child("input").unwrap();
        assert!(input.child("settings").is_some());
    }

    #[test]
    fn test_current_tree_untouched() {
        let mut root = XmlNode::parse("<BindingDocument version=\"3\"/>").unwrap();
        let before = root.clone();
        assert!(upgrade(&mut root).unwrap().is_empty());
        assert_eq!(root, before);
    }

    #[test]
    fn test_only_exact_names_renamed() {
        let mut root = XmlNode::parse(
            "<BindingDocument><inputs><input><BridgeItemX/><BridgeItem/></input></inputs></BindingDocument>",
        )
        .unwrap();
        assert_eq!(upgrade(&mut root).unwrap(), vec![MigrationStep::BridgeItemSettings]);
        let input = root.child("inputs").unwrap().child("input").unwrap();
        let names: Vec<_> = input.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["BridgeItemX", "settings"]);

        let mut root = XmlNode::parse("<BridgeConfigs/>").unwrap();
        assert_eq!(
            upgrade(&mut root),
            Err(MigrationError::UnknownRoot("BridgeConfigs".to_string()))
        );
    }

    #[test]
    fn test_flat_row_expansion() {
        let mut root = XmlNode::parse(
            "<BindingDocument><outputs><output>\
               <active>true</active><description>Gear lamp</description>\
               <offset>0BE8</offset><size>4</size><mask></mask>\
               <comparison>=</comparison><comparisonValue>16383</comparisonValue>\
               <converter>Boolean</converter><pin>5</pin><serial>ABC123</serial>\
             </output></outputs></BindingDocument>",
        )
        .unwrap();
        assert_eq!(upgrade(&mut root).unwrap(), vec![MigrationStep::FlatOutputRows]);

        let row = root.child("outputs").unwrap().child("output").unwrap();
        assert_eq!(row.attr("description"), Some("Gear lamp"));
        assert_eq!(row.children.len(), 1);
        let settings = row.child("settings").unwrap();
        let source = settings.child("source").unwrap();
        assert_eq!(source.attr("offset"), Some("0x0BE8"));
        assert_eq!(source.attr("mask"), None);
        let comparison = settings.child("comparison").unwrap();
        assert_eq!(comparison.attr("active"), Some("true"));
        assert_eq!(comparison.attr("ifValue"), Some("1"));
        let display = settings.child("display").unwrap();
        assert_eq!(display.attr("pin"), Some("5"));
        assert_eq!(display.attr("trigger"), Some("normal"));
    }

    #[test]
    fn test_empty_row_is_fatal() {
        let mut root =
            XmlNode::parse("<BindingDocument><outputs><output/></outputs></BindingDocument>")
                .unwrap();
        assert_eq!(upgrade(&mut root), Err(MigrationError::EmptyRow { index: 0 }));
    }

    #[test]
    fn test_unknown_root_is_fatal() {
        let mut root = XmlNode::parse("<Config/>").unwrap();
        assert_eq!(
            upgrade(&mut root),
            Err(MigrationError::UnknownRoot("Config".to_string()))
        );
    }
}
