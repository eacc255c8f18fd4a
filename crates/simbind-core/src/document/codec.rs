// Simbind Document Codec
// Reads and writes the versioned XML binding document

use std::path::Path;

use super::envelope::{self, format_hex, parse_hex, parse_number, parse_width, EnvelopeError};
use super::xml::XmlNode;
use super::{BindingId, Document, DocumentError, LoadReport, LoadWarning};
use crate::action::CompareOp;
use crate::binding::{ButtonBinding, InputBinding, InputTrigger, OutputBinding};
use crate::migrate;
use crate::output::{
    Comparison, DisplayTarget, LcdDisplay, OffsetSource, OutputConfig, OutputDisplay,
};
use crate::sim::OffsetWidth;

/// Generation written by this version
pub const CURRENT_VERSION: u32 = 3;

pub(crate) const ROOT: &str = "BindingDocument";
pub(crate) const OUTPUTS: &str = "outputs";
pub(crate) const OUTPUT: &str = "output";
pub(crate) const INPUTS: &str = "inputs";
pub(crate) const INPUT: &str = "input";
pub(crate) const SETTINGS: &str = "settings";

/// Load a document from XML text, migrating older generations
pub fn load_str(raw: &str) -> Result<LoadReport, DocumentError> {
    let mut root = XmlNode::parse(raw)?;
    let migrations = migrate::upgrade(&mut root)?;

    if let Some(raw) = root.attr("version") {
        let version: u32 = raw
            .trim()
            .parse()
            .map_err(|_| DocumentError::InvalidVersion(raw.to_string()))?;
        if version > CURRENT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                found: version,
                supported: CURRENT_VERSION,
            });
        }
    }

    for step in &migrations {
        log::info!("Applied migration {}", step);
    }

    let mut warnings = Vec::new();
    let mut document = Document::new();

    if let Some(outputs) = root.child(OUTPUTS) {
        for (index, node) in outputs.children_named(OUTPUT).enumerate() {
            let id = decode_id(node, &mut warnings);
            let (config, unparsed) = match decode_output(node) {
                Ok(config) => (config, None),
                Err(reason) => {
                    warnings.push(LoadWarning::InvalidOutput { index, reason });
                    (placeholder_output(node), Some(raw_settings(node)))
                }
            };
            let binding = OutputBinding {
                id,
                description: node.attr("description").unwrap_or_default().to_string(),
                active: parse_bool(node.attr("active")).unwrap_or(true),
                config,
                unparsed,
            };
            let taken = document.output(&id).is_some();
            let final_id = document.push_output(binding);
            if taken {
                warnings.push(LoadWarning::DuplicateId {
                    id,
                    replacement: final_id,
                });
            }
        }
    }

    if let Some(inputs) = root.child(INPUTS) {
        for (index, node) in inputs.children_named(INPUT).enumerate() {
            let id = decode_id(node, &mut warnings);
            let (trigger, button, unparsed) = match node.child(SETTINGS) {
                None => {
                    warnings.push(LoadWarning::InvalidInput {
                        index,
                        reason: "missing <settings>".to_string(),
                    });
                    (
                        InputTrigger::new("", 0),
                        ButtonBinding::default(),
                        Some(raw_settings(node)),
                    )
                }
                Some(settings) => match decode_trigger(settings) {
                    Ok(trigger) => (trigger, decode_button(id, settings, &mut warnings), None),
                    Err(reason) => {
                        warnings.push(LoadWarning::InvalidInput { index, reason });
                        let serial = settings.attr("serial").unwrap_or_default();
                        (
                            InputTrigger::new(serial, 0),
                            ButtonBinding::default(),
                            Some(settings.clone()),
                        )
                    }
                },
            };

            let binding = InputBinding {
                id,
                description: node.attr("description").unwrap_or_default().to_string(),
                active: parse_bool(node.attr("active")).unwrap_or(true),
                trigger,
                button,
                unparsed,
            };
            let taken = document.input(&id).is_some();
            let final_id = document.push_input(binding);
            if taken {
                warnings.push(LoadWarning::DuplicateId {
                    id,
                    replacement: final_id,
                });
            }
        }
    }

    for warning in &warnings {
        log::warn!("{}", warning);
    }

    Ok(LoadReport {
        document,
        warnings,
        migrations,
    })
}

/// Load a document file
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<LoadReport, DocumentError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&raw)
}

/// Serialize a document in the current generation
pub fn to_xml_string(document: &Document) -> Result<String, DocumentError> {
    let mut outputs = XmlNode::new(OUTPUTS);
    for binding in document.outputs() {
        outputs.children.push(
            XmlNode::new(OUTPUT)
                .with_attr("id", binding.id.to_string())
                .with_attr("active", binding.active.to_string())
                .with_attr("description", binding.description.as_str())
                .with_child(
                    binding
                        .unparsed
                        .clone()
                        .unwrap_or_else(|| encode_output(&binding.config)),
                ),
        );
    }

    let mut inputs = XmlNode::new(INPUTS);
    for binding in document.inputs() {
        let settings = binding.unparsed.clone().unwrap_or_else(|| {
            XmlNode::new(SETTINGS)
                .with_attr("serial", binding.trigger.serial.as_str())
                .with_attr("pin", binding.trigger.pin.to_string())
                .with_child(envelope::encode_button(&binding.button))
        });
        inputs.children.push(
            XmlNode::new(INPUT)
                .with_attr("id", binding.id.to_string())
                .with_attr("active", binding.active.to_string())
                .with_attr("description", binding.description.as_str())
                .with_child(settings),
        );
    }

    XmlNode::new(ROOT)
        .with_attr("version", CURRENT_VERSION.to_string())
        .with_child(outputs)
        .with_child(inputs)
        .to_xml_string()
}

/// Write a document file
pub fn save_file<P: AsRef<Path>>(document: &Document, path: P) -> Result<(), DocumentError> {
    let path = path.as_ref();
    let xml = to_xml_string(document)?;
    std::fs::write(path, xml).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_id(node: &XmlNode, warnings: &mut Vec<LoadWarning>) -> BindingId {
    match node.attr("id").map(str::trim) {
        None | Some("") => BindingId::generate(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            let replacement = BindingId::generate();
            warnings.push(LoadWarning::InvalidId {
                raw: raw.to_string(),
                replacement,
            });
            replacement
        }),
    }
}

/// Settings element of a row as written, or an empty one when absent
fn raw_settings(node: &XmlNode) -> XmlNode {
    node.child(SETTINGS)
        .cloned()
        .unwrap_or_else(|| XmlNode::new(SETTINGS))
}

fn decode_button(
    id: BindingId,
    settings: &XmlNode,
    warnings: &mut Vec<LoadWarning>,
) -> ButtonBinding {
    match settings
        .child(envelope::BUTTON)
        .ok_or(EnvelopeError::MissingButton)
        .and_then(envelope::decode_button)
    {
        Ok(button) => button,
        Err(error) => {
            warnings.push(LoadWarning::Envelope { id, error });
            ButtonBinding::default()
        }
    }
}

/// Stand-in config for an output row that failed to decode. Keeps the
/// module serial so the row still shows up in serial checks.
fn placeholder_output(node: &XmlNode) -> OutputConfig {
    let serial = node
        .child(SETTINGS)
        .and_then(|settings| settings.child("display"))
        .and_then(|display| display.attr("serial"))
        .unwrap_or_default();
    OutputConfig::new(
        OffsetSource::new(0, OffsetWidth::One),
        OutputDisplay::pin(serial, ""),
    )
}

fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn decode_trigger(settings: &XmlNode) -> Result<InputTrigger, String> {
    let serial = settings
        .attr("serial")
        .ok_or_else(|| "missing serial".to_string())?;
    let raw = settings.attr("pin").ok_or_else(|| "missing pin".to_string())?;
    let pin = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid pin '{}'", raw))?;
    Ok(InputTrigger::new(serial, pin))
}

fn decode_output(node: &XmlNode) -> Result<OutputConfig, String> {
    let settings = node
        .child(SETTINGS)
        .ok_or_else(|| "missing <settings>".to_string())?;

    let source = settings
        .child("source")
        .ok_or_else(|| "missing <source>".to_string())?;
    let raw = source.attr("offset").unwrap_or_default();
    let offset = parse_hex(raw)
        .and_then(|o| u32::try_from(o).ok())
        .ok_or_else(|| format!("invalid offset '{}'", raw))?;
    let raw = source.attr("width").unwrap_or_default();
    let width = parse_width(raw).ok_or_else(|| format!("invalid width '{}'", raw))?;
    let mask = match source.attr("mask").map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_number(raw).ok_or_else(|| format!("invalid mask '{}'", raw))?),
    };

    let comparison = match settings.child("comparison") {
        None => Comparison::default(),
        Some(node) => {
            let raw = node.attr("operand").unwrap_or("=");
            Comparison {
                active: parse_bool(node.attr("active")).unwrap_or(false),
                operand: CompareOp::from_symbol(raw)
                    .ok_or_else(|| format!("invalid operand '{}'", raw))?,
                value: node.attr("value").unwrap_or_default().to_string(),
                if_value: node.attr("ifValue").unwrap_or_default().to_string(),
                else_value: node.attr("elseValue").unwrap_or_default().to_string(),
            }
        }
    };

    let display = settings
        .child("display")
        .ok_or_else(|| "missing <display>".to_string())?;
    let target = match display.attr("type").unwrap_or("Pin") {
        "Pin" => DisplayTarget::Pin {
            pin: display.attr("pin").unwrap_or_default().to_string(),
        },
        "Lcd" => {
            let count = |attr: &str| -> Result<usize, String> {
                let raw = display.attr(attr).unwrap_or_default();
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid {} '{}'", attr, raw))
            };
            let mut lcd = LcdDisplay::new(
                display.attr("address").unwrap_or_default(),
                count("cols")?,
                count("rows")?,
            )
            .with_lines(
                display
                    .children_named("line")
                    .map(|line| line.attr("text").unwrap_or_default()),
            );
            lcd.escape_char = display.attr("escapeChar").and_then(|c| c.chars().next());
            DisplayTarget::Lcd(lcd)
        }
        other => return Err(format!("unknown display type '{}'", other)),
    };

    Ok(OutputConfig {
        source: OffsetSource {
            offset,
            width,
            mask,
        },
        comparison,
        display: OutputDisplay {
            serial: display.attr("serial").unwrap_or_default().to_string(),
            trigger: display
                .attr("trigger")
                .unwrap_or(OutputDisplay::DEFAULT_TRIGGER)
                .to_string(),
            target,
        },
    })
}

fn encode_output(config: &OutputConfig) -> XmlNode {
    let mut source = XmlNode::new("source")
        .with_attr("offset", format_hex(config.source.offset as u64, 4))
        .with_attr("width", config.source.width.bytes().to_string());
    if let Some(mask) = config.source.mask {
        source.set_attr("mask", format_hex(mask, 0));
    }

    let cmp = &config.comparison;
    let comparison = XmlNode::new("comparison")
        .with_attr("active", cmp.active.to_string())
        .with_attr("operand", cmp.operand.symbol())
        .with_attr("value", cmp.value.as_str())
        .with_attr("ifValue", cmp.if_value.as_str())
        .with_attr("elseValue", cmp.else_value.as_str());

    let shown = &config.display;
    let mut display = XmlNode::new("display")
        .with_attr("type", shown.target.type_name())
        .with_attr("serial", shown.serial.as_str())
        .with_attr("trigger", shown.trigger.as_str());
    match &shown.target {
        DisplayTarget::Pin { pin } => display.set_attr("pin", pin.as_str()),
        DisplayTarget::Lcd(lcd) => {
            display.set_attr("address", lcd.address.as_str());
            display.set_attr("cols", lcd.cols.to_string());
            display.set_attr("rows", lcd.rows.to_string());
            if let Some(escape) = lcd.escape_char {
                display.set_attr("escapeChar", escape.to_string());
            }
            for line in &lcd.lines {
                display
                    .children
                    .push(XmlNode::new("line").with_attr("text", line.as_str()));
            }
        }
    }

    XmlNode::new(SETTINGS)
        .with_child(source)
        .with_child(comparison)
        .with_child(display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{InputAction, OffsetAction, ValueExpr};

    const CURRENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<BindingDocument version="3">
  <outputs>
    <output id="6f1c2a4e-8a51-4c1e-9d3b-2f0e4b1a7c11" active="true" description="Gear lamp">
      <settings>
        <source offset="0x0BE8" width="4" mask="0xFFFF"/>
        <comparison active="true" operand="=" value="16383" ifValue="1" elseValue="0"/>
        <display type="Pin" serial="ABC123" trigger="normal" pin="5"/>
      </settings>
    </output>
  </outputs>
  <inputs>
    <input id="0b7f9c2d-3e4a-4f5b-8c6d-7e8f9a0b1c2d" active="true" description="Gear lever">
      <settings serial="ABC123" pin="3">
        <button>
          <onPress type="OffsetAction" address="0x0BE8" width="4" value="16383"/>
          <onRelease/>
        </button>
      </settings>
    </input>
  </inputs>
</BindingDocument>"#;

    #[test]
    fn test_load_current_document() {
        let report = load_str(CURRENT).unwrap();
        assert!(report.warnings.is_empty());
        assert!(report.migrations.is_empty());

        let output = report.document.outputs().next().unwrap();
        assert_eq!(output.description, "Gear lamp");
        assert_eq!(output.config.source.mask, Some(0xFFFF));
        assert!(output.config.comparison.active);

        let input = report.document.inputs().next().unwrap();
        assert_eq!(input.trigger, InputTrigger::new("ABC123", 3));
        assert_eq!(
            input.button.on_press,
            Some(InputAction::Offset(OffsetAction::new(
                0x0BE8,
                OffsetWidth::Four,
                ValueExpr::constant(16383),
                None
            )))
        );
        assert!(input.button.on_release.is_none());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let first = load_str(CURRENT).unwrap().document;
        let xml = to_xml_string(&first).unwrap();
        let second = load_str(&xml).unwrap();
        assert!(second.warnings.is_empty());
        assert_eq!(second.document, first);
    }

    #[test]
    fn test_lcd_roundtrip_keeps_spaces() {
        let mut lcd = LcdDisplay::new("0x27", 16, 2).with_lines(["  ALT $$$$$", "HDG \\$ $$$"]);
        lcd.escape_char = Some('\\');
        let mut document = Document::new();
        document.push_output(OutputBinding::new(
            "fcu",
            OutputConfig::new(
                OffsetSource::new(0x07D4, OffsetWidth::Four),
                OutputDisplay::lcd("ABC123", lcd),
            ),
        ));
        let xml = to_xml_string(&document).unwrap();
        assert_eq!(load_str(&xml).unwrap().document, document);
    }

    #[test]
    fn test_unknown_kind_disables_button_only() {
        let xml = CURRENT.replace(r#"type="OffsetAction""#, r#"type="MacroAction""#);
        let report = load_str(&xml).unwrap();
        assert_eq!(report.document.input_count(), 1);
        assert_eq!(report.document.output_count(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            LoadWarning::Envelope {
                error: EnvelopeError::UnknownKind { .. },
                ..
            }
        ));
        let input = report.document.inputs().next().unwrap();
        assert_eq!(input.button, ButtonBinding::default());
    }

    #[test]
    fn test_duplicate_ids_regenerated() {
        let xml = CURRENT.replace(
            "0b7f9c2d-3e4a-4f5b-8c6d-7e8f9a0b1c2d",
            "6f1c2a4e-8a51-4c1e-9d3b-2f0e4b1a7c11",
        );
        // outputs and inputs are separate collections, so this is not a clash
        assert!(load_str(&xml).unwrap().warnings.is_empty());

        let doubled = CURRENT.replace(
            "</inputs>",
            r#"<input id="0b7f9c2d-3e4a-4f5b-8c6d-7e8f9a0b1c2d" description="again">
                 <settings serial="ABC123" pin="4"><button><onPress/><onRelease/></button></settings>
               </input></inputs>"#,
        );
        let report = load_str(&doubled).unwrap();
        assert_eq!(report.document.input_count(), 2);
        assert!(matches!(
            report.warnings.as_slice(),
            [LoadWarning::DuplicateId { .. }]
        ));
    }

    #[test]
    fn test_missing_and_invalid_ids() {
        let xml = CURRENT
            .replace(r#"id="6f1c2a4e-8a51-4c1e-9d3b-2f0e4b1a7c11" "#, "")
            .replace("0b7f9c2d-3e4a-4f5b-8c6d-7e8f9a0b1c2d", "row-1");
        let report = load_str(&xml).unwrap();
        assert_eq!(report.document.len(), 2);
        assert!(matches!(
            report.warnings.as_slice(),
            [LoadWarning::InvalidId { .. }]
        ));
    }

    #[test]
    fn test_newer_version_rejected() {
        let xml = CURRENT.replace(r#"version="3""#, r#"version="4""#);
        assert!(matches!(
            load_str(&xml),
            Err(DocumentError::UnsupportedVersion { found: 4, .. })
        ));
    }

    #[test]
    fn test_missing_inputs_loads_empty() {
        let report =
            load_str(r#"<BindingDocument version="3"><outputs/></BindingDocument>"#).unwrap();
        assert!(report.document.is_empty());
    }

    #[test]
    fn test_invalid_rows_kept_as_no_op() {
        let xml = CURRENT
            .replace(r#"offset="0x0BE8""#, r#"offset="zz""#)
            .replace(r#"pin="3""#, r#"pin="three""#);
        let report = load_str(&xml).unwrap();
        assert_eq!(report.document.output_count(), 1);
        assert_eq!(report.document.input_count(), 1);
        assert!(matches!(
            report.warnings.as_slice(),
            [
                LoadWarning::InvalidOutput { index: 0, .. },
                LoadWarning::InvalidInput { index: 0, .. }
            ]
        ));

        let output = report.document.outputs().next().unwrap();
        assert_eq!(output.description, "Gear lamp");
        assert!(output.active);
        assert!(!output.is_runnable());
        assert_eq!(output.config.display.serial, "ABC123");
        let input = report.document.inputs().next().unwrap();
        assert_eq!(input.description, "Gear lever");
        assert!(!input.is_runnable());
        assert_eq!(input.trigger.serial, "ABC123");

        let saved = to_xml_string(&report.document).unwrap();
        assert!(saved.contains("6f1c2a4e-8a51-4c1e-9d3b-2f0e4b1a7c11"));
        assert!(saved.contains(r#"offset="zz""#));
        assert!(saved.contains(r#"pin="three""#));
        assert!(saved.contains(r#"value="16383""#));

        let reloaded = load_str(&saved).unwrap();
        assert_eq!(reloaded.warnings.len(), 2);
        assert_eq!(reloaded.document, report.document);
    }

    #[test]
    fn test_input_without_settings_kept() {
        let xml = CURRENT.replace(
            "</inputs>",
            r#"<input id="1c2d3e4f-5a6b-4c7d-8e9f-0a1b2c3d4e5f" description="blank"/></inputs>"#,
        );
        let report = load_str(&xml).unwrap();
        assert_eq!(report.document.input_count(), 2);
        assert!(matches!(
            report.warnings.as_slice(),
            [LoadWarning::InvalidInput { index: 1, .. }]
        ));
        let saved = to_xml_string(&report.document).unwrap();
        assert!(saved.contains("1c2d3e4f-5a6b-4c7d-8e9f-0a1b2c3d4e5f"));
    }
}
