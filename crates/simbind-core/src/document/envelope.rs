// Simbind Action Envelope
// Self-describing encoding of button slots: `type` attribute plus field attributes

use crate::action::{
    ActionKind, EventIdAction, InputAction, KeyAction, LegacyDeviceAction, OffsetAction,
    ValueExpr,
};
use crate::binding::{ButtonBinding, Slot};
use crate::modifier::KeyModifier;
use crate::sim::OffsetWidth;
use crate::Key;

use super::xml::XmlNode;

/// Element holding the two slots
pub const BUTTON: &str = "button";

/// Attribute carrying the action kind
pub const TYPE_ATTR: &str = "type";

/// Problems decoding a button's slots
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Missing <button> element")]
    MissingButton,

    #[error("Missing <{0}> element")]
    MissingSlot(Slot),

    #[error("<{0}> appears more than once")]
    DuplicateSlot(Slot),

    #[error("<{0}> has attributes but no type")]
    MissingKind(Slot),

    #[error("Unknown action type '{kind}' in <{slot}>")]
    UnknownKind { slot: Slot, kind: String },

    #[error("<{slot}> is missing attribute '{attr}'")]
    MissingAttribute { slot: Slot, attr: &'static str },

    #[error("<{slot}> attribute '{attr}' is invalid: {reason}")]
    InvalidAttribute {
        slot: Slot,
        attr: &'static str,
        reason: String,
    },
}

/// Parse a hex number, `0x` prefix optional
pub(crate) fn parse_hex(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u64::from_str_radix(digits, 16).ok()
}

/// Parse a number: hex with `0x` prefix, decimal otherwise
pub(crate) fn parse_number(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.starts_with("0x") || raw.starts_with("0X") {
        parse_hex(raw)
    } else {
        raw.parse().ok()
    }
}

pub(crate) fn format_hex(value: u64, digits: usize) -> String {
    format!("0x{:0width$X}", value, width = digits)
}

pub(crate) fn parse_width(raw: &str) -> Option<OffsetWidth> {
    raw.trim().parse::<u8>().ok().and_then(OffsetWidth::from_bytes)
}

/// Slot-aware attribute reader
struct Fields<'a> {
    slot: Slot,
    node: &'a XmlNode,
}

impl<'a> Fields<'a> {
    fn required(&self, attr: &'static str) -> Result<&'a str, EnvelopeError> {
        self.node
            .attr(attr)
            .ok_or(EnvelopeError::MissingAttribute {
                slot: self.slot,
                attr,
            })
    }

    fn invalid(&self, attr: &'static str, reason: impl Into<String>) -> EnvelopeError {
        EnvelopeError::InvalidAttribute {
            slot: self.slot,
            attr,
            reason: reason.into(),
        }
    }

    fn offset(&self) -> Result<OffsetAction, EnvelopeError> {
        let raw = self.required("address")?;
        let address = parse_hex(raw)
            .and_then(|a| u32::try_from(a).ok())
            .ok_or_else(|| self.invalid("address", format!("'{}' is not a hex offset", raw)))?;

        let raw = self.required("width")?;
        let width = parse_width(raw)
            .ok_or_else(|| self.invalid("width", format!("'{}' is not 1, 2, 4 or 8", raw)))?;

        let value = ValueExpr::parse(self.required("value")?)
            .map_err(|e| self.invalid("value", e.to_string()))?;

        let mask = match self.node.attr("mask").map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                parse_number(raw)
                    .ok_or_else(|| self.invalid("mask", format!("'{}' is not a number", raw)))?,
            ),
        };

        Ok(OffsetAction::new(address, width, value, mask))
    }

    fn key(&self) -> Result<KeyAction, EnvelopeError> {
        let raw = self.required("key")?;
        let key = Key::from_name(raw).ok_or_else(|| self.invalid("key", format!("unknown key '{}'", raw)))?;
        let modifiers = match self.node.attr("modifiers") {
            Some(list) => KeyModifier::parse_list(list).map_err(|e| self.invalid("modifiers", e.to_string()))?,
            None => Default::default(),
        };
        Ok(KeyAction { key, modifiers })
    }

    fn event_id(&self) -> Result<EventIdAction, EnvelopeError> {
        let event = self.required("event")?.trim();
        if event.is_empty() {
            return Err(self.invalid("event", "empty event name"));
        }
        let param = match self.node.attr("param").map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| self.invalid("param", format!("'{}' is not an integer", raw)))?,
            ),
        };
        Ok(EventIdAction::new(event, param))
    }
}

/// Decode one slot element. An element without attributes is an empty slot.
pub fn decode_action(slot: Slot, node: &XmlNode) -> Result<Option<InputAction>, EnvelopeError> {
    if node.attrs.is_empty() {
        return Ok(None);
    }
    let kind = node
        .attr(TYPE_ATTR)
        .ok_or(EnvelopeError::MissingKind(slot))?;
    let kind: ActionKind = kind.trim().parse().map_err(|_| EnvelopeError::UnknownKind {
        slot,
        kind: kind.to_string(),
    })?;

    let fields = Fields { slot, node };
    let action = match kind {
        ActionKind::Key => InputAction::Key(fields.key()?),
        ActionKind::EventId => InputAction::EventId(fields.event_id()?),
        ActionKind::Offset => InputAction::Offset(fields.offset()?),
        ActionKind::LegacyDevice => {
            InputAction::LegacyDevice(LegacyDeviceAction::from_offset(fields.offset()?))
        }
    };
    Ok(Some(action))
}

fn encode_offset(node: &mut XmlNode, action: &OffsetAction) {
    node.set_attr("address", format_hex(action.address as u64, 4));
    node.set_attr("width", action.width.bytes().to_string());
    node.set_attr("value", action.value.source());
    if let Some(mask) = action.mask {
        node.set_attr("mask", format_hex(mask, 0));
    }
}

/// Encode one slot element; an absent action is an empty element
pub fn encode_action(slot: Slot, action: Option<&InputAction>) -> XmlNode {
    let mut node = XmlNode::new(slot.to_string());
    let Some(action) = action else {
        return node;
    };

    node.set_attr(TYPE_ATTR, action.kind().to_string());
    match action {
        InputAction::Key(key) => {
            node.set_attr("key", key.key.to_string());
            if !key.modifiers.is_empty() {
                node.set_attr("modifiers", KeyModifier::format_list(&key.modifiers));
            }
        }
        InputAction::EventId(event) => {
            node.set_attr("event", event.event.as_str());
            if let Some(param) = event.param {
                node.set_attr("param", param.to_string());
            }
        }
        InputAction::Offset(offset) => encode_offset(&mut node, offset),
        InputAction::LegacyDevice(legacy) => encode_offset(&mut node, legacy.offset()),
    }
    node
}

/// Decode a `<button>` element. Slots may appear in either order.
pub fn decode_button(node: &XmlNode) -> Result<ButtonBinding, EnvelopeError> {
    let mut on_press: Option<Option<InputAction>> = None;
    let mut on_release: Option<Option<InputAction>> = None;

    for child in &node.children {
        let Ok(slot) = child.name.parse::<Slot>() else {
            continue;
        };
        let entry = match slot {
            Slot::OnPress => &mut on_press,
            Slot::OnRelease => &mut on_release,
        };
        if entry.is_some() {
            return Err(EnvelopeError::DuplicateSlot(slot));
        }
        *entry = Some(decode_action(slot, child)?);
    }

    Ok(ButtonBinding {
        on_press: on_press.ok_or(EnvelopeError::MissingSlot(Slot::OnPress))?,
        on_release: on_release.ok_or(EnvelopeError::MissingSlot(Slot::OnRelease))?,
    })
}

/// Encode a button; both slots are always written
pub fn encode_button(button: &ButtonBinding) -> XmlNode {
    XmlNode::new(BUTTON)
        .with_child(encode_action(Slot::OnPress, button.on_press.as_ref()))
        .with_child(encode_action(Slot::OnRelease, button.on_release.as_ref()))
}
