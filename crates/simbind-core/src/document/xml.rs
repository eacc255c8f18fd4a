// Simbind XML Tree
// Minimal element tree over quick-xml used by the document codec and migrations

use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::DocumentError;

/// One XML element with ordered attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: IndexMap<String, String>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder form of `set_attr`
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Remove and return the first child called `name`
    pub fn take_child(&mut self, name: &str) -> Option<XmlNode> {
        let index = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(index))
    }

    /// True for `<x/>`: no attributes, children or text
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.children.is_empty() && self.text.is_empty()
    }

    /// Parse a document and return its root element
    pub fn parse(source: &str) -> Result<XmlNode, DocumentError> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| DocumentError::Xml(e.to_string()))?;
            match event {
                Event::Start(start) => {
                    stack.push(Self::from_start(&start)?);
                }
                Event::Empty(start) => {
                    let node = Self::from_start(&start)?;
                    Self::attach(node, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| DocumentError::Xml("unbalanced end tag".to_string()))?;
                    Self::attach(node, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| DocumentError::Xml(e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(DocumentError::Xml("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| DocumentError::Xml("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<XmlNode, DocumentError> {
        let mut node = XmlNode::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(|e| DocumentError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DocumentError::Xml(e.to_string()))?;
            node.attrs.insert(key, value.into_owned());
        }
        Ok(node)
    }

    fn attach(
        node: XmlNode,
        stack: &mut [XmlNode],
        root: &mut Option<XmlNode>,
    ) -> Result<(), DocumentError> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None if root.is_none() => *root = Some(node),
            None => {
                return Err(DocumentError::Xml(
                    "document has more than one root element".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Serialize with an XML declaration and two-space indentation
    pub fn to_xml_string(&self) -> Result<String, DocumentError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| DocumentError::Xml(e.to_string()))?;
        self.write(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| DocumentError::Xml(e.to_string()))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), DocumentError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| DocumentError::Xml(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| DocumentError::Xml(e.to_string()))?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(|e| DocumentError::Xml(e.to_string()))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| DocumentError::Xml(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let root = XmlNode::parse(
            r#"<?xml version="1.0"?>
            <a x="1"><b y="&lt;2&gt;"/><c>text</c><b/></a>"#,
        )
        .unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.children_named("b").count(), 2);
        assert_eq!(root.child("b").unwrap().attr("y"), Some("<2>"));
        assert_eq!(root.child("c").unwrap().text, "text");
    }

    #[test]
    fn test_parse_errors() {
        assert!(XmlNode::parse("").is_err());
        assert!(XmlNode::parse("<a><b></a>").is_err());
        assert!(XmlNode::parse("<a/><b/>").is_err());
        assert!(XmlNode::parse("<a>").is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let node = XmlNode::new("line")
            .with_attr("text", "  HDG $$$ & \"x\"")
            .with_child(XmlNode::new("empty"));
        let xml = node.to_xml_string().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<empty/>"));
        assert_eq!(XmlNode::parse(&xml).unwrap(), node);
    }

    #[test]
    fn test_take_child() {
        let mut node = XmlNode::new("row")
            .with_child(XmlNode::new("offset"))
            .with_child(XmlNode::new("size"));
        assert!(node.take_child("offset").is_some());
        assert!(node.take_child("offset").is_none());
        assert_eq!(node.children.len(), 1);
    }
}
