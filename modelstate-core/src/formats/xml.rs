/*!
Markup-tree backend.

Every node becomes an element named after its tag. Value nodes hold their
text, levels hold child elements. The root element carries the document's
root name and attributes.

An element without child elements is read back as a value node, so an empty
level and an empty value are indistinguishable after a round trip; both
traverse as a node with empty value and no sub-level.
*/

use quick_xml::escape::unescape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use super::StateFormat;
use crate::document::{StateDocument, StateNode};
use crate::{PersistError, Result};

pub(crate) const FORMAT_NAME: &str = "xml";

/// XML state backend.
#[derive(Debug, Clone, Default)]
pub struct XmlStateFormat {
    indent: Option<usize>,
}

impl XmlStateFormat {
    /// Unindented output.
    pub fn new() -> Self {
        Self { indent: None }
    }

    /// Indent nested elements by `spaces`.
    pub fn with_indent(spaces: usize) -> Self {
        Self {
            indent: Some(spaces),
        }
    }
}

fn xml_error<E: std::fmt::Display>(error: E) -> PersistError {
    PersistError::format(format!("XML error: {error}"))
}

impl StateFormat for XmlStateFormat {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn write(&self, document: &StateDocument) -> Result<Vec<u8>> {
        if document.root_name.is_empty() {
            return Err(PersistError::validation(
                "XML state documents need a root name",
            ));
        }
        let mut writer = match self.indent {
            Some(spaces) => Writer::new_with_indent(Vec::new(), b' ', spaces),
            None => Writer::new(Vec::new()),
        };

        let mut root = BytesStart::new(document.root_name.as_str());
        for (key, value) in &document.root_attributes {
            root.push_attribute((key.as_str(), value.as_str()));
        }
        if document.children.is_empty() {
            writer.write_event(Event::Empty(root)).map_err(xml_error)?;
        } else {
            writer.write_event(Event::Start(root)).map_err(xml_error)?;
            write_nodes(&mut writer, &document.children)?;
            writer
                .write_event(Event::End(BytesEnd::new(document.root_name.as_str())))
                .map_err(xml_error)?;
        }
        Ok(writer.into_inner())
    }

    fn read(&self, bytes: &[u8]) -> Result<StateDocument> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut document: Option<StateDocument> = None;
        let mut open: Vec<OpenElement> = Vec::new();
        let mut closed_root = false;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(xml_error)?;
            match event {
                Event::Start(start) => {
                    let name = element_name(&start)?;
                    if closed_root {
                        return Err(PersistError::format(format!(
                            "Unexpected element '{name}' after the root element"
                        )));
                    }
                    if document.is_none() {
                        document = Some(root_document(&start, name)?);
                        open.push(OpenElement::new(String::new()));
                    } else {
                        if let Some(parent) = open.last_mut() {
                            parent.has_elements = true;
                        }
                        open.push(OpenElement::new(name));
                    }
                }
                Event::Empty(start) => {
                    let name = element_name(&start)?;
                    if closed_root {
                        return Err(PersistError::format(format!(
                            "Unexpected element '{name}' after the root element"
                        )));
                    }
                    if document.is_none() {
                        document = Some(root_document(&start, name)?);
                        closed_root = true;
                    } else if let Some(parent) = open.last_mut() {
                        parent.has_elements = true;
                        parent.children.push(StateNode::value(name, ""));
                    }
                }
                Event::End(_) => {
                    let Some(element) = open.pop() else {
                        return Err(PersistError::format("Unbalanced end tag"));
                    };
                    match open.last_mut() {
                        Some(parent) => parent.children.push(element.into_node()),
                        None => {
                            if let Some(document) = document.as_mut() {
                                document.children = element.children;
                            }
                            closed_root = true;
                        }
                    }
                }
                Event::Text(text) => {
                    let raw = std::str::from_utf8(&text).map_err(xml_error)?;
                    push_text(&mut open, &unescape(raw).map_err(xml_error)?);
                }
                Event::GeneralRef(reference) => {
                    let name = std::str::from_utf8(&reference).map_err(xml_error)?;
                    let entity = format!("&{name};");
                    push_text(&mut open, &unescape(&entity).map_err(xml_error)?);
                }
                Event::CData(data) => {
                    let raw = std::str::from_utf8(&data).map_err(xml_error)?;
                    push_text(&mut open, raw);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !open.is_empty() {
            return Err(PersistError::format(format!(
                "Unexpected end of input with {} element(s) open",
                open.len()
            )));
        }
        let document = document.ok_or_else(|| PersistError::format("No root element"))?;
        debug!(
            "Parsed XML state '{}' with {} node(s)",
            document.root_name,
            document.node_count()
        );
        Ok(document)
    }
}

fn write_nodes<W: std::io::Write>(writer: &mut Writer<W>, nodes: &[StateNode]) -> Result<()> {
    for node in nodes {
        let name = node.name.as_str();
        match &node.value {
            Some(value) if !value.is_empty() => {
                writer
                    .write_event(Event::Start(BytesStart::new(name)))
                    .map_err(xml_error)?;
                writer
                    .write_event(Event::Text(BytesText::new(value)))
                    .map_err(xml_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(xml_error)?;
            }
            None if !node.children.is_empty() => {
                writer
                    .write_event(Event::Start(BytesStart::new(name)))
                    .map_err(xml_error)?;
                write_nodes(writer, &node.children)?;
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(xml_error)?;
            }
            _ => {
                writer
                    .write_event(Event::Empty(BytesStart::new(name)))
                    .map_err(xml_error)?;
            }
        }
    }
    Ok(())
}

fn element_name(start: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(xml_error)
}

fn root_document(start: &BytesStart<'_>, name: String) -> Result<StateDocument> {
    let mut document = StateDocument::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = std::str::from_utf8(attribute.key.as_ref()).map_err(xml_error)?;
        let raw = std::str::from_utf8(&attribute.value).map_err(xml_error)?;
        let value = unescape(raw).map_err(xml_error)?;
        document
            .root_attributes
            .insert(key.to_string(), value.into_owned());
    }
    Ok(document)
}

fn push_text(open: &mut [OpenElement], text: &str) {
    if let Some(element) = open.last_mut() {
        element.text.push_str(text);
    }
}

struct OpenElement {
    name: String,
    text: String,
    children: Vec<StateNode>,
    has_elements: bool,
}

impl OpenElement {
    fn new(name: String) -> Self {
        Self {
            name,
            text: String::new(),
            children: Vec::new(),
            has_elements: false,
        }
    }

    // Text between child elements is layout only.
    fn into_node(self) -> StateNode {
        if self.has_elements {
            StateNode {
                children: self.children,
                ..StateNode::level(self.name)
            }
        } else {
            StateNode::value(self.name, self.text)
        }
    }
}
