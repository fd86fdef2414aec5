//! Quick-XML based XMLTV document tree
//!
//! The reducer copies arbitrary guide elements with full attribute and
//! subtree fidelity, so instead of deserializing into fixed structs this
//! module materializes the document as a generic element tree. Serialization
//! builds the indented document directly, escaping as it goes.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{AppError, AppResult, SourceError};

/// One XML element: name, attributes in document order, directly contained
/// text, and child elements in document order
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Exact-match attribute lookup
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_error(message: impl Into<String>) -> AppError {
    AppError::Source(SourceError::parse("xmltv", message.into()))
}

/// Parse an XMLTV document into its root element.
///
/// Malformed XML aborts with an error; there is no partial output.
pub fn parse_document(content: &str) -> AppResult<XmlElement> {
    let mut reader = Reader::from_str(content);
    // quick-xml 0.38 emits entity references (`&amp;`, `&#39;`, ...) as separate
    // `GeneralRef` events rather than expanding them inside `Text`. Trimming each
    // fragment would drop whitespace adjacent to an entity, so text nodes are
    // accumulated raw and trimmed once at their element boundary (on `End`).
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = element_from_start(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .xml_content()
                        .map_err(|e| parse_error(format!("Invalid text content: {e}")))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(ref r)) => {
                if let Some(top) = stack.last_mut() {
                    let name = r
                        .decode()
                        .map_err(|e| parse_error(format!("Invalid entity reference: {e}")))?;
                    let raw = format!("&{name};");
                    let decoded = unescape(&raw)
                        .map_err(|e| parse_error(format!("Invalid entity reference: {e}")))?;
                    top.text.push_str(&decoded);
                }
            }
            Ok(Event::CData(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = std::str::from_utf8(t.as_ref())
                        .map_err(|e| parse_error(format!("Invalid UTF-8 in CDATA: {e}")))?;
                    top.text.push_str(text);
                }
            }
            Ok(Event::End(_)) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| parse_error("Unbalanced closing tag"))?;
                // Trim the completed text node at its element boundary, mirroring
                // the document-order trimming the reader used to perform inline.
                let trimmed = element.text.trim();
                if trimmed.len() != element.text.len() {
                    element.text = trimmed.to_string();
                }
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declaration, comments, processing instructions, doctype
            Err(e) => return Err(parse_error(format!("XML parse error: {e}"))),
        }
    }

    if !stack.is_empty() {
        return Err(parse_error("Unclosed element at end of document"));
    }

    root.ok_or_else(|| parse_error("Document has no root element"))
}

/// Serialize an element tree as an indented document with an XML declaration
pub fn serialize_document(root: &XmlElement) -> String {
    let mut output = String::new();
    output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(&mut output, root, 0);
    output
}

fn element_from_start(e: &BytesStart) -> AppResult<XmlElement> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| parse_error(format!("Invalid UTF-8 in element name: {e}")))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| parse_error(format!("Invalid attribute: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| parse_error(format!("Invalid UTF-8 in attribute name: {e}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| parse_error(format!("Invalid attribute value: {e}")))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> AppResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(parse_error("Multiple root elements"));
    }
    Ok(())
}

fn write_element(output: &mut String, element: &XmlElement, depth: usize) {
    let indent = "  ".repeat(depth);
    output.push_str(&indent);
    output.push('<');
    output.push_str(&element.name);
    for (key, value) in &element.attributes {
        output.push_str(&format!(" {key}=\"{}\"", escape_xml(value)));
    }

    if element.text.is_empty() && element.children.is_empty() {
        output.push_str(" />\n");
        return;
    }

    output.push('>');
    if element.children.is_empty() {
        // text-only elements stay on one line
        output.push_str(&escape_xml(&element.text));
        output.push_str(&format!("</{}>\n", element.name));
        return;
    }

    output.push('\n');
    if !element.text.is_empty() {
        output.push_str(&"  ".repeat(depth + 1));
        output.push_str(&escape_xml(&element.text));
        output.push('\n');
    }
    for child in &element.children {
        write_element(output, child, depth + 1);
    }
    output.push_str(&indent);
    output.push_str(&format!("</{}>\n", element.name));
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
