//! Typed XML tree used to build, sign and inspect comprobantes.
//!
//! Documents are assembled as an [`Element`] tree and written out in a single
//! pass with `quick_xml`. The same tree is produced by [`parse`], so signing and
//! verification work on exactly what was serialized.
pub mod c14n;
pub mod constants;
pub mod parse;

pub use parse::parse;

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// XML errors.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("failed to write XML: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to read XML: {0}")]
    Read(#[from] quick_xml::Error),
    #[error("invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("XML is not valid UTF-8")]
    Utf8,
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

/// XML formatting options.
///
/// Signed documents must be written [`XmlFormat::Compact`]: indentation adds
/// text nodes that would change the canonical form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XmlFormat {
    #[default]
    Compact,
    Pretty {
        indent_char: char,
        indent_size: usize,
    },
}

/// Child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with ordered attributes and children.
///
/// Names are kept qualified (`ds:Signature`); namespace declarations are plain
/// `xmlns`/`xmlns:*` attributes.
///
/// # Examples
/// ```rust
/// use factura_core::invoice::xml::{Element, XmlFormat};
///
/// let pago = Element::new("pago")
///     .with_child(Element::leaf("formaPago", "01"))
///     .with_child(Element::leaf("total", "10.00"));
/// assert_eq!(
///     pago.to_xml_string(XmlFormat::Compact)?,
///     "<pago><formaPago>01</formaPago><total>10.00</total></pago>"
/// );
/// # Ok::<(), factura_core::invoice::xml::XmlError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element holding a single text node.
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.push(child);
        self
    }

    /// Appends `child` only when present.
    pub fn with_optional(mut self, child: Option<Element>) -> Self {
        if let Some(child) = child {
            self.push(child);
        }
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub(crate) fn push_node(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Prefix of the element name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First child element whose local name matches.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children().find(|el| el.local_name() == local)
    }

    /// Follows a chain of child local names.
    pub fn path(&self, locals: &[&str]) -> Option<&Element> {
        locals
            .iter()
            .try_fold(self, |current, local| current.child(local))
    }

    /// Text of the first matching child.
    pub fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).map(Element::text)
    }

    /// All descendant elements (depth first, document order) with the given local name.
    pub fn descendants<'a>(&'a self, local: &'a str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        collect_descendants(self, local, &mut found);
        found
    }

    /// Concatenated text content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Serializes the tree without an XML declaration.
    pub fn to_xml_string(&self, format: XmlFormat) -> Result<String, XmlError> {
        let bytes = match format {
            XmlFormat::Compact => {
                let mut writer = Writer::new(Vec::with_capacity(4096));
                write_element(&mut writer, self)?;
                writer.into_inner()
            }
            XmlFormat::Pretty {
                indent_char,
                indent_size,
            } => {
                let indent = u8::try_from(indent_char).unwrap_or(b' ');
                let mut writer = Writer::new_with_indent(Vec::with_capacity(4096), indent, indent_size);
                write_element(&mut writer, self)?;
                writer.into_inner()
            }
        };
        String::from_utf8(bytes).map_err(|_| XmlError::Utf8)
    }

    /// Serializes the tree as a standalone UTF-8 document.
    pub fn to_document_string(&self, format: XmlFormat) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::with_capacity(64));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut out = String::from_utf8(writer.into_inner()).map_err(|_| XmlError::Utf8)?;
        out.push('\n');
        out.push_str(&self.to_xml_string(format)?);
        Ok(out)
    }
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Owned(escape_attr_value(value).into_bytes()),
        });
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for node in &element.children {
        match node {
            Node::Element(child) => write_element(writer, child)?,
            Node::Text(text) => {
                writer.write_event(Event::Text(BytesText::from_escaped(escape_text(text))))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

/// Markup escaping plus a character reference for `\r`, which a reader
/// would otherwise fold into a line feed.
fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = escape(text);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#xD;"))
    } else {
        escaped
    }
}

/// Attribute values keep tabs and line breaks as character references so
/// attribute-value normalization leaves them intact.
fn escape_attr_value(value: &str) -> String {
    let escaped = escape(value);
    if !escaped.contains(['\t', '\n', '\r']) {
        return escaped.into_owned();
    }
    let mut out = String::with_capacity(escaped.len() + 8);
    for ch in escaped.chars() {
        match ch {
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

fn collect_descendants<'a>(element: &'a Element, local: &str, found: &mut Vec<&'a Element>) {
    for child in element.children() {
        if child.local_name() == local {
            found.push(child);
        }
        collect_descendants(child, local, found);
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

pub(crate) fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Number rendered with a fixed count of decimals.
///
/// # Examples
/// ```rust
/// use factura_core::invoice::xml::FixedPrecision;
///
/// assert_eq!(FixedPrecision::new(1.5, 6).to_string(), "1.500000");
/// assert_eq!(FixedPrecision::money(100.0).to_string(), "100.00");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedPrecision {
    value: f64,
    precision: usize,
}

impl FixedPrecision {
    pub fn new(value: f64, precision: usize) -> Self {
        Self { value, precision }
    }

    /// Two decimals, used for every monetary amount.
    pub fn money(value: f64) -> Self {
        Self::new(value, 2)
    }
}

impl Display for FixedPrecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // -0.00 is not a valid amount
        let value = if self.value == 0.0 { 0.0 } else { self.value };
        let rendered = format!("{:.*}", self.precision, value);
        match rendered.strip_prefix('-') {
            Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => f.write_str(rest),
            _ => f.write_str(&rendered),
        }
    }
}
