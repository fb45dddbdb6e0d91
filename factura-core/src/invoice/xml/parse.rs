//! Reading XML text back into an [`Element`] tree.
use super::{Element, Node, XmlError};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

/// Parses a document into its root element.
///
/// Text is kept verbatim (including whitespace inside the root) so the tree
/// canonicalizes to the same bytes a verifier would see. Line breaks and
/// attribute whitespace are normalized the way any XML processor does before
/// references are expanded. The XML declaration, comments and processing
/// instructions are dropped.
///
/// # Errors
/// Returns [`XmlError`] for malformed markup, a missing root or content after it.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unexpected closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text).map_err(|_| XmlError::Utf8)?;
                let value = expand(&normalize_line_breaks(raw))?;
                match stack.last_mut() {
                    Some(parent) if !value.is_empty() => {
                        parent.push_node(Node::Text(value))
                    }
                    Some(_) => {}
                    None if value.trim().is_empty() => {}
                    None => return Err(XmlError::Malformed("text outside the root element".into())),
                }
            }
            Event::CData(data) => {
                let value = data
                    .decode()
                    .map_err(|e| XmlError::Malformed(format!("CDATA: {e}")))?;
                match stack.last_mut() {
                    Some(parent) => parent.push_node(Node::Text(normalize_line_breaks(&value).into_owned())),
                    None => return Err(XmlError::Malformed("CDATA outside the root element".into())),
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element".into()));
    }
    root.ok_or_else(|| XmlError::Malformed("document has no root element".into()))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let qname = start.name();
    let name = std::str::from_utf8(qname.as_ref()).map_err(|_| XmlError::Utf8)?;
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|_| XmlError::Utf8)?;
        let raw = std::str::from_utf8(&attr.value).map_err(|_| XmlError::Utf8)?;
        let value = expand(&normalize_attribute_whitespace(raw))?;
        element.set_attr(key, value);
    }
    Ok(element)
}

/// `\r\n` and lone `\r` become `\n` (XML 1.0, section 2.11).
fn normalize_line_breaks(raw: &str) -> Cow<'_, str> {
    if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Literal tabs and line breaks in an attribute value become spaces
/// (XML 1.0, section 3.3.3). Character references are expanded afterwards and
/// survive.
fn normalize_attribute_whitespace(raw: &str) -> Cow<'_, str> {
    if raw.contains(['\t', '\n', '\r']) {
        Cow::Owned(
            raw.replace("\r\n", " ")
                .replace(['\t', '\n', '\r'], " "),
        )
    } else {
        Cow::Borrowed(raw)
    }
}

fn expand(raw: &str) -> Result<String, XmlError> {
    unescape(raw)
        .map(Cow::into_owned)
        .map_err(|e| XmlError::Malformed(format!("invalid reference: {e}")))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::Malformed("more than one root element".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::xml::XmlFormat;

    #[test]
    fn parses_nested_elements_attributes_and_entities() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<factura id="comprobante" version="2.1.0"><infoAdicional><campoAdicional nombre="Email &amp; web">a&lt;b</campoAdicional></infoAdicional></factura>
"#;
        let root = parse(xml).expect("parse");
        assert_eq!(root.name(), "factura");
        assert_eq!(root.attr("id"), Some("comprobante"));
        let campo = root
            .path(&["infoAdicional", "campoAdicional"])
            .expect("campo");
        assert_eq!(campo.attr("nombre"), Some("Email & web"));
        assert_eq!(campo.text(), "a<b");
    }

    #[test]
    fn line_breaks_and_attribute_whitespace_are_normalized() {
        let xml = "<campoAdicional nombre=\"Nota\r\ninterna\tfinal&#x9;ref\">Cafe\r\ntostado\rmolido&#xD;fino</campoAdicional>";
        let root = parse(xml).expect("parse");
        assert_eq!(root.attr("nombre"), Some("Nota interna final\tref"));
        assert_eq!(root.text(), "Cafe\ntostado\nmolido\rfino");

        let written = root.to_xml_string(XmlFormat::Compact).expect("xml");
        assert_eq!(parse(&written).expect("reparse"), root);
    }

    #[test]
    fn round_trips_compact_output() {
        let xml = "<a x=\"1\"><b>t</b><c/></a>";
        let root = parse(xml).expect("parse");
        assert_eq!(root.to_xml_string(XmlFormat::Compact).expect("xml"), xml);
    }

    #[test]
    fn keeps_whitespace_inside_root() {
        let root = parse("<a>\n  <b>1</b>\n</a>").expect("parse");
        assert_eq!(root.nodes().len(), 3);
    }

    #[test]
    fn cdata_becomes_text() {
        let root = parse("<a><![CDATA[<factura/>]]></a>").expect("parse");
        assert_eq!(root.text(), "<factura/>");
    }

    #[test]
    fn rejects_broken_documents() {
        assert!(parse("").is_err());
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("<a/><b/>").is_err());
        assert!(parse("text<a/>").is_err());
    }
}
