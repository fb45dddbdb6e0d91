//! Inclusive Canonical XML 1.0 (without comments), computed by libxml2.
//!
//! Subtrees are canonicalized as document subsets: the apex element carries
//! every namespace in scope, including the ones inherited from ancestors that
//! are passed in as a [`NamespaceScope`].
use super::{Element, XmlError, XmlFormat};
use libxml::parser::{Parser, ParserOptions};
use libxml::tree::{Document, c14n};
use libxml::xpath;
use std::collections::BTreeMap;

/// Root-level signatures, as removed by the enveloped-signature transform.
const ENVELOPED_SIGNATURES: &str = "/*/*[local-name()='Signature']";

/// Prefix to namespace URI. The default namespace uses the empty prefix.
pub type NamespaceScope = BTreeMap<String, String>;

/// Canonical form of a serialized document.
///
/// # Errors
/// [`XmlError::Canonicalization`] when libxml2 rejects the document.
pub fn canonicalize_str(xml: &str) -> Result<String, XmlError> {
    let doc = parse_document(xml)?;
    canonicalize_document(&doc)
}

/// Canonical form of `element` and its descendants.
///
/// # Examples
/// ```rust
/// use factura_core::invoice::xml::{Element, c14n};
///
/// let el = Element::new("a").with_attr("z", "1").with_attr("b", "2").with_child(Element::new("c"));
/// assert_eq!(c14n::canonicalize(&el, &c14n::NamespaceScope::new())?, r#"<a b="2" z="1"><c></c></a>"#);
/// # Ok::<(), factura_core::invoice::xml::XmlError>(())
/// ```
///
/// # Errors
/// [`XmlError`] when the subtree cannot be written or canonicalized.
pub fn canonicalize(element: &Element, inherited: &NamespaceScope) -> Result<String, XmlError> {
    let mut apex = element.clone();
    for (prefix, uri) in inherited {
        if uri.is_empty() {
            continue;
        }
        let name = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{prefix}")
        };
        if apex.attr(&name).is_none() {
            apex.set_attr(name, uri.as_str());
        }
    }
    canonicalize_str(&apex.to_xml_string(XmlFormat::Compact)?)
}

/// Canonical form of a signed document after dropping the signatures that
/// are direct children of its root.
///
/// # Errors
/// [`XmlError::Canonicalization`] when libxml2 rejects the document.
pub fn canonicalize_enveloped(xml: &str) -> Result<String, XmlError> {
    let doc = parse_document(xml)?;
    let ctx = xpath::Context::new(&doc)
        .map_err(|e| XmlError::Canonicalization(format!("XPath context error: {e:?}")))?;
    let nodes = ctx
        .evaluate(ENVELOPED_SIGNATURES)
        .map_err(|e| XmlError::Canonicalization(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    for mut node in nodes {
        node.unlink();
    }
    canonicalize_document(&doc)
}

/// Namespace scope after applying `element`'s own declarations to `parent`.
pub fn scope_of(element: &Element, parent: &NamespaceScope) -> NamespaceScope {
    let mut scope = parent.clone();
    for (name, value) in element.attributes() {
        if let Some(prefix) = namespace_prefix(name) {
            scope.insert(prefix.to_string(), value.clone());
        }
    }
    scope
}

/// Finds the first element (document order, `root` included) matching
/// `predicate` together with the namespaces it inherits from its ancestors.
pub fn find_with_scope<'a, F>(root: &'a Element, predicate: F) -> Option<(&'a Element, NamespaceScope)>
where
    F: Fn(&Element) -> bool,
{
    find_in(root, &NamespaceScope::new(), &predicate)
}

fn find_in<'a, F>(
    element: &'a Element,
    inherited: &NamespaceScope,
    predicate: &F,
) -> Option<(&'a Element, NamespaceScope)>
where
    F: Fn(&Element) -> bool,
{
    if predicate(element) {
        return Some((element, inherited.clone()));
    }
    let scope = scope_of(element, inherited);
    element
        .children()
        .find_map(|child| find_in(child, &scope, predicate))
}

// recovery would canonicalize a repaired document instead of rejecting it
fn parse_document(xml: &str) -> Result<Document, XmlError> {
    let options = ParserOptions {
        recover: false,
        no_net: true,
        ..ParserOptions::default()
    };
    Parser::default()
        .parse_string_with_options(xml, options)
        .map_err(|e| XmlError::Canonicalization(format!("Failed to parse xml: {e:?}")))
}

fn canonicalize_document(doc: &Document) -> Result<String, XmlError> {
    let canon_opts = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_0,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    doc.canonicalize(canon_opts, None)
        .map_err(|e| XmlError::Canonicalization(format!("Failed to canonicalize xml: {e:?}")))
}

/// `Some("")` for `xmlns`, `Some(p)` for `xmlns:p`, `None` otherwise.
fn namespace_prefix(attr_name: &str) -> Option<&str> {
    if attr_name == "xmlns" {
        Some("")
    } else {
        attr_name.strip_prefix("xmlns:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::xml::parse;

    const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
    const ETSI: &str = "http://uri.etsi.org/01903/v1.3.2#";

    #[test]
    fn escapes_text_and_attribute_values() {
        let el = Element::new("a")
            .with_attr("v", "x\"<&\t\n\r")
            .with_text("1 < 2 & 3 > 0\r");
        assert_eq!(
            canonicalize(&el, &NamespaceScope::new()).expect("c14n"),
            "<a v=\"x&quot;&lt;&amp;&#x9;&#xA;&#xD;\">1 &lt; 2 &amp; 3 &gt; 0&#xD;</a>"
        );
    }

    #[test]
    fn raw_line_breaks_are_normalized() {
        let xml = "<factura id=\"comprobante\" version=\"2.1.0\"><detalle><descripcion>Cafe\r\ntostado</descripcion></detalle>\
                   <infoAdicional><campoAdicional nombre=\"Nota\ninterna\">x</campoAdicional></infoAdicional></factura>";
        let expected = "<factura id=\"comprobante\" version=\"2.1.0\"><detalle><descripcion>Cafe\ntostado</descripcion></detalle>\
                        <infoAdicional><campoAdicional nombre=\"Nota interna\">x</campoAdicional></infoAdicional></factura>";
        assert_eq!(canonicalize_str(xml).expect("c14n"), expected);

        let root = parse(xml).expect("parse");
        assert_eq!(canonicalize(&root, &NamespaceScope::new()).expect("tree c14n"), expected);
    }

    #[test]
    fn namespace_declarations_precede_sorted_attributes() {
        let el = Element::new("ds:Signature")
            .with_attr("Id", "Signature1")
            .with_attr("xmlns:etsi", ETSI)
            .with_attr("xmlns:ds", DS);
        assert_eq!(
            canonicalize(&el, &NamespaceScope::new()).expect("c14n"),
            format!("<ds:Signature xmlns:ds=\"{DS}\" xmlns:etsi=\"{ETSI}\" Id=\"Signature1\"></ds:Signature>")
        );
    }

    #[test]
    fn subset_apex_renders_inherited_namespaces_once() {
        let xml = format!(
            "<factura id=\"comprobante\"><ds:Signature xmlns:ds=\"{DS}\" xmlns:etsi=\"{ETSI}\">\
             <ds:SignedInfo Id=\"si\"><ds:Reference xmlns:ds=\"{DS}\" URI=\"#x\"/></ds:SignedInfo>\
             </ds:Signature></factura>"
        );
        let root = parse(&xml).expect("parse");
        let (signed_info, scope) =
            find_with_scope(&root, |el| el.local_name() == "SignedInfo").expect("signed info");
        assert_eq!(scope.get("ds").map(String::as_str), Some(DS));
        assert_eq!(
            canonicalize(signed_info, &scope).expect("c14n"),
            format!(
                "<ds:SignedInfo xmlns:ds=\"{DS}\" xmlns:etsi=\"{ETSI}\" Id=\"si\">\
                 <ds:Reference URI=\"#x\"></ds:Reference></ds:SignedInfo>"
            )
        );
    }

    #[test]
    fn changed_default_namespace_is_redeclared() {
        let root = parse("<a xmlns=\"urn:a\"><b xmlns=\"urn:b\"><c xmlns=\"\"/></b></a>").expect("parse");
        assert_eq!(
            canonicalize(&root, &NamespaceScope::new()).expect("c14n"),
            "<a xmlns=\"urn:a\"><b xmlns=\"urn:b\"><c xmlns=\"\"></c></b></a>"
        );
    }

    #[test]
    fn enveloped_form_drops_root_level_signatures_only() {
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<factura id=\"comprobante\"><a><Signature/></a>\
             <ds:Signature xmlns:ds=\"{DS}\"><ds:SignedInfo/></ds:Signature></factura>"
        );
        assert_eq!(
            canonicalize_enveloped(&xml).expect("c14n"),
            "<factura id=\"comprobante\"><a><Signature></Signature></a></factura>"
        );
    }

    #[test]
    fn broken_documents_are_reported() {
        assert!(matches!(
            canonicalize_str("<factura>"),
            Err(XmlError::Canonicalization(_))
        ));
    }

    #[test]
    fn find_with_scope_matches_root() {
        let root = Element::new("factura").with_attr("id", "comprobante");
        let (found, scope) =
            find_with_scope(&root, |el| el.attr("id") == Some("comprobante")).expect("root");
        assert_eq!(found.name(), "factura");
        assert!(scope.is_empty());
    }
}
