mod common;

use base64ct::{Base64, Encoding};
use chrono::{FixedOffset, TimeZone};
use factura_core::invoice::AdditionalField;
use factura_core::invoice::sign::{SignatureOptions, verify_signed_xml};
use factura_core::invoice::xml::{self, c14n};
use sha2::{Digest, Sha256};

use common::{NUMERIC_CODE, pem_signer, read_fixture, sample_invoice};

// `expected.xml` is the output of `xmllint --c14n input.xml`.
fn golden() -> (String, String) {
    let input = String::from_utf8(read_fixture("c14n/input.xml")).expect("utf-8 input");
    let expected = String::from_utf8(read_fixture("c14n/expected.xml")).expect("utf-8 expected");
    (input, expected)
}

fn options() -> SignatureOptions {
    SignatureOptions::new(
        FixedOffset::west_opt(5 * 3600)
            .expect("offset")
            .with_ymd_and_hms(2024, 6, 15, 10, 0, 0)
            .single()
            .expect("time"),
        777,
    )
}

fn document_digest(signed: &str) -> String {
    let root = xml::parse(signed).expect("parse signed");
    root.path(&["Signature", "SignedInfo"])
        .expect("signed info")
        .children()
        .find(|el| el.attr("URI") == Some("#comprobante"))
        .and_then(|el| el.child_text("DigestValue"))
        .expect("document digest")
}

fn sha256_base64(canonical: &str) -> String {
    Base64::encode_string(&Sha256::digest(canonical.as_bytes()))
}

#[test]
fn golden_input_canonicalizes_like_xmllint() {
    let (input, expected) = golden();
    assert!(input.contains("\r\n"), "fixture lost its CRLF line breaks");
    assert_eq!(c14n::canonicalize_str(&input).expect("c14n"), expected);
}

#[test]
fn parsed_tree_canonicalizes_like_xmllint() {
    let (input, expected) = golden();
    let root = xml::parse(&input).expect("parse");
    assert_eq!(
        c14n::canonicalize(&root, &c14n::NamespaceScope::new()).expect("c14n"),
        expected
    );
}

#[test]
fn signed_golden_document_digest_matches_xmllint() {
    let (input, expected) = golden();
    let signed = pem_signer().sign_xml_with(&input, &options()).expect("sign");

    assert_eq!(document_digest(&signed), sha256_base64(&expected));
    assert_eq!(c14n::canonicalize_enveloped(&signed).expect("c14n"), expected);
    verify_signed_xml(&signed).expect("verify");
}

#[test]
fn invoice_with_line_breaks_and_markup_characters_signs_consistently() {
    let mut invoice = sample_invoice();
    invoice.line_items[0].description = "Cafe\r\ntostado".into();
    invoice.additional_info.push(AdditionalField {
        name: "Nota\ninterna\t'x' & <y> \"z\"".into(),
        value: "Linea 1\r\nLinea 2".into(),
    });

    let signed = invoice
        .finalize(NUMERIC_CODE)
        .expect("build")
        .sign(&pem_signer())
        .expect("sign");

    let canonical = c14n::canonicalize_enveloped(signed.xml()).expect("c14n");
    assert!(canonical.contains("<descripcion>Cafe&#xD;\ntostado</descripcion>"));
    assert!(canonical.contains(
        "nombre=\"Nota&#xA;interna&#x9;'x' &amp; &lt;y> &quot;z&quot;\">Linea 1&#xD;\nLinea 2<"
    ));
    assert_eq!(document_digest(signed.xml()), sha256_base64(&canonical));
    verify_signed_xml(signed.xml()).expect("verify");
}
