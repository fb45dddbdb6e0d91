use crate::certificate::{self, CertificateError, SigningMaterial};
use crate::invoice::xml::c14n::{self, NamespaceScope};
use crate::invoice::xml::constants::{
    C14N_ALGORITHM, COMPROBANTE_ID, DS_NS, ENVELOPED_SIGNATURE_TRANSFORM, ETSI_NS,
    RSA_SHA256_SIGNATURE, SHA256_DIGEST, SIGNED_PROPERTIES_TYPE,
};
use crate::invoice::xml::{self, Element, XmlFormat};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, FixedOffset, Local};
use rand::Rng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument};
use x509_cert::{
    Certificate,
    der::{Decode, DecodePem, Encode},
};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signing material: {0}")]
    Material(String),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("signature construction failed: {0}")]
    SignatureConstruction(String),
    #[error("signature verification failed: {0}")]
    Verification(String),
}

fn construction(e: impl fmt::Display) -> SigningError {
    SigningError::SignatureConstruction(e.to_string())
}

fn verification(e: impl fmt::Display) -> SigningError {
    SigningError::Verification(e.to_string())
}

/// Per-signature values that are not derived from the document.
///
/// The identifier suffixes every `Id` in the signature block so several
/// signed documents can be told apart; the signing time lands in
/// `etsi:SigningTime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOptions {
    pub signing_time: DateTime<FixedOffset>,
    pub id: u32,
}

impl SignatureOptions {
    pub fn new(signing_time: DateTime<FixedOffset>, id: u32) -> Self {
        Self { signing_time, id }
    }

    /// Current local time and a random six-digit identifier.
    pub fn now() -> Self {
        Self {
            signing_time: Local::now().fixed_offset(),
            id: rand::thread_rng().gen_range(100_000..1_000_000),
        }
    }
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self::now()
    }
}

/// Produces enveloped XAdES-BES signatures with an RSA key.
///
/// The private key is zeroized when the signer is dropped.
#[derive(Clone)]
pub struct InvoiceSigner {
    certificate: Certificate,
    private_key: RsaPrivateKey,
}

impl fmt::Debug for InvoiceSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceSigner")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl InvoiceSigner {
    /// Certificate DER and a PKCS#8 (or PKCS#1) RSA private key DER.
    pub fn from_der(cert_der: &[u8], private_key_der: &[u8]) -> Result<Self, SigningError> {
        let cert = Certificate::from_der(cert_der)
            .map_err(|e| SigningError::Material(format!("certificate parse error: {e}")))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(private_key_der)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(private_key_der))
            .map_err(|e| SigningError::Material(format!("private key parse error: {e}")))?;
        Self::new(cert, private_key)
    }

    pub fn from_pem(cert_pem: &str, private_key_pem: &str) -> Result<Self, SigningError> {
        let cert = Certificate::from_pem(cert_pem.as_bytes())
            .map_err(|e| SigningError::Material(format!("certificate parse error: {e}")))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .map_err(|e| SigningError::Material(format!("private key parse error: {e}")))?;
        Self::new(cert, private_key)
    }

    pub fn from_material(material: &SigningMaterial) -> Result<Self, SigningError> {
        let private_key = RsaPrivateKey::from_pkcs8_der(material.private_key_der())
            .map_err(|e| SigningError::Material(format!("private key parse error: {e}")))?;
        Self::new(material.certificate().clone(), private_key)
    }

    /// Extracts the signing material from PKCS#12 bytes.
    pub fn from_pkcs12(data: &[u8], password: &SecretString) -> Result<Self, SigningError> {
        Self::from_material(&certificate::extract(data, password)?)
    }

    fn new(certificate: Certificate, private_key: RsaPrivateKey) -> Result<Self, SigningError> {
        if certificate_public_key(&certificate)? != private_key.to_public_key() {
            return Err(SigningError::Material(
                "private key does not match the certificate".into(),
            ));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Signs with the current time and a random signature id.
    pub fn sign_xml(&self, xml: &str) -> Result<String, SigningError> {
        self.sign_xml_with(xml, &SignatureOptions::now())
    }

    /// Appends a `ds:Signature` as the last child of the root element.
    ///
    /// The root must carry `id="comprobante"` and must not be signed already.
    /// The output is written without indentation: whitespace added after
    /// signing would change the canonical form the digests were taken over.
    #[instrument(skip_all, fields(signature_id = options.id))]
    pub fn sign_xml_with(&self, xml: &str, options: &SignatureOptions) -> Result<String, SigningError> {
        let mut root = xml::parse(xml).map_err(construction)?;
        if root.attr("id") != Some(COMPROBANTE_ID) {
            return Err(SigningError::SignatureConstruction(format!(
                "root element <{}> has no id=\"{COMPROBANTE_ID}\"",
                root.name()
            )));
        }
        if root.children().any(|child| child.local_name() == "Signature") {
            return Err(SigningError::SignatureConstruction(
                "document is already signed".into(),
            ));
        }

        let ids = SignatureIds::new(options.id);
        let scope = signature_scope();
        let document_digest =
            digest_base64(&c14n::canonicalize(&root, &NamespaceScope::new()).map_err(construction)?);

        let cert_der = self.certificate.to_der().map_err(construction)?;
        let key_info = self.key_info(&ids, &cert_der);
        let signed_properties = self.signed_properties(&ids, &cert_der, options)?;

        let signed_info = Element::new("ds:SignedInfo")
            .with_attr("Id", ids.signed_info.as_str())
            .with_child(Element::new("ds:CanonicalizationMethod").with_attr("Algorithm", C14N_ALGORITHM))
            .with_child(Element::new("ds:SignatureMethod").with_attr("Algorithm", RSA_SHA256_SIGNATURE))
            .with_child(
                reference(
                    &format!("#{}", ids.signed_properties),
                    &digest_base64(&c14n::canonicalize(&signed_properties, &scope).map_err(construction)?),
                )
                .with_attr("Id", ids.signed_properties_ref.as_str())
                .with_attr("Type", SIGNED_PROPERTIES_TYPE),
            )
            .with_child(reference(
                &format!("#{}", ids.certificate),
                &digest_base64(&c14n::canonicalize(&key_info, &scope).map_err(construction)?),
            ))
            .with_child(
                Element::new("ds:Reference")
                    .with_attr("Id", ids.reference.as_str())
                    .with_attr("URI", format!("#{COMPROBANTE_ID}"))
                    .with_child(
                        Element::new("ds:Transforms")
                            .with_child(Element::new("ds:Transform").with_attr("Algorithm", C14N_ALGORITHM))
                            .with_child(
                                Element::new("ds:Transform")
                                    .with_attr("Algorithm", ENVELOPED_SIGNATURE_TRANSFORM),
                            ),
                    )
                    .with_child(digest_method())
                    .with_child(Element::leaf("ds:DigestValue", document_digest)),
            );

        let canonical_signed_info = c14n::canonicalize(&signed_info, &scope).map_err(construction)?;
        let signature_value = self.sign_bytes(canonical_signed_info.as_bytes())?;

        let signature = Element::new("ds:Signature")
            .with_attr("xmlns:ds", DS_NS)
            .with_attr("xmlns:etsi", ETSI_NS)
            .with_attr("Id", ids.signature.as_str())
            .with_child(signed_info)
            .with_child(
                Element::leaf("ds:SignatureValue", signature_value)
                    .with_attr("Id", ids.signature_value.as_str()),
            )
            .with_child(key_info)
            .with_child(
                Element::new("ds:Object").with_attr("Id", ids.object.as_str()).with_child(
                    Element::new("etsi:QualifyingProperties")
                        .with_attr("Target", format!("#{}", ids.signature))
                        .with_child(signed_properties),
                ),
            );
        root.push(signature);

        let signed = root
            .to_document_string(XmlFormat::Compact)
            .map_err(construction)?;
        debug!(bytes = signed.len(), "document signed");
        Ok(signed)
    }

    /// [`InvoiceSigner::sign_xml`] on the blocking thread pool.
    pub async fn sign_async(&self, xml: String) -> Result<String, SigningError> {
        let signer = self.clone();
        tokio::task::spawn_blocking(move || signer.sign_xml(&xml))
            .await
            .map_err(|e| SigningError::SignatureConstruction(format!("signing task failed: {e}")))?
    }

    fn sign_bytes(&self, data: &[u8]) -> Result<String, SigningError> {
        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.try_sign(data).map_err(construction)?;
        Ok(Base64::encode_string(&signature.to_bytes()))
    }

    fn key_info(&self, ids: &SignatureIds, cert_der: &[u8]) -> Element {
        let public_key = self.private_key.to_public_key();
        Element::new("ds:KeyInfo")
            .with_attr("Id", ids.certificate.as_str())
            .with_child(Element::new("ds:X509Data").with_child(Element::leaf(
                "ds:X509Certificate",
                Base64::encode_string(cert_der),
            )))
            .with_child(
                Element::new("ds:KeyValue").with_child(
                    Element::new("ds:RSAKeyValue")
                        .with_child(Element::leaf(
                            "ds:Modulus",
                            Base64::encode_string(&public_key.n().to_bytes_be()),
                        ))
                        .with_child(Element::leaf(
                            "ds:Exponent",
                            Base64::encode_string(&public_key.e().to_bytes_be()),
                        )),
                ),
            )
    }

    fn signed_properties(
        &self,
        ids: &SignatureIds,
        cert_der: &[u8],
        options: &SignatureOptions,
    ) -> Result<Element, SigningError> {
        let tbs = &self.certificate.tbs_certificate;
        let serial = serial_bytes_to_decimal_string(tbs.serial_number.as_bytes());
        Ok(Element::new("etsi:SignedProperties")
            .with_attr("Id", ids.signed_properties.as_str())
            .with_child(
                Element::new("etsi:SignedSignatureProperties")
                    .with_child(Element::leaf(
                        "etsi:SigningTime",
                        format_signing_time(&options.signing_time),
                    ))
                    .with_child(
                        Element::new("etsi:SigningCertificate").with_child(
                            Element::new("etsi:Cert")
                                .with_child(
                                    Element::new("etsi:CertDigest")
                                        .with_child(digest_method())
                                        .with_child(Element::leaf(
                                            "ds:DigestValue",
                                            Base64::encode_string(&Sha256::digest(cert_der)),
                                        )),
                                )
                                .with_child(
                                    Element::new("etsi:IssuerSerial")
                                        .with_child(Element::leaf(
                                            "ds:X509IssuerName",
                                            issuer_name(&self.certificate),
                                        ))
                                        .with_child(Element::leaf("ds:X509SerialNumber", serial)),
                                ),
                        ),
                    ),
            )
            .with_child(
                Element::new("etsi:SignedDataObjectProperties").with_child(
                    Element::new("etsi:DataObjectFormat")
                        .with_attr("ObjectReference", format!("#{}", ids.reference))
                        .with_child(Element::leaf("etsi:Description", "contenido comprobante"))
                        .with_child(Element::leaf("etsi:MimeType", "text/xml")),
                ),
            ))
    }
}

struct SignatureIds {
    signature: String,
    signed_info: String,
    signed_properties: String,
    signed_properties_ref: String,
    certificate: String,
    reference: String,
    signature_value: String,
    object: String,
}

impl SignatureIds {
    fn new(id: u32) -> Self {
        let signature = format!("Signature{id}");
        Self {
            signed_info: format!("{signature}-SignedInfo"),
            signed_properties: format!("{signature}-SignedProperties"),
            signed_properties_ref: format!("SignedPropertiesID{id}"),
            certificate: format!("Certificate{id}"),
            reference: format!("Reference-ID-{id}"),
            signature_value: format!("SignatureValue{id}"),
            object: format!("{signature}-Object"),
            signature,
        }
    }
}

/// Namespaces visible inside `ds:Signature`.
fn signature_scope() -> NamespaceScope {
    NamespaceScope::from([
        ("ds".to_string(), DS_NS.to_string()),
        ("etsi".to_string(), ETSI_NS.to_string()),
    ])
}

fn reference(uri: &str, digest: &str) -> Element {
    Element::new("ds:Reference")
        .with_attr("URI", uri)
        .with_child(digest_method())
        .with_child(Element::leaf("ds:DigestValue", digest))
}

fn digest_method() -> Element {
    Element::new("ds:DigestMethod").with_attr("Algorithm", SHA256_DIGEST)
}

fn digest_base64(canonical: &str) -> String {
    Base64::encode_string(&Sha256::digest(canonical.as_bytes()))
}

fn format_signing_time(time: &DateTime<FixedOffset>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

fn issuer_name(cert: &Certificate) -> String {
    cert.tbs_certificate
        .issuer
        .to_string()
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

fn certificate_public_key(cert: &Certificate) -> Result<RsaPublicKey, SigningError> {
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| SigningError::Material(format!("certificate public key: {e}")))?;
    RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| SigningError::Material(format!("certificate does not hold an RSA key: {e}")))
}

fn serial_bytes_to_decimal_string(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }

    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    while digits.len() > 1 && matches!(digits.last(), Some(0)) {
        digits.pop();
    }

    digits.iter().rev().map(|d| (b'0' + *d) as char).collect()
}

/// Checks an enveloped signature produced by [`InvoiceSigner`] (or any
/// XAdES-BES signature with the same shape) and returns the signing certificate.
///
/// Every reference digest is recomputed and the RSA signature over the
/// canonical `SignedInfo` is verified with the embedded certificate. The
/// enveloped transform removes signatures that are direct children of the root.
///
/// # Errors
/// [`SigningError::Verification`] naming the first check that failed.
pub fn verify_signed_xml(xml: &str) -> Result<Certificate, SigningError> {
    let root = xml::parse(xml).map_err(verification)?;
    let (signature, inherited) = c14n::find_with_scope(&root, |el| {
        el.local_name() == "Signature" && el.child("SignedInfo").is_some()
    })
    .ok_or_else(|| verification("no ds:Signature element"))?;
    let scope = c14n::scope_of(signature, &inherited);

    let signed_info = signature
        .child("SignedInfo")
        .ok_or_else(|| verification("missing SignedInfo"))?;
    expect_algorithm(signed_info, "CanonicalizationMethod", C14N_ALGORITHM)?;
    expect_algorithm(signed_info, "SignatureMethod", RSA_SHA256_SIGNATURE)?;

    let references: Vec<&Element> = signed_info
        .children()
        .filter(|el| el.local_name() == "Reference")
        .collect();
    if references.is_empty() {
        return Err(verification("SignedInfo has no references"));
    }
    for reference in references {
        verify_reference(xml, &root, reference)?;
    }

    let cert_b64: String = signature
        .path(&["KeyInfo", "X509Data", "X509Certificate"])
        .map(Element::text)
        .ok_or_else(|| verification("missing X509Certificate"))?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let cert_der = Base64::decode_vec(&cert_b64).map_err(verification)?;
    let certificate = Certificate::from_der(&cert_der).map_err(verification)?;
    let public_key = certificate_public_key(&certificate).map_err(verification)?;

    let signature_b64: String = signature
        .child_text("SignatureValue")
        .ok_or_else(|| verification("missing SignatureValue"))?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let signature_bytes = Base64::decode_vec(&signature_b64).map_err(verification)?;
    let rsa_signature = Signature::try_from(signature_bytes.as_slice()).map_err(verification)?;

    let canonical = c14n::canonicalize(signed_info, &scope).map_err(verification)?;
    VerifyingKey::<Sha256>::new(public_key)
        .verify(canonical.as_bytes(), &rsa_signature)
        .map_err(|_| verification("SignatureValue does not match SignedInfo"))?;
    Ok(certificate)
}

fn expect_algorithm(parent: &Element, local: &str, expected: &str) -> Result<(), SigningError> {
    match parent.child(local).and_then(|el| el.attr("Algorithm")) {
        Some(found) if found == expected => Ok(()),
        found => Err(SigningError::Verification(format!(
            "unsupported {local}: {}",
            found.unwrap_or("none")
        ))),
    }
}

fn verify_reference(xml: &str, root: &Element, reference: &Element) -> Result<(), SigningError> {
    let uri = reference.attr("URI").unwrap_or_default();
    let id = uri
        .strip_prefix('#')
        .ok_or_else(|| SigningError::Verification(format!("unsupported reference URI {uri:?}")))?;
    expect_algorithm(reference, "DigestMethod", SHA256_DIGEST)?;

    let canonical = if root.attr("id") == Some(id) || root.attr("Id") == Some(id) {
        c14n::canonicalize_enveloped(xml)
    } else {
        let (target, scope) =
            c14n::find_with_scope(root, |el| el.attr("Id") == Some(id) || el.attr("id") == Some(id))
                .ok_or_else(|| SigningError::Verification(format!("reference target #{id} not found")))?;
        c14n::canonicalize(target, &scope)
    }
    .map_err(verification)?;

    let expected = reference
        .child_text("DigestValue")
        .ok_or_else(|| SigningError::Verification(format!("reference #{id} has no DigestValue")))?;
    if digest_base64(&canonical) != expected.trim() {
        return Err(SigningError::Verification(format!(
            "digest mismatch for reference #{id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CERT_PEM: &str = include_str!("../../tests/fixtures/certs/signer-cert.pem");
    const KEY_PEM: &str = include_str!("../../tests/fixtures/certs/signer-key.pem");

    fn signer() -> InvoiceSigner {
        InvoiceSigner::from_pem(CERT_PEM, KEY_PEM).expect("signer")
    }

    fn options() -> SignatureOptions {
        let offset = FixedOffset::west_opt(5 * 3600).expect("offset");
        let time = offset
            .with_ymd_and_hms(2024, 6, 15, 10, 20, 30)
            .single()
            .expect("time");
        SignatureOptions::new(time, 123456)
    }

    const UNSIGNED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
        <factura id=\"comprobante\" version=\"2.1.0\"><infoTributaria><ruc>1790012345001</ruc></infoTributaria></factura>";

    #[test]
    fn serial_bytes_to_decimal_handles_large_values() {
        assert_eq!(serial_bytes_to_decimal_string(&[0x01]), "1");
        assert_eq!(serial_bytes_to_decimal_string(&[0x01, 0x00]), "256");
        assert_eq!(serial_bytes_to_decimal_string(&[0x00, 0x01]), "1");
        assert_eq!(serial_bytes_to_decimal_string(&[0xFF, 0xFF]), "65535");
    }

    #[test]
    fn signature_is_last_child_and_verifies() {
        let signed = signer().sign_xml_with(UNSIGNED, &options()).expect("sign");
        let root = xml::parse(&signed).expect("parse");
        let last = root.children().last().expect("children");
        assert_eq!(last.name(), "ds:Signature");
        assert_eq!(last.attr("Id"), Some("Signature123456"));
        assert_eq!(
            root.path(&["Signature", "Object", "QualifyingProperties", "SignedProperties",
                "SignedSignatureProperties", "SigningTime"])
                .map(Element::text),
            Some("2024-06-15T10:20:30-05:00".to_string())
        );

        let cert = verify_signed_xml(&signed).expect("verify");
        assert!(cert.tbs_certificate.subject.to_string().contains("ANDREA PAREDES"));
    }

    #[test]
    fn document_reference_uses_c14n_then_enveloped() {
        let signed = signer().sign_xml_with(UNSIGNED, &options()).expect("sign");
        let root = xml::parse(&signed).expect("parse");
        let signed_info = root.path(&["Signature", "SignedInfo"]).expect("signed info");
        let document_ref = signed_info
            .children()
            .find(|el| el.attr("URI") == Some("#comprobante"))
            .expect("document reference");
        let transforms: Vec<&str> = document_ref
            .child("Transforms")
            .expect("transforms")
            .children()
            .filter_map(|el| el.attr("Algorithm"))
            .collect();
        assert_eq!(transforms, [C14N_ALGORITHM, ENVELOPED_SIGNATURE_TRANSFORM]);
    }

    #[test]
    fn document_digest_uses_normalized_line_breaks() {
        let unsigned = "<factura id=\"comprobante\" version=\"2.1.0\"><detalle><descripcion>Cafe\r\ntostado</descripcion></detalle>\
                        <infoAdicional><campoAdicional nombre=\"Nota\ninterna\">x</campoAdicional></infoAdicional></factura>";
        let canonical = "<factura id=\"comprobante\" version=\"2.1.0\"><detalle><descripcion>Cafe\ntostado</descripcion></detalle>\
                         <infoAdicional><campoAdicional nombre=\"Nota interna\">x</campoAdicional></infoAdicional></factura>";

        let signed = signer().sign_xml_with(unsigned, &options()).expect("sign");
        let root = xml::parse(&signed).expect("parse");
        let digest = root
            .path(&["Signature", "SignedInfo"])
            .expect("signed info")
            .children()
            .find(|el| el.attr("URI") == Some("#comprobante"))
            .and_then(|el| el.child_text("DigestValue"))
            .expect("document digest");
        assert_eq!(digest, digest_base64(canonical));
        verify_signed_xml(&signed).expect("verify");
    }

    #[test]
    fn same_options_give_same_output() {
        let first = signer().sign_xml_with(UNSIGNED, &options()).expect("first");
        let second = signer().sign_xml_with(UNSIGNED, &options()).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn tampering_breaks_verification() {
        let signed = signer().sign_xml_with(UNSIGNED, &options()).expect("sign");
        let tampered = signed.replace("1790012345001", "1790012345002");
        assert!(matches!(
            verify_signed_xml(&tampered),
            Err(SigningError::Verification(_))
        ));
    }

    #[test]
    fn refuses_documents_without_comprobante_id() {
        let err = signer()
            .sign_xml("<factura version=\"1.0.0\"/>")
            .expect_err("no id");
        assert!(matches!(err, SigningError::SignatureConstruction(_)));
        let err = signer().sign_xml("<factura").expect_err("malformed");
        assert!(matches!(err, SigningError::SignatureConstruction(_)));
    }

    #[test]
    fn refuses_to_sign_twice() {
        let signed = signer().sign_xml(UNSIGNED).expect("sign");
        assert!(matches!(
            signer().sign_xml(&signed),
            Err(SigningError::SignatureConstruction(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let debug = format!("{:?}", signer());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("PRIVATE"));
    }

    #[tokio::test]
    async fn async_signing_verifies() {
        let signed = signer().sign_async(UNSIGNED.to_string()).await.expect("sign");
        verify_signed_xml(&signed).expect("verify");
    }
}
