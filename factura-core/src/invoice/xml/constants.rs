pub(crate) const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub(crate) const ETSI_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

pub(crate) const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub(crate) const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub(crate) const SHA256_DIGEST: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub(crate) const RSA_SHA256_SIGNATURE: &str =
    "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub(crate) const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";

/// Value of the root `id` attribute the document reference points at.
pub const COMPROBANTE_ID: &str = "comprobante";
