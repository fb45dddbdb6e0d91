//! Signing certificate and private key extraction from PKCS#12 containers.
//!
//! Private keys are located through an ordered chain of [`KeyBagStrategy`]
//! implementations: shrouded (encrypted) key bags first, then plain key bags.
//! Whatever the container held, the key leaves this module as PKCS#8 DER in a
//! buffer that is wiped on drop.
mod kdf;
mod parse;

pub use parse::{ContainerContents, EncryptedKey, KeyBag, PlainKey};

use rsa::RsaPrivateKey;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey};
use secrecy::SecretString;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};
use x509_cert::Certificate;
use x509_cert::der::{Decode, Encode};
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("no certificate found in the key container")]
    CertificateNotFound,
    #[error("no private key found in the key container")]
    PrivateKeyNotFound,
    #[error("incorrect password for the key container")]
    IncorrectPassword,
    #[error("malformed key container: {0}")]
    Malformed(String),
    #[error("failed to read key container {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One way of turning the key bags of a container into PKCS#8 DER.
///
/// Returns `Ok(None)` when the strategy finds nothing it can handle, so the
/// next strategy in the chain gets its turn.
pub trait KeyBagStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(
        &self,
        bags: &[KeyBag],
        password: &SecretString,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, CertificateError>;
}

/// `pkcs8ShroudedKeyBag`, the slot current tooling writes keys to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShroudedKeyBag;

/// `keyBag`, an unencrypted key written by older tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainKeyBag;

impl KeyBagStrategy for ShroudedKeyBag {
    fn name(&self) -> &'static str {
        "pkcs8-shrouded-key-bag"
    }

    fn extract(
        &self,
        bags: &[KeyBag],
        password: &SecretString,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, CertificateError> {
        bags.iter()
            .find_map(|bag| match bag {
                KeyBag::Shrouded(key) => Some(key),
                KeyBag::Plain(_) => None,
            })
            .map(|key| key.decrypt(password))
            .transpose()
    }
}

impl KeyBagStrategy for PlainKeyBag {
    fn name(&self) -> &'static str {
        "key-bag"
    }

    fn extract(
        &self,
        bags: &[KeyBag],
        _password: &SecretString,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, CertificateError> {
        Ok(bags.iter().find_map(|bag| match bag {
            KeyBag::Plain(key) => Some(Zeroizing::new(key.der().to_vec())),
            KeyBag::Shrouded(_) => None,
        }))
    }
}

/// Default lookup order for private keys.
pub fn default_strategies() -> Vec<Box<dyn KeyBagStrategy>> {
    vec![Box::new(ShroudedKeyBag), Box::new(PlainKeyBag)]
}

/// Certificate and private key ready to be handed to the signer.
#[derive(Clone)]
pub struct SigningMaterial {
    certificate: Certificate,
    private_key: Zeroizing<Vec<u8>>,
}

impl SigningMaterial {
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Private key as PKCS#8 DER.
    pub fn private_key_der(&self) -> &[u8] {
        &self.private_key
    }
}

impl fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Extracts the signing certificate and private key from PKCS#12 bytes using
/// the [`default_strategies`].
///
/// # Errors
/// - [`CertificateError::IncorrectPassword`] when the container MAC or a
///   decryption check fails
/// - [`CertificateError::CertificateNotFound`] / [`CertificateError::PrivateKeyNotFound`]
/// - [`CertificateError::Malformed`] for anything that does not parse
pub fn extract(data: &[u8], password: &SecretString) -> Result<SigningMaterial, CertificateError> {
    extract_with(data, password, &default_strategies())
}

/// Like [`extract`], with a caller-chosen strategy chain.
#[instrument(skip_all, fields(len = data.len()))]
pub fn extract_with(
    data: &[u8],
    password: &SecretString,
    strategies: &[Box<dyn KeyBagStrategy>],
) -> Result<SigningMaterial, CertificateError> {
    let contents = parse::parse_container(data, password)?;
    debug!(
        certificates = contents.certificates.len(),
        key_bags = contents.key_bags.len(),
        "key container parsed"
    );
    if contents.certificates.is_empty() {
        return Err(CertificateError::CertificateNotFound);
    }

    let mut raw_key = None;
    for strategy in strategies {
        if let Some(key) = strategy.extract(&contents.key_bags, password)? {
            debug!(strategy = strategy.name(), "private key found");
            raw_key = Some(key);
            break;
        }
    }
    let raw_key = raw_key.ok_or(CertificateError::PrivateKeyNotFound)?;

    let private_key = decode_private_key(&raw_key)?;
    let certificate = signing_certificate(&contents.certificates, &private_key)?;
    let private_key = private_key
        .to_pkcs8_der()
        .map_err(|e| CertificateError::Malformed(format!("PKCS#8 encoding: {e}")))?;

    Ok(SigningMaterial {
        certificate,
        private_key: Zeroizing::new(private_key.as_bytes().to_vec()),
    })
}

/// Reads a container from disk and extracts it.
pub async fn load(
    path: impl AsRef<Path>,
    password: &SecretString,
) -> Result<SigningMaterial, CertificateError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|source| CertificateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    extract(&data, password)
}

// PKCS#8 is what the bags are supposed to hold; some issuers put a bare PKCS#1 key inside
fn decode_private_key(der: &[u8]) -> Result<RsaPrivateKey, CertificateError> {
    RsaPrivateKey::from_pkcs8_der(der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
        .map_err(|e| CertificateError::Malformed(format!("unsupported private key: {e}")))
}

/// The certificate whose public key matches `key`, or the first one.
fn signing_certificate(
    certificates: &[Vec<u8>],
    key: &RsaPrivateKey,
) -> Result<Certificate, CertificateError> {
    let parsed = certificates
        .iter()
        .map(|der| {
            Certificate::from_der(der)
                .map_err(|e| CertificateError::Malformed(format!("certificate: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let public_key = key.to_public_key();
    let matching = parsed.iter().position(|cert| {
        cert.tbs_certificate
            .subject_public_key_info
            .to_der()
            .ok()
            .and_then(|spki| RsaPublicKey::from_public_key_der(&spki).ok())
            .is_some_and(|cert_key| cert_key == public_key)
    });
    let index = matching.unwrap_or(0);
    parsed
        .into_iter()
        .nth(index)
        .ok_or(CertificateError::CertificateNotFound)
}
