//! BER parsing of PKCS#12 (PFX) containers.
//!
//! PKCS#12 files are BER, not strict DER, so everything goes through
//! `yasna::parse_ber`. Certificates come out as DER, key bags stay as found:
//! shrouded keys are decrypted later by the key extraction strategies.
use super::CertificateError;
use super::kdf::{self, AesKeySize, Prf};
use secrecy::{ExposeSecret, SecretString};
use yasna::models::ObjectIdentifier;
use yasna::{ASN1Error, ASN1ErrorKind, BERReader, Tag};
use zeroize::Zeroizing;

const OID_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_ENCRYPTED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 6];

const OID_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 1];
const OID_PKCS8_SHROUDED_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 2];
const OID_CERT_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 3];
const OID_X509_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 1];

const OID_PBE_SHA1_3DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 3];
const OID_PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
const OID_PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];
const OID_AES_128_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 2];
const OID_AES_256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];

const OID_SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
const OID_HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
const OID_HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];

fn oid(components: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(components)
}

/// Password-based encryption scheme protecting a bag or a content block.
#[derive(Debug, Clone)]
pub(crate) enum EncryptionScheme {
    PbeSha1And3Des {
        salt: Vec<u8>,
        iterations: u32,
    },
    Pbes2 {
        salt: Vec<u8>,
        iterations: u32,
        prf: Prf,
        key_size: AesKeySize,
        iv: Vec<u8>,
    },
}

impl EncryptionScheme {
    pub(crate) fn decrypt(
        &self,
        ciphertext: &[u8],
        password: &SecretString,
    ) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
        match self {
            EncryptionScheme::PbeSha1And3Des { salt, iterations } => {
                let bmp = kdf::password_to_bmp(password.expose_secret());
                kdf::decrypt_pbe_sha1_3des(ciphertext, &bmp, salt, *iterations)
            }
            EncryptionScheme::Pbes2 {
                salt,
                iterations,
                prf,
                key_size,
                iv,
            } => kdf::decrypt_pbes2(
                ciphertext,
                password.expose_secret(),
                salt,
                *iterations,
                *prf,
                *key_size,
                iv,
            ),
        }
    }
}

/// Private key entry as stored in the container.
#[derive(Debug)]
pub enum KeyBag {
    /// `pkcs8ShroudedKeyBag`: an `EncryptedPrivateKeyInfo`.
    Shrouded(EncryptedKey),
    /// `keyBag`: a plain `PrivateKeyInfo`.
    Plain(PlainKey),
}

/// Encrypted PKCS#8 key, decrypted on demand with the container password.
pub struct EncryptedKey {
    pub(crate) scheme: EncryptionScheme,
    pub(crate) ciphertext: Vec<u8>,
}

impl EncryptedKey {
    /// Decrypts the `EncryptedPrivateKeyInfo` into PKCS#8 DER.
    pub fn decrypt(&self, password: &SecretString) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
        self.scheme.decrypt(&self.ciphertext, password)
    }
}

impl std::fmt::Debug for EncryptedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedKey")
            .field("scheme", &self.scheme)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Unencrypted PKCS#8 key bytes.
pub struct PlainKey(pub(crate) Zeroizing<Vec<u8>>);

impl PlainKey {
    pub fn der(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PlainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlainKey([REDACTED])")
    }
}

/// Certificates and key bags found in a container, in file order.
#[derive(Debug, Default)]
pub struct ContainerContents {
    pub certificates: Vec<Vec<u8>>,
    pub key_bags: Vec<KeyBag>,
}

struct MacData {
    algorithm: MacAlgorithm,
    digest: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
}

#[derive(Clone, Copy)]
enum MacAlgorithm {
    Sha1,
    Sha256,
}

enum ContentInfo {
    Data(Vec<u8>),
    Encrypted {
        scheme: EncryptionScheme,
        ciphertext: Vec<u8>,
    },
}

enum SafeBag {
    Key(KeyBag),
    Certificate(Vec<u8>),
    Other,
}

/// Verifies the integrity MAC and collects every certificate and key bag.
///
/// # Errors
/// [`CertificateError::IncorrectPassword`] when the MAC does not match or an
/// encrypted content block fails to decrypt; [`CertificateError::Malformed`]
/// for structural problems.
pub(crate) fn parse_container(
    data: &[u8],
    password: &SecretString,
) -> Result<ContainerContents, CertificateError> {
    let (auth_safe, mac) = yasna::parse_ber(data, |r| {
        r.read_sequence(|r| {
            let version = r.next().read_u32()?;
            if version != 3 {
                return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
            }
            let auth_safe = read_data_content(r.next())?;
            let mac = r.read_optional(read_mac_data)?;
            Ok((auth_safe, mac))
        })
    })
    .map_err(|e| CertificateError::Malformed(format!("PFX structure: {e}")))?;

    if let Some(mac) = &mac {
        verify_mac(mac, &auth_safe, password)?;
    }

    let infos = yasna::parse_ber(&auth_safe, |r| r.collect_sequence_of(read_content_info))
        .map_err(|e| CertificateError::Malformed(format!("authenticated safe: {e}")))?;

    let mut contents = ContainerContents::default();
    for info in infos {
        let bags = match info {
            ContentInfo::Data(data) => read_safe_contents(&data)?,
            ContentInfo::Encrypted { scheme, ciphertext } => {
                let plain = scheme.decrypt(&ciphertext, password)?;
                read_safe_contents(&plain)?
            }
        };
        for bag in bags {
            match bag {
                SafeBag::Key(key) => contents.key_bags.push(key),
                SafeBag::Certificate(der) => contents.certificates.push(der),
                SafeBag::Other => {}
            }
        }
    }
    Ok(contents)
}

fn read_safe_contents(data: &[u8]) -> Result<Vec<SafeBag>, CertificateError> {
    yasna::parse_ber(data, |r| r.collect_sequence_of(read_safe_bag))
        .map_err(|e| CertificateError::Malformed(format!("safe bags: {e}")))
}

fn read_data_content(r: BERReader) -> Result<Vec<u8>, ASN1Error> {
    r.read_sequence(|r| {
        if r.next().read_oid()? != oid(OID_DATA) {
            return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
        }
        r.next().read_tagged(Tag::context(0), |r| r.read_bytes())
    })
}

fn read_content_info(r: BERReader) -> Result<ContentInfo, ASN1Error> {
    r.read_sequence(|r| {
        let content_type = r.next().read_oid()?;
        if content_type == oid(OID_DATA) {
            let data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
            Ok(ContentInfo::Data(data))
        } else if content_type == oid(OID_ENCRYPTED_DATA) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let _version = r.next().read_u32()?;
                    r.next().read_sequence(|r| {
                        let _content_type = r.next().read_oid()?;
                        let scheme = read_encryption_scheme(r.next())?;
                        let ciphertext = r
                            .next()
                            .read_tagged_implicit(Tag::context(0), |r| r.read_bytes())?;
                        Ok(ContentInfo::Encrypted { scheme, ciphertext })
                    })
                })
            })
        } else {
            Err(ASN1Error::new(ASN1ErrorKind::Invalid))
        }
    })
}

fn read_safe_bag(r: BERReader) -> Result<SafeBag, ASN1Error> {
    r.read_sequence(|r| {
        let bag_type = r.next().read_oid()?;
        let bag = if bag_type == oid(OID_PKCS8_SHROUDED_KEY_BAG) {
            let (scheme, ciphertext) = r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let scheme = read_encryption_scheme(r.next())?;
                    let ciphertext = r.next().read_bytes()?;
                    Ok((scheme, ciphertext))
                })
            })?;
            SafeBag::Key(KeyBag::Shrouded(EncryptedKey { scheme, ciphertext }))
        } else if bag_type == oid(OID_KEY_BAG) {
            let der = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            SafeBag::Key(KeyBag::Plain(PlainKey(Zeroizing::new(der))))
        } else if bag_type == oid(OID_CERT_BAG) {
            let der = r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    if r.next().read_oid()? != oid(OID_X509_CERTIFICATE) {
                        return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
                    }
                    r.next().read_tagged(Tag::context(0), |r| r.read_bytes())
                })
            })?;
            SafeBag::Certificate(der)
        } else {
            let _value = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            SafeBag::Other
        };
        skip_bag_attributes(r)?;
        Ok(bag)
    })
}

// friendlyName, localKeyId and the like
fn skip_bag_attributes(r: &mut yasna::BERReaderSeq) -> Result<(), ASN1Error> {
    r.read_optional(|r| {
        r.read_set_of(|r| {
            r.read_sequence(|r| {
                let _attr_type = r.next().read_oid()?;
                r.next().read_set_of(|r| {
                    let _ = r.read_der()?;
                    Ok(())
                })
            })
        })
    })?;
    Ok(())
}

fn read_encryption_scheme(r: BERReader) -> Result<EncryptionScheme, ASN1Error> {
    r.read_sequence(|r| {
        let algorithm = r.next().read_oid()?;
        if algorithm == oid(OID_PBE_SHA1_3DES) {
            r.next().read_sequence(|r| {
                let salt = r.next().read_bytes()?;
                let iterations = r.next().read_u32()?;
                Ok(EncryptionScheme::PbeSha1And3Des { salt, iterations })
            })
        } else if algorithm == oid(OID_PBES2) {
            r.next().read_sequence(|r| {
                let (salt, iterations, prf) = r.next().read_sequence(|r| {
                    if r.next().read_oid()? != oid(OID_PBKDF2) {
                        return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
                    }
                    r.next().read_sequence(read_pbkdf2_params)
                })?;
                let (key_size, iv) = r.next().read_sequence(|r| {
                    let cipher = r.next().read_oid()?;
                    let key_size = if cipher == oid(OID_AES_256_CBC) {
                        AesKeySize::Aes256
                    } else if cipher == oid(OID_AES_128_CBC) {
                        AesKeySize::Aes128
                    } else {
                        return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
                    };
                    Ok((key_size, r.next().read_bytes()?))
                })?;
                Ok(EncryptionScheme::Pbes2 {
                    salt,
                    iterations,
                    prf,
                    key_size,
                    iv,
                })
            })
        } else {
            Err(ASN1Error::new(ASN1ErrorKind::Invalid))
        }
    })
}

// salt, iterationCount, keyLength OPTIONAL, prf DEFAULT hmacWithSHA1
fn read_pbkdf2_params(r: &mut yasna::BERReaderSeq) -> Result<(Vec<u8>, u32, Prf), ASN1Error> {
    let salt = r.next().read_bytes()?;
    let iterations = r.next().read_u32()?;
    let mut prf = Prf::HmacSha1;
    if let Some(der) = r.read_optional(|r| r.read_der())? {
        let prf_der = if der.first() == Some(&0x30) {
            Some(der)
        } else {
            r.read_optional(|r| r.read_der())?
        };
        if let Some(prf_der) = prf_der {
            prf = read_prf(&prf_der)?;
        }
    }
    Ok((salt, iterations, prf))
}

fn read_prf(der: &[u8]) -> Result<Prf, ASN1Error> {
    yasna::parse_der(der, |r| {
        r.read_sequence(|r| {
            let algorithm = r.next().read_oid()?;
            let _params = r.read_optional(|r| r.read_null())?;
            if algorithm == oid(OID_HMAC_SHA256) {
                Ok(Prf::HmacSha256)
            } else if algorithm == oid(OID_HMAC_SHA1) {
                Ok(Prf::HmacSha1)
            } else {
                Err(ASN1Error::new(ASN1ErrorKind::Invalid))
            }
        })
    })
}

fn read_mac_data(r: BERReader) -> Result<MacData, ASN1Error> {
    r.read_sequence(|r| {
        let (algorithm, digest) = r.next().read_sequence(|r| {
            let algorithm = r.next().read_sequence(|r| {
                let hash = r.next().read_oid()?;
                let _params = r.read_optional(|r| r.read_null())?;
                if hash == oid(OID_SHA256) {
                    Ok(MacAlgorithm::Sha256)
                } else if hash == oid(OID_SHA1) {
                    Ok(MacAlgorithm::Sha1)
                } else {
                    Err(ASN1Error::new(ASN1ErrorKind::Invalid))
                }
            })?;
            Ok((algorithm, r.next().read_bytes()?))
        })?;
        let salt = r.next().read_bytes()?;
        let iterations = r.read_optional(|r| r.read_u32())?.unwrap_or(1);
        Ok(MacData {
            algorithm,
            digest,
            salt,
            iterations,
        })
    })
}

fn verify_mac(
    mac: &MacData,
    auth_safe: &[u8],
    password: &SecretString,
) -> Result<(), CertificateError> {
    let bmp = kdf::password_to_bmp(password.expose_secret());
    match mac.algorithm {
        MacAlgorithm::Sha1 => {
            let key = kdf::pkcs12_kdf_sha1(kdf::ID_MAC, &bmp, &mac.salt, mac.iterations, 20);
            kdf::verify_hmac_sha1(&key, auth_safe, &mac.digest)
        }
        MacAlgorithm::Sha256 => {
            let key = kdf::pkcs12_kdf_sha256(kdf::ID_MAC, &bmp, &mac.salt, mac.iterations, 32);
            kdf::verify_hmac_sha256(&key, auth_safe, &mac.digest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/certs")
            .join(name);
        std::fs::read(path).expect("read fixture")
    }

    fn password() -> SecretString {
        SecretString::from("secret123")
    }

    #[test]
    fn modern_container_has_certificate_and_shrouded_key() {
        let contents = parse_container(&fixture("signer.p12"), &password()).expect("parse");
        assert_eq!(contents.certificates.len(), 1);
        assert_eq!(contents.certificates[0][0], 0x30);
        assert!(matches!(
            contents.key_bags.as_slice(),
            [KeyBag::Shrouded(EncryptedKey {
                scheme: EncryptionScheme::Pbes2 {
                    prf: Prf::HmacSha256,
                    key_size: AesKeySize::Aes256,
                    ..
                },
                ..
            })]
        ));
    }

    #[test]
    fn legacy_container_uses_triple_des() {
        let contents = parse_container(&fixture("signer-legacy.p12"), &password()).expect("parse");
        assert_eq!(contents.certificates.len(), 1);
        assert!(matches!(
            contents.key_bags.as_slice(),
            [KeyBag::Shrouded(EncryptedKey {
                scheme: EncryptionScheme::PbeSha1And3Des { .. },
                ..
            })]
        ));
    }

    #[test]
    fn plain_key_bag_is_kept_as_pkcs8() {
        let contents = parse_container(&fixture("signer-keybag.p12"), &password()).expect("parse");
        match contents.key_bags.as_slice() {
            [KeyBag::Plain(PlainKey(der))] => assert_eq!(der[0], 0x30),
            other => panic!("unexpected key bags: {other:?}"),
        }
    }

    #[test]
    fn wrong_password_fails_mac() {
        let err = parse_container(&fixture("signer.p12"), &SecretString::from("wrong"))
            .expect_err("mac must fail");
        assert!(matches!(err, CertificateError::IncorrectPassword));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_container(b"not a pfx", &password()).expect_err("garbage");
        assert!(matches!(err, CertificateError::Malformed(_)));
    }
}
