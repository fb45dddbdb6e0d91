//! Password-based key derivation and decryption for PKCS#12 containers.
//!
//! - PKCS#12 KDF (RFC 7292 Appendix B) for the MAC key and legacy 3DES PBE
//! - PBES2: PBKDF2 with HMAC-SHA1/SHA-256, then AES-128/256-CBC
use super::CertificateError;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::digest::FixedOutputReset;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Des3CbcDec = cbc::Decryptor<des::TdesEde3>;

/// Diversifier bytes of the PKCS#12 KDF.
pub(crate) const ID_KEY: u8 = 1;
pub(crate) const ID_IV: u8 = 2;
pub(crate) const ID_MAC: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prf {
    HmacSha1,
    HmacSha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AesKeySize {
    Aes128,
    Aes256,
}

impl AesKeySize {
    fn key_len(self) -> usize {
        match self {
            AesKeySize::Aes128 => 16,
            AesKeySize::Aes256 => 32,
        }
    }
}

pub(crate) fn pkcs12_kdf_sha1(
    id: u8,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Zeroizing<Vec<u8>> {
    pkcs12_kdf::<Sha1>(id, password, salt, iterations, output_len, 20, 64)
}

pub(crate) fn pkcs12_kdf_sha256(
    id: u8,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Zeroizing<Vec<u8>> {
    pkcs12_kdf::<Sha256>(id, password, salt, iterations, output_len, 32, 64)
}

// u: digest output size, v: digest block size
fn pkcs12_kdf<D>(
    id: u8,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
    u: usize,
    v: usize,
) -> Zeroizing<Vec<u8>>
where
    D: Digest + FixedOutputReset,
{
    let diversifier = vec![id; v];
    let mut input = Zeroizing::new(repeat_to_multiple(salt, v));
    input.extend_from_slice(&repeat_to_multiple(password, v));

    let blocks = output_len.div_ceil(u);
    let mut out = Zeroizing::new(Vec::with_capacity(blocks * u));
    for block in 0..blocks {
        let mut hasher = D::new();
        Digest::update(&mut hasher, &diversifier);
        Digest::update(&mut hasher, input.as_slice());
        let mut a = hasher.finalize_reset();
        for _ in 1..iterations {
            Digest::update(&mut hasher, &a);
            a = hasher.finalize_reset();
        }
        out.extend_from_slice(&a);

        if block + 1 < blocks {
            let b = repeat_to_multiple(&a, v);
            for chunk in input.chunks_mut(v) {
                add_with_carry(chunk, &b);
            }
        }
    }
    out.truncate(output_len);
    out
}

fn repeat_to_multiple(data: &[u8], v: usize) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let len = data.len().div_ceil(v) * v;
    data.iter().copied().cycle().take(len).collect()
}

// chunk = (chunk + b + 1) mod 2^(8 * v)
fn add_with_carry(chunk: &mut [u8], b: &[u8]) {
    let mut carry: u16 = 1;
    for (byte, addend) in chunk.iter_mut().zip(b).rev() {
        let sum = u16::from(*byte) + u16::from(*addend) + carry;
        *byte = sum as u8;
        carry = sum >> 8;
    }
}

/// UTF-16BE with a two-byte terminator; the empty password stays empty.
pub(crate) fn password_to_bmp(password: &str) -> Zeroizing<Vec<u8>> {
    let mut bmp = Zeroizing::new(Vec::with_capacity(password.len() * 2 + 2));
    if password.is_empty() {
        return bmp;
    }
    for unit in password.encode_utf16() {
        bmp.extend_from_slice(&unit.to_be_bytes());
    }
    bmp.extend_from_slice(&[0, 0]);
    bmp
}

/// `pbeWithSHAAnd3-KeyTripleDES-CBC`.
pub(crate) fn decrypt_pbe_sha1_3des(
    ciphertext: &[u8],
    bmp_password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
    let key = pkcs12_kdf_sha1(ID_KEY, bmp_password, salt, iterations, 24);
    let iv = pkcs12_kdf_sha1(ID_IV, bmp_password, salt, iterations, 8);
    let decryptor = Des3CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| CertificateError::Malformed(format!("3DES-CBC parameters: {e}")))?;
    unpad(decryptor, ciphertext)
}

/// PBES2 with PBKDF2 and AES-CBC. The password is used as UTF-8 bytes.
pub(crate) fn decrypt_pbes2(
    ciphertext: &[u8],
    password: &str,
    salt: &[u8],
    iterations: u32,
    prf: Prf,
    key_size: AesKeySize,
    iv: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
    let mut key = Zeroizing::new(vec![0u8; key_size.key_len()]);
    match prf {
        Prf::HmacSha1 => pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut key),
        Prf::HmacSha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key)
        }
    }
    match key_size {
        AesKeySize::Aes128 => {
            let decryptor = Aes128CbcDec::new_from_slices(&key, iv)
                .map_err(|e| CertificateError::Malformed(format!("AES-128-CBC parameters: {e}")))?;
            unpad(decryptor, ciphertext)
        }
        AesKeySize::Aes256 => {
            let decryptor = Aes256CbcDec::new_from_slices(&key, iv)
                .map_err(|e| CertificateError::Malformed(format!("AES-256-CBC parameters: {e}")))?;
            unpad(decryptor, ciphertext)
        }
    }
}

// a bad padding block is what a wrong password looks like after decryption
fn unpad<C>(decryptor: C, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CertificateError>
where
    C: BlockDecryptMut,
{
    let mut buf = Zeroizing::new(ciphertext.to_vec());
    let len = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| CertificateError::IncorrectPassword)?
        .len();
    buf.truncate(len);
    Ok(buf)
}

/// Checks `expected` against HMAC-SHA1 of `data` in constant time.
pub(crate) fn verify_hmac_sha1(key: &[u8], data: &[u8], expected: &[u8]) -> Result<(), CertificateError> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|e| CertificateError::Malformed(format!("MAC key: {e}")))?;
    mac.update(data);
    mac.verify_slice(expected)
        .map_err(|_| CertificateError::IncorrectPassword)
}

/// Checks `expected` against HMAC-SHA256 of `data` in constant time.
pub(crate) fn verify_hmac_sha256(key: &[u8], data: &[u8], expected: &[u8]) -> Result<(), CertificateError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| CertificateError::Malformed(format!("MAC key: {e}")))?;
    mac.update(data);
    mac.verify_slice(expected)
        .map_err(|_| CertificateError::IncorrectPassword)
}
