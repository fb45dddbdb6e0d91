use std::path::PathBuf;

use factura_core::invoice::InvoiceDocument;
use factura_core::invoice::sign::InvoiceSigner;
use secrecy::SecretString;

#[allow(dead_code)]
pub const NUMERIC_CODE: &str = "12345678";

#[allow(dead_code)]
pub const EXPECTED_ACCESS_KEY: &str = "1506202401179001234500110010010000000011234567812";

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

#[allow(dead_code)]
pub fn read_fixture(relative: &str) -> Vec<u8> {
    std::fs::read(fixture_path(relative)).expect("read fixture")
}

#[allow(dead_code)]
pub fn password() -> SecretString {
    SecretString::from("secret123")
}

#[allow(dead_code)]
pub fn sample_invoice() -> InvoiceDocument {
    let json = std::fs::read_to_string(fixture_path("invoices/factura-2.1.0.json"))
        .expect("read invoice fixture");
    serde_json::from_str(&json).expect("parse invoice fixture")
}

#[allow(dead_code)]
pub fn pem_signer() -> InvoiceSigner {
    let cert = std::fs::read_to_string(fixture_path("certs/signer-cert.pem")).expect("cert pem");
    let key = std::fs::read_to_string(fixture_path("certs/signer-key.pem")).expect("key pem");
    InvoiceSigner::from_pem(&cert, &key).expect("signer")
}
