//! Rust toolkit for Ecuador SRI electronic invoicing (access keys, invoice XML,
//! PKCS#12 signing material, XAdES-BES signatures and the SRI web services).
//!
//! # Examples
//! ```rust
//! use factura_core::config::{Config, Environment};
//!
//! let config = Config::new(Environment::Test);
//! # let _ = config;
//! ```
pub mod access_key;
pub mod api;
pub mod certificate;
pub mod config;
pub mod invoice;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    AccessKey(#[from] access_key::AccessKeyError),
    #[error(transparent)]
    Invoice(#[from] invoice::InvoiceError),
    #[error(transparent)]
    Certificate(#[from] certificate::CertificateError),
    #[error(transparent)]
    Signing(#[from] invoice::sign::SigningError),
    #[error(transparent)]
    Xml(#[from] invoice::xml::XmlError),
    #[error(transparent)]
    Environment(#[from] config::EnvironmentParseError),
    #[error(transparent)]
    Api(#[from] api::SriError),
}
