//! Configuration and environment selection.
use crate::certificate::{self, CertificateError, SigningMaterial};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

/// Environment override for the SRI web service host, mostly for tests.
pub const BASE_URL_ENV: &str = "FACTURA_SRI_BASE_URL";

const RECEPTION_PATH: &str = "comprobantes-electronicos-ws/RecepcionComprobantesOffline";
const AUTHORIZATION_PATH: &str = "comprobantes-electronicos-ws/AutorizacionComprobantesOffline";

/// SRI environment (`ambiente`).
/// - Test: the "pruebas" environment; documents carry no fiscal value.
/// - Production: the live environment.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use factura_core::config::Environment;
///
/// let env = Environment::from_str("production")?;
/// assert_eq!(env.code(), "2");
/// assert_eq!(Environment::from_str("1")?, Environment::Test);
/// # Ok::<(), factura_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    #[serde(alias = "1")]
    Test,
    #[serde(alias = "2")]
    Production,
}

/// Error returned when parsing an [`Environment`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment: {input}")]
    Invalid { input: String },
}

impl FromStr for Environment {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<Environment, EnvironmentParseError> {
        match env.trim().to_ascii_lowercase().as_str() {
            "1" | "test" | "pruebas" => Ok(Environment::Test),
            "2" | "production" | "produccion" => Ok(Environment::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    /// Code written in `ambiente` and in the access key.
    pub fn code(&self) -> &'static str {
        match self {
            Environment::Test => "1",
            Environment::Production => "2",
        }
    }

    pub fn endpoint_url(&self) -> &'static str {
        match self {
            Environment::Test => "https://celcer.sri.gob.ec/",
            Environment::Production => "https://cel.sri.gob.ec/",
        }
    }

    pub fn reception_url(&self) -> String {
        format!("{}{}", self.endpoint_url(), RECEPTION_PATH)
    }

    pub fn authorization_url(&self) -> String {
        format!("{}{}", self.endpoint_url(), AUTHORIZATION_PATH)
    }
}

/// Service paths relative to the base URL.
pub(crate) fn reception_path() -> &'static str {
    RECEPTION_PATH
}

pub(crate) fn authorization_path() -> &'static str {
    AUTHORIZATION_PATH
}

/// Configuration for signing and the SRI client, passed explicitly to the
/// operations that need it.
///
/// # Examples
/// ```rust
/// use factura_core::config::{Config, Environment};
///
/// let config = Config::new(Environment::Test)
///     .with_key_store("certs/firma.p12", "secret123".to_string().into());
/// assert_eq!(config.env(), Environment::Test);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    env: Environment,
    key_store: Option<KeyStore>,
}

/// Location and password of the PKCS#12 signing container.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
    password: SecretString,
}

impl KeyStore {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Reads the container and extracts the signing material.
    pub async fn load(&self) -> Result<SigningMaterial, CertificateError> {
        certificate::load(&self.path, &self.password).await
    }
}

impl Config {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            key_store: None,
        }
    }

    pub fn with_key_store(mut self, path: impl Into<PathBuf>, password: SecretString) -> Self {
        self.key_store = Some(KeyStore {
            path: path.into(),
            password,
        });
        self
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    pub fn key_store(&self) -> Option<&KeyStore> {
        self.key_store.as_ref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(Environment::Test)
    }
}
