//! SRI offline web service client (reception and authorization).
//!
//! Both services speak SOAP 1.1. Requests are built as [`Element`] trees and
//! responses are read back with the same XML layer used for invoices.
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    access_key::AccessKey,
    config::{self, BASE_URL_ENV, Config},
    invoice::SignedInvoice,
    invoice::xml::{self, Element, XmlError, XmlFormat},
};
use base64ct::{Base64, Encoding};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const RECEPTION_NS: &str = "http://ec.gob.sri.ws.recepcion";
const AUTHORIZATION_NS: &str = "http://ec.gob.sri.ws.autorizacion";

/// Errors returned by the SRI client.
#[derive(Error, Debug)]
pub enum SriError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SOAP fault from SRI: {0}")]
    Fault(String),
    #[error("Invalid response from SRI: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Outcome of submitting a signed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceptionStatus {
    /// `RECIBIDA`: queued for authorization.
    #[serde(rename = "RECIBIDA")]
    Received,
    /// `DEVUELTA`: rejected, see the messages.
    #[serde(rename = "DEVUELTA")]
    Returned,
}

/// Message attached to a reception or authorization result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SriMessage {
    identifier: String,
    message: String,
    additional_info: Option<String>,
    kind: Option<String>,
}

impl SriMessage {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn additional_info(&self) -> Option<&str> {
        self.additional_info.as_deref()
    }

    /// `ERROR`, `ADVERTENCIA` or `INFORMATIVO`.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    fn from_element(el: &Element) -> Self {
        Self {
            identifier: el.child_text("identificador").unwrap_or_default(),
            message: el.child_text("mensaje").unwrap_or_default(),
            additional_info: el
                .child_text("informacionAdicional")
                .filter(|value| !value.trim().is_empty()),
            kind: el.child_text("tipo"),
        }
    }
}

/// Reception service result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceptionResponse {
    status: ReceptionStatus,
    messages: Vec<SriMessage>,
}

impl ReceptionResponse {
    pub fn status(&self) -> ReceptionStatus {
        self.status
    }

    pub fn messages(&self) -> &[SriMessage] {
        &self.messages
    }

    pub fn is_received(&self) -> bool {
        self.status == ReceptionStatus::Received
    }
}

/// Authorized document as returned by the authorization service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authorization {
    number: String,
    authorized_at: String,
    environment: String,
    document: String,
    messages: Vec<SriMessage>,
}

impl Authorization {
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn authorized_at(&self) -> &str {
        &self.authorized_at
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The authorized XML, as echoed back by SRI.
    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn messages(&self) -> &[SriMessage] {
        &self.messages
    }
}

/// Authorization service result for one access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationResponse {
    /// Nothing decided yet (no authorization entries or `EN PROCESO`).
    Pending,
    Authorized(Authorization),
    NotAuthorized { messages: Vec<SriMessage> },
}

/// SRI web service client.
///
/// # Examples
/// ```rust,no_run
/// use factura_core::api::{SriClient, SriError};
/// use factura_core::config::Config;
///
/// let client = SriClient::new(Config::default())?;
/// # let _ = client;
/// # Ok::<(), SriError>(())
/// ```
#[derive(Debug)]
pub struct SriClient {
    config: Config,
    client: Client,
    base_url: String,
}

// Public API
impl SriClient {
    /// Create a new client for the configured environment.
    ///
    /// The host can be overridden with `FACTURA_SRI_BASE_URL`.
    ///
    /// # Errors
    /// Returns [`SriError::Http`] if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, SriError> {
        let client = Client::builder().build().map_err(SriError::Http)?;
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .map(|value| {
                if value.ends_with('/') {
                    value
                } else {
                    format!("{value}/")
                }
            })
            .unwrap_or_else(|| config.env().endpoint_url().to_string());

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submits a signed invoice to the reception service.
    ///
    /// # Errors
    /// Returns [`SriError`] for network failures, SOAP faults or unreadable responses.
    pub async fn send_receipt(&self, invoice: &SignedInvoice) -> Result<ReceptionResponse, SriError> {
        self.send_receipt_base64(&invoice.to_xml_base64()).await
    }

    /// Same as [`SriClient::send_receipt`] for an already signed XML string.
    pub async fn send_receipt_xml(&self, signed_xml: &str) -> Result<ReceptionResponse, SriError> {
        self.send_receipt_base64(&Base64::encode_string(signed_xml.as_bytes()))
            .await
    }

    /// Queries the authorization status of a previously submitted document.
    ///
    /// # Errors
    /// Returns [`SriError`] for network failures, SOAP faults or unreadable responses.
    #[instrument(skip_all, fields(access_key = %access_key))]
    pub async fn authorize(&self, access_key: &AccessKey) -> Result<AuthorizationResponse, SriError> {
        let operation = Element::new("ec:autorizacionComprobante")
            .with_child(Element::leaf("claveAccesoComprobante", access_key.as_str()));
        let body = self
            .call(config::authorization_path(), AUTHORIZATION_NS, operation)
            .await?;
        let response = parse_authorization(&body)?;
        info!(
            outcome = match &response {
                AuthorizationResponse::Pending => "pending",
                AuthorizationResponse::Authorized(_) => "authorized",
                AuthorizationResponse::NotAuthorized { .. } => "not_authorized",
            },
            "authorization queried"
        );
        Ok(response)
    }
}

// Private API
impl SriClient {
    #[instrument(skip_all)]
    async fn send_receipt_base64(&self, document: &str) -> Result<ReceptionResponse, SriError> {
        let operation =
            Element::new("ec:validarComprobante").with_child(Element::leaf("xml", document));
        let body = self
            .call(config::reception_path(), RECEPTION_NS, operation)
            .await?;
        let response = parse_reception(&body)?;
        info!(status = ?response.status(), messages = response.messages().len(), "document submitted");
        Ok(response)
    }

    async fn call(&self, path: &str, service_ns: &str, operation: Element) -> Result<String, SriError> {
        let envelope = Element::new("soapenv:Envelope")
            .with_attr("xmlns:soapenv", SOAP_ENV_NS)
            .with_attr("xmlns:ec", service_ns)
            .with_child(Element::new("soapenv:Header"))
            .with_child(Element::new("soapenv:Body").with_child(operation))
            .to_xml_string(XmlFormat::Compact)?;

        let url = self.build_endpoint(path);
        debug!(%url, "calling SRI");
        let response = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "")
            .body(envelope)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        // SOAP 1.1 reports faults with 500
        if let Some(fault) = fault_string(&body) {
            return Err(SriError::Fault(fault));
        }
        if !status.is_success() {
            return Err(SriError::InvalidResponse(format!("status {status}: {body}")));
        }
        Ok(body)
    }

    fn build_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn fault_string(body: &str) -> Option<String> {
    let root = xml::parse(body).ok()?;
    let fault = root.descendants("Fault").into_iter().next()?;
    Some(
        fault
            .child_text("faultstring")
            .unwrap_or_else(|| fault.text()),
    )
}

fn parse_reception(body: &str) -> Result<ReceptionResponse, SriError> {
    let root = xml::parse(body)?;
    let answer = root
        .descendants("RespuestaRecepcionComprobante")
        .into_iter()
        .next()
        .ok_or_else(|| SriError::InvalidResponse("missing RespuestaRecepcionComprobante".into()))?;
    let status = match answer.child_text("estado").as_deref().map(str::trim) {
        Some("RECIBIDA") => ReceptionStatus::Received,
        Some("DEVUELTA") => ReceptionStatus::Returned,
        other => {
            return Err(SriError::InvalidResponse(format!(
                "unknown reception status {other:?}"
            )));
        }
    };
    let messages = answer
        .descendants("mensajes")
        .into_iter()
        .flat_map(|list| list.children().filter(|el| el.local_name() == "mensaje"))
        .map(SriMessage::from_element)
        .collect();
    Ok(ReceptionResponse { status, messages })
}

fn parse_authorization(body: &str) -> Result<AuthorizationResponse, SriError> {
    let root = xml::parse(body)?;
    let answer = root
        .descendants("RespuestaAutorizacionComprobante")
        .into_iter()
        .next()
        .ok_or_else(|| {
            SriError::InvalidResponse("missing RespuestaAutorizacionComprobante".into())
        })?;
    let Some(authorization) = answer.descendants("autorizacion").into_iter().next() else {
        return Ok(AuthorizationResponse::Pending);
    };

    let messages: Vec<SriMessage> = authorization
        .child("mensajes")
        .map(|list| {
            list.children()
                .filter(|el| el.local_name() == "mensaje")
                .map(SriMessage::from_element)
                .collect()
        })
        .unwrap_or_default();

    let text = |local: &str| {
        authorization
            .child_text(local)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };
    match text("estado").as_str() {
        "AUTORIZADO" => Ok(AuthorizationResponse::Authorized(Authorization {
            number: text("numeroAutorizacion"),
            authorized_at: text("fechaAutorizacion"),
            environment: text("ambiente"),
            document: authorization.child_text("comprobante").unwrap_or_default(),
            messages,
        })),
        "NO AUTORIZADO" | "RECHAZADA" => Ok(AuthorizationResponse::NotAuthorized { messages }),
        "EN PROCESO" | "" => Ok(AuthorizationResponse::Pending),
        other => Err(SriError::InvalidResponse(format!(
            "unknown authorization status {other:?}"
        ))),
    }
}
