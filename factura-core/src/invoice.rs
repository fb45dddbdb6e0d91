//! Invoice (`factura`) domain types and builders.
mod builder;
pub mod sign;
pub mod validation;
pub mod xml;

pub use builder::{InvoiceBuilder, SignedInvoice, UnsignedInvoice, build_document};
pub use validation::{ValidationError, ValidationRule, validate};

use crate::access_key::AccessKeyError;
use crate::config::Environment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Document-type code of a sales invoice.
pub const INVOICE_DOCUMENT_TYPE: &str = "01";

/// Document type allowed to carry a vehicle plate (fuel sales).
pub const FUEL_SALE_DOCUMENT_TYPE: &str = "01";

/// Invoice-related errors.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("numeric code must be exactly 8 digits, got {code:?}")]
    InvalidNumericCode { code: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    AccessKey(#[from] AccessKeyError),
    #[error(transparent)]
    Xml(#[from] xml::XmlError),
}

/// Schema version declared on the `factura` root.
///
/// # Examples
/// ```rust
/// use factura_core::invoice::SchemaVersion;
///
/// let version: SchemaVersion = "2.1.0".parse()?;
/// assert_eq!(version.quantity_precision(), 6);
/// assert!(version.allows_third_party_blocks());
/// # Ok::<(), factura_core::invoice::SchemaVersionParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    #[serde(rename = "1.0.0")]
    V1_0_0,
    #[serde(rename = "1.1.0")]
    V1_1_0,
    #[serde(rename = "2.0.0")]
    V2_0_0,
    #[serde(rename = "2.1.0")]
    V2_1_0,
}

/// Error returned when parsing a [`SchemaVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported schema version: {input}")]
pub struct SchemaVersionParseError {
    pub input: String,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1_0_0 => "1.0.0",
            SchemaVersion::V1_1_0 => "1.1.0",
            SchemaVersion::V2_0_0 => "2.0.0",
            SchemaVersion::V2_1_0 => "2.1.0",
        }
    }

    /// Decimals used for line quantity and unit price.
    pub fn quantity_precision(&self) -> usize {
        match self {
            SchemaVersion::V1_1_0 | SchemaVersion::V2_1_0 => 6,
            SchemaVersion::V1_0_0 | SchemaVersion::V2_0_0 => 2,
        }
    }

    /// Whether the substitute remission guide and third-party values blocks exist.
    pub fn allows_third_party_blocks(&self) -> bool {
        matches!(self, SchemaVersion::V2_0_0 | SchemaVersion::V2_1_0)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaVersionParseError;
    fn from_str(s: &str) -> Result<Self, SchemaVersionParseError> {
        match s.trim() {
            "1.0.0" => Ok(SchemaVersion::V1_0_0),
            "1.1.0" => Ok(SchemaVersion::V1_1_0),
            "2.0.0" => Ok(SchemaVersion::V2_0_0),
            "2.1.0" => Ok(SchemaVersion::V2_1_0),
            _ => Err(SchemaVersionParseError {
                input: s.to_string(),
            }),
        }
    }
}

/// Emission type (`tipoEmision`). Only normal emission exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmissionType {
    #[default]
    #[serde(rename = "1")]
    Normal,
}

impl EmissionType {
    pub fn code(&self) -> &'static str {
        match self {
            EmissionType::Normal => "1",
        }
    }
}

/// Emitter block (`infoTributaria`).
///
/// The access key is not part of it: it is computed when the document is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxHeader {
    pub environment: Environment,
    #[serde(default)]
    pub emission_type: EmissionType,
    pub legal_name: String,
    #[serde(default)]
    pub commercial_name: Option<String>,
    pub tax_id: String,
    pub document_type: String,
    pub establishment: String,
    pub emission_point: String,
    pub sequential: String,
    pub head_office_address: String,
    #[serde(default)]
    pub withholding_agent: Option<String>,
    #[serde(default)]
    pub rimpe_taxpayer: Option<String>,
}

impl TaxHeader {
    /// `estab` and `ptoEmi` joined, as used in the access key.
    pub fn series(&self) -> String {
        format!(
            "{:0>3}{:0>3}",
            self.establishment.trim(),
            self.emission_point.trim()
        )
    }
}

/// Buyer and totals block (`infoFactura`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    /// `dd/mm/yyyy`
    pub emission_date: String,
    #[serde(default)]
    pub establishment_address: Option<String>,
    #[serde(default)]
    pub special_taxpayer: Option<String>,
    #[serde(default)]
    pub keeps_accounts: Option<bool>,
    pub buyer_id_type: String,
    #[serde(default)]
    pub remission_guide: Option<String>,
    pub buyer_name: String,
    pub buyer_id: String,
    #[serde(default)]
    pub buyer_address: Option<String>,
    pub total_without_taxes: f64,
    pub total_discount: f64,
    #[serde(default)]
    pub reimbursement_document_type: Option<String>,
    #[serde(default)]
    pub total_reimbursement_vouchers: Option<f64>,
    #[serde(default)]
    pub total_reimbursement_tax_base: Option<f64>,
    #[serde(default)]
    pub total_reimbursement_tax: Option<f64>,
    #[serde(default)]
    pub taxes: Vec<TotalTax>,
    #[serde(default)]
    pub tip: f64,
    pub grand_total: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub withheld_vat: Option<f64>,
    #[serde(default)]
    pub withheld_income_tax: Option<f64>,
}

/// Invoice-level tax total (`totalImpuesto`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalTax {
    pub code: String,
    pub percentage_code: String,
    #[serde(default)]
    pub additional_discount: Option<f64>,
    pub tax_base: f64,
    #[serde(default)]
    pub rate: Option<f64>,
    pub value: f64,
}

/// Payment (`pago`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub method: String,
    pub total: f64,
    #[serde(default)]
    pub term: Option<f64>,
    #[serde(default)]
    pub time_unit: Option<String>,
}

impl Payment {
    pub fn new(method: impl Into<String>, total: f64) -> Self {
        Self {
            method: method.into(),
            total,
            term: None,
            time_unit: None,
        }
    }
}

/// Line item (`detalle`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub main_code: String,
    #[serde(default)]
    pub auxiliary_code: Option<String>,
    pub description: String,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub discount: f64,
    pub total_without_taxes: f64,
    #[serde(default)]
    pub additional_details: Vec<AdditionalDetail>,
    #[serde(default)]
    pub taxes: Vec<LineTax>,
}

impl LineItem {
    /// Line with no discount whose net total is `quantity * unit_price`.
    pub fn new(
        main_code: impl Into<String>,
        description: impl Into<String>,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            main_code: main_code.into(),
            auxiliary_code: None,
            description: description.into(),
            unit_of_measure: None,
            quantity,
            unit_price,
            discount: 0.0,
            total_without_taxes: quantity * unit_price,
            additional_details: Vec::new(),
            taxes: Vec::new(),
        }
    }

    pub fn with_tax(mut self, tax: LineTax) -> Self {
        self.taxes.push(tax);
        self
    }
}

/// Named free-form detail on a line (`detAdicional`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDetail {
    pub name: String,
    pub value: String,
}

/// Tax applied to a line (`impuesto`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTax {
    pub code: String,
    pub percentage_code: String,
    pub rate: f64,
    pub tax_base: f64,
    pub value: f64,
}

/// Withholding applied inside the invoice (`retencion`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withholding {
    pub code: String,
    pub percentage_code: String,
    pub rate: f64,
    pub value: f64,
}

/// Reimbursed expense voucher (`reembolsoDetalle`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reimbursement {
    pub provider_id_type: String,
    pub provider_id: String,
    pub provider_country_code: String,
    pub provider_type: String,
    pub document_type: String,
    pub establishment: String,
    pub emission_point: String,
    pub sequential: String,
    /// `dd/mm/yyyy`
    pub emission_date: String,
    pub authorization_number: String,
    #[serde(default)]
    pub taxes: Vec<ReimbursementTax>,
}

/// Tax line of a reimbursed voucher (`detalleImpuesto`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReimbursementTax {
    pub code: String,
    pub percentage_code: String,
    pub rate: f64,
    pub tax_base: f64,
    pub value: f64,
}

/// Remission guide data carried by the invoice (`infoSustitutivaGuiaRemision`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstituteRemissionGuide {
    pub origin_address: String,
    pub destination_address: String,
    /// `dd/mm/yyyy`
    pub transport_start: String,
    /// `dd/mm/yyyy`
    pub transport_end: String,
    pub carrier_name: String,
    pub carrier_id_type: String,
    pub carrier_id: String,
    pub plate: String,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

/// Destination of a transported shipment (`destino`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub reason: String,
    #[serde(default)]
    pub customs_document: Option<String>,
    #[serde(default)]
    pub establishment_code: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
}

/// Amount collected on behalf of a third party (`rubro`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThirdPartyValue {
    pub concept: String,
    pub total: f64,
}

/// Free-form name/value pair printed on the invoice (`campoAdicional`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalField {
    pub name: String,
    pub value: String,
}

/// A complete invoice ready to be validated and built.
///
/// Optional blocks are absent when their list is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub version: SchemaVersion,
    pub tax_header: TaxHeader,
    pub invoice_header: InvoiceHeader,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub withholdings: Vec<Withholding>,
    #[serde(default)]
    pub reimbursements: Vec<Reimbursement>,
    #[serde(default)]
    pub substitute_remission_guide: Option<SubstituteRemissionGuide>,
    #[serde(default)]
    pub third_party_values: Vec<ThirdPartyValue>,
    #[serde(default)]
    pub additional_info: Vec<AdditionalField>,
}

impl InvoiceDocument {
    /// Starts a builder; see [`InvoiceBuilder`].
    pub fn builder(
        version: SchemaVersion,
        tax_header: TaxHeader,
        invoice_header: InvoiceHeader,
    ) -> InvoiceBuilder {
        InvoiceBuilder::new(version, tax_header, invoice_header)
    }

    /// Validates the invoice and serializes it with a freshly computed access key.
    ///
    /// # Errors
    /// See [`build_document`].
    pub fn finalize(&self, numeric_code: &str) -> Result<UnsignedInvoice, InvoiceError> {
        build_document(self, numeric_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_round_trips_and_orders() {
        for version in [
            SchemaVersion::V1_0_0,
            SchemaVersion::V1_1_0,
            SchemaVersion::V2_0_0,
            SchemaVersion::V2_1_0,
        ] {
            assert_eq!(version.as_str().parse::<SchemaVersion>(), Ok(version));
        }
        assert!(SchemaVersion::V1_0_0 < SchemaVersion::V1_1_0);
        assert!(SchemaVersion::V2_0_0 < SchemaVersion::V2_1_0);
        assert!("2.2.0".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn precision_and_block_rules_by_version() {
        assert_eq!(SchemaVersion::V1_0_0.quantity_precision(), 2);
        assert_eq!(SchemaVersion::V1_1_0.quantity_precision(), 6);
        assert_eq!(SchemaVersion::V2_0_0.quantity_precision(), 2);
        assert_eq!(SchemaVersion::V2_1_0.quantity_precision(), 6);
        assert!(!SchemaVersion::V1_0_0.allows_third_party_blocks());
        assert!(!SchemaVersion::V1_1_0.allows_third_party_blocks());
        assert!(SchemaVersion::V2_0_0.allows_third_party_blocks());
        assert!(SchemaVersion::V2_1_0.allows_third_party_blocks());
    }

    #[test]
    fn schema_version_serializes_as_dotted_string() {
        let json = serde_json::to_string(&SchemaVersion::V2_1_0).expect("json");
        assert_eq!(json, "\"2.1.0\"");
        let parsed: SchemaVersion = serde_json::from_str("\"1.1.0\"").expect("parse");
        assert_eq!(parsed, SchemaVersion::V1_1_0);
    }

    #[test]
    fn series_pads_establishment_and_point() {
        let header = TaxHeader {
            environment: Environment::Test,
            emission_type: EmissionType::Normal,
            legal_name: "X".into(),
            commercial_name: None,
            tax_id: "1790012345001".into(),
            document_type: INVOICE_DOCUMENT_TYPE.into(),
            establishment: "1".into(),
            emission_point: "01".into(),
            sequential: "1".into(),
            head_office_address: "Quito".into(),
            withholding_agent: None,
            rimpe_taxpayer: None,
        };
        assert_eq!(header.series(), "001001");
    }

    #[test]
    fn line_item_new_computes_net_total() {
        let line = LineItem::new("A1", "Widget", 2.0, 12.5);
        assert_eq!(line.total_without_taxes, 25.0);
        assert!(line.taxes.is_empty());
    }
}
