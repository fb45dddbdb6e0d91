use super::xml::constants::COMPROBANTE_ID;
use super::xml::{Element, FixedPrecision, XmlFormat};
use super::{
    AdditionalField, InvoiceDocument, InvoiceError, InvoiceHeader, LineItem, Reimbursement,
    SchemaVersion, SubstituteRemissionGuide, TaxHeader, ThirdPartyValue, Withholding, validate,
};
use crate::access_key::{self, AccessKey, AccessKeyParts};
use crate::invoice::sign::{InvoiceSigner, SigningError};
use tracing::{debug, instrument};

const NUMERIC_CODE_LEN: usize = 8;

/// Serialized invoice that still has to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedInvoice {
    access_key: AccessKey,
    version: SchemaVersion,
    xml: String,
}

/// Invoice carrying its enveloped XAdES-BES signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInvoice {
    access_key: AccessKey,
    signed_xml: String,
}

/// Chained construction of an [`InvoiceDocument`].
///
/// # Examples
/// ```rust,ignore
/// let invoice = InvoiceDocument::builder(SchemaVersion::V2_1_0, tax_header, header)
///     .line_item(LineItem::new("A1", "Widget", 2.0, 12.5))
///     .additional_field("Email", "buyer@example.com")
///     .build()?;
/// let unsigned = invoice.finalize("12345678")?;
/// ```
#[derive(Debug, Clone)]
pub struct InvoiceBuilder {
    invoice: InvoiceDocument,
}

impl InvoiceBuilder {
    pub fn new(version: SchemaVersion, tax_header: TaxHeader, invoice_header: InvoiceHeader) -> Self {
        Self {
            invoice: InvoiceDocument {
                version,
                tax_header,
                invoice_header,
                line_items: Vec::new(),
                withholdings: Vec::new(),
                reimbursements: Vec::new(),
                substitute_remission_guide: None,
                third_party_values: Vec::new(),
                additional_info: Vec::new(),
            },
        }
    }

    pub fn line_item(mut self, item: LineItem) -> Self {
        self.invoice.line_items.push(item);
        self
    }

    pub fn line_items(mut self, items: impl IntoIterator<Item = LineItem>) -> Self {
        self.invoice.line_items.extend(items);
        self
    }

    pub fn withholding(mut self, withholding: Withholding) -> Self {
        self.invoice.withholdings.push(withholding);
        self
    }

    pub fn reimbursement(mut self, reimbursement: Reimbursement) -> Self {
        self.invoice.reimbursements.push(reimbursement);
        self
    }

    pub fn substitute_remission_guide(mut self, guide: SubstituteRemissionGuide) -> Self {
        self.invoice.substitute_remission_guide = Some(guide);
        self
    }

    pub fn third_party_value(mut self, value: ThirdPartyValue) -> Self {
        self.invoice.third_party_values.push(value);
        self
    }

    pub fn additional_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.invoice.additional_info.push(AdditionalField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Validates and returns the finished document.
    pub fn build(self) -> Result<InvoiceDocument, InvoiceError> {
        validate(&self.invoice)?;
        Ok(self.invoice)
    }
}

/// Validates `invoice`, derives its access key and serializes it.
///
/// The numeric code is checked first, then the business rules, so no key is
/// computed for an invalid document. Identical input yields identical bytes.
///
/// # Errors
/// - [`InvoiceError::InvalidNumericCode`] unless `numeric_code` is 8 ASCII digits
/// - [`InvoiceError::Validation`] for the first violated business rule
/// - [`InvoiceError::AccessKey`] when the key components do not fit
/// - [`InvoiceError::Xml`] if serialization fails
#[instrument(skip_all, fields(version = %invoice.version, sequential = %invoice.tax_header.sequential))]
pub fn build_document(
    invoice: &InvoiceDocument,
    numeric_code: &str,
) -> Result<UnsignedInvoice, InvoiceError> {
    if numeric_code.len() != NUMERIC_CODE_LEN || !numeric_code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvoiceError::InvalidNumericCode {
            code: numeric_code.to_string(),
        });
    }
    validate(invoice)?;

    let tax = &invoice.tax_header;
    let access_key = access_key::generate(&AccessKeyParts {
        emission_date: invoice.invoice_header.emission_date.clone(),
        document_type: tax.document_type.clone(),
        tax_id: tax.tax_id.clone(),
        environment: tax.environment.code().to_string(),
        series: tax.series(),
        sequential: tax.sequential.clone(),
        numeric_code: numeric_code.to_string(),
        emission_type: tax.emission_type.code().to_string(),
    })?;

    let xml = document_tree(invoice, &access_key).to_document_string(XmlFormat::Compact)?;
    debug!(access_key = %access_key, bytes = xml.len(), "invoice serialized");
    Ok(UnsignedInvoice {
        access_key,
        version: invoice.version,
        xml,
    })
}

fn document_tree(invoice: &InvoiceDocument, access_key: &AccessKey) -> Element {
    let quantity_precision = invoice.version.quantity_precision();
    Element::new("factura")
        .with_attr("id", COMPROBANTE_ID)
        .with_attr("version", invoice.version.as_str())
        .with_child(tax_header(&invoice.tax_header, access_key))
        .with_child(invoice_header(&invoice.invoice_header))
        .with_child(Element::new("detalles").with_children(
            invoice
                .line_items
                .iter()
                .map(|item| line_item(item, quantity_precision)),
        ))
        .with_optional(non_empty("retenciones", invoice.withholdings.iter().map(withholding)))
        .with_optional(non_empty("reembolsos", invoice.reimbursements.iter().map(reimbursement)))
        .with_optional(invoice.substitute_remission_guide.as_ref().map(remission_guide))
        .with_optional(non_empty(
            "otrosRubrosTerceros",
            invoice.third_party_values.iter().map(third_party_value),
        ))
        .with_optional(non_empty(
            "infoAdicional",
            invoice.additional_info.iter().map(|field| {
                Element::new("campoAdicional")
                    .with_attr("nombre", field.name.as_str())
                    .with_text(field.value.as_str())
            }),
        ))
}

fn tax_header(tax: &TaxHeader, access_key: &AccessKey) -> Element {
    Element::new("infoTributaria")
        .with_child(Element::leaf("ambiente", tax.environment.code()))
        .with_child(Element::leaf("tipoEmision", tax.emission_type.code()))
        .with_child(Element::leaf("razonSocial", tax.legal_name.as_str()))
        .with_optional(optional_leaf("nombreComercial", tax.commercial_name.as_deref()))
        .with_child(Element::leaf("ruc", tax.tax_id.as_str()))
        .with_child(Element::leaf("claveAcceso", access_key.as_str()))
        .with_child(Element::leaf("codDoc", tax.document_type.as_str()))
        .with_child(Element::leaf("estab", padded(&tax.establishment, 3)))
        .with_child(Element::leaf("ptoEmi", padded(&tax.emission_point, 3)))
        .with_child(Element::leaf("secuencial", padded(&tax.sequential, 9)))
        .with_child(Element::leaf("dirMatriz", tax.head_office_address.as_str()))
        .with_optional(optional_leaf("agenteRetencion", tax.withholding_agent.as_deref()))
        .with_optional(optional_leaf("contribuyenteRimpe", tax.rimpe_taxpayer.as_deref()))
}

fn invoice_header(header: &InvoiceHeader) -> Element {
    let keeps_accounts = header
        .keeps_accounts
        .map(|keeps| if keeps { "SI" } else { "NO" });
    Element::new("infoFactura")
        .with_child(Element::leaf("fechaEmision", header.emission_date.as_str()))
        .with_optional(optional_leaf("dirEstablecimiento", header.establishment_address.as_deref()))
        .with_optional(optional_leaf("contribuyenteEspecial", header.special_taxpayer.as_deref()))
        .with_optional(optional_leaf("obligadoContabilidad", keeps_accounts))
        .with_child(Element::leaf("tipoIdentificacionComprador", header.buyer_id_type.as_str()))
        .with_optional(optional_leaf("guiaRemision", header.remission_guide.as_deref()))
        .with_child(Element::leaf("razonSocialComprador", header.buyer_name.as_str()))
        .with_child(Element::leaf("identificacionComprador", header.buyer_id.as_str()))
        .with_optional(optional_leaf("direccionComprador", header.buyer_address.as_deref()))
        .with_child(money("totalSinImpuestos", header.total_without_taxes))
        .with_child(money("totalDescuento", header.total_discount))
        .with_optional(optional_leaf(
            "codDocReembolso",
            header.reimbursement_document_type.as_deref(),
        ))
        .with_optional(optional_money(
            "totalComprobantesReembolso",
            header.total_reimbursement_vouchers,
        ))
        .with_optional(optional_money(
            "totalBaseImponibleReembolso",
            header.total_reimbursement_tax_base,
        ))
        .with_optional(optional_money("totalImpuestoReembolso", header.total_reimbursement_tax))
        .with_child(Element::new("totalConImpuestos").with_children(header.taxes.iter().map(
            |tax| {
                Element::new("totalImpuesto")
                    .with_child(Element::leaf("codigo", tax.code.as_str()))
                    .with_child(Element::leaf("codigoPorcentaje", tax.percentage_code.as_str()))
                    .with_optional(optional_money("descuentoAdicional", tax.additional_discount))
                    .with_child(money("baseImponible", tax.tax_base))
                    .with_optional(optional_money("tarifa", tax.rate))
                    .with_child(money("valor", tax.value))
            },
        )))
        .with_child(money("propina", header.tip))
        .with_child(money("importeTotal", header.grand_total))
        .with_optional(optional_leaf("moneda", header.currency.as_deref()))
        .with_optional(optional_leaf("placa", header.vehicle_plate.as_deref()))
        .with_optional(non_empty(
            "pagos",
            header.payments.iter().map(|payment| {
                Element::new("pago")
                    .with_child(Element::leaf("formaPago", payment.method.as_str()))
                    .with_child(money("total", payment.total))
                    .with_optional(optional_money("plazo", payment.term))
                    .with_optional(optional_leaf("unidadTiempo", payment.time_unit.as_deref()))
            }),
        ))
        .with_optional(optional_money("valorRetIva", header.withheld_vat))
        .with_optional(optional_money("valorRetRenta", header.withheld_income_tax))
}

fn line_item(item: &LineItem, quantity_precision: usize) -> Element {
    Element::new("detalle")
        .with_child(Element::leaf("codigoPrincipal", item.main_code.as_str()))
        .with_optional(optional_leaf("codigoAuxiliar", item.auxiliary_code.as_deref()))
        .with_child(Element::leaf("descripcion", item.description.as_str()))
        .with_optional(optional_leaf("unidadMedida", item.unit_of_measure.as_deref()))
        .with_child(Element::leaf(
            "cantidad",
            FixedPrecision::new(item.quantity, quantity_precision).to_string(),
        ))
        .with_child(Element::leaf(
            "precioUnitario",
            FixedPrecision::new(item.unit_price, quantity_precision).to_string(),
        ))
        .with_child(money("descuento", item.discount))
        .with_child(money("precioTotalSinImpuesto", item.total_without_taxes))
        .with_optional(non_empty(
            "detallesAdicionales",
            item.additional_details.iter().map(|detail| {
                Element::new("detAdicional")
                    .with_attr("nombre", detail.name.as_str())
                    .with_attr("valor", detail.value.as_str())
            }),
        ))
        .with_child(Element::new("impuestos").with_children(item.taxes.iter().map(|tax| {
            Element::new("impuesto")
                .with_child(Element::leaf("codigo", tax.code.as_str()))
                .with_child(Element::leaf("codigoPorcentaje", tax.percentage_code.as_str()))
                .with_child(money("tarifa", tax.rate))
                .with_child(money("baseImponible", tax.tax_base))
                .with_child(money("valor", tax.value))
        })))
}

fn withholding(withholding: &Withholding) -> Element {
    Element::new("retencion")
        .with_child(Element::leaf("codigo", withholding.code.as_str()))
        .with_child(Element::leaf("codigoPorcentaje", withholding.percentage_code.as_str()))
        .with_child(money("tarifa", withholding.rate))
        .with_child(money("valor", withholding.value))
}

fn reimbursement(item: &Reimbursement) -> Element {
    Element::new("reembolsoDetalle")
        .with_child(Element::leaf(
            "tipoIdentificacionProveedorReembolso",
            item.provider_id_type.as_str(),
        ))
        .with_child(Element::leaf("identificacionProveedorReembolso", item.provider_id.as_str()))
        .with_child(Element::leaf(
            "codPaisPagoProveedorReembolso",
            item.provider_country_code.as_str(),
        ))
        .with_child(Element::leaf("tipoProveedorReembolso", item.provider_type.as_str()))
        .with_child(Element::leaf("codDocReembolso", item.document_type.as_str()))
        .with_child(Element::leaf("estabDocReembolso", padded(&item.establishment, 3)))
        .with_child(Element::leaf("ptoEmiDocReembolso", padded(&item.emission_point, 3)))
        .with_child(Element::leaf("secuencialDocReembolso", padded(&item.sequential, 9)))
        .with_child(Element::leaf("fechaEmisionDocReembolso", item.emission_date.as_str()))
        .with_child(Element::leaf(
            "numeroautorizacionDocReemb",
            item.authorization_number.as_str(),
        ))
        .with_child(Element::new("detalleImpuestos").with_children(item.taxes.iter().map(
            |tax| {
                Element::new("detalleImpuesto")
                    .with_child(Element::leaf("codigo", tax.code.as_str()))
                    .with_child(Element::leaf("codigoPorcentaje", tax.percentage_code.as_str()))
                    .with_child(money("tarifa", tax.rate))
                    .with_child(money("baseImponibleReembolso", tax.tax_base))
                    .with_child(money("impuestoReembolso", tax.value))
            },
        )))
}

fn remission_guide(guide: &SubstituteRemissionGuide) -> Element {
    Element::new("infoSustitutivaGuiaRemision")
        .with_child(Element::leaf("dirPartida", guide.origin_address.as_str()))
        .with_child(Element::leaf("dirDestinatario", guide.destination_address.as_str()))
        .with_child(Element::leaf("fechaIniTransporte", guide.transport_start.as_str()))
        .with_child(Element::leaf("fechaFinTransporte", guide.transport_end.as_str()))
        .with_child(Element::leaf("razonSocialTransportista", guide.carrier_name.as_str()))
        .with_child(Element::leaf(
            "tipoIdentificacionTransportista",
            guide.carrier_id_type.as_str(),
        ))
        .with_child(Element::leaf("rucTransportista", guide.carrier_id.as_str()))
        .with_child(Element::leaf("placa", guide.plate.as_str()))
        .with_child(Element::new("destinos").with_children(guide.destinations.iter().map(
            |destination| {
                Element::new("destino")
                    .with_child(Element::leaf("motivoTraslado", destination.reason.as_str()))
                    .with_optional(optional_leaf(
                        "docAduaneroUnico",
                        destination.customs_document.as_deref(),
                    ))
                    .with_optional(optional_leaf(
                        "codEstabDestino",
                        destination.establishment_code.as_deref(),
                    ))
                    .with_optional(optional_leaf("ruta", destination.route.as_deref()))
            },
        )))
}

fn third_party_value(value: &ThirdPartyValue) -> Element {
    Element::new("rubro")
        .with_child(Element::leaf("concepto", value.concept.as_str()))
        .with_child(money("total", value.total))
}

fn money(name: &str, value: f64) -> Element {
    Element::leaf(name, FixedPrecision::money(value).to_string())
}

fn optional_money(name: &str, value: Option<f64>) -> Option<Element> {
    value.map(|value| money(name, value))
}

// blank strings count as absent so no empty placeholder nodes are written
fn optional_leaf(name: &str, value: Option<&str>) -> Option<Element> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(|value| Element::leaf(name, value))
}

fn non_empty(name: &str, children: impl Iterator<Item = Element>) -> Option<Element> {
    let wrapper = Element::new(name).with_children(children);
    let has_children = wrapper.children().next().is_some();
    has_children.then_some(wrapper)
}

fn padded(value: &str, width: usize) -> String {
    format!("{:0>width$}", value.trim())
}

impl UnsignedInvoice {
    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn into_xml(self) -> String {
        self.xml
    }

    pub fn sign(&self, signer: &InvoiceSigner) -> Result<SignedInvoice, SigningError> {
        let signed_xml = signer.sign_xml(&self.xml)?;
        Ok(SignedInvoice {
            access_key: self.access_key.clone(),
            signed_xml,
        })
    }

    /// Same as [`UnsignedInvoice::sign`], with the RSA work on the blocking pool.
    pub async fn sign_async(&self, signer: &InvoiceSigner) -> Result<SignedInvoice, SigningError> {
        let signed_xml = signer.sign_async(self.xml.clone()).await?;
        Ok(SignedInvoice {
            access_key: self.access_key.clone(),
            signed_xml,
        })
    }
}

impl SignedInvoice {
    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    pub fn xml(&self) -> &str {
        &self.signed_xml
    }

    pub fn into_xml(self) -> String {
        self.signed_xml
    }

    pub fn to_xml_base64(&self) -> String {
        use base64ct::{Base64, Encoding};
        Base64::encode_string(self.signed_xml.as_bytes())
    }
}
