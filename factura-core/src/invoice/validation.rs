//! Business rules checked before an invoice is serialized.
//!
//! Rules run in a fixed order and the first failure is reported.
use super::{FUEL_SALE_DOCUMENT_TYPE, InvoiceDocument};
use thiserror::Error;
use tracing::debug;

/// Allowed difference between declared and computed totals.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

// absorbs binary rounding so that a difference of exactly one cent passes
const EPSILON: f64 = 1e-9;

/// Business rule violated by an invoice, in evaluation order.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    RequiredBlocks,
    PaymentsMatchGrandTotal,
    LinesMatchTotalWithoutTaxes,
    VehiclePlateOnlyForFuelSales,
    ReimbursementsNeedDocumentType,
    RemissionGuideNeedsVersion2,
    ThirdPartyValuesNeedVersion2,
    FiniteAmounts,
}

/// First rule an invoice fails, with a description of what is wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invoice validation failed ({rule:?}): {message}")]
pub struct ValidationError {
    pub rule: ValidationRule,
    pub message: String,
}

impl ValidationError {
    pub fn new(rule: ValidationRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

/// Checks the invoice against every rule in order.
///
/// # Errors
/// Returns the first [`ValidationError`] encountered.
pub fn validate(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    required_blocks(invoice)?;
    payments_match_grand_total(invoice)?;
    lines_match_total_without_taxes(invoice)?;
    vehicle_plate_only_for_fuel_sales(invoice)?;
    reimbursements_need_document_type(invoice)?;
    remission_guide_needs_version_2(invoice)?;
    third_party_values_need_version_2(invoice)?;
    finite_amounts(invoice)?;
    debug!(
        lines = invoice.line_items.len(),
        version = %invoice.version,
        "invoice passed validation"
    );
    Ok(())
}

pub(crate) fn within_tolerance(a: f64, b: f64) -> bool {
    (a - b).abs() <= AMOUNT_TOLERANCE + EPSILON
}

fn required_blocks(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    let tax = &invoice.tax_header;
    let header = &invoice.invoice_header;
    let required = [
        ("infoTributaria.razonSocial", tax.legal_name.as_str()),
        ("infoTributaria.ruc", tax.tax_id.as_str()),
        ("infoTributaria.codDoc", tax.document_type.as_str()),
        ("infoTributaria.estab", tax.establishment.as_str()),
        ("infoTributaria.ptoEmi", tax.emission_point.as_str()),
        ("infoTributaria.secuencial", tax.sequential.as_str()),
        ("infoTributaria.dirMatriz", tax.head_office_address.as_str()),
        ("infoFactura.fechaEmision", header.emission_date.as_str()),
        (
            "infoFactura.tipoIdentificacionComprador",
            header.buyer_id_type.as_str(),
        ),
        ("infoFactura.razonSocialComprador", header.buyer_name.as_str()),
        ("infoFactura.identificacionComprador", header.buyer_id.as_str()),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ValidationError::new(
            ValidationRule::RequiredBlocks,
            format!("{field} is required"),
        ));
    }
    if invoice.line_items.is_empty() {
        return Err(ValidationError::new(
            ValidationRule::RequiredBlocks,
            "detalles must contain at least one line item",
        ));
    }
    Ok(())
}

fn payments_match_grand_total(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    let header = &invoice.invoice_header;
    let paid: f64 = header.payments.iter().map(|p| p.total).sum();
    if !within_tolerance(paid, header.grand_total) {
        return Err(ValidationError::new(
            ValidationRule::PaymentsMatchGrandTotal,
            format!(
                "payments add up to {paid:.2} but importeTotal is {:.2}",
                header.grand_total
            ),
        ));
    }
    Ok(())
}

fn lines_match_total_without_taxes(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    let declared = invoice.invoice_header.total_without_taxes;
    let lines: f64 = invoice
        .line_items
        .iter()
        .map(|line| line.total_without_taxes)
        .sum();
    if !within_tolerance(lines, declared) {
        return Err(ValidationError::new(
            ValidationRule::LinesMatchTotalWithoutTaxes,
            format!("line items add up to {lines:.2} but totalSinImpuestos is {declared:.2}"),
        ));
    }
    Ok(())
}

fn vehicle_plate_only_for_fuel_sales(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    let has_plate = invoice
        .invoice_header
        .vehicle_plate
        .as_deref()
        .is_some_and(|plate| !plate.trim().is_empty());
    if has_plate && invoice.tax_header.document_type.trim() != FUEL_SALE_DOCUMENT_TYPE {
        return Err(ValidationError::new(
            ValidationRule::VehiclePlateOnlyForFuelSales,
            format!(
                "placa is only allowed for document type {FUEL_SALE_DOCUMENT_TYPE}, got {}",
                invoice.tax_header.document_type
            ),
        ));
    }
    Ok(())
}

fn reimbursements_need_document_type(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    let has_code = invoice
        .invoice_header
        .reimbursement_document_type
        .as_deref()
        .is_some_and(|code| !code.trim().is_empty());
    if !invoice.reimbursements.is_empty() && !has_code {
        return Err(ValidationError::new(
            ValidationRule::ReimbursementsNeedDocumentType,
            "reembolsos require codDocReembolso in infoFactura",
        ));
    }
    Ok(())
}

fn remission_guide_needs_version_2(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    if invoice.substitute_remission_guide.is_some() && !invoice.version.allows_third_party_blocks() {
        return Err(ValidationError::new(
            ValidationRule::RemissionGuideNeedsVersion2,
            format!(
                "infoSustitutivaGuiaRemision requires version 2.0.0 or 2.1.0, got {}",
                invoice.version
            ),
        ));
    }
    Ok(())
}

fn third_party_values_need_version_2(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    if !invoice.third_party_values.is_empty() && !invoice.version.allows_third_party_blocks() {
        return Err(ValidationError::new(
            ValidationRule::ThirdPartyValuesNeedVersion2,
            format!(
                "otrosRubrosTerceros requires version 2.0.0 or 2.1.0, got {}",
                invoice.version
            ),
        ));
    }
    Ok(())
}

/// NaN and infinities from JSON input would be written as `NaN`/`inf`.
fn finite_amounts(invoice: &InvoiceDocument) -> Result<(), ValidationError> {
    let header = &invoice.invoice_header;
    let mut amounts: Vec<(String, f64)> = vec![
        ("infoFactura.totalSinImpuestos".into(), header.total_without_taxes),
        ("infoFactura.totalDescuento".into(), header.total_discount),
        ("infoFactura.propina".into(), header.tip),
        ("infoFactura.importeTotal".into(), header.grand_total),
    ];
    let optional = [
        ("infoFactura.totalComprobantesReembolso", header.total_reimbursement_vouchers),
        ("infoFactura.totalBaseImponibleReembolso", header.total_reimbursement_tax_base),
        ("infoFactura.totalImpuestoReembolso", header.total_reimbursement_tax),
        ("infoFactura.valorRetIva", header.withheld_vat),
        ("infoFactura.valorRetRenta", header.withheld_income_tax),
    ];
    amounts.extend(
        optional
            .into_iter()
            .filter_map(|(field, value)| value.map(|v| (field.to_string(), v))),
    );
    for tax in &header.taxes {
        amounts.push(("totalImpuesto.baseImponible".into(), tax.tax_base));
        amounts.push(("totalImpuesto.valor".into(), tax.value));
        amounts.extend(tax.rate.map(|v| ("totalImpuesto.tarifa".to_string(), v)));
        amounts.extend(
            tax.additional_discount
                .map(|v| ("totalImpuesto.descuentoAdicional".to_string(), v)),
        );
    }
    for payment in &header.payments {
        amounts.push(("pago.total".into(), payment.total));
        amounts.extend(payment.term.map(|v| ("pago.plazo".to_string(), v)));
    }
    for (index, line) in invoice.line_items.iter().enumerate() {
        let line_no = index + 1;
        amounts.push((format!("detalle {line_no} cantidad"), line.quantity));
        amounts.push((format!("detalle {line_no} precioUnitario"), line.unit_price));
        amounts.push((format!("detalle {line_no} descuento"), line.discount));
        amounts.push((format!("detalle {line_no} precioTotalSinImpuesto"), line.total_without_taxes));
        for tax in &line.taxes {
            amounts.push((format!("detalle {line_no} impuesto.tarifa"), tax.rate));
            amounts.push((format!("detalle {line_no} impuesto.baseImponible"), tax.tax_base));
            amounts.push((format!("detalle {line_no} impuesto.valor"), tax.value));
        }
    }
    for withholding in &invoice.withholdings {
        amounts.push(("retencion.tarifa".into(), withholding.rate));
        amounts.push(("retencion.valor".into(), withholding.value));
    }
    for tax in invoice.reimbursements.iter().flat_map(|r| &r.taxes) {
        amounts.push(("detalleImpuesto.tarifa".into(), tax.rate));
        amounts.push(("detalleImpuesto.baseImponibleReembolso".into(), tax.tax_base));
        amounts.push(("detalleImpuesto.impuestoReembolso".into(), tax.value));
    }
    for value in &invoice.third_party_values {
        amounts.push(("rubro.total".into(), value.total));
    }

    match amounts.into_iter().find(|(_, value)| !value.is_finite()) {
        Some((field, value)) => Err(ValidationError::new(
            ValidationRule::FiniteAmounts,
            format!("{field} must be a finite number, got {value}"),
        )),
        None => Ok(()),
    }
}
