mod common;

use factura_core::invoice::{
    Destination, InvoiceError, Reimbursement, SchemaVersion, SubstituteRemissionGuide,
    ThirdPartyValue, ValidationRule, validate,
};

use common::{NUMERIC_CODE, sample_invoice};

fn reimbursement() -> Reimbursement {
    Reimbursement {
        provider_id_type: "04".into(),
        provider_id: "0990011223001".into(),
        provider_country_code: "593".into(),
        provider_type: "02".into(),
        document_type: "01".into(),
        establishment: "002".into(),
        emission_point: "001".into(),
        sequential: "000000123".into(),
        emission_date: "10/06/2024".into(),
        authorization_number: "1006202401099001122300120020010000001231234567811".into(),
        taxes: Vec::new(),
    }
}

fn remission_guide() -> SubstituteRemissionGuide {
    SubstituteRemissionGuide {
        origin_address: "Quito".into(),
        destination_address: "Cuenca".into(),
        transport_start: "15/06/2024".into(),
        transport_end: "16/06/2024".into(),
        carrier_name: "Transportes del Sur".into(),
        carrier_id_type: "04".into(),
        carrier_id: "0190012345001".into(),
        plate: "PBA-1234".into(),
        destinations: vec![Destination {
            reason: "Venta".into(),
            customs_document: None,
            establishment_code: Some("001".into()),
            route: Some("Panamericana Sur".into()),
        }],
    }
}

fn rule_of(result: Result<(), factura_core::invoice::ValidationError>) -> ValidationRule {
    result.expect_err("validation should fail").rule
}

#[test]
fn sample_invoice_is_valid() {
    validate(&sample_invoice()).expect("valid");
}

#[test]
fn missing_line_items_fail_required_blocks() {
    let mut invoice = sample_invoice();
    invoice.line_items.clear();
    assert_eq!(rule_of(validate(&invoice)), ValidationRule::RequiredBlocks);

    let mut invoice = sample_invoice();
    invoice.tax_header.tax_id = "  ".into();
    let err = validate(&invoice).expect_err("blank ruc");
    assert_eq!(err.rule, ValidationRule::RequiredBlocks);
    assert!(err.message.contains("infoTributaria.ruc"));
}

#[test]
fn payments_tolerate_one_cent() {
    let mut invoice = sample_invoice();
    invoice.invoice_header.grand_total = 100.0;
    invoice.invoice_header.payments[0].total = 100.02;
    assert_eq!(
        rule_of(validate(&invoice)),
        ValidationRule::PaymentsMatchGrandTotal
    );

    invoice.invoice_header.payments[0].total = 100.01;
    validate(&invoice).expect("one cent is within tolerance");
}

#[test]
fn line_totals_must_match_total_without_taxes() {
    let mut invoice = sample_invoice();
    invoice.invoice_header.total_without_taxes = 70.0;
    assert_eq!(
        rule_of(validate(&invoice)),
        ValidationRule::LinesMatchTotalWithoutTaxes
    );
}

#[test]
fn plate_requires_fuel_sale_document_type() {
    let mut invoice = sample_invoice();
    invoice.invoice_header.vehicle_plate = Some("PBA-1234".into());
    validate(&invoice).expect("plate allowed on document type 01");

    invoice.tax_header.document_type = "04".into();
    assert_eq!(
        rule_of(validate(&invoice)),
        ValidationRule::VehiclePlateOnlyForFuelSales
    );

    invoice.invoice_header.vehicle_plate = Some(String::new());
    validate(&invoice).expect("blank plate counts as absent");
}

#[test]
fn reimbursements_require_document_code() {
    let mut invoice = sample_invoice();
    invoice.reimbursements.push(reimbursement());
    assert_eq!(
        rule_of(validate(&invoice)),
        ValidationRule::ReimbursementsNeedDocumentType
    );

    invoice.invoice_header.reimbursement_document_type = Some("41".into());
    validate(&invoice).expect("code present");
}

#[test]
fn version_2_blocks_are_rejected_on_version_1() {
    let mut invoice = sample_invoice();
    invoice.version = SchemaVersion::V1_1_0;
    invoice.substitute_remission_guide = Some(remission_guide());
    assert_eq!(
        rule_of(validate(&invoice)),
        ValidationRule::RemissionGuideNeedsVersion2
    );

    let mut invoice = sample_invoice();
    invoice.version = SchemaVersion::V1_0_0;
    invoice.third_party_values.push(ThirdPartyValue {
        concept: "Flete".into(),
        total: 5.0,
    });
    assert_eq!(
        rule_of(validate(&invoice)),
        ValidationRule::ThirdPartyValuesNeedVersion2
    );

    invoice.version = SchemaVersion::V2_0_0;
    invoice.substitute_remission_guide = Some(remission_guide());
    validate(&invoice).expect("version 2.0.0 accepts both blocks");
}

#[test]
fn first_failing_rule_wins() {
    let mut invoice = sample_invoice();
    invoice.invoice_header.payments[0].total = 1.0;
    invoice.invoice_header.total_without_taxes = 1.0;
    invoice.version = SchemaVersion::V1_0_0;
    invoice.third_party_values.push(ThirdPartyValue {
        concept: "Flete".into(),
        total: 5.0,
    });
    assert_eq!(
        rule_of(validate(&invoice)),
        ValidationRule::PaymentsMatchGrandTotal
    );

    invoice.line_items.clear();
    assert_eq!(rule_of(validate(&invoice)), ValidationRule::RequiredBlocks);
}

#[test]
fn non_finite_amounts_are_rejected() {
    let mut invoice = sample_invoice();
    invoice.line_items[0].quantity = f64::NAN;
    let err = validate(&invoice).expect_err("NaN quantity");
    assert_eq!(err.rule, ValidationRule::FiniteAmounts);
    assert!(err.message.contains("detalle 1 cantidad"));

    let mut invoice = sample_invoice();
    invoice.line_items[0].unit_price = f64::INFINITY;
    assert_eq!(rule_of(validate(&invoice)), ValidationRule::FiniteAmounts);

    let mut invoice = sample_invoice();
    invoice.line_items[0].unit_price = f64::NEG_INFINITY;
    let err = invoice.finalize(NUMERIC_CODE).expect_err("infinite price");
    assert!(matches!(
        err,
        InvoiceError::Validation(ref validation) if validation.rule == ValidationRule::FiniteAmounts
    ));
}

#[test]
fn invalid_invoice_never_reaches_serialization() {
    let mut invoice = sample_invoice();
    invoice.invoice_header.payments[0].total = 0.0;
    let err = invoice.finalize(NUMERIC_CODE).expect_err("invalid invoice");
    assert!(matches!(
        err,
        InvoiceError::Validation(ref validation)
            if validation.rule == ValidationRule::PaymentsMatchGrandTotal
    ));
}
