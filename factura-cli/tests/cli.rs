use std::path::PathBuf;
use std::process::Command;

fn cli_exe() -> &'static str {
    env!("CARGO_BIN_EXE_factura")
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("factura-core")
        .join("tests")
        .join("fixtures")
}

fn invoice_fixture() -> PathBuf {
    fixtures_dir().join("invoices").join("factura-2.1.0.json")
}

fn p12_fixture() -> PathBuf {
    fixtures_dir().join("certs").join("signer.p12")
}

fn unique_temp_path(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    path.push(format!("{prefix}-{nonce}"));
    path
}

#[test]
fn access_key_command_prints_key() {
    let output = Command::new(cli_exe())
        .args([
            "access-key",
            "--date",
            "15/06/2024",
            "--tax-id",
            "1790012345001",
            "--environment",
            "test",
            "--series",
            "001001",
            "--sequential",
            "000000001",
            "--numeric-code",
            "12345678",
        ])
        .output()
        .expect("run access-key command");

    assert!(
        output.status.success(),
        "access-key command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "1506202401179001234500110010010000000011234567812");
}

#[test]
fn build_command_writes_unsigned_xml() {
    let xml_path = unique_temp_path("factura-build");
    let output = Command::new(cli_exe())
        .args(["build", "--numeric-code", "12345678", "--invoice"])
        .arg(invoice_fixture())
        .arg("--output")
        .arg(&xml_path)
        .output()
        .expect("run build command");

    assert!(
        output.status.success(),
        "build command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let xml = std::fs::read_to_string(&xml_path).expect("read built invoice");
    assert!(xml.contains("<factura id=\"comprobante\" version=\"2.1.0\">"));
    assert!(xml.contains("<claveAcceso>1506202401179001234500110010010000000011234567812</claveAcceso>"));
    assert!(!xml.contains("Signature"));

    let _ = std::fs::remove_file(xml_path);
}

#[test]
fn build_command_rejects_short_numeric_code() {
    let output = Command::new(cli_exe())
        .args(["build", "--numeric-code", "1234", "--invoice"])
        .arg(invoice_fixture())
        .output()
        .expect("run build command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("numeric code"), "unexpected stderr: {stderr}");
}

#[test]
fn sign_then_verify_round_trip() {
    let signed_path = unique_temp_path("factura-signed");
    let output = Command::new(cli_exe())
        .args(["sign", "--numeric-code", "12345678", "--invoice"])
        .arg(invoice_fixture())
        .arg("--p12")
        .arg(p12_fixture())
        .arg("--signed-invoice")
        .arg(&signed_path)
        .env("FACTURA_P12_PASSWORD", "secret123")
        .output()
        .expect("run sign command");

    assert!(
        output.status.success(),
        "sign command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let signed_xml = std::fs::read_to_string(&signed_path).expect("read signed invoice");
    assert!(signed_xml.contains("<ds:Signature"));

    let output = Command::new(cli_exe())
        .args(["verify", "--invoice"])
        .arg(&signed_path)
        .output()
        .expect("run verify command");
    assert!(
        output.status.success(),
        "verify command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("OK"));
    assert!(stdout.contains("ANDREA PAREDES"));

    let _ = std::fs::remove_file(signed_path);
}

#[test]
fn sign_command_reports_wrong_password() {
    let output = Command::new(cli_exe())
        .args(["sign", "--numeric-code", "12345678", "--invoice"])
        .arg(invoice_fixture())
        .arg("--p12")
        .arg(p12_fixture())
        .args(["--password", "not-the-password"])
        .output()
        .expect("run sign command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("incorrect password"), "unexpected stderr: {stderr}");
    assert!(!stderr.contains("not-the-password"));
}

#[test]
fn verify_command_rejects_tampered_document() {
    let signed_path = unique_temp_path("factura-tampered");
    let output = Command::new(cli_exe())
        .args(["sign", "--numeric-code", "12345678", "--invoice"])
        .arg(invoice_fixture())
        .arg("--p12")
        .arg(p12_fixture())
        .arg("--signed-invoice")
        .arg(&signed_path)
        .env("FACTURA_P12_PASSWORD", "secret123")
        .output()
        .expect("run sign command");
    assert!(output.status.success());

    let signed_xml = std::fs::read_to_string(&signed_path).expect("read signed invoice");
    let tampered = signed_xml.replace("<importeTotal>74.75</importeTotal>", "<importeTotal>7.47</importeTotal>");
    assert_ne!(signed_xml, tampered);
    std::fs::write(&signed_path, tampered).expect("write tampered invoice");

    let output = Command::new(cli_exe())
        .args(["verify", "--invoice"])
        .arg(&signed_path)
        .output()
        .expect("run verify command");
    assert!(!output.status.success());

    let _ = std::fs::remove_file(signed_path);
}
