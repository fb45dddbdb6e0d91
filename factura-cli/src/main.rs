use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use factura_core::{
    access_key::{self, AccessKey, AccessKeyParts},
    api::{AuthorizationResponse, SriClient},
    config::{Config, Environment},
    invoice::{InvoiceDocument, build_document, sign::InvoiceSigner, sign::verify_signed_xml},
};
use secrecy::SecretString;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "factura")]
#[command(about = "SRI Ecuador electronic invoice CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the access key for the given parts.
    AccessKey {
        /// dd/mm/yyyy
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "01")]
        document_type: String,
        #[arg(long)]
        tax_id: String,
        #[arg(long, default_value = "test")]
        environment: Environment,
        #[arg(long)]
        series: String,
        #[arg(long)]
        sequential: String,
        #[arg(long)]
        numeric_code: String,
        #[arg(long, default_value = "1")]
        emission_type: String,
    },
    /// Build the unsigned XML of a JSON invoice.
    Build {
        #[arg(long)]
        invoice: PathBuf,
        #[arg(long)]
        numeric_code: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build and sign a JSON invoice with a PKCS#12 container.
    Sign {
        #[arg(long)]
        invoice: PathBuf,
        #[arg(long)]
        numeric_code: String,
        #[arg(long)]
        p12: PathBuf,
        #[arg(long, env = "FACTURA_P12_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        signed_invoice: Option<PathBuf>,
    },
    /// Check the signature of a signed XML document.
    Verify {
        #[arg(long)]
        invoice: PathBuf,
    },
    /// Submit a signed XML document to the reception service.
    Send {
        #[arg(long)]
        invoice: PathBuf,
        #[arg(long, default_value = "test")]
        environment: Environment,
    },
    /// Query the authorization service for an access key.
    Authorize {
        #[arg(long)]
        access_key: AccessKey,
        #[arg(long, default_value = "test")]
        environment: Environment,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::AccessKey {
            date,
            document_type,
            tax_id,
            environment,
            series,
            sequential,
            numeric_code,
            emission_type,
        } => {
            let key = access_key::generate(&AccessKeyParts {
                emission_date: date,
                document_type,
                tax_id,
                environment: environment.code().to_string(),
                series,
                sequential,
                numeric_code,
                emission_type,
            })?;
            println!("{key}");
        }
        Commands::Build {
            invoice,
            numeric_code,
            output,
        } => {
            let document = read_invoice(&invoice)?;
            let unsigned = build_document(&document, &numeric_code)?;
            info!(access_key = %unsigned.access_key(), "invoice built");
            write_output(output.as_deref(), unsigned.xml())?;
        }
        Commands::Sign {
            invoice,
            numeric_code,
            p12,
            password,
            signed_invoice,
        } => {
            let document = read_invoice(&invoice)?;
            let config = Config::new(document.tax_header.environment)
                .with_key_store(&p12, SecretString::from(password));
            let unsigned = build_document(&document, &numeric_code)?;
            let material = match config.key_store() {
                Some(key_store) => key_store
                    .load()
                    .await
                    .with_context(|| format!("loading {}", p12.display()))?,
                None => bail!("no key store configured"),
            };
            let signer = InvoiceSigner::from_material(&material)?;
            let signed = unsigned.sign_async(&signer).await?;
            info!(access_key = %signed.access_key(), "invoice signed");
            write_output(signed_invoice.as_deref(), signed.xml())?;
        }
        Commands::Verify { invoice } => {
            let xml = read_text(&invoice)?;
            let certificate = verify_signed_xml(&xml)?;
            println!("OK {}", certificate.tbs_certificate.subject);
        }
        Commands::Send {
            invoice,
            environment,
        } => {
            let xml = read_text(&invoice)?;
            let client = SriClient::new(Config::new(environment))?;
            let response = client.send_receipt_xml(&xml).await?;
            println!("{:?}", response.status());
            for message in response.messages() {
                println!("{}: {}", message.identifier(), message.message());
            }
            if !response.is_received() {
                bail!("document returned by SRI");
            }
        }
        Commands::Authorize {
            access_key,
            environment,
        } => {
            let client = SriClient::new(Config::new(environment))?;
            match client.authorize(&access_key).await? {
                AuthorizationResponse::Pending => println!("PENDING"),
                AuthorizationResponse::Authorized(authorization) => {
                    println!("AUTORIZADO {} {}", authorization.number(), authorization.authorized_at());
                }
                AuthorizationResponse::NotAuthorized { messages } => {
                    for message in &messages {
                        eprintln!("{}: {}", message.identifier(), message.message());
                    }
                    bail!("document not authorized");
                }
            }
        }
    }

    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn read_invoice(path: &Path) -> Result<InvoiceDocument> {
    let json = read_text(path)?;
    serde_json::from_str(&json).with_context(|| format!("parsing invoice {}", path.display()))
}

fn write_output(path: Option<&Path>, xml: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, xml).with_context(|| format!("writing {}", path.display()))
        }
        None => {
            println!("{xml}");
            Ok(())
        }
    }
}
