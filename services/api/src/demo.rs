use crate::infra::{in_memory_marketplace, PlatformMarketplace};
use chrono::Utc;
use clap::Args;
use praevon::clock::SystemClock;
use praevon::config::{ConfigError, StorageConfig};
use praevon::error::AppError;
use praevon::marketplace::{
    DocumentRule, DocumentType, NewUser, PropertyDraft, RentalStatus,
    UploadRequest, UserProfile,
};
use praevon::storage::{ObjectStore, Permission, StorageError};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

const DEMO_STORAGE_URL: &str = "http://127.0.0.1:3000/blob";
const DEMO_SIGNING_KEY: &[u8] = b"praevon-demo-signing-key";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Monthly rent for the demo listing, in whole pesos.
    #[arg(long, default_value_t = 2_500_000)]
    pub(crate) rent: u64,
    /// City of the demo listing.
    #[arg(long, default_value = "Bogotá")]
    pub(crate) city: String,
    /// File uploaded as the tenant's income proof. Its MIME type is guessed from the name.
    #[arg(long)]
    pub(crate) income_proof: Option<PathBuf>,
    /// Write the generated lease PDF to this path.
    #[arg(long)]
    pub(crate) pdf_out: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        rent,
        city,
        income_proof,
        pdf_out,
    } = args;

    let storage = StorageConfig {
        base_url: Url::parse(DEMO_STORAGE_URL).map_err(|source| ConfigError::InvalidStorageUrl {
            value: DEMO_STORAGE_URL.to_string(),
            source,
        })?,
        container: "documents".to_string(),
        signing_key: DEMO_SIGNING_KEY.to_vec(),
        url_ttl_minutes: 10,
    };
    let marketplace = in_memory_marketplace(&storage, Arc::new(SystemClock))?;

    println!("Praevon lease walkthrough ({})", Utc::now().format("%Y-%m-%d"));
    let landlord = register(&marketplace, "landlord", Some("+57 300 555 0101"))?;
    let tenant = register(&marketplace, "tenant", None)?;
    println!(
        "- registered landlord #{} and tenant #{}",
        landlord.id, tenant.id
    );

    let property = marketplace.properties().create(
        PropertyDraft {
            title: "Demo apartment".to_string(),
            description: "Two bedrooms, one bath, parking".to_string(),
            address: "Avenida Siempre Viva 742".to_string(),
            city,
            price: rent,
        },
        landlord.id,
    )?;
    println!(
        "- listed property #{} in {} at {} per month",
        property.id, property.city, property.price
    );

    let rental = marketplace
        .rentals()
        .create_rental(property.id, tenant.id)?;
    println!("- tenant requested rental #{}", rental.id);

    upload_income_proof(&marketplace, &tenant, income_proof)?;

    let rental = marketplace
        .rentals()
        .update_status(rental.id, RentalStatus::Accepted, landlord.id)?;
    println!("- landlord marked rental #{} {}", rental.id, rental.status.label());

    let contract = marketplace
        .contracts()
        .create_for_party(rental.id, landlord.id)?;
    println!(
        "- drafted contract #{} running {} to {}",
        contract.id, contract.start_date, contract.end_date
    );

    let contract = marketplace
        .contracts()
        .generate_and_upload_pdf(contract.id, landlord.id)?;
    let link = marketplace
        .contracts()
        .pdf_download_url(contract.id, tenant.id)?;
    println!("- lease pdf ready ({})", contract.status.label());
    println!("  download: {link}");

    if let Some(path) = pdf_out {
        let grant = marketplace.storage().verify(&link, Permission::Read)?;
        if let Some(object) = marketplace.storage().store().get(&grant.key)? {
            std::fs::write(&path, object.bytes)?;
            println!("  written to {}", path.display());
        }
    }

    let signed = marketplace.contracts().sign(contract.id, tenant.id)?;
    println!("- contract #{} is now {}", signed.id, signed.status.label());
    Ok(())
}

pub(crate) fn print_document_rules() {
    println!("{:<22} {:>10}  accepted types", "document type", "max size");
    for kind in DocumentType::ALL {
        let rule = DocumentRule::for_type(kind);
        println!(
            "{:<22} {:>7} MB  {}",
            kind.label(),
            rule.max_bytes / (1024 * 1024),
            rule.allowed_mimes.join(", ")
        );
    }
}

fn register(
    marketplace: &PlatformMarketplace,
    username: &str,
    phone: Option<&str>,
) -> Result<UserProfile, AppError> {
    Ok(marketplace.register_user(NewUser {
        username: username.to_string(),
        email: format!("{username}@praevon.demo"),
        phone: phone.map(str::to_string),
    })?)
}

/// Plays both sides of the direct-to-storage upload: the server issues the capability,
/// the client writes the bytes with the pinned content type, the server confirms.
fn upload_income_proof(
    marketplace: &PlatformMarketplace,
    tenant: &UserProfile,
    source: Option<PathBuf>,
) -> Result<(), AppError> {
    let (name, mime_type, bytes) = match source {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            let mime_type = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "income-proof".to_string());
            (name, mime_type, bytes)
        }
        None => (
            "income-proof.pdf".to_string(),
            "application/pdf".to_string(),
            b"%PDF-1.4\n% demo income proof\n".to_vec(),
        ),
    };

    let ticket = marketplace.documents().prepare_upload(
        UploadRequest {
            kind: DocumentType::TenantIncomeProof.label().to_string(),
            original_name: name,
            mime_type: mime_type.clone(),
            size: bytes.len() as u64,
            property_id: None,
        },
        tenant.id,
    )?;

    let upload = Url::parse(&ticket.upload_url)
        .map_err(|_| StorageError::ForeignUrl(ticket.upload_url.clone()))?;
    let grant = marketplace.storage().verify(&upload, Permission::Write)?;
    marketplace
        .storage()
        .store()
        .put(&grant.key, bytes, &mime_type)?;

    let document = marketplace
        .documents()
        .confirm_upload(ticket.document_id, tenant.id)?;
    println!(
        "- tenant uploaded {} ({}) as document #{}, {}",
        document.original_name,
        document.mime_type,
        document.id,
        document.status.label()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_end_to_end_in_memory() {
        let output = std::env::temp_dir().join(format!("praevon-demo-{}.pdf", std::process::id()));
        run_demo(DemoArgs {
            rent: 1_900_000,
            city: "Cali".to_string(),
            income_proof: None,
            pdf_out: Some(output.clone()),
        })
        .expect("demo completes");

        let pdf = std::fs::read(&output).expect("pdf written");
        assert!(pdf.starts_with(b"%PDF-1.4"));
        let _ = std::fs::remove_file(output);
    }
}
