use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use url::Url;

use super::common::*;
use crate::marketplace::{
    ContractId, ContractStatus, Denied, EntityKind, MarketplaceError, RentalStatus,
    ValidationError,
};
use crate::storage::{InMemoryObjectStore, ObjectStore, Permission};

#[test]
fn contracts_are_only_drafted_from_accepted_rentals() {
    let fx = fixture();
    let rental = fx
        .marketplace
        .rentals()
        .create_rental(fx.property.id, fx.tenant.id)
        .expect("request");

    let result = fx.marketplace.contracts().create_from_rental(rental.id);
    assert!(matches!(
        result,
        Err(MarketplaceError::Validation(ValidationError::RentalNotAccepted(
            RentalStatus::Pending
        )))
    ));
}

#[test]
fn drafting_is_idempotent_and_fills_placeholder_terms() {
    let fx = fixture();
    let rental = fx.accepted_rental();

    let first = fx
        .marketplace
        .contracts()
        .create_from_rental(rental.id)
        .expect("drafted");
    let second = fx
        .marketplace
        .contracts()
        .create_from_rental(rental.id)
        .expect("returned again");

    assert_eq!(first, second);
    assert_eq!(first.status, ContractStatus::Draft);
    assert_eq!(first.tenant_id, fx.tenant.id);
    assert_eq!(first.landlord_id, fx.landlord.id);
    assert_eq!(first.monthly_rent, fx.property.price);
    assert_eq!(first.start_date, NaiveDate::from_ymd_opt(2025, 3, 1).expect("date"));
    assert_eq!(first.end_date, NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"));
    assert!(first.terms.contains(&fx.property.address));
    assert!(first.pdf_url.is_none());
}

#[test]
fn only_parties_can_read_a_contract() {
    let fx = fixture();
    let contract = fx.drafted_contract();

    let details = fx
        .marketplace
        .contracts()
        .get_by_id(contract.id, fx.tenant.id)
        .expect("tenant reads");
    assert_eq!(details.landlord.id, fx.landlord.id);
    assert_eq!(details.property.id, fx.property.id);

    let by_rental = fx
        .marketplace
        .contracts()
        .get_by_rental_id(contract.rental_id, fx.landlord.id)
        .expect("landlord reads by rental");
    assert_eq!(by_rental.contract.id, contract.id);

    assert!(matches!(
        fx.marketplace.contracts().get_by_id(contract.id, fx.stranger.id),
        Err(MarketplaceError::Forbidden(Denied::NotContractParty))
    ));
    assert!(matches!(
        fx.marketplace.contracts().get_by_id(ContractId(404), fx.tenant.id),
        Err(MarketplaceError::NotFound {
            entity: EntityKind::Contract,
            ..
        })
    ));
}

#[test]
fn strangers_cannot_materialize_someone_elses_contract() {
    let fx = fixture();
    let rental = fx.accepted_rental();

    assert!(matches!(
        fx.marketplace
            .contracts()
            .create_for_party(rental.id, fx.stranger.id),
        Err(MarketplaceError::Forbidden(Denied::NotRentalParty))
    ));
    let contract = fx
        .marketplace
        .contracts()
        .create_for_party(rental.id, fx.landlord.id)
        .expect("owner materializes");
    assert_eq!(contract.rental_id, rental.id);
}

#[test]
fn download_before_generation_is_not_found() {
    let fx = fixture();
    let contract = fx.drafted_contract();

    let result = fx
        .marketplace
        .contracts()
        .pdf_download_url(contract.id, fx.tenant.id);
    assert!(matches!(
        result,
        Err(MarketplaceError::NotFound {
            entity: EntityKind::ContractPdf,
            ..
        })
    ));
}

#[test]
fn generated_pdf_is_downloadable_under_the_stored_key() {
    let fx = fixture();
    let contract = fx.drafted_contract();

    let updated = fx
        .marketplace
        .contracts()
        .generate_and_upload_pdf(contract.id, fx.landlord.id)
        .expect("pdf generated");
    assert_eq!(updated.status, ContractStatus::PendingSignature);
    let stored = updated.pdf_url.clone().expect("pdf url recorded");
    assert!(stored.starts_with("http://127.0.0.1:3000/blob/documents/contracts/"));
    assert!(stored.ends_with(".pdf"));

    let download = fx
        .marketplace
        .contracts()
        .pdf_download_url(contract.id, fx.tenant.id)
        .expect("download url");
    let grant = fx
        .marketplace
        .storage()
        .verify(&download, Permission::Read)
        .expect("read capability verifies");
    assert_eq!(grant.key, key_of(&stored));

    let object = fx.store.get(&grant.key).expect("get").expect("object present");
    assert_eq!(object.content_type, "application/pdf");
    assert!(object.bytes.starts_with(b"%PDF-1.4"));
}

#[test]
fn regeneration_purges_the_superseded_artifact() {
    let fx = fixture();
    let contract = fx.drafted_contract();
    let contracts = fx.marketplace.contracts();

    let first = contracts
        .generate_and_upload_pdf(contract.id, fx.landlord.id)
        .expect("first render");
    let second = contracts
        .generate_and_upload_pdf(contract.id, fx.tenant.id)
        .expect("second render");

    let first_key = key_of(first.pdf_url.as_deref().expect("url"));
    let second_key = key_of(second.pdf_url.as_deref().expect("url"));
    assert_ne!(first_key, second_key);
    assert!(!fx.store.exists(&first_key).expect("exists check"));
    assert!(fx.store.exists(&second_key).expect("exists check"));
}

#[test]
fn unrecorded_upload_is_removed_when_the_contract_update_fails() {
    let fx = fixture_with(
        Arc::new(ScriptedRepository::default()),
        Arc::new(InMemoryObjectStore::default()),
    );
    let contract = fx.drafted_contract();

    fx.repository.fail_contract_update.store(true, Ordering::SeqCst);
    let result = fx
        .marketplace
        .contracts()
        .generate_and_upload_pdf(contract.id, fx.landlord.id);
    assert!(matches!(result, Err(MarketplaceError::StorageTransient(_))));
    assert!(fx.store.is_empty());
}

#[test]
fn signing_requires_a_generated_pdf() {
    let fx = fixture();
    let contract = fx.drafted_contract();

    assert!(matches!(
        fx.marketplace.contracts().sign(contract.id, fx.tenant.id),
        Err(MarketplaceError::Validation(ValidationError::ContractPdfMissing))
    ));
    assert!(matches!(
        fx.marketplace.contracts().notarize(contract.id, fx.tenant.id),
        Err(MarketplaceError::Validation(ValidationError::ContractPdfMissing))
    ));
}

#[test]
fn contract_moves_through_signature() {
    let fx = fixture();
    let contract = fx.drafted_contract();
    let contracts = fx.marketplace.contracts();
    contracts
        .generate_and_upload_pdf(contract.id, fx.landlord.id)
        .expect("pdf generated");

    let signed = contracts.sign(contract.id, fx.tenant.id).expect("signed");
    assert_eq!(signed.status, ContractStatus::Signed);
    assert!(matches!(
        contracts.generate_and_upload_pdf(contract.id, fx.landlord.id),
        Err(MarketplaceError::Validation(ValidationError::ContractTransition {
            from: ContractStatus::Signed,
            ..
        }))
    ));

    let notarized = contracts.notarize(contract.id, fx.landlord.id).expect("notarized");
    assert_eq!(notarized.status, ContractStatus::Notarized);
}

#[test]
fn notarization_does_not_require_a_signature() {
    let fx = fixture();
    let contract = fx.drafted_contract();
    let contracts = fx.marketplace.contracts();
    contracts
        .generate_and_upload_pdf(contract.id, fx.landlord.id)
        .expect("pdf generated");

    let notarized = contracts
        .notarize(contract.id, fx.landlord.id)
        .expect("notarized straight from pending signature");
    assert_eq!(notarized.status, ContractStatus::Notarized);

    assert!(matches!(
        contracts.sign(contract.id, fx.tenant.id),
        Err(MarketplaceError::Validation(ValidationError::ContractTransition {
            from: ContractStatus::Notarized,
            to: ContractStatus::Signed,
        }))
    ));
    assert!(matches!(
        contracts.generate_and_upload_pdf(contract.id, fx.tenant.id),
        Err(MarketplaceError::Validation(_))
    ));
    let again = contracts
        .notarize(contract.id, fx.tenant.id)
        .expect("notarizing again is a no-op");
    assert_eq!(again, notarized);
}

#[test]
fn parties_see_their_contracts_newest_first() {
    let fx = fixture();
    let first = fx.drafted_contract();

    fx.clock.advance(chrono::Duration::days(1));
    let second_property = fx
        .marketplace
        .properties()
        .create(draft("Casa en Usaquén", 4_000_000), fx.landlord.id)
        .expect("second listing");
    let rental = fx
        .marketplace
        .rentals()
        .create_rental(second_property.id, fx.stranger.id)
        .expect("request");
    fx.marketplace
        .rentals()
        .update_status(rental.id, RentalStatus::Accepted, fx.landlord.id)
        .expect("accepted");
    let second = fx
        .marketplace
        .contracts()
        .create_from_rental(rental.id)
        .expect("drafted");

    let landlord_view = fx
        .marketplace
        .contracts()
        .list_for_user(fx.landlord.id)
        .expect("listing");
    let ids: Vec<_> = landlord_view.iter().map(|contract| contract.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let tenant_view = fx
        .marketplace
        .contracts()
        .list_for_user(fx.tenant.id)
        .expect("listing");
    assert_eq!(tenant_view.len(), 1);
    assert_eq!(tenant_view[0].id, first.id);
}

#[test]
fn stored_pdf_url_round_trips_through_the_issuer() {
    let fx = fixture();
    let contract = fx.drafted_contract();
    let updated = fx
        .marketplace
        .contracts()
        .generate_and_upload_pdf(contract.id, fx.landlord.id)
        .expect("pdf generated");

    let stored = Url::parse(updated.pdf_url.as_deref().expect("url")).expect("parses");
    let key = fx
        .marketplace
        .storage()
        .key_from_url(&stored)
        .expect("key derivable");
    assert!(key.as_str().starts_with("contracts/"));
}
