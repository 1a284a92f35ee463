use std::sync::Arc;

use chrono::{Months, NaiveDate};
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::authorization::AccessResolver;
use super::domain::{
    Contract, ContractDetails, ContractId, ContractStatus, RentalId, RentalStatus, UserId,
};
use super::error::{EntityKind, MarketplaceError, ValidationError};
use super::repository::{MarketplaceRepository, NewContract, RepositoryError};
use crate::clock::Clock;
use crate::pdf::ContractRenderer;
use crate::storage::{CapabilityIssuer, ObjectKey, ObjectStore};

const LEASE_TERM_MONTHS: u32 = 12;

fn standard_terms(address: &str) -> String {
    format!(
        "Standard terms and conditions for the property located at {address}. \
         Monthly rent is due within the first five days of each month."
    )
}

/// Lease contracts: materialization from accepted rentals, rendering and execution.
pub struct ContractService<R, S> {
    repository: Arc<R>,
    storage: Arc<CapabilityIssuer<S>>,
    renderer: Box<dyn ContractRenderer>,
    clock: Arc<dyn Clock>,
}

impl<R, S> ContractService<R, S>
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    pub fn new(
        repository: Arc<R>,
        storage: Arc<CapabilityIssuer<S>>,
        renderer: Box<dyn ContractRenderer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            storage,
            renderer,
            clock,
        }
    }

    /// Returns the rental's contract, creating a DRAFT one the first time.
    #[instrument(skip(self))]
    pub fn create_from_rental(&self, rental_id: RentalId) -> Result<Contract, MarketplaceError> {
        let rental = self
            .repository
            .fetch_rental(rental_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Rental, rental_id.0))?;
        if rental.status != RentalStatus::Accepted {
            return Err(ValidationError::RentalNotAccepted(rental.status).into());
        }

        if let Some(existing) = self.repository.fetch_contract_by_rental(rental_id)? {
            warn!(rental = %rental_id, contract = %existing.id, "contract already exists for rental");
            return Ok(existing);
        }

        let property = self
            .repository
            .fetch_property(rental.property_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Property, rental.property_id.0))?;

        let now = self.clock.now();
        let start_date = now.date_naive();
        let end_date = start_date
            .checked_add_months(Months::new(LEASE_TERM_MONTHS))
            .unwrap_or(NaiveDate::MAX);

        let inserted = self.repository.insert_contract(NewContract {
            rental_id,
            property_id: property.id,
            tenant_id: rental.renter_id,
            landlord_id: property.owner_id,
            monthly_rent: property.price,
            start_date,
            end_date,
            terms: standard_terms(&property.address),
            status: ContractStatus::Draft,
            created_at: now,
        });

        match inserted {
            Ok(contract) => {
                info!(contract = %contract.id, rental = %rental_id, "contract drafted");
                Ok(contract)
            }
            Err(RepositoryError::Conflict(_)) => self
                .repository
                .fetch_contract_by_rental(rental_id)?
                .ok_or_else(|| MarketplaceError::not_found(EntityKind::Contract, rental_id.0)),
            Err(other) => Err(other.into()),
        }
    }

    /// Materialization requested over HTTP: only the renter or the property owner may ask.
    pub fn create_for_party(
        &self,
        rental_id: RentalId,
        user: UserId,
    ) -> Result<Contract, MarketplaceError> {
        let rental = self
            .repository
            .fetch_rental(rental_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Rental, rental_id.0))?;
        AccessResolver::new(self.repository.as_ref()).ensure_rental_party(&rental, user)?;
        self.create_from_rental(rental_id)
    }

    pub fn get_by_id(
        &self,
        contract_id: ContractId,
        user: UserId,
    ) -> Result<ContractDetails, MarketplaceError> {
        let contract = self
            .repository
            .fetch_contract(contract_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Contract, contract_id.0))?;
        self.details_for(contract, user)
    }

    pub fn get_by_rental_id(
        &self,
        rental_id: RentalId,
        user: UserId,
    ) -> Result<ContractDetails, MarketplaceError> {
        let contract = self
            .repository
            .fetch_contract_by_rental(rental_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Contract, rental_id.0))?;
        self.details_for(contract, user)
    }

    pub fn list_for_user(&self, user: UserId) -> Result<Vec<Contract>, MarketplaceError> {
        Ok(self.repository.contracts_for_party(user)?)
    }

    /// Renders the lease, uploads it under a fresh key and moves the contract to
    /// PENDING_SIGNATURE. A previously generated artifact is purged once the new one is
    /// recorded.
    #[instrument(skip(self))]
    pub fn generate_and_upload_pdf(
        &self,
        contract_id: ContractId,
        user: UserId,
    ) -> Result<Contract, MarketplaceError> {
        let details = self.get_by_id(contract_id, user)?;
        let status = details.contract.status;
        if !status.accepts_new_pdf() {
            return Err(ValidationError::ContractTransition {
                from: status,
                to: ContractStatus::PendingSignature,
            }
            .into());
        }

        let bytes = self.renderer.render(&details);
        let size = bytes.len();
        let key = ObjectKey::new(format!("contracts/{}.pdf", Uuid::new_v4()))?;
        let pdf_url = self
            .storage
            .upload(&key, bytes, mime::APPLICATION_PDF.essence_str())?;

        let mut contract = details.contract;
        let previous = contract.pdf_url.replace(pdf_url.to_string());
        contract.status = ContractStatus::PendingSignature;

        if let Err(error) = self.repository.update_contract(contract.clone()) {
            if let Err(cleanup) = self.storage.delete_if_exists(&key) {
                warn!(key = %key, error = %cleanup, "could not remove unrecorded contract pdf");
            }
            return Err(error.into());
        }
        info!(contract = %contract.id, key = %key, size, "contract pdf generated");

        if let Some(previous) = previous {
            self.purge_artifact(&previous);
        }
        Ok(contract)
    }

    #[instrument(skip(self))]
    pub fn pdf_download_url(
        &self,
        contract_id: ContractId,
        user: UserId,
    ) -> Result<Url, MarketplaceError> {
        let details = self.get_by_id(contract_id, user)?;
        let stored = details
            .contract
            .pdf_url
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::ContractPdf, contract_id.0))?;

        let key = self.key_for_stored_url(&stored)?;
        Ok(self.storage.issue_read_url(&key, self.storage.default_ttl()))
    }

    #[instrument(skip(self))]
    pub fn sign(&self, contract_id: ContractId, user: UserId) -> Result<Contract, MarketplaceError> {
        let mut contract = self.executable_contract(contract_id, user)?;
        match contract.status {
            ContractStatus::Signed => return Ok(contract),
            ContractStatus::Notarized => {
                return Err(ValidationError::ContractTransition {
                    from: ContractStatus::Notarized,
                    to: ContractStatus::Signed,
                }
                .into())
            }
            ContractStatus::Draft | ContractStatus::PendingSignature => {}
        }

        contract.status = ContractStatus::Signed;
        self.repository.update_contract(contract.clone())?;
        info!(contract = %contract.id, "contract signed");
        Ok(contract)
    }

    /// Notarization does not require a prior signature.
    #[instrument(skip(self))]
    pub fn notarize(
        &self,
        contract_id: ContractId,
        user: UserId,
    ) -> Result<Contract, MarketplaceError> {
        let mut contract = self.executable_contract(contract_id, user)?;
        if contract.status.is_terminal() {
            return Ok(contract);
        }

        contract.status = ContractStatus::Notarized;
        self.repository.update_contract(contract.clone())?;
        info!(contract = %contract.id, "contract notarized");
        Ok(contract)
    }

    fn executable_contract(
        &self,
        contract_id: ContractId,
        user: UserId,
    ) -> Result<Contract, MarketplaceError> {
        let contract = self.get_by_id(contract_id, user)?.contract;
        if contract.pdf_url.is_none() {
            return Err(ValidationError::ContractPdfMissing.into());
        }
        Ok(contract)
    }

    fn details_for(
        &self,
        contract: Contract,
        user: UserId,
    ) -> Result<ContractDetails, MarketplaceError> {
        AccessResolver::new(self.repository.as_ref()).ensure_contract_party(&contract, user)?;

        let landlord = self
            .repository
            .fetch_user(contract.landlord_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::User, contract.landlord_id.0))?;
        let tenant = self
            .repository
            .fetch_user(contract.tenant_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::User, contract.tenant_id.0))?;
        let property = self
            .repository
            .fetch_property(contract.property_id)?
            .ok_or_else(|| {
                MarketplaceError::not_found(EntityKind::Property, contract.property_id.0)
            })?;

        Ok(ContractDetails {
            contract,
            landlord,
            tenant,
            property,
        })
    }

    fn key_for_stored_url(&self, stored: &str) -> Result<ObjectKey, MarketplaceError> {
        let url = Url::parse(stored).map_err(|error| {
            MarketplaceError::StorageTransient(format!("stored pdf url '{stored}' is invalid: {error}"))
        })?;
        Ok(self.storage.key_from_url(&url)?)
    }

    fn purge_artifact(&self, stored: &str) {
        let purged = self
            .key_for_stored_url(stored)
            .and_then(|key| Ok(self.storage.delete_if_exists(&key)?));
        if let Err(error) = purged {
            warn!(url = stored, %error, "could not purge superseded contract pdf");
        }
    }
}
