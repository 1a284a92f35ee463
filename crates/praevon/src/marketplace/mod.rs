//! Rental → document → contract lifecycle and the access rules around it.

pub mod authorization;
pub mod contracts;
pub mod documents;
pub mod domain;
pub mod error;
pub mod memory;
pub mod properties;
pub mod rentals;
pub mod repository;
pub mod router;

use std::sync::Arc;

pub use authorization::{AccessResolver, Denied};
pub use contracts::ContractService;
pub use documents::{DocumentRule, DocumentService, UploadRequest, UploadTicket};
pub use domain::{
    Contract, ContractDetails, ContractId, ContractStatus, Document, DocumentId, DocumentStatus,
    DocumentType, OwnerRentalView, Property, PropertyChanges, PropertyDraft, PropertyId,
    PropertyStatus, PropertyView, PublicProfile, Rental, RentalId, RentalStatus, RenterRentalView,
    UserId, UserProfile,
};
pub use error::{EntityKind, MarketplaceError, ValidationError};
pub use memory::InMemoryRepository;
pub use properties::{PropertyRemoval, PropertyService};
pub use rentals::RentalService;
pub use repository::{
    MarketplaceRepository, NewUser, RentalFilter, RepositoryError, UnitOfWork,
};
pub use router::{marketplace_router, CurrentUser, USER_ID_HEADER};

use crate::clock::Clock;
use crate::pdf::ContractRenderer;
use crate::storage::{CapabilityIssuer, ObjectStore};

/// The lifecycle managers wired to one repository and one object store.
pub struct Marketplace<R, S> {
    repository: Arc<R>,
    storage: Arc<CapabilityIssuer<S>>,
    properties: PropertyService<R>,
    rentals: RentalService<R>,
    documents: DocumentService<R, S>,
    contracts: ContractService<R, S>,
}

impl<R, S> Marketplace<R, S>
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
            properties: PropertyService::new(repository.clone(), clock.clone()),
            rentals: RentalService::new(repository.clone(), clock.clone()),
            documents: DocumentService::new(repository.clone(), storage.clone(), clock.clone()),
            contracts: ContractService::new(repository.clone(), storage.clone(), renderer, clock),
            repository,
            storage,
        }
    }

    pub fn properties(&self) -> &PropertyService<R> {
        &self.properties
    }

    pub fn rentals(&self) -> &RentalService<R> {
        &self.rentals
    }

    pub fn documents(&self) -> &DocumentService<R, S> {
        &self.documents
    }

    pub fn contracts(&self) -> &ContractService<R, S> {
        &self.contracts
    }

    pub fn storage(&self) -> &Arc<CapabilityIssuer<S>> {
        &self.storage
    }

    /// Records a profile handed over by the identity collaborator.
    pub fn register_user(&self, user: NewUser) -> Result<UserProfile, MarketplaceError> {
        Ok(self.repository.insert_user(user)?)
    }

    /// The caller's own profile, contact details included.
    pub fn profile(&self, user: UserId) -> Result<UserProfile, MarketplaceError> {
        self.repository
            .fetch_user(user)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::User, user.0))
    }

    pub fn public_profile(&self, user: UserId) -> Result<PublicProfile, MarketplaceError> {
        Ok(self.profile(user)?.into())
    }
}

#[cfg(test)]
mod tests;
