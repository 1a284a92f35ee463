use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    Contract, ContractId, ContractStatus, Document, DocumentId, DocumentStatus, DocumentType,
    Property, PropertyDraft, PropertyId, PropertyStatus, Rental, RentalId, RentalStatus, UserId,
    UserProfile,
};
use super::error::EntityKind;
use crate::storage::ObjectKey;

/// Error enumeration for relational store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} violates a uniqueness constraint")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProperty {
    pub owner_id: UserId,
    pub draft: PropertyDraft,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRental {
    pub property_id: PropertyId,
    pub renter_id: UserId,
    pub status: RentalStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub rental_id: RentalId,
    pub property_id: PropertyId,
    pub tenant_id: UserId,
    pub landlord_id: UserId,
    pub monthly_rent: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub terms: String,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub storage_key: ObjectKey,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub kind: DocumentType,
    pub status: DocumentStatus,
    pub uploaded_by: UserId,
    pub property_id: Option<PropertyId>,
    pub created_at: DateTime<Utc>,
}

/// Conjunctive rental filter; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RentalFilter {
    pub property_id: Option<PropertyId>,
    pub renter_id: Option<UserId>,
    pub owner_id: Option<UserId>,
    pub status: Option<RentalStatus>,
}

/// Mutations that must commit together. Implementations apply every call made through
/// one `UnitOfWork` atomically, or none of them.
pub trait UnitOfWork {
    fn property(&mut self, id: PropertyId) -> Result<Option<Property>, RepositoryError>;
    fn save_property(&mut self, property: Property) -> Result<(), RepositoryError>;
    fn rental(&mut self, id: RentalId) -> Result<Option<Rental>, RepositoryError>;
    fn save_rental(&mut self, rental: Rental) -> Result<(), RepositoryError>;
    fn remove_contracts_for_property(&mut self, id: PropertyId)
        -> Result<usize, RepositoryError>;
    fn remove_rentals_for_property(&mut self, id: PropertyId) -> Result<usize, RepositoryError>;
    /// Clears the property link on documents, returning how many were detached.
    fn detach_documents_from_property(&mut self, id: PropertyId)
        -> Result<usize, RepositoryError>;
    fn remove_property(&mut self, id: PropertyId) -> Result<(), RepositoryError>;
}

/// Storage abstraction over the relational store so the managers can be exercised in isolation.
///
/// Inserts enforce the store-level uniqueness rules: one contract per rental and one
/// pending rental per (property, renter).
pub trait MarketplaceRepository: Send + Sync {
    fn insert_user(&self, user: NewUser) -> Result<UserProfile, RepositoryError>;
    fn fetch_user(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError>;

    fn insert_property(&self, property: NewProperty) -> Result<Property, RepositoryError>;
    fn fetch_property(&self, id: PropertyId) -> Result<Option<Property>, RepositoryError>;
    fn update_property(&self, property: Property) -> Result<(), RepositoryError>;
    fn properties_owned_by(&self, owner: UserId) -> Result<Vec<Property>, RepositoryError>;

    fn insert_rental(&self, rental: NewRental) -> Result<Rental, RepositoryError>;
    fn fetch_rental(&self, id: RentalId) -> Result<Option<Rental>, RepositoryError>;
    fn rentals(&self, filter: RentalFilter) -> Result<Vec<Rental>, RepositoryError>;

    fn insert_contract(&self, contract: NewContract) -> Result<Contract, RepositoryError>;
    fn fetch_contract(&self, id: ContractId) -> Result<Option<Contract>, RepositoryError>;
    fn fetch_contract_by_rental(
        &self,
        rental: RentalId,
    ) -> Result<Option<Contract>, RepositoryError>;
    fn update_contract(&self, contract: Contract) -> Result<(), RepositoryError>;
    /// Contracts where `user` is landlord or tenant, newest first.
    fn contracts_for_party(&self, user: UserId) -> Result<Vec<Contract>, RepositoryError>;

    fn insert_document(&self, document: NewDocument) -> Result<Document, RepositoryError>;
    fn fetch_document(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError>;
    fn update_document(&self, document: Document) -> Result<(), RepositoryError>;
    fn delete_document(&self, id: DocumentId) -> Result<(), RepositoryError>;
    /// Documents uploaded by `user`, newest first.
    fn documents_uploaded_by(&self, user: UserId) -> Result<Vec<Document>, RepositoryError>;

    /// Runs `work` inside a single store transaction, committing only when it returns `Ok`.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>;
}
