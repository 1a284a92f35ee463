use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use url::Url;

use crate::clock::FixedClock;
use crate::config::StorageConfig;
use crate::marketplace::repository::{NewContract, NewDocument, NewProperty, NewRental};
use crate::marketplace::{
    Contract, ContractId, Document, DocumentId, Marketplace, MarketplaceRepository, NewUser,
    Property, PropertyDraft, PropertyId, Rental, RentalFilter, RentalId, RentalStatus,
    RepositoryError, UnitOfWork, UploadRequest, UserId, UserProfile,
};
use crate::marketplace::InMemoryRepository;
use crate::pdf::LeasePdfRenderer;
use crate::storage::{
    CapabilityIssuer, InMemoryObjectStore, ObjectKey, ObjectStore, Permission, StorageError,
    StoredObject,
};

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn storage_config() -> StorageConfig {
    StorageConfig {
        base_url: Url::parse("http://127.0.0.1:3000/blob").expect("valid url"),
        container: "documents".to_string(),
        signing_key: b"marketplace-test-key".to_vec(),
        url_ttl_minutes: 10,
    }
}

pub(super) struct Fixture<R, S> {
    pub marketplace: Arc<Marketplace<R, S>>,
    pub repository: Arc<R>,
    pub store: Arc<S>,
    pub clock: Arc<FixedClock>,
    pub landlord: UserProfile,
    pub tenant: UserProfile,
    pub stranger: UserProfile,
    pub property: Property,
}

pub(super) type MemoryFixture = Fixture<InMemoryRepository, InMemoryObjectStore>;

pub(super) fn fixture() -> MemoryFixture {
    fixture_with(
        Arc::new(InMemoryRepository::default()),
        Arc::new(InMemoryObjectStore::default()),
    )
}

pub(super) fn fixture_with<R, S>(repository: Arc<R>, store: Arc<S>) -> Fixture<R, S>
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    let clock = Arc::new(FixedClock::new(start()));
    let issuer = CapabilityIssuer::new(store.clone(), &storage_config())
        .expect("issuer builds")
        .with_clock(clock.clone());
    let marketplace = Arc::new(Marketplace::new(
        repository.clone(),
        Arc::new(issuer),
        Box::new(LeasePdfRenderer),
        clock.clone(),
    ));

    let landlord = register(&marketplace, "lucia", Some("+57 300 111 2233"));
    let tenant = register(&marketplace, "mateo", None);
    let stranger = register(&marketplace, "sofia", None);
    let property = marketplace
        .properties()
        .create(draft("Apartamento en Chapinero", 2_500_000), landlord.id)
        .expect("property listed");

    Fixture {
        marketplace,
        repository,
        store,
        clock,
        landlord,
        tenant,
        stranger,
        property,
    }
}

fn register<R, S>(marketplace: &Marketplace<R, S>, username: &str, phone: Option<&str>) -> UserProfile
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    marketplace
        .register_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            phone: phone.map(str::to_string),
        })
        .expect("user registered")
}

pub(super) fn draft(title: &str, price: u64) -> PropertyDraft {
    PropertyDraft {
        title: title.to_string(),
        description: "Two bedrooms, balcony".to_string(),
        address: "Calle 60 # 9-15".to_string(),
        city: "Bogotá".to_string(),
        price,
    }
}

pub(super) fn upload_request(kind: &str, name: &str, mime: &str, size: u64) -> UploadRequest {
    UploadRequest {
        kind: kind.to_string(),
        original_name: name.to_string(),
        mime_type: mime.to_string(),
        size,
        property_id: None,
    }
}

impl<R, S> Fixture<R, S>
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    /// Renter requests the fixture property and the landlord accepts.
    pub fn accepted_rental(&self) -> Rental {
        let rental = self
            .marketplace
            .rentals()
            .create_rental(self.property.id, self.tenant.id)
            .expect("rental requested");
        self.marketplace
            .rentals()
            .update_status(rental.id, RentalStatus::Accepted, self.landlord.id)
            .expect("rental accepted")
    }

    pub fn drafted_contract(&self) -> Contract {
        let rental = self.accepted_rental();
        self.marketplace
            .contracts()
            .create_from_rental(rental.id)
            .expect("contract drafted")
    }

    /// Plays the client side: PUT the bytes through the write capability.
    pub fn upload_through(&self, upload_url: &str, bytes: &[u8], content_type: &str) {
        let url = Url::parse(upload_url).expect("upload url parses");
        let grant = self
            .marketplace
            .storage()
            .verify(&url, Permission::Write)
            .expect("write capability verifies");
        assert!(grant.permits_content_type(content_type));
        self.store
            .put(&grant.key, bytes.to_vec(), content_type)
            .expect("object stored");
    }

    /// Prepares, uploads and confirms a tenant document.
    pub fn confirmed_tenant_document(&self) -> Document {
        let ticket = self
            .marketplace
            .documents()
            .prepare_upload(
                upload_request("TENANT_ID_FRONT", "cedula.jpg", "image/jpeg", 2048),
                self.tenant.id,
            )
            .expect("upload prepared");
        self.upload_through(&ticket.upload_url, &[0xFF, 0xD8, 0xFF], "image/jpeg");
        self.marketplace
            .documents()
            .confirm_upload(ticket.document_id, self.tenant.id)
            .expect("upload confirmed")
    }
}

pub(super) fn key_of(url: &str) -> ObjectKey {
    let url = Url::parse(url).expect("url parses");
    ObjectKey::new(url.path().trim_start_matches("/blob/documents/")).expect("key")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Object store whose writes or deletes can be switched off.
#[derive(Debug, Default)]
pub(super) struct FlakyStore {
    inner: InMemoryObjectStore,
    pub fail_deletes: AtomicBool,
    pub fail_exists: AtomicBool,
}

impl ObjectStore for FlakyStore {
    fn put(&self, key: &ObjectKey, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.inner.put(key, bytes, content_type)
    }

    fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StorageError> {
        self.inner.get(key)
    }

    fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("blob endpoint timed out".to_string()));
        }
        self.inner.exists(key)
    }

    fn delete_if_exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("blob endpoint timed out".to_string()));
        }
        self.inner.delete_if_exists(key)
    }
}

/// In-memory repository with switchable faults: a full outage, or a failure on the
/// property write inside a transaction.
#[derive(Debug, Default)]
pub(super) struct ScriptedRepository {
    inner: InMemoryRepository,
    pub offline: AtomicBool,
    pub fail_property_save: AtomicBool,
    pub fail_contract_update: AtomicBool,
}

impl ScriptedRepository {
    fn check(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("database offline".to_string()))
        } else {
            Ok(())
        }
    }
}

struct FaultyUnit<'a> {
    inner: &'a mut dyn UnitOfWork,
    fail_property_save: bool,
}

impl UnitOfWork for FaultyUnit<'_> {
    fn property(&mut self, id: PropertyId) -> Result<Option<Property>, RepositoryError> {
        self.inner.property(id)
    }

    fn save_property(&mut self, property: Property) -> Result<(), RepositoryError> {
        if self.fail_property_save {
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        self.inner.save_property(property)
    }

    fn rental(&mut self, id: RentalId) -> Result<Option<Rental>, RepositoryError> {
        self.inner.rental(id)
    }

    fn save_rental(&mut self, rental: Rental) -> Result<(), RepositoryError> {
        self.inner.save_rental(rental)
    }

    fn remove_contracts_for_property(&mut self, id: PropertyId) -> Result<usize, RepositoryError> {
        self.inner.remove_contracts_for_property(id)
    }

    fn remove_rentals_for_property(&mut self, id: PropertyId) -> Result<usize, RepositoryError> {
        self.inner.remove_rentals_for_property(id)
    }

    fn detach_documents_from_property(
        &mut self,
        id: PropertyId,
    ) -> Result<usize, RepositoryError> {
        self.inner.detach_documents_from_property(id)
    }

    fn remove_property(&mut self, id: PropertyId) -> Result<(), RepositoryError> {
        self.inner.remove_property(id)
    }
}

impl MarketplaceRepository for ScriptedRepository {
    fn insert_user(&self, user: NewUser) -> Result<UserProfile, RepositoryError> {
        self.check()?;
        self.inner.insert_user(user)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        self.check()?;
        self.inner.fetch_user(id)
    }

    fn insert_property(&self, property: NewProperty) -> Result<Property, RepositoryError> {
        self.check()?;
        self.inner.insert_property(property)
    }

    fn fetch_property(&self, id: PropertyId) -> Result<Option<Property>, RepositoryError> {
        self.check()?;
        self.inner.fetch_property(id)
    }

    fn update_property(&self, property: Property) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.update_property(property)
    }

    fn properties_owned_by(&self, owner: UserId) -> Result<Vec<Property>, RepositoryError> {
        self.check()?;
        self.inner.properties_owned_by(owner)
    }

    fn insert_rental(&self, rental: NewRental) -> Result<Rental, RepositoryError> {
        self.check()?;
        self.inner.insert_rental(rental)
    }

    fn fetch_rental(&self, id: RentalId) -> Result<Option<Rental>, RepositoryError> {
        self.check()?;
        self.inner.fetch_rental(id)
    }

    fn rentals(&self, filter: RentalFilter) -> Result<Vec<Rental>, RepositoryError> {
        self.check()?;
        self.inner.rentals(filter)
    }

    fn insert_contract(&self, contract: NewContract) -> Result<Contract, RepositoryError> {
        self.check()?;
        self.inner.insert_contract(contract)
    }

    fn fetch_contract(&self, id: ContractId) -> Result<Option<Contract>, RepositoryError> {
        self.check()?;
        self.inner.fetch_contract(id)
    }

    fn fetch_contract_by_rental(
        &self,
        rental: RentalId,
    ) -> Result<Option<Contract>, RepositoryError> {
        self.check()?;
        self.inner.fetch_contract_by_rental(rental)
    }

    fn update_contract(&self, contract: Contract) -> Result<(), RepositoryError> {
        self.check()?;
        if self.fail_contract_update.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        self.inner.update_contract(contract)
    }

    fn contracts_for_party(&self, user: UserId) -> Result<Vec<Contract>, RepositoryError> {
        self.check()?;
        self.inner.contracts_for_party(user)
    }

    fn insert_document(&self, document: NewDocument) -> Result<Document, RepositoryError> {
        self.check()?;
        self.inner.insert_document(document)
    }

    fn fetch_document(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        self.check()?;
        self.inner.fetch_document(id)
    }

    fn update_document(&self, document: Document) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.update_document(document)
    }

    fn delete_document(&self, id: DocumentId) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.delete_document(id)
    }

    fn documents_uploaded_by(&self, user: UserId) -> Result<Vec<Document>, RepositoryError> {
        self.check()?;
        self.inner.documents_uploaded_by(user)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.check().map_err(E::from)?;
        let fail_property_save = self.fail_property_save.load(Ordering::SeqCst);
        self.inner.transaction(|tx| {
            let mut unit = FaultyUnit {
                inner: tx,
                fail_property_save,
            };
            work(&mut unit)
        })
    }
}
