use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Contract, ContractId, Document, DocumentId, Property, PropertyId, Rental, RentalId,
    RentalStatus, UserId, UserProfile,
};
use super::error::EntityKind;
use super::repository::{
    MarketplaceRepository, NewContract, NewDocument, NewProperty, NewRental, NewUser,
    RentalFilter, RepositoryError, UnitOfWork,
};

#[derive(Debug, Default, Clone)]
struct Sequences {
    user: i64,
    property: i64,
    rental: i64,
    contract: i64,
    document: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default, Clone)]
struct Tables {
    sequences: Sequences,
    users: BTreeMap<UserId, UserProfile>,
    properties: BTreeMap<PropertyId, Property>,
    rentals: BTreeMap<RentalId, Rental>,
    contracts: BTreeMap<ContractId, Contract>,
    documents: BTreeMap<DocumentId, Document>,
}

impl Tables {
    fn require_user(&self, id: UserId) -> Result<(), RepositoryError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(RepositoryError::NotFound {
                entity: EntityKind::User,
                id: id.0,
            })
        }
    }
}

impl UnitOfWork for Tables {
    fn property(&mut self, id: PropertyId) -> Result<Option<Property>, RepositoryError> {
        Ok(self.properties.get(&id).cloned())
    }

    fn save_property(&mut self, property: Property) -> Result<(), RepositoryError> {
        match self.properties.get_mut(&property.id) {
            Some(slot) => {
                *slot = property;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: EntityKind::Property,
                id: property.id.0,
            }),
        }
    }

    fn rental(&mut self, id: RentalId) -> Result<Option<Rental>, RepositoryError> {
        Ok(self.rentals.get(&id).cloned())
    }

    fn save_rental(&mut self, rental: Rental) -> Result<(), RepositoryError> {
        if rental.status == RentalStatus::Pending
            && self.rentals.values().any(|existing| {
                existing.id != rental.id
                    && existing.status == RentalStatus::Pending
                    && existing.property_id == rental.property_id
                    && existing.renter_id == rental.renter_id
            })
        {
            return Err(RepositoryError::Conflict(format!(
                "pending rental for property {} and renter {}",
                rental.property_id, rental.renter_id
            )));
        }

        match self.rentals.get_mut(&rental.id) {
            Some(slot) => {
                *slot = rental;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: EntityKind::Rental,
                id: rental.id.0,
            }),
        }
    }

    fn remove_contracts_for_property(
        &mut self,
        id: PropertyId,
    ) -> Result<usize, RepositoryError> {
        let before = self.contracts.len();
        self.contracts
            .retain(|_, contract| contract.property_id != id);
        Ok(before - self.contracts.len())
    }

    fn remove_rentals_for_property(&mut self, id: PropertyId) -> Result<usize, RepositoryError> {
        let before = self.rentals.len();
        self.rentals.retain(|_, rental| rental.property_id != id);
        Ok(before - self.rentals.len())
    }

    fn detach_documents_from_property(
        &mut self,
        id: PropertyId,
    ) -> Result<usize, RepositoryError> {
        let mut detached = 0;
        for document in self.documents.values_mut() {
            if document.property_id == Some(id) {
                document.property_id = None;
                detached += 1;
            }
        }
        Ok(detached)
    }

    fn remove_property(&mut self, id: PropertyId) -> Result<(), RepositoryError> {
        if self.contracts.values().any(|contract| contract.property_id == id)
            || self.rentals.values().any(|rental| rental.property_id == id)
        {
            return Err(RepositoryError::Conflict(format!(
                "property {id} is still referenced by rentals or contracts"
            )));
        }

        self.properties
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound {
                entity: EntityKind::Property,
                id: id.0,
            })
    }
}

/// Mutex-guarded tables standing in for the relational store.
///
/// Transactions run against a staged copy that replaces the live tables only on success.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

impl MarketplaceRepository for InMemoryRepository {
    fn insert_user(&self, user: NewUser) -> Result<UserProfile, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepositoryError::Conflict(format!("user email {}", user.email)));
        }

        let id = UserId(next(&mut tables.sequences.user));
        let profile = UserProfile {
            id,
            username: user.username,
            email: user.email,
            phone: user.phone,
        };
        tables.users.insert(id, profile.clone());
        Ok(profile)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    fn insert_property(&self, property: NewProperty) -> Result<Property, RepositoryError> {
        let mut tables = self.tables()?;
        tables.require_user(property.owner_id)?;

        let id = PropertyId(next(&mut tables.sequences.property));
        let NewProperty {
            owner_id,
            draft,
            status,
            created_at,
        } = property;
        let stored = Property {
            id,
            owner_id,
            title: draft.title,
            description: draft.description,
            address: draft.address,
            city: draft.city,
            price: draft.price,
            status,
            created_at,
        };
        tables.properties.insert(id, stored.clone());
        Ok(stored)
    }

    fn fetch_property(&self, id: PropertyId) -> Result<Option<Property>, RepositoryError> {
        self.tables()?.property(id)
    }

    fn update_property(&self, property: Property) -> Result<(), RepositoryError> {
        self.tables()?.save_property(property)
    }

    fn properties_owned_by(&self, owner: UserId) -> Result<Vec<Property>, RepositoryError> {
        let tables = self.tables()?;
        let mut owned: Vec<Property> = tables
            .properties
            .values()
            .filter(|property| property.owner_id == owner)
            .cloned()
            .collect();
        newest_first(&mut owned, |property| (property.created_at, property.id));
        Ok(owned)
    }

    fn insert_rental(&self, rental: NewRental) -> Result<Rental, RepositoryError> {
        let mut tables = self.tables()?;
        tables.require_user(rental.renter_id)?;
        if !tables.properties.contains_key(&rental.property_id) {
            return Err(RepositoryError::NotFound {
                entity: EntityKind::Property,
                id: rental.property_id.0,
            });
        }
        if rental.status == RentalStatus::Pending
            && tables.rentals.values().any(|existing| {
                existing.status == RentalStatus::Pending
                    && existing.property_id == rental.property_id
                    && existing.renter_id == rental.renter_id
            })
        {
            return Err(RepositoryError::Conflict(format!(
                "pending rental for property {} and renter {}",
                rental.property_id, rental.renter_id
            )));
        }

        let id = RentalId(next(&mut tables.sequences.rental));
        let stored = Rental {
            id,
            property_id: rental.property_id,
            renter_id: rental.renter_id,
            status: rental.status,
            created_at: rental.created_at,
        };
        tables.rentals.insert(id, stored.clone());
        Ok(stored)
    }

    fn fetch_rental(&self, id: RentalId) -> Result<Option<Rental>, RepositoryError> {
        self.tables()?.rental(id)
    }

    fn rentals(&self, filter: RentalFilter) -> Result<Vec<Rental>, RepositoryError> {
        let tables = self.tables()?;
        let mut matching: Vec<Rental> = tables
            .rentals
            .values()
            .filter(|rental| filter.property_id.map_or(true, |id| rental.property_id == id))
            .filter(|rental| filter.renter_id.map_or(true, |id| rental.renter_id == id))
            .filter(|rental| filter.status.map_or(true, |status| rental.status == status))
            .filter(|rental| {
                filter.owner_id.map_or(true, |owner| {
                    tables
                        .properties
                        .get(&rental.property_id)
                        .is_some_and(|property| property.owner_id == owner)
                })
            })
            .cloned()
            .collect();
        newest_first(&mut matching, |rental| (rental.created_at, rental.id));
        Ok(matching)
    }

    fn insert_contract(&self, contract: NewContract) -> Result<Contract, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .contracts
            .values()
            .any(|existing| existing.rental_id == contract.rental_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "contract for rental {}",
                contract.rental_id
            )));
        }

        let id = ContractId(next(&mut tables.sequences.contract));
        let NewContract {
            rental_id,
            property_id,
            tenant_id,
            landlord_id,
            monthly_rent,
            start_date,
            end_date,
            terms,
            status,
            created_at,
        } = contract;
        let stored = Contract {
            id,
            rental_id,
            property_id,
            tenant_id,
            landlord_id,
            monthly_rent,
            start_date,
            end_date,
            terms,
            pdf_url: None,
            status,
            created_at,
        };
        tables.contracts.insert(id, stored.clone());
        Ok(stored)
    }

    fn fetch_contract(&self, id: ContractId) -> Result<Option<Contract>, RepositoryError> {
        Ok(self.tables()?.contracts.get(&id).cloned())
    }

    fn fetch_contract_by_rental(
        &self,
        rental: RentalId,
    ) -> Result<Option<Contract>, RepositoryError> {
        Ok(self
            .tables()?
            .contracts
            .values()
            .find(|contract| contract.rental_id == rental)
            .cloned())
    }

    fn update_contract(&self, contract: Contract) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.contracts.get_mut(&contract.id) {
            Some(slot) => {
                *slot = contract;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: EntityKind::Contract,
                id: contract.id.0,
            }),
        }
    }

    fn contracts_for_party(&self, user: UserId) -> Result<Vec<Contract>, RepositoryError> {
        let tables = self.tables()?;
        let mut contracts: Vec<Contract> = tables
            .contracts
            .values()
            .filter(|contract| contract.is_party(user))
            .cloned()
            .collect();
        newest_first(&mut contracts, |contract| (contract.created_at, contract.id));
        Ok(contracts)
    }

    fn insert_document(&self, document: NewDocument) -> Result<Document, RepositoryError> {
        let mut tables = self.tables()?;
        tables.require_user(document.uploaded_by)?;
        if tables
            .documents
            .values()
            .any(|existing| existing.storage_key == document.storage_key)
        {
            return Err(RepositoryError::Conflict(format!(
                "document storage key {}",
                document.storage_key
            )));
        }

        let id = DocumentId(next(&mut tables.sequences.document));
        let NewDocument {
            storage_key,
            original_name,
            mime_type,
            size,
            kind,
            status,
            uploaded_by,
            property_id,
            created_at,
        } = document;
        let stored = Document {
            id,
            storage_key,
            original_name,
            mime_type,
            size,
            kind,
            status,
            uploaded_by,
            property_id,
            storage_url: String::new(),
            created_at,
        };
        tables.documents.insert(id, stored.clone());
        Ok(stored)
    }

    fn fetch_document(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.tables()?.documents.get(&id).cloned())
    }

    fn update_document(&self, document: Document) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.documents.get_mut(&document.id) {
            Some(slot) => {
                *slot = document;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: EntityKind::Document,
                id: document.id.0,
            }),
        }
    }

    fn delete_document(&self, id: DocumentId) -> Result<(), RepositoryError> {
        self.tables()?
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound {
                entity: EntityKind::Document,
                id: id.0,
            })
    }

    fn documents_uploaded_by(&self, user: UserId) -> Result<Vec<Document>, RepositoryError> {
        let tables = self.tables()?;
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|document| document.uploaded_by == user)
            .cloned()
            .collect();
        newest_first(&mut documents, |document| (document.created_at, document.id));
        Ok(documents)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut live = self.tables().map_err(E::from)?;
        let mut staged = live.clone();
        let outcome = work(&mut staged)?;
        *live = staged;
        Ok(outcome)
    }
}
