use std::sync::Arc;

use tracing::{info, instrument};

use super::authorization::AccessResolver;
use super::domain::{
    Property, PropertyChanges, PropertyDraft, PropertyId, PropertyStatus, PropertyView, UserId,
};
use super::error::{EntityKind, MarketplaceError, ValidationError};
use super::repository::{MarketplaceRepository, NewProperty};
use crate::clock::Clock;

/// Rows removed or detached by a property delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PropertyRemoval {
    pub contracts: usize,
    pub rentals: usize,
    pub detached_documents: usize,
}

/// Listing management for owners.
pub struct PropertyService<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> PropertyService<R>
where
    R: MarketplaceRepository + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create(&self, draft: PropertyDraft, owner: UserId) -> Result<Property, MarketplaceError> {
        for (field, value) in [
            ("title", &draft.title),
            ("address", &draft.address),
            ("city", &draft.city),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField { field }.into());
            }
        }

        let property = self.repository.insert_property(NewProperty {
            owner_id: owner,
            draft,
            status: PropertyStatus::Available,
            created_at: self.clock.now(),
        })?;
        info!(property = %property.id, owner = %owner, "property listed");
        Ok(property)
    }

    pub fn get(&self, property_id: PropertyId) -> Result<PropertyView, MarketplaceError> {
        let property = self.require(property_id)?;
        let owner = self
            .repository
            .fetch_user(property.owner_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::User, property.owner_id.0))?;
        Ok(PropertyView {
            property,
            owner: owner.into(),
        })
    }

    pub fn list_owned(&self, owner: UserId) -> Result<Vec<Property>, MarketplaceError> {
        Ok(self.repository.properties_owned_by(owner)?)
    }

    #[instrument(skip(self, changes))]
    pub fn update(
        &self,
        property_id: PropertyId,
        changes: PropertyChanges,
        requester: UserId,
    ) -> Result<Property, MarketplaceError> {
        let mut property = self.require(property_id)?;
        AccessResolver::new(self.repository.as_ref()).ensure_property_owner(&property, requester)?;

        let PropertyChanges {
            title,
            description,
            address,
            city,
            price,
            status,
        } = changes;
        for (field, value) in [("title", &title), ("address", &address), ("city", &city)] {
            if value.as_deref().is_some_and(|value| value.trim().is_empty()) {
                return Err(ValidationError::EmptyField { field }.into());
            }
        }

        if let Some(title) = title {
            property.title = title;
        }
        if let Some(description) = description {
            property.description = description;
        }
        if let Some(address) = address {
            property.address = address;
        }
        if let Some(city) = city {
            property.city = city;
        }
        if let Some(price) = price {
            property.price = price;
        }
        if let Some(status) = status {
            property.status = status;
        }

        self.repository.update_property(property.clone())?;
        info!(property = %property.id, "property updated");
        Ok(property)
    }

    /// Deletes the listing together with its contracts and rentals in one transaction.
    /// Documents survive, unlinked from the property.
    #[instrument(skip(self))]
    pub fn delete(
        &self,
        property_id: PropertyId,
        requester: UserId,
    ) -> Result<PropertyRemoval, MarketplaceError> {
        let resolver = AccessResolver::new(self.repository.as_ref());
        let removal = self.repository.transaction(|tx| {
            let property = tx
                .property(property_id)?
                .ok_or_else(|| MarketplaceError::not_found(EntityKind::Property, property_id.0))?;
            resolver.ensure_property_owner(&property, requester)?;

            let removal = PropertyRemoval {
                contracts: tx.remove_contracts_for_property(property_id)?,
                rentals: tx.remove_rentals_for_property(property_id)?,
                detached_documents: tx.detach_documents_from_property(property_id)?,
            };
            tx.remove_property(property_id)?;
            Ok::<_, MarketplaceError>(removal)
        })?;

        info!(
            property = %property_id,
            contracts = removal.contracts,
            rentals = removal.rentals,
            documents = removal.detached_documents,
            "property deleted"
        );
        Ok(removal)
    }

    fn require(&self, property_id: PropertyId) -> Result<Property, MarketplaceError> {
        self.repository
            .fetch_property(property_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Property, property_id.0))
    }
}
