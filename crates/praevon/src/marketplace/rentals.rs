use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};

use super::authorization::AccessResolver;
use super::domain::{
    OwnerRentalView, Property, PropertyId, PropertyStatus, Rental, RentalId, RentalStatus,
    RenterRentalView, UserId, UserProfile,
};
use super::error::{EntityKind, MarketplaceError, ValidationError};
use super::repository::{MarketplaceRepository, NewRental, RentalFilter, RepositoryError};
use crate::clock::Clock;

/// Rental requests and the owner's decisions on them.
pub struct RentalService<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> RentalService<R>
where
    R: MarketplaceRepository + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    #[instrument(skip(self))]
    pub fn create_rental(
        &self,
        property_id: PropertyId,
        renter: UserId,
    ) -> Result<Rental, MarketplaceError> {
        let property = self
            .repository
            .fetch_property(property_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Property, property_id.0))?;
        if property.owner_id == renter {
            return Err(ValidationError::SelfRental.into());
        }

        let pending = self.repository.rentals(RentalFilter {
            property_id: Some(property_id),
            renter_id: Some(renter),
            status: Some(RentalStatus::Pending),
            ..RentalFilter::default()
        })?;
        if !pending.is_empty() {
            return Err(ValidationError::DuplicatePendingRental.into());
        }

        let rental = self
            .repository
            .insert_rental(NewRental {
                property_id,
                renter_id: renter,
                status: RentalStatus::Pending,
                created_at: self.clock.now(),
            })
            .map_err(|error| match error {
                // Lost a race against a concurrent request from the same renter.
                RepositoryError::Conflict(_) => ValidationError::DuplicatePendingRental.into(),
                other => MarketplaceError::from(other),
            })?;

        info!(rental = %rental.id, property = %property_id, "rental requested");
        Ok(rental)
    }

    pub fn list_for_renter(&self, renter: UserId) -> Result<Vec<RenterRentalView>, MarketplaceError> {
        let rentals = self.repository.rentals(RentalFilter {
            renter_id: Some(renter),
            ..RentalFilter::default()
        })?;

        let mut properties = HashMap::new();
        rentals
            .into_iter()
            .map(|rental| {
                let property = self.property_cached(&mut properties, rental.property_id)?;
                Ok(RenterRentalView { rental, property })
            })
            .collect()
    }

    pub fn list_for_owner(&self, owner: UserId) -> Result<Vec<OwnerRentalView>, MarketplaceError> {
        let rentals = self.repository.rentals(RentalFilter {
            owner_id: Some(owner),
            ..RentalFilter::default()
        })?;

        let mut properties = HashMap::new();
        let mut renters: HashMap<UserId, UserProfile> = HashMap::new();
        rentals
            .into_iter()
            .map(|rental| {
                let property = self.property_cached(&mut properties, rental.property_id)?;
                let renter = match renters.get(&rental.renter_id) {
                    Some(profile) => profile.clone(),
                    None => {
                        let profile = self.repository.fetch_user(rental.renter_id)?.ok_or_else(
                            || MarketplaceError::not_found(EntityKind::User, rental.renter_id.0),
                        )?;
                        renters.insert(rental.renter_id, profile.clone());
                        profile
                    }
                };
                Ok(OwnerRentalView {
                    rental,
                    property,
                    renter,
                })
            })
            .collect()
    }

    /// Owner decision on a request. Acceptance marks the property rented in the same
    /// transaction.
    #[instrument(skip(self))]
    pub fn update_status(
        &self,
        rental_id: RentalId,
        status: RentalStatus,
        requester: UserId,
    ) -> Result<Rental, MarketplaceError> {
        if status == RentalStatus::Pending {
            return Err(ValidationError::InvalidRentalStatus(status).into());
        }

        let resolver = AccessResolver::new(self.repository.as_ref());
        let rental = self.repository.transaction(|tx| {
            let mut rental = tx
                .rental(rental_id)?
                .ok_or_else(|| MarketplaceError::not_found(EntityKind::Rental, rental_id.0))?;
            let mut property = tx.property(rental.property_id)?.ok_or_else(|| {
                MarketplaceError::not_found(EntityKind::Property, rental.property_id.0)
            })?;
            resolver.ensure_property_owner(&property, requester)?;

            rental.status = status;
            tx.save_rental(rental.clone())?;
            if status == RentalStatus::Accepted {
                property.status = PropertyStatus::Rented;
                tx.save_property(property)?;
            }
            Ok::<_, MarketplaceError>(rental)
        })?;

        info!(rental = %rental.id, status = status.label(), "rental status updated");
        Ok(rental)
    }

    fn property_cached(
        &self,
        cache: &mut HashMap<PropertyId, Property>,
        id: PropertyId,
    ) -> Result<Property, MarketplaceError> {
        if let Some(property) = cache.get(&id) {
            return Ok(property.clone());
        }
        let property = self
            .repository
            .fetch_property(id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Property, id.0))?;
        cache.insert(id, property.clone());
        Ok(property)
    }
}
