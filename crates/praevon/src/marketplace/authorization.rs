use tracing::debug;

use super::domain::{Contract, Document, Property, Rental, UserId};
use super::error::MarketplaceError;
use super::repository::{MarketplaceRepository, RentalFilter};

/// Reason an actor was refused. Every variant maps to 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denied {
    #[error("you are not a party to this contract")]
    NotContractParty,
    #[error("you do not own this property")]
    NotPropertyOwner,
    #[error("you are not allowed to review this document")]
    NotDocumentReviewer,
    #[error("you are not allowed to access this document")]
    NotDocumentReader,
    #[error("you can only delete documents you uploaded")]
    NotDocumentUploader,
    #[error("you are not a party to this rental")]
    NotRentalParty,
}

/// Read-only access predicates shared by the lifecycle managers and the HTTP surface.
///
/// Every check fails closed: a dangling reference is a refusal, not a pass.
pub struct AccessResolver<'a, R> {
    repository: &'a R,
}

impl<'a, R> AccessResolver<'a, R>
where
    R: MarketplaceRepository,
{
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    pub fn ensure_contract_party(
        &self,
        contract: &Contract,
        user: UserId,
    ) -> Result<(), MarketplaceError> {
        if contract.is_party(user) {
            Ok(())
        } else {
            Err(Denied::NotContractParty.into())
        }
    }

    pub fn ensure_property_owner(
        &self,
        property: &Property,
        user: UserId,
    ) -> Result<(), MarketplaceError> {
        if property.owner_id == user {
            Ok(())
        } else {
            Err(Denied::NotPropertyOwner.into())
        }
    }

    /// Property-linked documents are reviewed by the property owner. Unlinked ones by
    /// anyone owning a property the uploader has rented, whatever that rental's status.
    pub fn ensure_document_reviewer(
        &self,
        document: &Document,
        reviewer: UserId,
    ) -> Result<(), MarketplaceError> {
        if self.may_review(document, reviewer)? {
            Ok(())
        } else {
            debug!(document = %document.id, reviewer = %reviewer, "document review refused");
            Err(Denied::NotDocumentReviewer.into())
        }
    }

    pub fn ensure_document_reader(
        &self,
        document: &Document,
        requester: UserId,
    ) -> Result<(), MarketplaceError> {
        if document.uploaded_by == requester || self.may_review(document, requester)? {
            Ok(())
        } else {
            Err(Denied::NotDocumentReader.into())
        }
    }

    pub fn ensure_rental_party(&self, rental: &Rental, user: UserId) -> Result<(), MarketplaceError> {
        if rental.renter_id == user {
            return Ok(());
        }

        match self.repository.fetch_property(rental.property_id)? {
            Some(property) if property.owner_id == user => Ok(()),
            _ => Err(Denied::NotRentalParty.into()),
        }
    }

    fn may_review(&self, document: &Document, reviewer: UserId) -> Result<bool, MarketplaceError> {
        if let Some(property_id) = document.property_id {
            let owner = self
                .repository
                .fetch_property(property_id)?
                .map(|property| property.owner_id);
            return Ok(owner == Some(reviewer));
        }

        let linking = self.repository.rentals(RentalFilter {
            renter_id: Some(document.uploaded_by),
            owner_id: Some(reviewer),
            ..RentalFilter::default()
        })?;
        Ok(!linking.is_empty())
    }
}
