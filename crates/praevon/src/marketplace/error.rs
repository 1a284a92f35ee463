use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::authorization::Denied;
use super::domain::{ContractStatus, DocumentType, RentalStatus};
use super::repository::RepositoryError;
use crate::storage::StorageError;

/// Entity kinds named in not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Property,
    Rental,
    Contract,
    ContractPdf,
    Document,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::User => "user",
            EntityKind::Property => "property",
            EntityKind::Rental => "rental",
            EntityKind::Contract => "contract",
            EntityKind::ContractPdf => "contract pdf",
            EntityKind::Document => "document",
        };
        f.write_str(label)
    }
}

/// Out-of-policy input, rejected before any state changes (except orphan cleanup).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown document type '{0}'")]
    UnknownDocumentType(String),
    #[error("file size must be between 1 byte and {max_bytes} bytes for {kind}, got {size}")]
    FileSize {
        kind: DocumentType,
        size: u64,
        max_bytes: u64,
    },
    #[error("mime type '{mime_type}' is not allowed for {kind}; allowed: {allowed}")]
    MimeType {
        kind: DocumentType,
        mime_type: String,
        allowed: String,
    },
    #[error("original file name must not be empty")]
    EmptyFileName,
    #[error("upload confirmation failed: file was never uploaded to storage")]
    NeverUploaded,
    #[error("documents can only be reviewed as APPROVED or REJECTED")]
    InvalidReviewStatus,
    #[error("you cannot rent your own property")]
    SelfRental,
    #[error("you already have a pending rental request for this property")]
    DuplicatePendingRental,
    #[error("rental status can only be changed to accepted, rejected or cancelled, not {}", .0.label())]
    InvalidRentalStatus(RentalStatus),
    #[error("contracts can only be created from an accepted rental (rental is {})", .0.label())]
    RentalNotAccepted(RentalStatus),
    #[error("contract pdf has not been generated for this contract yet")]
    ContractPdfMissing,
    #[error("contract is {} and can no longer move to {}", .from.label(), .to.label())]
    ContractTransition {
        from: ContractStatus,
        to: ContractStatus,
    },
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("duplicate record: {0}")]
    Conflict(String),
}

/// Closed error taxonomy returned by every marketplace manager.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },
    #[error("{0}")]
    Forbidden(Denied),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("storage unavailable: {0}")]
    StorageTransient(String),
}

impl MarketplaceError {
    pub fn not_found(entity: EntityKind, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// HTTP-style status hint for the boundary layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MarketplaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            MarketplaceError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketplaceError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketplaceError::StorageTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<Denied> for MarketplaceError {
    fn from(value: Denied) -> Self {
        Self::Forbidden(value)
    }
}

impl From<RepositoryError> for MarketplaceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Conflict(detail) => {
                Self::Validation(ValidationError::Conflict(detail))
            }
            RepositoryError::Unavailable(reason) => Self::StorageTransient(reason),
        }
    }
}

impl From<StorageError> for MarketplaceError {
    fn from(value: StorageError) -> Self {
        Self::StorageTransient(value.to_string())
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "marketplace request failed");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_hints_cover_the_taxonomy() {
        assert_eq!(
            MarketplaceError::not_found(EntityKind::Contract, 4).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MarketplaceError::from(Denied::NotDocumentUploader).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            MarketplaceError::from(ValidationError::SelfRental).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MarketplaceError::from(StorageError::Unavailable("down".to_string())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn repository_errors_keep_their_meaning() {
        let missing = MarketplaceError::from(RepositoryError::NotFound {
            entity: EntityKind::Rental,
            id: 9,
        });
        assert_eq!(missing.to_string(), "rental 9 not found");

        let conflict = MarketplaceError::from(RepositoryError::Conflict("rental".to_string()));
        assert!(matches!(
            conflict,
            MarketplaceError::Validation(ValidationError::Conflict(_))
        ));
    }
}
