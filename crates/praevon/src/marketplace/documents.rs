use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::authorization::{AccessResolver, Denied};
use super::domain::{Document, DocumentId, DocumentStatus, DocumentType, PropertyId, UserId};
use super::error::{EntityKind, MarketplaceError, ValidationError};
use super::repository::{MarketplaceRepository, NewDocument};
use crate::clock::Clock;
use crate::storage::{CapabilityIssuer, ObjectKey, ObjectStore};

const MIB: u64 = 1024 * 1024;
const IMAGE_MIMES: &[&str] = &["image/jpeg", "image/png"];
const PDF_MIMES: &[&str] = &["application/pdf"];

/// Size ceiling and accepted MIME essences for one document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRule {
    pub max_bytes: u64,
    pub allowed_mimes: &'static [&'static str],
}

impl DocumentRule {
    pub const fn for_type(kind: DocumentType) -> Self {
        match kind {
            DocumentType::TenantIdFront | DocumentType::TenantIdBack => Self {
                max_bytes: 5 * MIB,
                allowed_mimes: IMAGE_MIMES,
            },
            DocumentType::TenantIncomeProof => Self {
                max_bytes: 10 * MIB,
                allowed_mimes: PDF_MIMES,
            },
            DocumentType::PropertyPhoto => Self {
                max_bytes: 15 * MIB,
                allowed_mimes: IMAGE_MIMES,
            },
            DocumentType::PropertyDeed => Self {
                max_bytes: 20 * MIB,
                allowed_mimes: PDF_MIMES,
            },
        }
    }

    /// Validates an upload declaration. Parameters on the MIME type are ignored.
    pub fn check(&self, kind: DocumentType, mime_type: &str, size: u64) -> Result<(), ValidationError> {
        if size == 0 || size > self.max_bytes {
            return Err(ValidationError::FileSize {
                kind,
                size,
                max_bytes: self.max_bytes,
            });
        }

        let allowed = mime_type
            .parse::<mime::Mime>()
            .map(|parsed| {
                self.allowed_mimes
                    .iter()
                    .any(|allowed| *allowed == parsed.essence_str())
            })
            .unwrap_or(false);
        if !allowed {
            return Err(ValidationError::MimeType {
                kind,
                mime_type: mime_type.to_string(),
                allowed: self.allowed_mimes.join(", "),
            });
        }

        Ok(())
    }
}

/// Upload declaration sent by the client before any bytes move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTicket {
    pub upload_url: String,
    pub document_id: DocumentId,
    pub expires_at: DateTime<Utc>,
}

/// Document intake, confirmation, review and retrieval.
pub struct DocumentService<R, S> {
    repository: Arc<R>,
    storage: Arc<CapabilityIssuer<S>>,
    clock: Arc<dyn Clock>,
}

impl<R, S> DocumentService<R, S>
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    pub fn new(repository: Arc<R>, storage: Arc<CapabilityIssuer<S>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            storage,
            clock,
        }
    }

    /// Creates the pending record and hands back a write-only URL for the bytes.
    #[instrument(skip(self, request), fields(kind = %request.kind, size = request.size))]
    pub fn prepare_upload(
        &self,
        request: UploadRequest,
        uploader: UserId,
    ) -> Result<UploadTicket, MarketplaceError> {
        let kind: DocumentType = request
            .kind
            .parse()
            .map_err(ValidationError::UnknownDocumentType)?;
        if request.original_name.trim().is_empty() {
            return Err(ValidationError::EmptyFileName.into());
        }
        DocumentRule::for_type(kind).check(kind, &request.mime_type, request.size)?;

        if let Some(property_id) = request.property_id {
            let property = self
                .repository
                .fetch_property(property_id)?
                .ok_or_else(|| MarketplaceError::not_found(EntityKind::Property, property_id.0))?;
            AccessResolver::new(self.repository.as_ref()).ensure_property_owner(&property, uploader)?;
        }

        let storage_key = storage_key_for(kind, &request.original_name)?;
        let now = self.clock.now();
        let document = self.repository.insert_document(NewDocument {
            storage_key,
            original_name: request.original_name,
            mime_type: request.mime_type,
            size: request.size,
            kind,
            status: DocumentStatus::PendingValidation,
            uploaded_by: uploader,
            property_id: request.property_id,
            created_at: now,
        })?;

        let ttl = self.storage.default_ttl();
        let upload_url =
            self.storage
                .issue_write_url(&document.storage_key, &document.mime_type, ttl);
        info!(document = %document.id, key = %document.storage_key, "document upload prepared");

        Ok(UploadTicket {
            upload_url: upload_url.into(),
            document_id: document.id,
            expires_at: now + ttl,
        })
    }

    /// Checks the object landed in storage. A record whose bytes never arrived is deleted.
    #[instrument(skip(self))]
    pub fn confirm_upload(
        &self,
        document_id: DocumentId,
        requester: UserId,
    ) -> Result<Document, MarketplaceError> {
        let mut document = self
            .repository
            .fetch_document(document_id)?
            .filter(|document| document.uploaded_by == requester)
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Document, document_id.0))?;

        if !self.storage.object_exists(&document.storage_key)? {
            self.repository.delete_document(document.id)?;
            warn!(document = %document.id, key = %document.storage_key, "removed orphaned document record");
            return Err(ValidationError::NeverUploaded.into());
        }

        document.storage_url = self.storage.object_url(&document.storage_key).into();
        self.repository.update_document(document.clone())?;
        info!(document = %document.id, "document upload confirmed");
        Ok(document)
    }

    #[instrument(skip(self))]
    pub fn review_document(
        &self,
        document_id: DocumentId,
        status: DocumentStatus,
        reviewer: UserId,
    ) -> Result<Document, MarketplaceError> {
        if !status.is_review_outcome() {
            return Err(ValidationError::InvalidReviewStatus.into());
        }

        let mut document = self.require_document(document_id)?;
        AccessResolver::new(self.repository.as_ref()).ensure_document_reviewer(&document, reviewer)?;

        document.status = status;
        self.repository.update_document(document.clone())?;
        info!(document = %document.id, status = status.label(), "document reviewed");
        Ok(document)
    }

    pub fn my_documents(&self, user: UserId) -> Result<Vec<Document>, MarketplaceError> {
        Ok(self.repository.documents_uploaded_by(user)?)
    }

    #[instrument(skip(self))]
    pub fn download_url(
        &self,
        document_id: DocumentId,
        requester: UserId,
    ) -> Result<Url, MarketplaceError> {
        let document = self.require_document(document_id)?;
        AccessResolver::new(self.repository.as_ref()).ensure_document_reader(&document, requester)?;

        Ok(self
            .storage
            .issue_read_url(&document.storage_key, self.storage.default_ttl()))
    }

    /// Removes the blob, then the record. A missing document is reported as forbidden so
    /// callers cannot probe for ids they do not own.
    #[instrument(skip(self))]
    pub fn delete_document(
        &self,
        document_id: DocumentId,
        requester: UserId,
    ) -> Result<(), MarketplaceError> {
        let document = match self.repository.fetch_document(document_id)? {
            Some(document) if document.uploaded_by == requester => document,
            _ => return Err(Denied::NotDocumentUploader.into()),
        };

        if let Err(error) = self.storage.delete_if_exists(&document.storage_key) {
            warn!(document = %document.id, key = %document.storage_key, %error, "storage delete failed; keeping record");
            return Err(error.into());
        }

        self.repository.delete_document(document.id)?;
        info!(document = %document.id, "document deleted");
        Ok(())
    }

    fn require_document(&self, document_id: DocumentId) -> Result<Document, MarketplaceError> {
        self.repository
            .fetch_document(document_id)?
            .ok_or_else(|| MarketplaceError::not_found(EntityKind::Document, document_id.0))
    }
}

/// `{type}/{uuid}{.ext}` where the extension keeps only ASCII alphanumerics of the original.
pub fn storage_key_for(kind: DocumentType, original_name: &str) -> Result<ObjectKey, MarketplaceError> {
    let extension = original_name
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .take(16)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let raw = format!("{}/{}{}", kind.storage_prefix(), Uuid::new_v4(), extension);
    Ok(ObjectKey::new(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_table_matches_document_types() {
        let deed = DocumentRule::for_type(DocumentType::PropertyDeed);
        assert_eq!(deed.max_bytes, 20 * MIB);
        assert_eq!(deed.allowed_mimes, &[mime::APPLICATION_PDF.essence_str()]);

        let front = DocumentRule::for_type(DocumentType::TenantIdFront);
        assert_eq!(front.max_bytes, 5 * MIB);
        assert!(front.allowed_mimes.contains(&mime::IMAGE_PNG.essence_str()));
        assert!(front.allowed_mimes.contains(&mime::IMAGE_JPEG.essence_str()));
    }

    #[test]
    fn size_bounds_are_inclusive() {
        let kind = DocumentType::TenantIdFront;
        let rule = DocumentRule::for_type(kind);
        assert!(rule.check(kind, "image/png", 5 * MIB).is_ok());
        assert!(matches!(
            rule.check(kind, "image/png", 5 * MIB + 1),
            Err(ValidationError::FileSize { .. })
        ));
        assert!(matches!(
            rule.check(kind, "image/png", 0),
            Err(ValidationError::FileSize { .. })
        ));
    }

    #[test]
    fn mime_parameters_do_not_change_the_essence() {
        let kind = DocumentType::TenantIncomeProof;
        let rule = DocumentRule::for_type(kind);
        assert!(rule.check(kind, "application/pdf; name=payslip", 1024).is_ok());
        assert!(matches!(
            rule.check(kind, "image/jpeg", 1024),
            Err(ValidationError::MimeType { .. })
        ));
        assert!(matches!(
            rule.check(kind, "not a mime", 1024),
            Err(ValidationError::MimeType { .. })
        ));
    }

    #[test]
    fn storage_keys_are_namespaced_and_sanitized() {
        let key = storage_key_for(DocumentType::TenantIdFront, "My Scan.JPG").expect("key");
        assert!(key.as_str().starts_with("tenant_id_front/"));
        assert!(key.as_str().ends_with(".jpg"));

        let bare = storage_key_for(DocumentType::PropertyDeed, "deed").expect("key");
        assert!(!bare.as_str().contains('.'));

        let hostile = storage_key_for(DocumentType::PropertyDeed, "x.p/d?f").expect("key");
        assert!(hostile.as_str().ends_with(".pdf"));

        let dotfile = storage_key_for(DocumentType::PropertyPhoto, ".hidden").expect("key");
        assert_eq!(dotfile.as_str().split('/').count(), 2);
        assert!(!dotfile.as_str().contains('.'));
    }
}
