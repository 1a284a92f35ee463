use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::ObjectKey;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Authenticated user id supplied by the identity collaborator.
    UserId
);
numeric_id!(PropertyId);
numeric_id!(RentalId);
numeric_id!(ContractId);
numeric_id!(DocumentId);

/// Full profile of a marketplace user. Contact details are shown only to the user
/// themselves and to parties of a shared rental or contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Profile visible to anyone, without contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: UserId,
    pub username: String,
}

impl From<UserProfile> for PublicProfile {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            username: profile.username,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Available,
    Rented,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub address: String,
    pub city: String,
    pub price: u64,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields a caller supplies when listing a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub address: String,
    pub city: String,
    pub price: u64,
}

/// Partial update applied by the owner; absent fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub price: Option<u64>,
    pub status: Option<PropertyStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RentalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RentalStatus::Pending => "pending",
            RentalStatus::Accepted => "accepted",
            RentalStatus::Rejected => "rejected",
            RentalStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub property_id: PropertyId,
    pub renter_id: UserId,
    pub status: RentalStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Draft,
    PendingSignature,
    Signed,
    Notarized,
}

impl ContractStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ContractStatus::Draft => "DRAFT",
            ContractStatus::PendingSignature => "PENDING_SIGNATURE",
            ContractStatus::Signed => "SIGNED",
            ContractStatus::Notarized => "NOTARIZED",
        }
    }

    /// Whether the artifact may still be (re)rendered. Signed contracts are frozen.
    pub const fn accepts_new_pdf(self) -> bool {
        matches!(self, ContractStatus::Draft | ContractStatus::PendingSignature)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ContractStatus::Notarized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub rental_id: RentalId,
    pub property_id: PropertyId,
    pub tenant_id: UserId,
    pub landlord_id: UserId,
    pub monthly_rent: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub terms: String,
    pub pdf_url: Option<String>,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    pub fn is_party(&self, user: UserId) -> bool {
        self.landlord_id == user || self.tenant_id == user
    }
}

/// Contract joined with both parties and the leased property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractDetails {
    #[serde(flatten)]
    pub contract: Contract,
    pub landlord: UserProfile,
    pub tenant: UserProfile,
    pub property: Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    TenantIdFront,
    TenantIdBack,
    TenantIncomeProof,
    PropertyPhoto,
    PropertyDeed,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::TenantIdFront,
        DocumentType::TenantIdBack,
        DocumentType::TenantIncomeProof,
        DocumentType::PropertyPhoto,
        DocumentType::PropertyDeed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::TenantIdFront => "TENANT_ID_FRONT",
            DocumentType::TenantIdBack => "TENANT_ID_BACK",
            DocumentType::TenantIncomeProof => "TENANT_INCOME_PROOF",
            DocumentType::PropertyPhoto => "PROPERTY_PHOTO",
            DocumentType::PropertyDeed => "PROPERTY_DEED",
        }
    }

    /// Virtual folder the type's blobs are stored under.
    pub fn storage_prefix(self) -> String {
        self.label().to_ascii_lowercase()
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    PendingValidation,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::PendingValidation => "PENDING_VALIDATION",
            DocumentStatus::Approved => "APPROVED",
            DocumentStatus::Rejected => "REJECTED",
        }
    }

    pub const fn is_review_outcome(self) -> bool {
        matches!(self, DocumentStatus::Approved | DocumentStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub storage_key: ObjectKey,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: DocumentType,
    pub status: DocumentStatus,
    pub uploaded_by: UserId,
    pub property_id: Option<PropertyId>,
    /// Empty until the upload has been confirmed against the object store.
    pub storage_url: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn is_confirmed(&self) -> bool {
        !self.storage_url.is_empty()
    }
}

/// Rental as seen by the renter: joined with the property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenterRentalView {
    #[serde(flatten)]
    pub rental: Rental,
    pub property: Property,
}

/// Rental as seen by the owner: joined with the property and the renter's full profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerRentalView {
    #[serde(flatten)]
    pub rental: Rental,
    pub property: Property,
    pub renter: UserProfile,
}

/// Property with its owner's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyView {
    #[serde(flatten)]
    pub property: Property,
    pub owner: PublicProfile,
}
