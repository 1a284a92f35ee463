//! Object storage boundary and the capability URL issuer wrapping it.

mod capability;
mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use capability::{CapabilityError, CapabilityGrant, CapabilityIssuer, Permission};
pub use memory::InMemoryObjectStore;

/// Key of a blob inside the configured container, e.g. `tenant_id_front/<uuid>.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, StorageError> {
        let raw = raw.into();
        let well_formed = !raw.is_empty()
            && !raw.starts_with('/')
            && !raw.ends_with('/')
            && raw
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));

        if well_formed {
            Ok(Self(raw))
        } else {
            Err(StorageError::InvalidKey(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectKey> for String {
    fn from(value: ObjectKey) -> Self {
        value.0
    }
}

/// Blob payload plus the content type it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Operations consumed from the blob store. Capability URLs are minted locally by
/// [`CapabilityIssuer`], so the store itself only moves bytes.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &ObjectKey, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;
    fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StorageError>;
    fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError>;
    /// Returns whether an object was actually removed. Absent objects are not an error.
    fn delete_if_exists(&self, key: &ObjectKey) -> Result<bool, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error("url '{0}' does not address the configured storage container")]
    ForeignUrl(String),
    #[error("capability signing key rejected")]
    InvalidSigningKey,
}
