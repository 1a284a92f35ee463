use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};
use url::Url;

use super::{ObjectKey, ObjectStore, StorageError};
use crate::clock::{Clock, SystemClock};
use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

/// The single permission a capability URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    const fn code(self) -> &'static str {
        match self {
            Permission::Read => "r",
            Permission::Write => "w",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "r" => Some(Permission::Read),
            "w" => Some(Permission::Write),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Read => f.write_str("read"),
            Permission::Write => f.write_str("write"),
        }
    }
}

/// Claims carried by a verified capability URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityGrant {
    pub key: ObjectKey,
    pub permission: Permission,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub content_type: Option<String>,
}

impl CapabilityGrant {
    /// Write grants pin a content type; anything else on the request is refused.
    pub fn permits_content_type(&self, content_type: &str) -> bool {
        match &self.content_type {
            Some(pinned) => essence(pinned) == essence(content_type),
            None => true,
        }
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("capability url is missing or has a malformed '{0}' parameter")]
    Malformed(&'static str),
    #[error("capability signature does not match")]
    BadSignature,
    #[error("capability grants {granted} access but {required} was requested")]
    PermissionMismatch {
        required: Permission,
        granted: Permission,
    },
    #[error("capability is not valid before {0}")]
    NotYetValid(DateTime<Utc>),
    #[error("capability expired at {0}")]
    Expired(DateTime<Utc>),
}

/// Mints time-bounded, single-permission URLs for objects in one container.
///
/// Tokens are stateless HMAC signatures: there is no revocation list, an issued URL
/// stays usable until its expiry passes.
pub struct CapabilityIssuer<S> {
    store: Arc<S>,
    base_url: Url,
    container: String,
    mac: HmacSha256,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<S> CapabilityIssuer<S>
where
    S: ObjectStore,
{
    pub fn new(store: Arc<S>, config: &StorageConfig) -> Result<Self, StorageError> {
        let mac = HmacSha256::new_from_slice(&config.signing_key)
            .map_err(|_| StorageError::InvalidSigningKey)?;

        Ok(Self {
            store,
            base_url: config.base_url.clone(),
            container: config.container.clone(),
            mac,
            default_ttl: config.url_ttl(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Canonical, unsigned location of `key`. This is what gets persisted on records.
    pub fn object_url(&self, key: &ObjectKey) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("{}{}", self.resource_prefix(), key.as_str()));
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Inverse of [`Self::object_url`]; query parameters are ignored.
    pub fn key_from_url(&self, url: &Url) -> Result<ObjectKey, StorageError> {
        if url.origin() != self.base_url.origin() {
            return Err(StorageError::ForeignUrl(url.to_string()));
        }

        let prefix = self.resource_prefix();
        let key = url
            .path()
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;
        ObjectKey::new(key)
    }

    pub fn issue_write_url(&self, key: &ObjectKey, content_type: &str, ttl: Duration) -> Url {
        debug!(key = %key, content_type, ttl_secs = ttl.num_seconds(), "issuing write capability");
        self.issue(key, Permission::Write, Some(content_type), ttl)
    }

    pub fn issue_read_url(&self, key: &ObjectKey, ttl: Duration) -> Url {
        debug!(key = %key, ttl_secs = ttl.num_seconds(), "issuing read capability");
        self.issue(key, Permission::Read, None, ttl)
    }

    pub fn object_exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        self.store.exists(key)
    }

    pub fn delete_if_exists(&self, key: &ObjectKey) -> Result<(), StorageError> {
        let removed = self.store.delete_if_exists(key)?;
        if !removed {
            debug!(key = %key, "object already absent");
        }
        Ok(())
    }

    /// Server-side write used for generated artifacts; returns the canonical URL.
    pub fn upload(
        &self,
        key: &ObjectKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Url, StorageError> {
        let size = bytes.len();
        self.store.put(key, bytes, content_type)?;
        debug!(key = %key, size, content_type, "uploaded object");
        Ok(self.object_url(key))
    }

    /// Checks signature, scope and validity window of a capability URL.
    pub fn verify(
        &self,
        url: &Url,
        required: Permission,
    ) -> Result<CapabilityGrant, CapabilityError> {
        let key = self.key_from_url(url)?;

        let mut permission = None;
        let mut starts = None;
        let mut expires = None;
        let mut content_type = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "sp" => permission = Permission::from_code(&value),
                "st" => starts = value.parse::<i64>().ok(),
                "se" => expires = value.parse::<i64>().ok(),
                "rsct" => content_type = Some(value.into_owned()),
                "sig" => signature = hex::decode(value.as_bytes()).ok(),
                _ => {}
            }
        }

        let permission = permission.ok_or(CapabilityError::Malformed("sp"))?;
        let starts = starts.ok_or(CapabilityError::Malformed("st"))?;
        let expires = expires.ok_or(CapabilityError::Malformed("se"))?;
        let signature = signature.ok_or(CapabilityError::Malformed("sig"))?;

        let mut mac = self.mac.clone();
        mac.update(
            self.string_to_sign(permission, starts, expires, &key, content_type.as_deref())
                .as_bytes(),
        );
        if mac.verify_slice(&signature).is_err() {
            warn!(key = %key, "rejected capability with bad signature");
            return Err(CapabilityError::BadSignature);
        }

        if permission != required {
            return Err(CapabilityError::PermissionMismatch {
                required,
                granted: permission,
            });
        }

        let starts_at = timestamp(starts).ok_or(CapabilityError::Malformed("st"))?;
        let expires_at = timestamp(expires).ok_or(CapabilityError::Malformed("se"))?;
        let now = self.clock.now();
        if now < starts_at {
            return Err(CapabilityError::NotYetValid(starts_at));
        }
        if now > expires_at {
            return Err(CapabilityError::Expired(expires_at));
        }

        Ok(CapabilityGrant {
            key,
            permission,
            starts_at,
            expires_at,
            content_type,
        })
    }

    fn issue(
        &self,
        key: &ObjectKey,
        permission: Permission,
        content_type: Option<&str>,
        ttl: Duration,
    ) -> Url {
        let starts = self.clock.now().timestamp();
        let expires = starts + ttl.num_seconds();

        let mut mac = self.mac.clone();
        mac.update(
            self.string_to_sign(permission, starts, expires, key, content_type)
                .as_bytes(),
        );
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut url = self.object_url(key);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("sp", permission.code())
                .append_pair("st", &starts.to_string())
                .append_pair("se", &expires.to_string());
            if let Some(content_type) = content_type {
                query.append_pair("rsct", content_type);
            }
            query.append_pair("sig", &signature);
        }
        url
    }

    fn string_to_sign(
        &self,
        permission: Permission,
        starts: i64,
        expires: i64,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> String {
        format!(
            "{}\n{}\n{}\n/{}/{}\n{}",
            permission.code(),
            starts,
            expires,
            self.container,
            key.as_str(),
            content_type.unwrap_or_default()
        )
    }

    fn resource_prefix(&self) -> String {
        format!(
            "{}/{}/",
            self.base_url.path().trim_end_matches('/'),
            self.container
        )
    }
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::InMemoryObjectStore;

    fn storage_config() -> StorageConfig {
        StorageConfig {
            base_url: Url::parse("http://127.0.0.1:3000/blob").expect("valid url"),
            container: "documents".to_string(),
            signing_key: b"test-signing-key".to_vec(),
            url_ttl_minutes: 10,
        }
    }

    fn issuer() -> (CapabilityIssuer<InMemoryObjectStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
                .single()
                .expect("valid instant"),
        ));
        let issuer = CapabilityIssuer::new(Arc::new(InMemoryObjectStore::default()), &storage_config())
            .expect("issuer builds")
            .with_clock(clock.clone());
        (issuer, clock)
    }

    fn key() -> ObjectKey {
        ObjectKey::new("tenant_id_front/abc.jpg").expect("valid key")
    }

    #[test]
    fn object_url_round_trips_through_key_from_url() {
        let (issuer, _) = issuer();
        let url = issuer.object_url(&key());
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:3000/blob/documents/tenant_id_front/abc.jpg"
        );
        assert_eq!(issuer.key_from_url(&url).expect("key parses"), key());
    }

    #[test]
    fn write_url_verifies_with_pinned_content_type() {
        let (issuer, _) = issuer();
        let url = issuer.issue_write_url(&key(), "image/jpeg", Duration::minutes(10));

        let grant = issuer.verify(&url, Permission::Write).expect("grant verifies");
        assert_eq!(grant.key, key());
        assert_eq!(grant.permission, Permission::Write);
        assert_eq!(grant.expires_at - grant.starts_at, Duration::minutes(10));
        assert!(grant.permits_content_type("image/jpeg"));
        assert!(grant.permits_content_type("IMAGE/JPEG; charset=binary"));
        assert!(!grant.permits_content_type("application/pdf"));
    }

    #[test]
    fn read_url_cannot_be_used_for_writes() {
        let (issuer, _) = issuer();
        let url = issuer.issue_read_url(&key(), Duration::minutes(10));

        match issuer.verify(&url, Permission::Write) {
            Err(CapabilityError::PermissionMismatch { required, granted }) => {
                assert_eq!(required, Permission::Write);
                assert_eq!(granted, Permission::Read);
            }
            other => panic!("expected permission mismatch, got {other:?}"),
        }
    }

    #[test]
    fn expired_capability_is_rejected() {
        let (issuer, clock) = issuer();
        let url = issuer.issue_read_url(&key(), Duration::minutes(10));

        clock.advance(Duration::minutes(11));
        assert!(matches!(
            issuer.verify(&url, Permission::Read),
            Err(CapabilityError::Expired(_))
        ));
    }

    #[test]
    fn tampered_key_fails_signature_check() {
        let (issuer, _) = issuer();
        let url = issuer.issue_read_url(&key(), Duration::minutes(10));
        let tampered = Url::parse(
            &url.as_str()
                .replace("tenant_id_front/abc.jpg", "tenant_id_front/other.jpg"),
        )
        .expect("valid url");

        assert!(matches!(
            issuer.verify(&tampered, Permission::Read),
            Err(CapabilityError::BadSignature)
        ));
    }

    #[test]
    fn foreign_urls_are_not_mapped_to_keys() {
        let (issuer, _) = issuer();
        let foreign = Url::parse("https://elsewhere.example/blob/documents/a.pdf").expect("url");
        assert!(matches!(
            issuer.key_from_url(&foreign),
            Err(StorageError::ForeignUrl(_))
        ));

        let other_container =
            Url::parse("http://127.0.0.1:3000/blob/archive/a.pdf").expect("url");
        assert!(matches!(
            issuer.key_from_url(&other_container),
            Err(StorageError::ForeignUrl(_))
        ));
    }

    #[test]
    fn delete_if_exists_tolerates_missing_objects() {
        let (issuer, _) = issuer();
        issuer
            .upload(&key(), vec![1, 2, 3], "image/jpeg")
            .expect("upload succeeds");
        assert!(issuer.object_exists(&key()).expect("exists check"));

        issuer.delete_if_exists(&key()).expect("first delete");
        issuer.delete_if_exists(&key()).expect("second delete is a no-op");
        assert!(!issuer.object_exists(&key()).expect("exists check"));
    }
}
