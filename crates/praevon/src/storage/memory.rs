use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ObjectKey, ObjectStore, StorageError, StoredObject};

/// Process-local blob store used by the development server and the test suites.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<HashMap<ObjectKey, StoredObject>>>,
}

impl InMemoryObjectStore {
    fn objects(&self) -> Result<MutexGuard<'_, HashMap<ObjectKey, StoredObject>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Unavailable("object store mutex poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects().map(|objects| objects.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(
        &self,
        key: &ObjectKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects()?.insert(
            key.clone(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StorageError> {
        Ok(self.objects()?.get(key).cloned())
    }

    fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        Ok(self.objects()?.contains_key(key))
    }

    fn delete_if_exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        Ok(self.objects()?.remove(key).is_some())
    }
}
