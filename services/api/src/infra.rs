use metrics_exporter_prometheus::PrometheusHandle;
use praevon::clock::Clock;
use praevon::config::StorageConfig;
use praevon::marketplace::{InMemoryRepository, Marketplace};
use praevon::pdf::LeasePdfRenderer;
use praevon::storage::{CapabilityIssuer, InMemoryObjectStore, StorageError};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Marketplace backed by the process-local repository and blob emulator.
pub(crate) type PlatformMarketplace = Marketplace<InMemoryRepository, InMemoryObjectStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn in_memory_marketplace(
    storage: &StorageConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<PlatformMarketplace>, StorageError> {
    let store = Arc::new(InMemoryObjectStore::default());
    let issuer = CapabilityIssuer::new(store, storage)?.with_clock(clock.clone());

    Ok(Arc::new(Marketplace::new(
        Arc::new(InMemoryRepository::default()),
        Arc::new(issuer),
        Box::new(LeasePdfRenderer),
        clock,
    )))
}

/// Mount point of the blob emulator: the path component of the storage base URL.
pub(crate) fn blob_route(storage_base_path: &str) -> String {
    format!("{}/*object", storage_base_path.trim_end_matches('/'))
}
