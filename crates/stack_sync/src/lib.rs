pub mod document;
pub mod json_store;
pub mod store;
pub mod sync;

use anyhow::{Context, Result};

use stack_domain::{HabitStackService, StackConfig};

pub use crate::document::HabitDocument;
pub use crate::json_store::JsonDirStore;
pub use crate::store::{HabitStore, MemoryStore, StoreError};
pub use crate::sync::{PersistFailure, PersistJob, SnapshotOutcome, StackSync, SyncReport};

/// Opens the JSON directory store named by `config` and loads it into a
/// fresh service.
pub async fn open_json_sync(config: &StackConfig) -> Result<StackSync<JsonDirStore>> {
    let root = config
        .store_root
        .as_ref()
        .context("no habit store root configured")?;
    let store = JsonDirStore::open(root)?;
    let service = HabitStackService::builder().with_config(config).build();
    let mut sync = StackSync::new(service, store);
    let outcome = sync
        .refresh_from_store()
        .await
        .with_context(|| format!("unable to load habits from {}", root.display()))?;
    if let SnapshotOutcome::Applied(report) = &outcome {
        if !report.is_clean() {
            tracing::info!(
                dropped = report.dropped.len(),
                repaired = report.repaired.len(),
                "habit store needed repairs on load"
            );
        }
    }
    Ok(sync)
}
