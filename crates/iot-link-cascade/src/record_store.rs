//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result as AnyResult};
use async_trait::async_trait;
use iot_link_common::config::AppConfig;
use iot_link_transport::{BoxId, Target};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// Network identity of a box as kept by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    /// Address on the box's local network.
    pub ip: String,
    /// Stable box identifier.
    pub identifier: String,
}

/// Failures reported by a [`RecordStore`].
#[derive(Debug, Clone, Error)]
pub enum RecordStoreError {
    /// No record exists for the box.
    #[error("box {0} not found in record store")]
    NotFound(BoxId),
    /// The store could not be queried.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// External store holding the network identity of each box.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record for one box.
    async fn lookup(&self, box_id: BoxId) -> Result<BoxRecord, RecordStoreError>;
}

/// Record store backed by the `[boxes]` configuration table.
#[derive(Debug, Clone, Default)]
pub struct StaticRecordStore {
    records: HashMap<BoxId, BoxRecord>,
}

impl StaticRecordStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record.
    pub fn with_box(
        mut self,
        box_id: BoxId,
        ip: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        self.records.insert(
            box_id,
            BoxRecord {
                ip: ip.into(),
                identifier: identifier.into(),
            },
        );
        self
    }

    /// Build the store from the configured box table.
    pub fn from_config(config: &AppConfig) -> AnyResult<Self> {
        let mut store = Self::new();
        for (key, record) in &config.boxes {
            let box_id = key
                .trim()
                .parse::<BoxId>()
                .map_err(|_| anyhow!("box key '{}' is not a numeric record id", key))?;
            store = store.with_box(box_id, record.ip.clone(), record.identifier.clone());
        }
        Ok(store)
    }

    /// Iterate over the known records, ordered by box id.
    pub fn records(&self) -> Vec<(BoxId, &BoxRecord)> {
        let mut records: Vec<_> = self.records.iter().map(|(id, rec)| (*id, rec)).collect();
        records.sort_by_key(|(id, _)| *id);
        records
    }
}

#[async_trait]
impl RecordStore for StaticRecordStore {
    async fn lookup(&self, box_id: BoxId) -> Result<BoxRecord, RecordStoreError> {
        self.records
            .get(&box_id)
            .cloned()
            .ok_or(RecordStoreError::NotFound(box_id))
    }
}

/// Memoizes record store lookups for the lifetime of the service.
///
/// Concurrent resolutions of the same box share a single lookup. Failed lookups
/// are not cached.
pub struct TargetCache {
    store: Arc<dyn RecordStore>,
    entries: Mutex<HashMap<BoxId, Arc<OnceCell<Target>>>>,
}

impl TargetCache {
    /// Wrap a record store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a box id to its target, querying the store at most once per box.
    pub async fn resolve(&self, box_id: BoxId) -> Result<Target, RecordStoreError> {
        let cell = self.entries.lock().entry(box_id).or_default().clone();
        let resolved = cell
            .get_or_try_init(|| async {
                let record = self.store.lookup(box_id).await?;
                debug!(box_id, ip = %record.ip, identifier = %record.identifier, "resolved box identity");
                Ok::<_, RecordStoreError>(Target::new(box_id, record.ip, record.identifier))
            })
            .await;
        match resolved {
            Ok(target) => Ok(target.clone()),
            Err(err) => {
                self.evict_empty(box_id, &cell);
                Err(err)
            }
        }
    }

    /// Drop the slot of a failed lookup unless a concurrent caller has filled or replaced it.
    fn evict_empty(&self, box_id: BoxId, cell: &Arc<OnceCell<Target>>) {
        let mut entries = self.entries.lock();
        let stale = entries
            .get(&box_id)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            entries.remove(&box_id);
        }
    }

    /// Already-resolved target, if any.
    pub fn cached(&self, box_id: BoxId) -> Option<Target> {
        self.entries
            .lock()
            .get(&box_id)
            .and_then(|cell| cell.get().cloned())
    }
}

impl std::fmt::Debug for TargetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetCache")
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}
