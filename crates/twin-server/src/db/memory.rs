//! In-memory stores for development and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{DbError, DbResult, MetadataStore, UserStore};
use crate::auth::Identity;
use crate::models::{AssetRecord, AssetUpdate, NewAssetRecord};

#[derive(Debug, Default)]
struct MetadataInner {
    next_id: i64,
    records: BTreeMap<i64, AssetRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: RwLock<MetadataInner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unscoped lookup, for assertions.
    pub async fn find(&self, id: i64) -> Option<AssetRecord> {
        self.inner.read().await.records.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.records.len()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn save(&self, record: NewAssetRecord) -> DbResult<AssetRecord> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let record = record.into_record(inner.next_id);
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64, name: &str) -> DbResult<Option<AssetRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .records
            .get(&id)
            .filter(|r| r.name == name)
            .cloned())
    }

    async fn get_by_date_range(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> DbResult<Vec<AssetRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<AssetRecord> = inner
            .records
            .values()
            .filter(|r| r.name == name)
            .filter(|r| start.map_or(true, |s| r.date >= s))
            .filter(|r| end.map_or(true, |e| r.date <= e))
            .cloned()
            .collect();

        records.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        if let Some(limit) = limit {
            records.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }

        Ok(records)
    }

    async fn update_by_id(
        &self,
        name: &str,
        id: i64,
        update: AssetUpdate,
    ) -> DbResult<AssetRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(&id)
            .filter(|r| r.name == name)
            .ok_or_else(|| DbError::not_found("Asset", &id.to_string()))?;

        update.apply_to(record);
        Ok(record.clone())
    }

    async fn delete(&self, id: i64, name: &str) -> DbResult<bool> {
        let mut inner = self.inner.write().await;
        let owned = inner.records.get(&id).map(|r| r.name == name).unwrap_or(false);
        if owned {
            inner.records.remove(&id);
        }
        Ok(owned)
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, i64>>,
    unavailable: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable user directory.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_or_create(&self, identity: &Identity) -> DbResult<i64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("user store offline".to_string()));
        }

        let mut users = self.users.write().await;
        let next_id = i64::try_from(users.len()).unwrap_or(i64::MAX - 1) + 1;
        Ok(*users.entry(identity.subject.clone()).or_insert(next_id))
    }
}
