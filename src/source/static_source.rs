use super::{EntityApi, EntitySource, FetchQuery, extract_records};
use crate::core::{EntityId, EntityKind, FetchError, MutationError, Result};
use async_trait::async_trait;
use serde_json::{Value as Json, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    records: HashMap<EntityKind, Vec<Json>>,
    failures: HashMap<EntityKind, FetchError>,
    calls: HashMap<EntityKind, usize>,
    last_query: HashMap<EntityKind, FetchQuery>,
    interests: Vec<(EntityId, String)>,
}

/// In-memory backend: records per kind, scriptable failures, call counts.
///
/// Used by the CLI for file input and by tests as a stand-in for the REST
/// API. Clones share state.
#[derive(Clone, Default)]
pub struct StaticSource {
    inner: Arc<Mutex<Inner>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, kind: EntityKind, records: Vec<Json>) -> Self {
        self.set_records(kind, records);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_records(&self, kind: EntityKind, records: Vec<Json>) {
        self.lock().records.insert(kind, records);
    }

    /// Replace a kind's records from a payload in any accepted shape.
    pub fn set_payload(&self, kind: EntityKind, payload: &Json) -> std::result::Result<(), FetchError> {
        let records = extract_records(kind, payload)?.to_vec();
        self.set_records(kind, records);
        Ok(())
    }

    pub async fn load_file(&self, kind: EntityKind, path: impl AsRef<Path>) -> Result<()> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let payload: Json = serde_json::from_slice(&bytes).map_err(FetchError::from)?;
        self.set_payload(kind, &payload)?;
        Ok(())
    }

    /// Make every following call for `kind` fail with `error`.
    pub fn fail(&self, kind: EntityKind, error: FetchError) {
        self.lock().failures.insert(kind, error);
    }

    pub fn recover(&self, kind: EntityKind) {
        self.lock().failures.remove(&kind);
    }

    pub fn records(&self, kind: EntityKind) -> Vec<Json> {
        self.lock().records.get(&kind).cloned().unwrap_or_default()
    }

    pub fn calls(&self, kind: EntityKind) -> usize {
        self.lock().calls.get(&kind).copied().unwrap_or(0)
    }

    pub fn last_query(&self, kind: EntityKind) -> Option<FetchQuery> {
        self.lock().last_query.get(&kind).cloned()
    }

    pub fn interests(&self) -> Vec<(EntityId, String)> {
        self.lock().interests.clone()
    }

    fn check(&self, kind: EntityKind) -> std::result::Result<(), FetchError> {
        match self.lock().failures.get(&kind) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn position(records: &[Json], id: &EntityId) -> Option<usize> {
        records
            .iter()
            .position(|record| record.get("id").and_then(EntityId::from_json).as_ref() == Some(id))
    }

    fn not_found(kind: EntityKind, id: &EntityId) -> MutationError {
        MutationError::Rejected(FetchError::server(format!("{} {} not found", kind, id)))
    }
}

#[async_trait]
impl EntitySource for StaticSource {
    async fn fetch(
        &self,
        kind: EntityKind,
        query: &FetchQuery,
    ) -> std::result::Result<Json, FetchError> {
        let mut inner = self.lock();
        *inner.calls.entry(kind).or_insert(0) += 1;
        inner.last_query.insert(kind, query.clone());

        if let Some(error) = inner.failures.get(&kind) {
            return Err(error.clone());
        }

        let records = inner.records.get(&kind).cloned().unwrap_or_default();
        let key = kind.schema().payload_keys.first().copied().unwrap_or("items");
        let mut payload = serde_json::Map::new();
        payload.insert(key.to_string(), Json::Array(records));
        Ok(Json::Object(payload))
    }
}

#[async_trait]
impl EntityApi for StaticSource {
    async fn create(
        &self,
        kind: EntityKind,
        payload: &Json,
    ) -> std::result::Result<Json, MutationError> {
        self.check(kind)?;
        let mut record = payload
            .as_object()
            .cloned()
            .ok_or_else(|| MutationError::Rejected(FetchError::server("payload must be an object")))?;

        let mut inner = self.lock();
        let records = inner.records.entry(kind).or_default();
        let next_id = records
            .iter()
            .filter_map(|record| record.get("id").and_then(Json::as_i64))
            .max()
            .unwrap_or(0)
            + 1;
        record.insert("id".to_string(), Json::from(next_id));

        let record = Json::Object(record);
        records.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Json,
    ) -> std::result::Result<Json, MutationError> {
        self.check(kind)?;
        let mut inner = self.lock();
        let records = inner.records.entry(kind).or_default();
        let index = Self::position(records, id).ok_or_else(|| Self::not_found(kind, id))?;

        if let (Some(target), Some(changes)) = (records[index].as_object_mut(), payload.as_object()) {
            for (field, value) in changes {
                if field != "id" {
                    target.insert(field.clone(), value.clone());
                }
            }
        }
        Ok(records[index].clone())
    }

    async fn delete(&self, kind: EntityKind, id: &EntityId) -> std::result::Result<(), MutationError> {
        self.check(kind)?;
        let mut inner = self.lock();
        let records = inner.records.entry(kind).or_default();
        let index = Self::position(records, id).ok_or_else(|| Self::not_found(kind, id))?;
        records.remove(index);
        Ok(())
    }

    async fn update_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        status: &str,
    ) -> std::result::Result<(), MutationError> {
        self.update(kind, id, &json!({ "status": status })).await.map(|_| ())
    }

    async fn express_interest(
        &self,
        post_id: &EntityId,
        message: &str,
    ) -> std::result::Result<(), MutationError> {
        self.check(EntityKind::Posts)?;
        let mut inner = self.lock();
        let records = inner.records.entry(EntityKind::Posts).or_default();
        let index = Self::position(records, post_id)
            .ok_or_else(|| Self::not_found(EntityKind::Posts, post_id))?;

        if let Some(post) = records[index].as_object_mut() {
            let count = post.get("interest_count").and_then(Json::as_i64).unwrap_or(0);
            post.insert("interest_count".to_string(), Json::from(count + 1));
        }
        inner.interests.push((post_id.clone(), message.to_string()));
        Ok(())
    }
}
