//! Collaborator contract for the platform backend.
//!
//! The store never speaks HTTP itself. Per entity kind it needs a fetch
//! that returns raw JSON (`{"items": [...]}`, the kind's own wrapper key, or
//! a bare array) and, for pages that edit data, the optional mutations of
//! [`EntityApi`].

pub mod rest;
pub mod static_source;

pub use rest::RestSource;
pub use static_source::StaticSource;

use crate::core::{EntityId, EntityKind, FetchError, MutationError};
use async_trait::async_trait;
use serde::Serialize;

/// Optional server-side filters a page passes along with a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchQuery {
    pub region: Option<String>,
    pub region_id: Option<EntityId>,
    pub season: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub warehouse_id: Option<EntityId>,
    pub user_id: Option<EntityId>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl FetchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    pub fn region_id(mut self, id: impl Into<EntityId>) -> Self {
        self.region_id = Some(id.into());
        self
    }

    pub fn season(mut self, season: &str) -> Self {
        self.season = Some(season.to_string());
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn search(mut self, search: &str) -> Self {
        self.search = Some(search.to_string());
        self
    }

    pub fn warehouse_id(mut self, id: impl Into<EntityId>) -> Self {
        self.warehouse_id = Some(id.into());
        self
    }

    pub fn user_id(mut self, id: impl Into<EntityId>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }

    /// Query-string pairs, skipping empty values and the "All" sentinel.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                let trimmed = value.trim();
                if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("all") {
                    pairs.push((key, trimmed.to_string()));
                }
            }
        };

        push("region", self.region.clone());
        push("season", self.season.clone());
        push("category", self.category.clone());
        push("status", self.status.clone());
        push("search", self.search.clone());
        push("warehouse_id", self.warehouse_id.as_ref().map(EntityId::to_string));
        push("user_id", self.user_id.as_ref().map(EntityId::to_string));
        push("page", self.page.map(|page| page.to_string()));
        push("per_page", self.per_page.map(|per_page| per_page.to_string()));
        pairs
    }
}

#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn fetch(
        &self,
        kind: EntityKind,
        query: &FetchQuery,
    ) -> Result<serde_json::Value, FetchError>;
}

/// Mutations some pages perform. Sources that cannot mutate keep the
/// defaults, which report `Unsupported`.
#[async_trait]
pub trait EntityApi: EntitySource {
    async fn create(
        &self,
        _kind: EntityKind,
        _payload: &serde_json::Value,
    ) -> Result<serde_json::Value, MutationError> {
        Err(MutationError::Unsupported("create"))
    }

    async fn update(
        &self,
        _kind: EntityKind,
        _id: &EntityId,
        _payload: &serde_json::Value,
    ) -> Result<serde_json::Value, MutationError> {
        Err(MutationError::Unsupported("update"))
    }

    async fn delete(&self, _kind: EntityKind, _id: &EntityId) -> Result<(), MutationError> {
        Err(MutationError::Unsupported("delete"))
    }

    async fn update_status(
        &self,
        _kind: EntityKind,
        _id: &EntityId,
        _status: &str,
    ) -> Result<(), MutationError> {
        Err(MutationError::Unsupported("update_status"))
    }

    async fn express_interest(
        &self,
        _post_id: &EntityId,
        _message: &str,
    ) -> Result<(), MutationError> {
        Err(MutationError::Unsupported("express_interest"))
    }
}

/// Locate the record list inside a payload.
///
/// A missing wrapper key reads as an empty list, the way the pages fall
/// back to `data.warehouses || []`.
pub fn extract_records(
    kind: EntityKind,
    payload: &serde_json::Value,
) -> Result<&[serde_json::Value], FetchError> {
    match payload {
        serde_json::Value::Array(records) => Ok(records.as_slice()),
        serde_json::Value::Object(object) => {
            let found = std::iter::once("items")
                .chain(kind.schema().payload_keys.iter().copied())
                .find_map(|key| object.get(key));
            match found {
                Some(serde_json::Value::Array(records)) => Ok(records.as_slice()),
                Some(other) => Err(FetchError::decode(format!(
                    "{} payload list is not an array: {}",
                    kind, other
                ))),
                None => Ok(&[]),
            }
        }
        other => Err(FetchError::decode(format!(
            "{} payload is neither a list nor an object: {}",
            kind, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_skip_all_and_empty() {
        let query = FetchQuery::new()
            .region("All")
            .season("rainy")
            .category("  ")
            .region_id(5)
            .page(1, 20);

        assert_eq!(
            query.pairs(),
            vec![
                ("season", "rainy".to_string()),
                ("page", "1".to_string()),
                ("per_page", "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_records_wrapper_keys() {
        let payload = json!({"applications": [{"id": 1}]});
        assert_eq!(
            extract_records(EntityKind::LoanApplications, &payload)
                .unwrap()
                .len(),
            1
        );

        let payload = json!({"regions": "broken"});
        assert!(extract_records(EntityKind::Regions, &payload).is_err());
    }
}
