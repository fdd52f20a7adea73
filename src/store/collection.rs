use crate::core::{Entity, EntityId, EntityKind, FetchError};
use crate::source::extract_records;
use chrono::{DateTime, Utc};
use im::Vector;

/// Ordered entities of one kind as returned by the most recent fetch.
///
/// Backed by a persistent vector: cloning into the snapshot, or handing a
/// copy to a caller, shares structure instead of copying records.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    kind: EntityKind,
    items: Vector<Entity>,
    fetched_at: Option<DateTime<Utc>>,
}

impl Collection {
    pub fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            items: Vector::new(),
            fetched_at: None,
        }
    }

    pub fn from_entities(kind: EntityKind, entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            kind,
            items: entities.into_iter().collect(),
            fetched_at: None,
        }
    }

    /// Normalise a collaborator payload into a collection.
    ///
    /// Accepts a bare array, `{"items": [...]}` or the kind's own wrapper
    /// key (`{"warehouses": [...]}`, `{"requests": [...]}`, ...).
    /// Duplicate ids keep their first occurrence.
    pub fn decode(kind: EntityKind, payload: &serde_json::Value) -> Result<Self, FetchError> {
        let schema = kind.schema();
        let records = extract_records(kind, payload)?;

        let mut seen = std::collections::HashSet::new();
        let mut items = Vector::new();
        for record in records {
            let entity = Entity::decode(schema, record)?;
            if seen.insert(entity.id().clone()) {
                items.push_back(entity);
            }
        }

        Ok(Self {
            kind,
            items,
            fetched_at: Some(Utc::now()),
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.items.iter()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.items.iter().find(|entity| entity.id() == id)
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn to_vec(&self) -> Vec<Entity> {
        self.items.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = im::vector::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
