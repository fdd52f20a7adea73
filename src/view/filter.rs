// ============================================================================
// Filtering predicates for derived lists
// ============================================================================

use super::sort::{SortKey, sort_entities};
use crate::core::{Entity, EntityId, KindSchema, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Predicate that removes entities regardless of search and filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Exclusion {
    /// Drop entities whose owner field equals the viewer (the marketplace
    /// hides the viewer's own posts).
    OwnedBy { viewer: EntityId },
    /// Drop entities whose field equals `value`.
    FieldEquals { field: String, value: Value },
    /// Drop entities with one of these ids (SACCOs the viewer already joined).
    IdIn(BTreeSet<EntityId>),
}

impl Exclusion {
    pub fn owned_by(viewer: impl Into<EntityId>) -> Self {
        Self::OwnedBy {
            viewer: viewer.into(),
        }
    }

    pub fn field_equals(field: &str, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn id_in(ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self::IdIn(ids.into_iter().collect())
    }

    fn excludes(&self, entity: &Entity, schema: &KindSchema) -> bool {
        match self {
            Self::OwnedBy { viewer } => entity.is_owned_by(schema, viewer),
            Self::FieldEquals { field, value } => entity.get(field) == Some(value),
            Self::IdIn(ids) => ids.contains(entity.id()),
        }
    }
}

/// Active predicates of one page plus its sort order.
///
/// Categorical filters hold the raw select value; an empty value or the
/// "All" option means no predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub search: String,
    pub filters: BTreeMap<String, String>,
    pub exclusions: Vec<Exclusion>,
    pub sort: SortKey,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = text.to_string();
        self
    }

    pub fn filter(mut self, field: &str, value: &str) -> Self {
        self.filters.insert(field.to_string(), value.to_string());
        self
    }

    pub fn exclude(mut self, exclusion: Exclusion) -> Self {
        self.exclusions.push(exclusion);
        self
    }

    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// Filter, then sort.
    pub fn apply<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a Entity>,
        schema: &KindSchema,
    ) -> Vec<Entity> {
        sort_entities(filter_entities(entities, self, schema), &self.sort)
    }

    fn search_term(&self) -> Option<String> {
        let term = self.search.trim();
        (!term.is_empty()).then(|| term.to_lowercase())
    }

    fn active_filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.filters
            .iter()
            .map(|(field, value)| (field.as_str(), value.trim()))
            .filter(|(_, value)| !value.is_empty() && !value.eq_ignore_ascii_case("all"))
    }
}

/// Apply search, categorical filters and exclusions (AND-combined, in that
/// order). Input order is preserved.
pub fn filter_entities<'a>(
    entities: impl IntoIterator<Item = &'a Entity>,
    spec: &FilterSpec,
    schema: &KindSchema,
) -> Vec<Entity> {
    let term = spec.search_term();
    let filters: Vec<(&str, &str)> = spec.active_filters().collect();

    entities
        .into_iter()
        .filter(|entity| match &term {
            Some(term) => matches_search(entity, schema, term),
            None => true,
        })
        .filter(|entity| {
            filters.iter().all(|(field, expected)| {
                entity
                    .get(field)
                    .is_some_and(|value| value.display_key() == *expected)
            })
        })
        .filter(|entity| {
            !spec
                .exclusions
                .iter()
                .any(|exclusion| exclusion.excludes(entity, schema))
        })
        .cloned()
        .collect()
}

fn matches_search(entity: &Entity, schema: &KindSchema, term: &str) -> bool {
    schema.searchable.iter().any(|field| {
        entity
            .get(field)
            .is_some_and(|value| value.display_key().to_lowercase().contains(term))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityKind;

    fn posts() -> Vec<Entity> {
        vec![
            Entity::new(1)
                .with("user_id", 7)
                .with("title", "Maize Seeds")
                .with("category", "seeds")
                .with("status", "active"),
            Entity::new(2)
                .with("user_id", 8)
                .with("title", "Bean Seeds")
                .with("category", "seeds")
                .with("status", "active"),
            Entity::new(3)
                .with("user_id", 8)
                .with("title", "Maize Fertilizer")
                .with("category", "inputs")
                .with("status", "sold"),
        ]
    }

    fn ids(entities: &[Entity]) -> Vec<EntityId> {
        entities.iter().map(|entity| entity.id().clone()).collect()
    }

    #[test]
    fn test_search_with_all_category() {
        let spec = FilterSpec::new().search("maize").filter("category", "All");
        let view = filter_entities(&posts(), &spec, EntityKind::Posts.schema());
        assert_eq!(ids(&view), vec![EntityId::from(1), EntityId::from(3)]);
    }

    #[test]
    fn test_blank_search_is_no_predicate() {
        let spec = FilterSpec::new().search("   ");
        assert_eq!(filter_entities(&posts(), &spec, EntityKind::Posts.schema()).len(), 3);
    }

    #[test]
    fn test_categorical_filter_compares_display_form() {
        let recommendations = vec![
            Entity::new(1).with("region_id", 5).with("crop_name", "Maize"),
            Entity::new(2).with("region_id", 6).with("crop_name", "Beans"),
        ];
        let spec = FilterSpec::new().filter("region_id", "5");
        let view = filter_entities(&recommendations, &spec, EntityKind::Recommendations.schema());
        assert_eq!(ids(&view), vec![EntityId::from(1)]);
    }

    #[test]
    fn test_exclusions() {
        let schema = EntityKind::Posts.schema();

        let own = FilterSpec::new().exclude(Exclusion::owned_by(8));
        assert_eq!(ids(&filter_entities(&posts(), &own, schema)), vec![EntityId::from(1)]);

        let sold = FilterSpec::new().exclude(Exclusion::field_equals("status", "sold"));
        assert_eq!(filter_entities(&posts(), &sold, schema).len(), 2);

        let joined = FilterSpec::new().exclude(Exclusion::id_in([EntityId::from(2)]));
        assert_eq!(
            ids(&filter_entities(&posts(), &joined, schema)),
            vec![EntityId::from(1), EntityId::from(3)]
        );
    }

    #[test]
    fn test_filter_is_idempotent() {
        let schema = EntityKind::Posts.schema();
        let spec = FilterSpec::new()
            .search("seeds")
            .filter("status", "active")
            .exclude(Exclusion::owned_by(7));

        let once = filter_entities(&posts(), &spec, schema);
        let twice = filter_entities(&once, &spec, schema);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_entity_without_searchable_fields_never_matches() {
        let entities = vec![Entity::new(1).with("price", 10.0)];
        let spec = FilterSpec::new().search("x");
        assert!(filter_entities(&entities, &spec, EntityKind::Posts.schema()).is_empty());
    }
}
