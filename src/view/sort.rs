// ============================================================================
// src/view/sort.rs - Sorting of derived lists
// ============================================================================
//
// - Stable sort (equal entities keep their input order)
// - Numeric keys: missing or unparseable values compare as 0
// - Date keys: missing values go last in both directions
//
// ============================================================================

use crate::core::Entity;
use std::cmp::Ordering;

/// How a page orders its list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Keep the collection order
    #[default]
    Identity,
    Numeric { field: String, descending: bool },
    Date { field: String, descending: bool },
}

impl SortKey {
    pub fn numeric(field: &str, descending: bool) -> Self {
        Self::Numeric {
            field: field.to_string(),
            descending,
        }
    }

    pub fn date(field: &str, descending: bool) -> Self {
        Self::Date {
            field: field.to_string(),
            descending,
        }
    }

    /// Map a sort select value used by the pages.
    ///
    /// Unknown options keep the input order.
    pub fn from_option(option: &str) -> Self {
        match option.trim() {
            "newest" => Self::date("created_at", true),
            "oldest" => Self::date("created_at", false),
            "price-asc" | "price_low" => Self::numeric("price", false),
            "price-desc" | "price_high" => Self::numeric("price", true),
            "capacity" => Self::numeric("capacity", true),
            "availability" => Self::numeric("available_capacity", true),
            "views" => Self::numeric("view_count", true),
            "interests" => Self::numeric("interest_count", true),
            _ => Self::Identity,
        }
    }

    /// Compare two entities under this key.
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        match self {
            Self::Identity => Ordering::Equal,
            Self::Numeric { field, descending } => {
                let ordering = a.number(field).total_cmp(&b.number(field));
                apply_direction(ordering, *descending)
            }
            Self::Date { field, descending } => match (a.instant(field), b.instant(field)) {
                (None, None) => Ordering::Equal,
                // Missing is last regardless of direction, so it is not reversed
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => apply_direction(x.cmp(&y), *descending),
            },
        }
    }
}

fn apply_direction(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Stable sort of an owned list.
pub fn sort_entities(mut entities: Vec<Entity>, key: &SortKey) -> Vec<Entity> {
    if *key != SortKey::Identity {
        entities.sort_by(|a, b| key.compare(a, b));
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityId;

    fn ids(entities: &[Entity]) -> Vec<EntityId> {
        entities.iter().map(|entity| entity.id().clone()).collect()
    }

    #[test]
    fn test_from_option() {
        assert_eq!(SortKey::from_option("newest"), SortKey::date("created_at", true));
        assert_eq!(SortKey::from_option("price-asc"), SortKey::numeric("price", false));
        assert_eq!(SortKey::from_option("bogus"), SortKey::Identity);
        assert_eq!(SortKey::from_option(""), SortKey::Identity);
    }

    #[test]
    fn test_numeric_sort_treats_missing_as_zero() {
        let entities = vec![
            Entity::new(1).with("price", "120"),
            Entity::new(2),
            Entity::new(3).with("price", 80.0),
            Entity::new(4).with("price", "n/a"),
        ];

        let ascending = sort_entities(entities.clone(), &SortKey::from_option("price-asc"));
        assert_eq!(
            ids(&ascending),
            vec![EntityId::from(2), EntityId::from(4), EntityId::from(3), EntityId::from(1)]
        );

        let descending = sort_entities(entities, &SortKey::from_option("price-desc"));
        assert_eq!(
            ids(&descending),
            vec![EntityId::from(1), EntityId::from(3), EntityId::from(2), EntityId::from(4)]
        );
    }

    #[test]
    fn test_date_sort_puts_missing_last_both_ways() {
        let entities = vec![
            Entity::new(1),
            Entity::new(2).with("created_at", "2024-01-05T10:00:00"),
            Entity::new(3).with("created_at", "2024-03-01T10:00:00"),
        ];

        let newest = sort_entities(entities.clone(), &SortKey::from_option("newest"));
        assert_eq!(
            ids(&newest),
            vec![EntityId::from(3), EntityId::from(2), EntityId::from(1)]
        );

        let oldest = sort_entities(entities, &SortKey::from_option("oldest"));
        assert_eq!(
            ids(&oldest),
            vec![EntityId::from(2), EntityId::from(3), EntityId::from(1)]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let entities = vec![
            Entity::new(1).with("view_count", 3),
            Entity::new(2).with("view_count", 9),
            Entity::new(3).with("view_count", 3),
            Entity::new(4).with("view_count", 9),
        ];
        let sorted = sort_entities(entities, &SortKey::from_option("views"));
        assert_eq!(
            ids(&sorted),
            vec![EntityId::from(2), EntityId::from(4), EntityId::from(1), EntityId::from(3)]
        );
    }

    #[test]
    fn test_identity_keeps_order() {
        let entities = vec![Entity::new(3), Entity::new(1), Entity::new(2)];
        assert_eq!(sort_entities(entities.clone(), &SortKey::Identity), entities);
    }
}
