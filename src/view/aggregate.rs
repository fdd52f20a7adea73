use crate::core::{Entity, EntityId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const UNKNOWN_LABEL: &str = "Unknown";

/// How chart data buckets entities.
#[derive(Debug, Clone, Copy)]
pub enum GroupBy<'a> {
    /// By the display value of a field.
    Field(&'a str),
    /// By a label looked up through an id reference, e.g. recommendations
    /// grouped by the name of their `region_id`.
    Related {
        field: &'a str,
        related: &'a [Entity],
        label_field: &'a str,
    },
}

/// One chart bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub label: String,
    pub count: usize,
}

/// Count entities per bucket, in order of first appearance.
///
/// An absent field or a reference that resolves to nothing lands in the
/// `"Unknown"` bucket.
pub fn aggregate<'a>(
    entities: impl IntoIterator<Item = &'a Entity>,
    group_by: GroupBy<'_>,
) -> Vec<GroupCount> {
    let labels: Option<HashMap<&EntityId, String>> = match group_by {
        GroupBy::Related {
            related,
            label_field,
            ..
        } => Some(
            related
                .iter()
                .filter_map(|entity| {
                    entity
                        .get(label_field)
                        .map(|label| (entity.id(), label.display_key()))
                })
                .collect(),
        ),
        GroupBy::Field(_) => None,
    };

    let mut groups: Vec<GroupCount> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entity in entities {
        let label = match (group_by, &labels) {
            (GroupBy::Related { field, .. }, Some(labels)) => entity
                .reference(field)
                .and_then(|id| labels.get(&id).cloned()),
            (GroupBy::Field(field), _) | (GroupBy::Related { field, .. }, None) => {
                entity.get(field).map(|value| value.display_key())
            }
        }
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        match positions.get(&label) {
            Some(&index) => groups[index].count += 1,
            None => {
                positions.insert(label.clone(), groups.len());
                groups.push(GroupCount { label, count: 1 });
            }
        }
    }

    groups
}

/// Counts per display value, keyed for dropdowns and status badges.
pub fn count_by_field<'a>(
    entities: impl IntoIterator<Item = &'a Entity>,
    field: &str,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entity in entities {
        let key = entity
            .get(field)
            .map(|value| value.display_key())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions() -> Vec<Entity> {
        vec![
            Entity::new(5).with("name", "Rift Valley"),
            Entity::new(6).with("name", "Coast"),
        ]
    }

    #[test]
    fn test_unresolved_region_is_unknown() {
        let recommendations = vec![
            Entity::new(1).with("region_id", 5),
            Entity::new(2).with("region_id", 99),
            Entity::new(3).with("region_id", 5),
            Entity::new(4),
        ];
        let regions = regions();

        let groups = aggregate(
            &recommendations,
            GroupBy::Related {
                field: "region_id",
                related: &regions,
                label_field: "name",
            },
        );

        assert_eq!(
            groups,
            vec![
                GroupCount { label: "Rift Valley".into(), count: 2 },
                GroupCount { label: "Unknown".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_group_by_field_keeps_first_appearance_order() {
        let posts = vec![
            Entity::new(1).with("category", "seeds"),
            Entity::new(2).with("category", "livestock"),
            Entity::new(3).with("category", "seeds"),
        ];
        let groups = aggregate(&posts, GroupBy::Field("category"));
        let labels: Vec<_> = groups.iter().map(|group| group.label.as_str()).collect();
        assert_eq!(labels, vec!["seeds", "livestock"]);
        assert_eq!(groups[0].count, 2);
    }

    #[test]
    fn test_counts_add_up() {
        let requests = vec![
            Entity::new(1).with("status", "pending"),
            Entity::new(2).with("status", "approved"),
            Entity::new(3).with("status", "pending"),
            Entity::new(4),
        ];
        let total: usize = aggregate(&requests, GroupBy::Field("status"))
            .iter()
            .map(|group| group.count)
            .sum();
        assert_eq!(total, requests.len());

        let counts = count_by_field(&requests, "status");
        assert_eq!(counts.get("pending"), Some(&2));
        assert_eq!(counts.get("Unknown"), Some(&1));
    }
}
