// ============================================================================
// Transition detection between successive fetches
// ============================================================================

use super::collection::Collection;
use crate::core::{Entity, EntityId, EntityKind, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A tracked field whose value changed between two fetches of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub field: String,
    pub from: Value,
    pub to: Value,
}

impl TransitionEvent {
    /// True when the entity moved into `status` (or `approved`) = `to`.
    pub fn is_transition_to(&self, field: &str, to: impl Into<Value>) -> bool {
        self.field == field && self.to == to.into()
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {} -> {}",
            self.kind, self.entity_id, self.field, self.from, self.to
        )
    }
}

/// Compare two collections of the same kind on the tracked fields.
///
/// Entities are matched by id. Only entities present on both sides can
/// produce events; a tracked field missing on either side is undefined and
/// never counts as a change. Events come out in the order of `new`, and
/// within one entity in the order of `tracked`.
pub fn diff<S: AsRef<str>>(old: &Collection, new: &Collection, tracked: &[S]) -> Vec<TransitionEvent> {
    if tracked.is_empty() || old.is_empty() || new.is_empty() {
        return Vec::new();
    }

    let previous: HashMap<&EntityId, &Entity> =
        old.iter().map(|entity| (entity.id(), entity)).collect();

    let mut events = Vec::new();
    for current in new {
        let Some(before) = previous.get(current.id()) else {
            continue;
        };

        for field in tracked {
            let field = field.as_ref();
            let (Some(from), Some(to)) = (before.get(field), current.get(field)) else {
                continue;
            };
            if from != to {
                events.push(TransitionEvent {
                    kind: new.kind(),
                    entity_id: current.id().clone(),
                    field: field.to_string(),
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
    }

    events
}
