use super::error::FetchError;
use super::schema::KindSchema;
use super::value::Value;
use chrono::{DateTime, Utc};
use im::OrdMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Stable identity of an entity.
///
/// Backend ids are integers and local fallback ids are strings; both are
/// normalised to their textual form so they compare uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts JSON numbers and strings; anything else has no identity.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            _ => None,
        }
    }

    /// Identity held in a field value, e.g. a `region_id` reference.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Self(i.to_string())),
            Value::Float(f) if f.fract() == 0.0 => Some(Self((*f as i64).to_string())),
            Value::Text(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self.0.parse::<i64>() {
            Ok(n) => serde_json::Value::from(n),
            Err(_) => serde_json::Value::String(self.0.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A cached domain record: its identity plus decoded attributes.
///
/// Attributes live in a persistent map so cloning an entity (and therefore
/// a whole collection into its snapshot) shares structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    fields: OrdMap<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>) -> Self {
        let id = id.into();
        let mut fields = OrdMap::new();
        fields.insert("id".to_string(), Value::from_json(&id.to_json()));
        Self { id, fields }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        if field == "id" {
            return;
        }
        self.fields.insert(field.to_string(), value.into());
    }

    /// Decode one backend record against its kind's schema.
    pub fn decode(schema: &KindSchema, json: &serde_json::Value) -> Result<Self, FetchError> {
        let object = json.as_object().ok_or_else(|| {
            FetchError::decode(format!("{} record is not an object: {}", schema.name, json))
        })?;

        let id = object
            .get("id")
            .and_then(EntityId::from_json)
            .ok_or_else(|| FetchError::decode(format!("{} record has no usable id", schema.name)))?;

        let mut fields = OrdMap::new();
        for field in schema.fields {
            match object.get(field.name) {
                Some(raw) if !raw.is_null() => {
                    fields.insert(field.name.to_string(), schema.decode_field(field, raw)?);
                }
                _ if field.required => {
                    return Err(FetchError::decode(format!(
                        "{} {}: required field '{}' is missing",
                        schema.name, id, field.name
                    )));
                }
                _ => {}
            }
        }

        for (name, raw) in object {
            if schema.field(name).is_none() {
                fields.insert(name.clone(), Value::from_json(raw));
            }
        }

        Ok(Self { id, fields })
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Numeric attribute with missing or unparseable values read as 0.
    pub fn number(&self, field: &str) -> f64 {
        self.get(field).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn instant(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get(field).and_then(Value::as_instant)
    }

    pub fn flag(&self, field: &str) -> bool {
        self.get(field).map(Value::as_bool).unwrap_or(false)
    }

    /// Identity referenced by a foreign-key style field.
    pub fn reference(&self, field: &str) -> Option<EntityId> {
        self.get(field).and_then(EntityId::from_value)
    }

    pub fn status(&self) -> Option<&str> {
        self.text("status")
    }

    /// True for records kept only on this side after a failed create.
    pub fn is_local(&self) -> bool {
        self.flag("local")
    }

    pub fn is_owned_by(&self, schema: &KindSchema, viewer: &EntityId) -> bool {
        schema
            .owner_field
            .and_then(|field| self.reference(field))
            .is_some_and(|owner| &owner == viewer)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.to_json());
        }
        object.insert("id".to_string(), self.id.to_json());
        serde_json::Value::Object(object)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::EntityKind;
    use serde_json::json;

    #[test]
    fn test_decode_market_post() {
        let schema = EntityKind::Posts.schema();
        let raw = json!({
            "id": 11,
            "user_id": 4,
            "title": "Maize Seeds",
            "price": "250.50",
            "created_at": "2024-04-02T09:15:00",
            "images": [{"image_url": "a.png"}]
        });

        let post = Entity::decode(schema, &raw).unwrap();
        assert_eq!(post.id(), &EntityId::from(11));
        assert_eq!(post.number("price"), 250.5);
        assert!(post.instant("created_at").is_some());
        assert!(matches!(post.get("images"), Some(Value::Json(_))));
        assert_eq!(post.number("view_count"), 0.0);
        assert!(post.is_owned_by(schema, &EntityId::from(4)));
        assert!(!post.is_owned_by(schema, &EntityId::from(5)));
    }

    #[test]
    fn test_decode_rejects_missing_required_field() {
        let schema = EntityKind::Recommendations.schema();
        let err = Entity::decode(schema, &json!({"id": 1, "crop_name": "Maize"})).unwrap_err();
        assert!(err.message.contains("region_id"));
    }

    #[test]
    fn test_decode_rejects_missing_id() {
        let schema = EntityKind::Regions.schema();
        assert!(Entity::decode(schema, &json!({"name": "Rift Valley"})).is_err());
        assert!(Entity::decode(schema, &json!("Rift Valley")).is_err());
    }

    #[test]
    fn test_decode_rejects_incompatible_type() {
        let schema = EntityKind::Warehouses.schema();
        let raw = json!({"id": 1, "name": "A", "location": "B", "capacity": "huge"});
        assert!(Entity::decode(schema, &raw).is_err());
    }

    #[test]
    fn test_null_reads_as_absent() {
        let schema = EntityKind::Posts.schema();
        let raw = json!({"id": 1, "user_id": 2, "title": "Beans", "status": null});
        let post = Entity::decode(schema, &raw).unwrap();
        assert!(post.get("status").is_none());
    }

    #[test]
    fn test_to_json_keeps_numeric_id() {
        let entity = Entity::new(7).with("status", "pending");
        assert_eq!(entity.to_json(), json!({"id": 7, "status": "pending"}));
    }
}
