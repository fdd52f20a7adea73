// ============================================================================
// Entity kinds and their tagged-record schemas
// ============================================================================

use super::error::{FetchError, StoreError, ValidationError};
use super::value::{Value, parse_instant};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named category of domain record held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Regions,
    Recommendations,
    Warehouses,
    StorageRequests,
    Posts,
    Saccos,
    Memberships,
    LoanApplications,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        Self::Regions,
        Self::Recommendations,
        Self::Warehouses,
        Self::StorageRequests,
        Self::Posts,
        Self::Saccos,
        Self::Memberships,
        Self::LoanApplications,
    ];

    pub fn name(&self) -> &'static str {
        self.schema().name
    }

    pub fn schema(&self) -> &'static KindSchema {
        match self {
            Self::Regions => &REGIONS,
            Self::Recommendations => &RECOMMENDATIONS,
            Self::Warehouses => &WAREHOUSES,
            Self::StorageRequests => &STORAGE_REQUESTS,
            Self::Posts => &POSTS,
            Self::Saccos => &SACCOS,
            Self::Memberships => &MEMBERSHIPS,
            Self::LoanApplications => &LOAN_APPLICATIONS,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EntityKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| StoreError::UnknownKind(s.to_string()))
    }
}

// ============================================================================
// FIELD TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }

    /// Decode a JSON value into this type.
    ///
    /// Numbers are accepted as numeric text and timestamps as ISO 8601 text,
    /// because the backend serialises decimals and dates that way.
    /// `None` means the value is incompatible.
    pub fn coerce(&self, json: &serde_json::Value) -> Option<Value> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Some(Value::Null);
        }

        match (self, json) {
            (Self::Integer, Json::Number(n)) => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Float)),
            (Self::Integer, Json::String(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),
            (Self::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
            (Self::Float, Json::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float),
            (Self::Text, Json::String(s)) => Some(Value::Text(s.clone())),
            (Self::Text, Json::Number(n)) => Some(Value::Text(n.to_string())),
            (Self::Boolean, Json::Bool(b)) => Some(Value::Boolean(*b)),
            (Self::Boolean, Json::Number(n)) => n.as_i64().map(|i| Value::Boolean(i != 0)),
            (Self::Timestamp, Json::String(s)) => parse_instant(s).map(Value::Timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Declared attribute of an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }
}

/// Schema of one entity kind: declared fields plus the roles the store
/// gives some of them (tracked for transitions, searchable, owner).
#[derive(Debug)]
pub struct KindSchema {
    pub kind: EntityKind,
    pub name: &'static str,
    pub fields: &'static [Field],
    /// Tracked fields in declaration order; diff events follow this order.
    pub tracked: &'static [&'static str],
    pub searchable: &'static [&'static str],
    pub owner_field: Option<&'static str>,
    /// Response keys the backend wraps the list in, besides `items`.
    pub payload_keys: &'static [&'static str],
}

impl KindSchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| field.required)
    }

    /// Decode one record's declared field.
    pub(crate) fn decode_field(
        &self,
        field: &Field,
        json: &serde_json::Value,
    ) -> Result<Value, FetchError> {
        field.field_type.coerce(json).ok_or_else(|| {
            FetchError::decode(format!(
                "{}.{} expects {}, got {}",
                self.name, field.name, field.field_type, json
            ))
        })
    }

    /// Required-field check for an outgoing create/update payload.
    ///
    /// `id` is assigned by the backend and therefore never demanded here.
    pub fn validate_payload(&self, payload: &serde_json::Value) -> Result<(), ValidationError> {
        let object = payload
            .as_object()
            .ok_or(ValidationError::NotAnObject { kind: self.kind })?;

        for field in self.required_fields().filter(|field| field.name != "id") {
            let present = match object.get(field.name) {
                None | Some(serde_json::Value::Null) => false,
                Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            };
            if !present {
                return Err(ValidationError::MissingField {
                    kind: self.kind,
                    field: field.name.to_string(),
                });
            }
        }

        for (name, json) in object {
            if let Some(field) = self.field(name) {
                if field.field_type.coerce(json).is_none() {
                    return Err(ValidationError::WrongType {
                        kind: self.kind,
                        field: name.clone(),
                        expected: field.field_type.name(),
                    });
                }
            }
        }

        Ok(())
    }
}

use FieldType::{Boolean, Float, Integer, Text, Timestamp};

static REGIONS: KindSchema = KindSchema {
    kind: EntityKind::Regions,
    name: "regions",
    fields: &[
        Field::required("id", Integer),
        Field::required("name", Text),
        Field::optional("latitude", Float),
        Field::optional("longitude", Float),
        Field::optional("altitude", Float),
        Field::optional("soil_type", Text),
        Field::optional("average_rainfall", Float),
    ],
    tracked: &[],
    searchable: &["name"],
    owner_field: None,
    payload_keys: &["regions"],
};

static RECOMMENDATIONS: KindSchema = KindSchema {
    kind: EntityKind::Recommendations,
    name: "recommendations",
    fields: &[
        Field::required("id", Integer),
        Field::required("region_id", Integer),
        Field::required("crop_name", Text),
        Field::optional("season", Text),
        Field::optional("planting_month", Text),
        Field::optional("harvesting_month", Text),
        Field::optional("expected_yield", Text),
        Field::optional("water_requirements", Text),
        Field::optional("soil_requirements", Text),
        Field::optional("description", Text),
        Field::optional("status", Text),
        Field::optional("approved", Boolean),
    ],
    tracked: &["status", "approved"],
    searchable: &["crop_name", "description"],
    owner_field: None,
    payload_keys: &["recommendations"],
};

static WAREHOUSES: KindSchema = KindSchema {
    kind: EntityKind::Warehouses,
    name: "warehouses",
    fields: &[
        Field::required("id", Integer),
        Field::required("name", Text),
        Field::required("location", Text),
        Field::optional("region", Text),
        Field::optional("capacity", Float),
        Field::optional("available_capacity", Float),
        Field::optional("temperature_control", Boolean),
        Field::optional("humidity_control", Boolean),
        Field::optional("security_level", Text),
        Field::optional("owner", Text),
        Field::optional("contact_info", Text),
        Field::optional("is_active", Boolean),
        Field::optional("rates", Text),
        Field::optional("description", Text),
    ],
    tracked: &["is_active"],
    searchable: &["name", "location"],
    owner_field: None,
    payload_keys: &["warehouses"],
};

static STORAGE_REQUESTS: KindSchema = KindSchema {
    kind: EntityKind::StorageRequests,
    name: "storage_requests",
    fields: &[
        Field::required("id", Integer),
        Field::optional("user_id", Integer),
        Field::required("warehouse_id", Integer),
        Field::optional("warehouse_name", Text),
        Field::optional("product_type", Text),
        Field::optional("quantity", Float),
        Field::optional("duration", Integer),
        Field::optional("start_date", Timestamp),
        Field::optional("end_date", Timestamp),
        Field::optional("special_requirements", Text),
        Field::optional("status", Text),
        Field::optional("requested_at", Timestamp),
        Field::optional("approved_at", Timestamp),
        Field::optional("total_cost", Float),
    ],
    tracked: &["status"],
    searchable: &["product_type", "warehouse_name"],
    owner_field: Some("user_id"),
    payload_keys: &["requests", "storage_requests"],
};

static POSTS: KindSchema = KindSchema {
    kind: EntityKind::Posts,
    name: "posts",
    fields: &[
        Field::required("id", Integer),
        Field::required("user_id", Integer),
        Field::required("title", Text),
        Field::optional("description", Text),
        Field::optional("price", Float),
        Field::optional("quantity", Float),
        Field::optional("unit", Text),
        Field::optional("category", Text),
        Field::optional("type", Text),
        Field::optional("location", Text),
        Field::optional("region", Text),
        Field::optional("status", Text),
        Field::optional("approved", Boolean),
        Field::optional("is_available", Boolean),
        Field::optional("view_count", Integer),
        Field::optional("interest_count", Integer),
        Field::optional("created_at", Timestamp),
        Field::optional("updated_at", Timestamp),
    ],
    tracked: &["status", "approved"],
    searchable: &["title", "description", "location"],
    owner_field: Some("user_id"),
    payload_keys: &["posts"],
};

static SACCOS: KindSchema = KindSchema {
    kind: EntityKind::Saccos,
    name: "saccos",
    fields: &[
        Field::required("id", Integer),
        Field::required("name", Text),
        Field::optional("description", Text),
        Field::optional("registration_number", Text),
        Field::optional("location", Text),
        Field::optional("region", Text),
        Field::optional("founded_date", Timestamp),
        Field::optional("total_members", Integer),
        Field::optional("total_assets", Float),
        Field::optional("is_active", Boolean),
        Field::optional("created_at", Timestamp),
    ],
    tracked: &["is_active"],
    searchable: &["name", "description", "location"],
    owner_field: None,
    payload_keys: &["saccos"],
};

static MEMBERSHIPS: KindSchema = KindSchema {
    kind: EntityKind::Memberships,
    name: "memberships",
    fields: &[
        Field::required("id", Integer),
        Field::optional("user_id", Integer),
        Field::required("sacco_id", Integer),
        Field::optional("sacco_name", Text),
        Field::optional("membership_id", Text),
        Field::optional("join_date", Timestamp),
        Field::optional("membership_type", Text),
        Field::optional("shares", Float),
        Field::optional("savings", Float),
        Field::optional("is_active", Boolean),
    ],
    tracked: &["is_active"],
    searchable: &["sacco_name"],
    owner_field: Some("user_id"),
    payload_keys: &["memberships"],
};

static LOAN_APPLICATIONS: KindSchema = KindSchema {
    kind: EntityKind::LoanApplications,
    name: "loan_applications",
    fields: &[
        Field::required("id", Integer),
        Field::optional("user_id", Integer),
        Field::optional("loan_id", Integer),
        Field::optional("loan_name", Text),
        Field::optional("sacco_id", Integer),
        Field::optional("sacco_name", Text),
        Field::optional("amount", Float),
        Field::optional("purpose", Text),
        Field::optional("status", Text),
        Field::optional("application_date", Timestamp),
        Field::optional("approval_date", Timestamp),
        Field::optional("disbursement_date", Timestamp),
    ],
    tracked: &["status"],
    searchable: &["purpose", "loan_name"],
    owner_field: Some("user_id"),
    payload_keys: &["applications", "loan_applications"],
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trip_by_name() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.name().parse::<EntityKind>().unwrap(), kind);
            assert_eq!(kind.schema().kind, kind);
        }
        assert_eq!(
            "storage-requests".parse::<EntityKind>().unwrap(),
            EntityKind::StorageRequests
        );
        assert!("orders".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_every_schema_requires_id() {
        for kind in EntityKind::ALL {
            let id = kind.schema().field("id").unwrap();
            assert!(id.required, "{} must require id", kind);
        }
    }

    #[test]
    fn test_tracked_fields_are_declared() {
        for kind in EntityKind::ALL {
            let schema = kind.schema();
            for tracked in schema.tracked {
                assert!(schema.field(tracked).is_some(), "{}.{}", kind, tracked);
            }
        }
    }

    #[test]
    fn test_coerce_numeric_text() {
        assert_eq!(
            FieldType::Float.coerce(&json!("1500.00")),
            Some(Value::Float(1500.0))
        );
        assert_eq!(FieldType::Integer.coerce(&json!("12")), Some(Value::Integer(12)));
        assert_eq!(FieldType::Integer.coerce(&json!("twelve")), None);
        assert_eq!(FieldType::Float.coerce(&json!("inf")), None);
        assert_eq!(FieldType::Float.coerce(&json!("NaN")), None);
        assert_eq!(FieldType::Boolean.coerce(&json!(null)), Some(Value::Null));
        assert!(matches!(
            FieldType::Timestamp.coerce(&json!("2024-05-01T10:00:00")),
            Some(Value::Timestamp(_))
        ));
    }

    #[test]
    fn test_validate_payload_required_fields() {
        let schema = EntityKind::Warehouses.schema();

        let ok = json!({"name": "Nakuru Silo", "location": "Nakuru", "capacity": "500"});
        assert!(schema.validate_payload(&ok).is_ok());

        let blank = json!({"name": "  ", "location": "Nakuru"});
        assert_eq!(
            schema.validate_payload(&blank),
            Err(ValidationError::MissingField {
                kind: EntityKind::Warehouses,
                field: "name".into()
            })
        );

        let wrong = json!({"name": "A", "location": "B", "capacity": "lots"});
        assert!(matches!(
            schema.validate_payload(&wrong),
            Err(ValidationError::WrongType { .. })
        ));

        assert!(matches!(
            schema.validate_payload(&json!([1])),
            Err(ValidationError::NotAnObject { .. })
        ));
    }
}
