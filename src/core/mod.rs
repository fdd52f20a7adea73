pub mod entity;
pub mod error;
pub mod schema;
pub mod value;

pub use entity::{Entity, EntityId};
pub use error::{
    ConflictError, FetchError, FetchErrorKind, MutationError, Result, StoreError, ValidationError,
};
pub use schema::{EntityKind, Field, FieldType, KindSchema};
pub use value::Value;
