// ============================================================================
// agroview Library
// ============================================================================

pub mod config;
pub mod core;
pub mod notify;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod view;

// Re-export main types for convenience
pub use config::{FailurePolicy, StoreConfig};
pub use core::{
    ConflictError, Entity, EntityId, EntityKind, FetchError, FetchErrorKind, MutationError,
    Result, StoreError, ValidationError, Value,
};
pub use notify::{
    AlwaysConfirm, Confirmer, LogNotifier, NeverConfirm, Notification, NotificationLevel,
    Notifier, RecordingNotifier,
};
pub use scheduler::{PollingScheduler, SchedulerState, SchedulerStats, TickReport};
pub use source::{EntityApi, EntitySource, FetchQuery, RestSource, StaticSource};
pub use store::{
    ChangeReason, Collection, CreateOutcome, DerivedViewStore, DiscardReason, LiveView,
    RefreshOutcome, StoreChange, StoreStats, TransitionEvent,
};
pub use view::{Exclusion, FilterSpec, GroupBy, GroupCount, SortKey};
