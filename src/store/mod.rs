pub mod cache;
pub mod change;
pub mod collection;
pub mod diff;
pub mod mutation;

pub use cache::{DerivedViewStore, DiscardReason, RefreshOutcome, StoreStats};
pub use change::{ChangeReason, LiveView, StoreChange};
pub use collection::Collection;
pub use diff::{TransitionEvent, diff};
pub use mutation::CreateOutcome;
