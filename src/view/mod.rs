//! Derived views: pure functions from cached entities to what a page shows.

pub mod aggregate;
pub mod filter;
pub mod sort;
pub mod stats;

pub use aggregate::{GroupBy, GroupCount, UNKNOWN_LABEL, aggregate, count_by_field};
pub use filter::{Exclusion, FilterSpec, filter_entities};
pub use sort::{SortKey, sort_entities};
pub use stats::{
    LoanEstimate, MarketStats, SaccoSummary, StorageSummary, approval_rate, compute_stats,
};
