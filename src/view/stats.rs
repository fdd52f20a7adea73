// ============================================================================
// Aggregate statistics shown on dashboards
// ============================================================================

use crate::core::{Entity, EntityId, KindSchema};
use serde::Serialize;
use std::collections::HashMap;

/// Flat annual interest the SACCO portal quotes loans at.
pub const FLAT_ANNUAL_RATE: f64 = 0.12;

pub const UNKNOWN_WAREHOUSE: &str = "Unknown Warehouse";

/// Marketplace "My Posts" header numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarketStats {
    pub total: usize,
    pub active: usize,
    pub total_views: u64,
    pub total_interests: u64,
}

/// Stats over the entities owned by `viewer`.
///
/// Missing and negative counters contribute 0, so sums never go negative
/// and `active <= total` always holds. Sums saturate at `u64::MAX`.
pub fn compute_stats<'a>(
    entities: impl IntoIterator<Item = &'a Entity>,
    schema: &KindSchema,
    viewer: &EntityId,
) -> MarketStats {
    entities
        .into_iter()
        .filter(|entity| entity.is_owned_by(schema, viewer))
        .fold(MarketStats::default(), |mut stats, entity| {
            stats.total += 1;
            if entity.status() == Some("active") {
                stats.active += 1;
            }
            stats.total_views = stats.total_views.saturating_add(counter(entity, "view_count"));
            stats.total_interests = stats
                .total_interests
                .saturating_add(counter(entity, "interest_count"));
            stats
        })
}

fn counter(entity: &Entity, field: &str) -> u64 {
    let value = entity.number(field);
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

fn amount(entity: &Entity, field: &str) -> f64 {
    let value = entity.number(field);
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

/// Member dashboard totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SaccoSummary {
    pub total_savings: f64,
    pub total_shares: f64,
    pub active_memberships: usize,
    pub active_loans: usize,
    pub pending_applications: usize,
}

impl SaccoSummary {
    pub fn compute<'a>(
        memberships: impl IntoIterator<Item = &'a Entity>,
        loan_applications: impl IntoIterator<Item = &'a Entity>,
    ) -> Self {
        let mut summary = Self::default();

        for membership in memberships {
            summary.total_savings += amount(membership, "savings");
            summary.total_shares += amount(membership, "shares");
            if membership.flag("is_active") {
                summary.active_memberships += 1;
            }
        }

        for application in loan_applications {
            match application.status() {
                Some("approved") | Some("disbursed") => summary.active_loans += 1,
                Some("pending") => summary.pending_applications += 1,
                _ => {}
            }
        }

        summary
    }
}

/// Repayment figures for the loan calculator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoanEstimate {
    pub amount: f64,
    pub period_months: u32,
    pub interest: f64,
    pub total: f64,
    pub monthly_payment: f64,
}

impl LoanEstimate {
    /// `None` unless both amount and period are positive.
    pub fn flat_rate(amount: f64, period_months: u32) -> Option<Self> {
        if !amount.is_finite() || amount <= 0.0 || period_months == 0 {
            return None;
        }

        let interest = amount * FLAT_ANNUAL_RATE * f64::from(period_months) / 12.0;
        let total = amount + interest;
        Some(Self {
            amount,
            period_months,
            interest,
            total,
            monthly_payment: total / f64::from(period_months),
        })
    }
}

/// Storage admin overview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageSummary {
    /// Requests per warehouse name, in order of first appearance.
    pub per_warehouse: Vec<(String, usize)>,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub completed: usize,
}

impl StorageSummary {
    pub fn compute<'a>(
        requests: impl IntoIterator<Item = &'a Entity>,
        warehouses: &[Entity],
    ) -> Self {
        let names: HashMap<&EntityId, &str> = warehouses
            .iter()
            .filter_map(|warehouse| warehouse.text("name").map(|name| (warehouse.id(), name)))
            .collect();

        let mut summary = Self::default();
        for request in requests {
            let name = request
                .reference("warehouse_id")
                .and_then(|id| names.get(&id).copied())
                .unwrap_or(UNKNOWN_WAREHOUSE);

            match summary
                .per_warehouse
                .iter()
                .position(|(warehouse, _)| warehouse == name)
            {
                Some(index) => summary.per_warehouse[index].1 += 1,
                None => summary.per_warehouse.push((name.to_string(), 1)),
            }

            match request.status() {
                Some("pending") => summary.pending += 1,
                Some("approved") => summary.approved += 1,
                Some("rejected") => summary.rejected += 1,
                Some("completed") => summary.completed += 1,
                _ => {}
            }
        }
        summary
    }
}

/// Percentage of entities with `status == "approved"`; 0 when empty.
pub fn approval_rate<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> f64 {
    let (total, approved) = entities.into_iter().fold((0usize, 0usize), |(total, approved), entity| {
        let hit = entity.status() == Some("approved");
        (total + 1, approved + usize::from(hit))
    });

    if total == 0 {
        0.0
    } else {
        approved as f64 * 100.0 / total as f64
    }
}
