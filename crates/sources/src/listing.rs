//! Pieces shared by the group and subgroup listings: sort/filter arguments
//! and the anomaly statistics attached to every row.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rad_core::{subgroup_placeholder_name, GroupInfo, ServiceCapabilities};
use tracing::warn;
use uuid::Uuid;

use crate::cache::HistoricalAnomalyCache;
use crate::error::SourceError;
use crate::feed::AnomalyFeed;
use crate::host::{ArgKind, ArgValue, ArgumentSpec, Arguments};
use crate::rows::GroupRow;
use crate::sorting::{sort_rows, SortingColumn};

pub const ARG_SORT_BY: &str = "Sort by";
pub const ARG_SORT_DESCENDING: &str = "Sort descending";
pub const ARG_ONLY_ACTIVE: &str = "Show only groups with an active anomaly";

// ── Sort and filter options ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingOptions {
    pub sort_by: SortingColumn,
    pub descending: bool,
    /// Keep only rows in error (unmonitored).
    pub only_errors: bool,
    pub only_active_anomalies: bool,
}

impl ListingOptions {
    /// Argument specs for a listing. `error_filter` is the label of the
    /// error filter, which differs between listings.
    pub fn arguments(error_filter: &'static str, columns: &[SortingColumn]) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::new(error_filter, ArgKind::Bool).with_default(ArgValue::Bool(false)),
            ArgumentSpec::new(ARG_ONLY_ACTIVE, ArgKind::Bool).with_default(ArgValue::Bool(false)),
            ArgumentSpec::new(ARG_SORT_BY, ArgKind::Dropdown)
                .with_default(ArgValue::String(SortingColumn::Name.description().to_string()))
                .with_options(SortingColumn::descriptions(columns)),
            ArgumentSpec::new(ARG_SORT_DESCENDING, ArgKind::Bool)
                .with_default(ArgValue::Bool(false)),
        ]
    }

    pub fn from_arguments(
        args: &Arguments,
        error_filter: &'static str,
        columns: &[SortingColumn],
    ) -> Result<Self, SourceError> {
        let sort_by = match args.string(ARG_SORT_BY) {
            None => SortingColumn::default(),
            Some(s) => s
                .parse::<SortingColumn>()
                .ok()
                .filter(|c| columns.contains(c))
                .ok_or_else(|| SourceError::InvalidArgument {
                    name: ARG_SORT_BY,
                    reason: format!("'{}' is not a sortable column", s),
                })?,
        };
        Ok(Self {
            sort_by,
            descending: args.bool(ARG_SORT_DESCENDING).unwrap_or(false),
            only_errors: args.bool(error_filter).unwrap_or(false),
            only_active_anomalies: args.bool(ARG_ONLY_ACTIVE).unwrap_or(false),
        })
    }

    /// Filter then sort.
    pub fn apply(&self, mut rows: Vec<GroupRow>) -> Vec<GroupRow> {
        rows.retain(|r| {
            (!self.only_errors || r.has_error())
                && (!self.only_active_anomalies || r.common().has_active_anomaly)
        });
        sort_rows(&mut rows, self.sort_by, self.descending);
        rows
    }
}

/// Name a row shows for the subgroup at `index`. A simple group's only
/// subgroup goes by the group name; unnamed shared-model subgroups get a
/// numbered placeholder.
pub fn row_name(group: &GroupInfo, index: usize) -> String {
    if group.is_simple() {
        return group.name.clone();
    }
    match group.subgroups[index].name.as_deref() {
        Some(n) if !n.trim().is_empty() => n.to_string(),
        _ => subgroup_placeholder_name(index + 1),
    }
}

// ── Anomaly statistics ────────────────────────────────────────

/// Active anomalies and per-subgroup anomaly counts over the history window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyStats {
    pub active: HashSet<Uuid>,
    pub counts: HashMap<Uuid, usize>,
}

impl AnomalyStats {
    /// Failures of either lookup are logged and read as "no anomalies", so a
    /// listing still renders when the anomaly side is down.
    pub fn fetch(
        feed: &dyn AnomalyFeed,
        history: &HistoricalAnomalyCache,
        capabilities: ServiceCapabilities,
        now: DateTime<Utc>,
    ) -> Self {
        let active = feed.active_anomaly_subgroups().unwrap_or_else(|e| {
            warn!(error = %e, "Could not fetch active anomalies");
            HashSet::new()
        });

        let mut counts = HashMap::new();
        if capabilities.historical_anomalies_available {
            match history.anomalies(feed, now, false) {
                Ok(anomalies) => {
                    let mut seen = HashSet::new();
                    for a in anomalies {
                        if seen.insert(a.anomaly_id) {
                            *counts.entry(a.subgroup_id).or_insert(0) += 1;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Could not fetch historical anomalies"),
            }
        }

        Self { active, counts }
    }

    pub fn annotate(&self, row: &mut GroupRow) {
        let common = row.common_mut();
        if let Some(id) = common.subgroup_id {
            common.has_active_anomaly = self.active.contains(&id);
            common.anomalies_in_last_30_days = self.counts.get(&id).copied().unwrap_or(0);
        }
    }
}
