use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rows::GroupRow;

/// Sort keys offered by the listing sources. Descriptions are what the host shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortingColumn {
    #[default]
    Name,
    AnomaliesInLast30Days,
    UpdateModel,
    AnomalyThreshold,
    MinimumAnomalyDuration,
    /// Only meaningful for subgroup rows, which carry a fit score.
    IsOutlier,
}

impl SortingColumn {
    pub const ALL: [SortingColumn; 6] = [
        SortingColumn::Name,
        SortingColumn::AnomaliesInLast30Days,
        SortingColumn::UpdateModel,
        SortingColumn::AnomalyThreshold,
        SortingColumn::MinimumAnomalyDuration,
        SortingColumn::IsOutlier,
    ];

    pub fn description(self) -> &'static str {
        match self {
            SortingColumn::Name => "Name",
            SortingColumn::AnomaliesInLast30Days => "Number of anomalies in Last 30 Days",
            SortingColumn::UpdateModel => "Adaptive / Static model",
            SortingColumn::AnomalyThreshold => "Anomaly Threshold",
            SortingColumn::MinimumAnomalyDuration => "Minimum Anomaly Duration",
            SortingColumn::IsOutlier => "Is Outlier",
        }
    }

    fn slug(self) -> &'static str {
        match self {
            SortingColumn::Name => "name",
            SortingColumn::AnomaliesInLast30Days => "anomalies",
            SortingColumn::UpdateModel => "update-model",
            SortingColumn::AnomalyThreshold => "threshold",
            SortingColumn::MinimumAnomalyDuration => "duration",
            SortingColumn::IsOutlier => "outlier",
        }
    }

    pub fn descriptions(columns: &[SortingColumn]) -> Vec<String> {
        columns.iter().map(|c| c.description().to_string()).collect()
    }
}

impl fmt::Display for SortingColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Accepts the description (as the host sends it) or a short slug, case-insensitively.
impl FromStr for SortingColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SortingColumn::ALL
            .into_iter()
            .find(|c| c.description().to_lowercase() == wanted || c.slug() == wanted)
            .ok_or_else(|| format!("unknown sort column '{}'", s))
    }
}

fn by_name(a: &GroupRow, b: &GroupRow) -> Ordering {
    a.name().to_lowercase().cmp(&b.name().to_lowercase())
}

/// Sort `rows` in place. Ties break by name, case-insensitive ascending,
/// whatever the direction.
///
/// Update Model sorts adaptive before static when ascending. Returns false
/// (rows untouched) when the column does not apply to any row, as with
/// `IsOutlier` on group listing rows.
pub fn sort_rows(rows: &mut [GroupRow], column: SortingColumn, descending: bool) -> bool {
    let directed = |o: Ordering| if descending { o.reverse() } else { o };
    match column {
        SortingColumn::Name => rows.sort_by(|a, b| directed(by_name(a, b))),
        SortingColumn::AnomaliesInLast30Days => rows.sort_by(|a, b| {
            let x = a.common().anomalies_in_last_30_days;
            let y = b.common().anomalies_in_last_30_days;
            directed(x.cmp(&y)).then_with(|| by_name(a, b))
        }),
        SortingColumn::UpdateModel => rows.sort_by(|a, b| {
            let (x, y) = (a.common().update_model, b.common().update_model);
            directed(y.cmp(&x)).then_with(|| by_name(a, b))
        }),
        SortingColumn::AnomalyThreshold => rows.sort_by(|a, b| {
            let (x, y) = (a.common().anomaly_threshold, b.common().anomaly_threshold);
            directed(x.total_cmp(&y)).then_with(|| by_name(a, b))
        }),
        SortingColumn::MinimumAnomalyDuration => rows.sort_by(|a, b| {
            let (x, y) = (a.common().minimum_anomaly_duration, b.common().minimum_anomaly_duration);
            directed(x.cmp(&y)).then_with(|| by_name(a, b))
        }),
        SortingColumn::IsOutlier => {
            if !rows.iter().any(|r| matches!(r, GroupRow::Subgroup { .. })) {
                return false;
            }
            rows.sort_by(|a, b| {
                let x = a.fit_score().unwrap_or(f64::NAN);
                let y = b.fit_score().unwrap_or(f64::NAN);
                directed(x.total_cmp(&y)).then_with(|| by_name(a, b))
            })
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FitScore;
    use crate::rows::RowCommon;

    fn row(name: &str, update_model: bool, threshold: f64, anomalies: usize) -> GroupRow {
        GroupRow::Simple(RowCommon {
            name: name.into(),
            data_miner_id: 1,
            parameters: vec![],
            update_model,
            anomaly_threshold: threshold,
            minimum_anomaly_duration: 5,
            is_monitored: true,
            parent_group: name.into(),
            subgroup_id: None,
            has_active_anomaly: false,
            anomalies_in_last_30_days: anomalies,
        })
    }

    fn names(rows: &[GroupRow]) -> Vec<&str> {
        rows.iter().map(GroupRow::name).collect()
    }

    #[test]
    fn name_sort_is_case_insensitive() {
        let mut rows = vec![
            row("beta", false, 3.0, 0),
            row("Alpha", false, 3.0, 0),
            row("gamma", false, 3.0, 0),
        ];
        sort_rows(&mut rows, SortingColumn::Name, false);
        assert_eq!(names(&rows), ["Alpha", "beta", "gamma"]);
        sort_rows(&mut rows, SortingColumn::Name, true);
        assert_eq!(names(&rows), ["gamma", "beta", "Alpha"]);
    }

    #[test]
    fn update_model_ascending_puts_adaptive_first() {
        let mut rows = vec![
            row("b", false, 3.0, 0),
            row("a", false, 3.0, 0),
            row("c", true, 3.0, 0),
        ];
        sort_rows(&mut rows, SortingColumn::UpdateModel, false);
        assert_eq!(names(&rows), ["c", "a", "b"]);
        sort_rows(&mut rows, SortingColumn::UpdateModel, true);
        assert_eq!(names(&rows), ["a", "b", "c"]);
    }

    #[test]
    fn ties_break_by_name_ascending_even_when_descending() {
        let mut rows = vec![
            row("b", false, 3.0, 2),
            row("a", false, 3.0, 2),
            row("c", false, 3.0, 7),
        ];
        sort_rows(&mut rows, SortingColumn::AnomaliesInLast30Days, true);
        assert_eq!(names(&rows), ["c", "a", "b"]);
    }

    #[test]
    fn threshold_sort() {
        let mut rows = vec![row("x", false, 5.0, 0), row("y", false, 2.5, 0)];
        sort_rows(&mut rows, SortingColumn::AnomalyThreshold, false);
        assert_eq!(names(&rows), ["y", "x"]);
    }

    #[test]
    fn outlier_sort_only_applies_to_subgroup_rows() {
        let mut rows = vec![row("b", false, 3.0, 0), row("a", false, 3.0, 0)];
        assert!(!sort_rows(&mut rows, SortingColumn::IsOutlier, false));
        assert_eq!(names(&rows), ["b", "a"]);

        let sub = |name: &str, fit: f64| GroupRow::Subgroup {
            common: match row(name, false, 3.0, 0) {
                GroupRow::Simple(c) => c,
                _ => unreachable!(),
            },
            fit_score: Some(FitScore {
                model_fit: fit,
                is_outlier: fit < 0.5,
            }),
        };
        let mut rows = vec![sub("a", 0.9), sub("b", 0.1)];
        assert!(sort_rows(&mut rows, SortingColumn::IsOutlier, false));
        assert_eq!(names(&rows), ["b", "a"]);
    }

    #[test]
    fn parses_descriptions_and_slugs() {
        assert_eq!(
            "Adaptive / Static model".parse::<SortingColumn>(),
            Ok(SortingColumn::UpdateModel)
        );
        assert_eq!("threshold".parse::<SortingColumn>(), Ok(SortingColumn::AnomalyThreshold));
        assert!("bogus".parse::<SortingColumn>().is_err());
    }
}
