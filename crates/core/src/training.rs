use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A period of normal behavior used as training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

/// Training configuration as chosen in the editor.
///
/// Exclusions are subgroup ids, which stay stable while the operator adds,
/// removes and reorders subgroups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfiguration {
    #[serde(default)]
    pub time_ranges: Vec<TimeRange>,
    #[serde(default)]
    pub excluded_subgroup_ids: Vec<Uuid>,
}

impl TrainingConfiguration {
    pub fn new(time_ranges: Vec<TimeRange>, excluded_subgroup_ids: Vec<Uuid>) -> Self {
        Self {
            time_ranges,
            excluded_subgroup_ids,
        }
    }

    /// True when nothing differs from the editor default, so no training is requested.
    pub fn is_noop(&self, default_ranges: &[TimeRange]) -> bool {
        self.excluded_subgroup_ids.is_empty() && self.time_ranges.as_slice() == default_ranges
    }
}

/// Training configuration in the shape the training request expects:
/// exclusions are positions in the persisted subgroup list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistableTrainingConfig {
    pub time_ranges: Vec<TimeRange>,
    pub excluded_subgroups: Vec<usize>,
}

/// Length in days of the default training range for a new model.
pub const DEFAULT_TRAINING_DAYS: u32 = 60;

/// Default time ranges offered by the editor.
///
/// A brand new model must be trained, so forced training defaults to the last
/// `days` days. Otherwise the default is "keep the existing model".
pub fn default_training_ranges(
    now: DateTime<Utc>,
    force_training: bool,
    days: u32,
) -> Vec<TimeRange> {
    if force_training {
        vec![TimeRange::new(now - Duration::days(i64::from(days)), now)]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn noop_when_equal_to_defaults() {
        let defaults = vec![TimeRange::new(at(1), at(10))];
        let config = TrainingConfiguration::new(defaults.clone(), vec![]);
        assert!(config.is_noop(&defaults));

        let with_exclusion = TrainingConfiguration::new(defaults.clone(), vec![Uuid::new_v4()]);
        assert!(!with_exclusion.is_noop(&defaults));

        let other_range = TrainingConfiguration::new(vec![TimeRange::new(at(2), at(10))], vec![]);
        assert!(!other_range.is_noop(&defaults));
    }

    #[test]
    fn empty_config_is_noop_without_forced_training() {
        let defaults = default_training_ranges(at(20), false, 60);
        assert!(defaults.is_empty());
        assert!(TrainingConfiguration::default().is_noop(&defaults));
    }

    #[test]
    fn forced_default_spans_requested_days() {
        let ranges = default_training_ranges(at(20), true, 5);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start, at(15));
        assert_eq!(ranges[0].end, at(20));
        assert!(ranges[0].is_valid());
    }
}
