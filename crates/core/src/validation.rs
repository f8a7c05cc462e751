//! Editor-side validation of group settings and training configuration.
//!
//! Everything here is a pure function over the data. Errors block applying
//! an edit; warnings are advisory. Reconciliation assumes its inputs already
//! passed these checks.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::group::{names_equal, GroupInfo, GroupOptions, SubgroupOptions};
use crate::parameter::ParameterKey;
use crate::training::TrainingConfiguration;

pub const MIN_PARAMETERS: usize = 2;
pub const MAX_PARAMETERS: usize = 100;

// ── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location, e.g. `"subgroups[1].parameters"`.
    pub path: String,
    pub message: String,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// First error message, the text shown next to a disabled apply button.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a group name against the names already present on the agent.
///
/// `original_name` is the name of the group being edited; keeping it is allowed.
pub fn validate_group_name(
    name: &str,
    existing_names: &[String],
    original_name: Option<&str>,
) -> ValidationResult {
    let mut result = ValidationResult::new();
    if name.trim().is_empty() {
        result.error("name", "Provide a group name.");
        return result;
    }

    let keeps_original = original_name.is_some_and(|o| names_equal(o, name));
    if !keeps_original && existing_names.iter().any(|n| names_equal(n, name)) {
        result.error("name", format!("A group with name '{}' already exists.", name));
    }
    result
}

/// Validate the complete group: name, options and every subgroup.
pub fn validate_group(
    group: &GroupInfo,
    existing_names: &[String],
    original_name: Option<&str>,
) -> ValidationResult {
    let mut result = validate_group_name(&group.name, existing_names, original_name);
    validate_group_options(&group.options, &mut result);

    if group.subgroups.is_empty() {
        result.error("subgroups", "Add at least one subgroup.");
        return result;
    }

    let expected = group.subgroups[0].parameter_count();
    let mut seen_names = HashSet::new();
    for (i, subgroup) in group.subgroups.iter().enumerate() {
        let path = format!("subgroups[{}]", i);
        let count = subgroup.parameter_count();

        if count == 0 {
            result.error(format!("{}.parameters", path), "Select at least one parameter.");
        } else if !(MIN_PARAMETERS..=MAX_PARAMETERS).contains(&count) {
            result.error(
                format!("{}.parameters", path),
                format!(
                    "Select between {} and {} parameters, found {}.",
                    MIN_PARAMETERS, MAX_PARAMETERS, count
                ),
            );
        }

        if count != expected {
            result.error(
                format!("{}.parameters", path),
                format!(
                    "All subgroups must have the same number of parameters ({} expected, found {}).",
                    expected, count
                ),
            );
        }

        let mut keys: HashSet<&ParameterKey> = HashSet::new();
        if subgroup.parameter_keys().any(|k| !keys.insert(k)) {
            result.error(
                format!("{}.parameters", path),
                "The same parameter is selected more than once.",
            );
        }

        if let Some(name) = subgroup.name.as_deref().filter(|n| !n.is_empty()) {
            if name.trim().is_empty() {
                result.error(
                    format!("{}.name", path),
                    "Subgroup names cannot only contain whitespace.",
                );
            } else if !seen_names.insert(name.to_lowercase()) {
                result.error(
                    format!("{}.name", path),
                    format!("Duplicate subgroup name '{}'.", name),
                );
            }
        }

        validate_subgroup_options(&subgroup.options, &path, &mut result);

        if !subgroup.is_monitored {
            result.warn(path, "Subgroup is currently not monitored.");
        }
    }

    if group.is_shared_model() {
        let labels: Vec<String> = group.subgroups[0]
            .parameters
            .iter()
            .map(|p| p.label.clone().unwrap_or_default())
            .collect();
        result.merge(validate_labels(&labels));
    }

    result
}

/// Labels are either all empty or all set, never whitespace-only, and unique
/// (case-insensitive).
pub fn validate_labels(labels: &[String]) -> ValidationResult {
    let mut result = ValidationResult::new();

    let any_set = labels.iter().any(|l| !l.is_empty());
    let any_missing = labels.iter().any(|l| l.is_empty());
    if any_set && any_missing {
        result.error(
            "labels",
            "Either provide a label for all parameters, or do not provide any labels.",
        );
    }

    if labels.iter().any(|l| !l.is_empty() && l.trim().is_empty()) {
        result.error("labels", "Parameter labels cannot only contain whitespace characters.");
    }

    let mut seen = HashSet::new();
    let mut duplicated = Vec::new();
    for label in labels.iter().filter(|l| !l.trim().is_empty()) {
        let lowered = label.to_lowercase();
        let already_reported = duplicated.iter().any(|d: &String| d.to_lowercase() == lowered);
        if !seen.insert(lowered.clone()) && !already_reported {
            duplicated.push(label.clone());
        }
    }
    if !duplicated.is_empty() {
        result.error(
            "labels",
            format!(
                "Provide a unique label for each parameter. Duplicated: {}",
                human_readable_join(&duplicated)
            ),
        );
    }

    result
}

/// Validate the training configuration against the subgroups it refers to.
///
/// Training is forced for brand new models: then at least one time range is
/// required. Excluding subgroups without a time range makes no sense either,
/// and at least one subgroup must stay included.
pub fn validate_training(
    config: &TrainingConfiguration,
    subgroup_ids: &[Uuid],
    force_training: bool,
) -> ValidationResult {
    let mut result = ValidationResult::new();

    let has_exclusions = !config.excluded_subgroup_ids.is_empty();
    if config.time_ranges.is_empty() && (force_training || has_exclusions) {
        result.error("training.time_ranges", "Select at least one time range to train the model.");
    }

    for (i, range) in config.time_ranges.iter().enumerate() {
        if !range.is_valid() {
            result.error(
                format!("training.time_ranges[{}]", i),
                "The start of a time range must be before its end.",
            );
        }
    }

    if !subgroup_ids.is_empty()
        && subgroup_ids
            .iter()
            .all(|id| config.excluded_subgroup_ids.contains(id))
    {
        result.error(
            "training.excluded_subgroups",
            "At least one subgroup must be included for training the model.",
        );
    }

    result
}

fn validate_group_options(options: &GroupOptions, result: &mut ValidationResult) {
    if let Some(threshold) = options.anomaly_threshold {
        if !(threshold > 0.0 && threshold.is_finite()) {
            result.error(
                "options.anomaly_threshold",
                "The anomaly threshold must be a positive number.",
            );
        }
    }
}

fn validate_subgroup_options(options: &SubgroupOptions, path: &str, result: &mut ValidationResult) {
    if let Some(threshold) = options.anomaly_threshold {
        if !(threshold > 0.0 && threshold.is_finite()) {
            result.error(
                format!("{}.options.anomaly_threshold", path),
                "The anomaly threshold must be a positive number.",
            );
        }
    }
}

/// `a`, `a and b`, `a, b and c`.
pub fn human_readable_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::SubgroupInfo;
    use crate::parameter::SubgroupParameter;
    use crate::training::TimeRange;
    use chrono::{Duration, Utc};

    fn key(p: i32) -> ParameterKey {
        ParameterKey::new(1, 10, p)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn group_name_must_be_unique_case_insensitive() {
        let existing = names(&["Cooling", "Power"]);
        assert!(!validate_group_name("cooling", &existing, None).valid);
        assert!(validate_group_name("Network", &existing, None).valid);
        // Keeping the original name while editing is fine.
        assert!(validate_group_name("COOLING", &existing, Some("Cooling")).valid);
        assert!(!validate_group_name("   ", &existing, None).valid);
    }

    #[test]
    fn subgroups_need_same_parameter_count() {
        let group = GroupInfo::new(
            "g",
            vec![
                SubgroupInfo::from_keys([key(1), key(2)]),
                SubgroupInfo::from_keys([key(3), key(4), key(5)]),
            ],
        );
        let result = validate_group(&group, &[], None);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.path == "subgroups[1].parameters"));
    }

    #[test]
    fn empty_subgroup_is_rejected() {
        let group = GroupInfo::new("g", vec![SubgroupInfo::from_keys([])]);
        let result = validate_group(&group, &[], None);
        assert_eq!(result.first_error(), Some("Select at least one parameter."));
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let group = GroupInfo::new("g", vec![SubgroupInfo::from_keys([key(1), key(1)])]);
        assert!(!validate_group(&group, &[], None).valid);
    }

    #[test]
    fn valid_shared_model_group_passes() {
        let labeled = |a, b| {
            SubgroupInfo::new(vec![
                SubgroupParameter::labeled(key(a), "Temp"),
                SubgroupParameter::labeled(key(b), "Fan"),
            ])
        };
        let group = GroupInfo::new("Racks", vec![labeled(1, 2), labeled(3, 4)]);
        let result = validate_group(&group, &names(&["Other"]), None);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn labels_all_or_nothing() {
        assert!(validate_labels(&names(&["", ""])).valid);
        assert!(validate_labels(&names(&["a", "b"])).valid);
        assert!(!validate_labels(&names(&["a", ""])).valid);
        assert!(!validate_labels(&names(&["a", "  "])).valid);

        let dup = validate_labels(&names(&["Temp", "temp", "Fan"]));
        assert!(!dup.valid);
        assert!(dup.errors[0].message.to_lowercase().ends_with("temp"));
    }

    #[test]
    fn training_requires_one_included_subgroup() {
        let now = Utc::now();
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let range = TimeRange::new(now - Duration::days(1), now);

        let all_excluded = TrainingConfiguration::new(vec![range], ids.clone());
        assert!(!validate_training(&all_excluded, &ids, false).valid);

        let one_excluded = TrainingConfiguration::new(vec![range], vec![ids[0]]);
        assert!(validate_training(&one_excluded, &ids, false).valid);
    }

    #[test]
    fn training_needs_range_when_forced_or_excluding() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let empty = TrainingConfiguration::default();
        assert!(validate_training(&empty, &ids, false).valid);
        assert!(!validate_training(&empty, &ids, true).valid);

        let exclusion_only = TrainingConfiguration::new(vec![], vec![ids[0]]);
        assert!(!validate_training(&exclusion_only, &ids, false).valid);
    }

    #[test]
    fn inverted_time_range_is_rejected() {
        let now = Utc::now();
        let inverted = TimeRange::new(now, now - Duration::hours(1));
        let config = TrainingConfiguration::new(vec![inverted], vec![]);
        assert!(!validate_training(&config, &[], false).valid);
    }

    #[test]
    fn join_reads_naturally() {
        assert_eq!(human_readable_join(&names(&["a"])), "a");
        assert_eq!(human_readable_join(&names(&["a", "b"])), "a and b");
        assert_eq!(human_readable_join(&names(&["a", "b", "c"])), "a, b and c");
    }
}
