use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parameter::{ParameterKey, SubgroupParameter};

/// Platform defaults applied when neither a subgroup nor its group sets an option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionDefaults {
    pub anomaly_threshold: f64,
    /// Minutes.
    pub minimum_anomaly_duration: u32,
}

impl Default for OptionDefaults {
    fn default() -> Self {
        Self {
            anomaly_threshold: 3.0,
            minimum_anomaly_duration: 5,
        }
    }
}

/// Group-level options. Subgroups fall back to these when they don't override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupOptions {
    /// Adaptive model (`true`) or static model (`false`).
    #[serde(default)]
    pub update_model: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_threshold: Option<f64>,
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_anomaly_duration: Option<u32>,
}

/// Per-subgroup overrides of the group options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubgroupOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_anomaly_duration: Option<u32>,
}

impl SubgroupOptions {
    pub fn is_empty(&self) -> bool {
        self.anomaly_threshold.is_none() && self.minimum_anomaly_duration.is_none()
    }
}

/// One subgroup: a set of parameters sharing a single detection model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgroupInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Assigned by the configuration store; `None` for subgroups created in the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub parameters: Vec<SubgroupParameter>,
    #[serde(default, skip_serializing_if = "SubgroupOptions::is_empty")]
    pub options: SubgroupOptions,
    #[serde(default = "default_monitored")]
    pub is_monitored: bool,
}

fn default_monitored() -> bool {
    true
}

impl SubgroupInfo {
    pub fn new(parameters: Vec<SubgroupParameter>) -> Self {
        Self {
            name: None,
            id: None,
            parameters,
            options: SubgroupOptions::default(),
            is_monitored: true,
        }
    }

    /// Build an unlabeled subgroup from bare keys.
    pub fn from_keys(keys: impl IntoIterator<Item = ParameterKey>) -> Self {
        Self::new(keys.into_iter().map(SubgroupParameter::new).collect())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_keys(&self) -> impl Iterator<Item = &ParameterKey> {
        self.parameters.iter().map(|p| &p.key)
    }

    /// Sorted copy of the parameter keys: the canonical, order-insensitive form.
    pub fn normalized_keys(&self) -> Vec<ParameterKey> {
        let mut keys: Vec<ParameterKey> = self.parameter_keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy of this subgroup with its parameters sorted by key.
    pub fn normalized(&self) -> Self {
        let mut copy = self.clone();
        copy.parameters.sort_by(|a, b| a.key.cmp(&b.key));
        copy
    }

    /// Same parameters (up to order), same count.
    pub fn has_same_parameters(&self, other: &SubgroupInfo) -> bool {
        self.parameter_count() == other.parameter_count()
            && self.normalized_keys() == other.normalized_keys()
    }

    /// Name shown to operators; unnamed subgroups fall back to the group name.
    pub fn display_name<'a>(&'a self, group_name: &'a str) -> &'a str {
        match self.name.as_deref() {
            Some(n) if !n.is_empty() => n,
            _ => group_name,
        }
    }

    pub fn effective_anomaly_threshold(
        &self,
        group: &GroupOptions,
        defaults: &OptionDefaults,
    ) -> f64 {
        self.options
            .anomaly_threshold
            .or(group.anomaly_threshold)
            .unwrap_or(defaults.anomaly_threshold)
    }

    /// Minutes.
    pub fn effective_minimum_anomaly_duration(
        &self,
        group: &GroupOptions,
        defaults: &OptionDefaults,
    ) -> u32 {
        self.options
            .minimum_anomaly_duration
            .or(group.minimum_anomaly_duration)
            .unwrap_or(defaults.minimum_anomaly_duration)
    }
}

/// Placeholder display name for the n-th (1-based) unnamed subgroup.
pub fn subgroup_placeholder_name(n: usize) -> String {
    format!("Subgroup {}", n)
}

/// A full relational anomaly group.
///
/// One subgroup makes a simple group, more than one a shared-model group.
/// There is no explicit tag: the subgroup count is the discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    #[serde(default)]
    pub data_miner_id: i32,
    #[serde(default)]
    pub options: GroupOptions,
    pub subgroups: Vec<SubgroupInfo>,
}

impl GroupInfo {
    pub fn new(name: impl Into<String>, subgroups: Vec<SubgroupInfo>) -> Self {
        Self {
            name: name.into(),
            data_miner_id: 0,
            options: GroupOptions::default(),
            subgroups,
        }
    }

    pub fn with_options(mut self, options: GroupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_data_miner_id(mut self, data_miner_id: i32) -> Self {
        self.data_miner_id = data_miner_id;
        self
    }

    pub fn is_shared_model(&self) -> bool {
        self.subgroups.len() > 1
    }

    pub fn is_simple(&self) -> bool {
        self.subgroups.len() == 1
    }

    /// Parameters per subgroup (the model shape), taken from the first subgroup.
    pub fn parameter_count(&self) -> Option<usize> {
        self.subgroups.first().map(SubgroupInfo::parameter_count)
    }

    /// Case-insensitive name comparison, the way group names are unique.
    pub fn has_name(&self, name: &str) -> bool {
        names_equal(&self.name, name)
    }

    pub fn find_subgroup(&self, id: Uuid) -> Option<&SubgroupInfo> {
        self.subgroups.iter().find(|s| s.id == Some(id))
    }

    pub fn find_subgroup_by_name(&self, name: &str) -> Option<&SubgroupInfo> {
        self.subgroups
            .iter()
            .find(|s| s.name.as_deref().is_some_and(|n| names_equal(n, name)))
    }

    pub fn subgroup_ids(&self) -> Vec<Uuid> {
        self.subgroups.iter().filter_map(|s| s.id).collect()
    }
}

/// Group and subgroup names are compared case-insensitively.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
