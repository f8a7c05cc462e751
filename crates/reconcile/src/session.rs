//! Editor state for adding or editing one group.
//!
//! The session owns the working copy and only changes through its methods.
//! Validation is a pure read of that state; `finish` turns a valid state into
//! a plan plus the training configuration to send with it.

use chrono::{DateTime, Utc};
use rad_core::validation::{validate_group, validate_labels, validate_training, MIN_PARAMETERS};
use rad_core::{
    default_training_ranges, ConfigurationService, GroupInfo, GroupOptions,
    PersistableTrainingConfig, RadError, ServiceCapabilities, SubgroupInfo, TimeRange,
    TrainingConfiguration, ValidationResult, DEFAULT_TRAINING_DAYS,
};
use tracing::debug;
use uuid::Uuid;

use crate::engine::Reconciler;
use crate::executor::{ApplyReport, PlanExecutor};
use crate::matcher::match_subgroups;
use crate::plan::ReconcilePlan;
use crate::training::propagate_training;
use crate::ReconcileError;

/// What a finished session hands to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub plan: ReconcilePlan,
    pub training: Option<PersistableTrainingConfig>,
    /// Advisory warnings from validation.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EditSession {
    original: Option<GroupInfo>,
    desired: GroupInfo,
    existing_names: Vec<String>,
    parameter_count: usize,
    labels: Vec<String>,
    /// Labels dropped by lowering the parameter count, restored when it grows again.
    parked_labels: Vec<String>,
    training: Option<TrainingConfiguration>,
    reconciler: Reconciler,
    training_days: u32,
    now: DateTime<Utc>,
}

impl EditSession {
    /// Session for a group that does not exist yet.
    pub fn new_group(
        data_miner_id: i32,
        existing_names: Vec<String>,
        capabilities: ServiceCapabilities,
    ) -> Self {
        Self {
            original: None,
            desired: GroupInfo::new("", Vec::new()).with_data_miner_id(data_miner_id),
            existing_names,
            parameter_count: MIN_PARAMETERS,
            labels: vec![String::new(); MIN_PARAMETERS],
            parked_labels: Vec::new(),
            training: None,
            reconciler: Reconciler::new(capabilities),
            training_days: DEFAULT_TRAINING_DAYS,
            now: Utc::now(),
        }
    }

    /// Session editing a stored group. The working copy starts equal to it.
    pub fn edit(
        original: GroupInfo,
        existing_names: Vec<String>,
        capabilities: ServiceCapabilities,
    ) -> Self {
        let parameter_count = original.parameter_count().unwrap_or(MIN_PARAMETERS);
        let labels = original
            .subgroups
            .first()
            .map(|s| {
                s.parameters
                    .iter()
                    .map(|p| p.label.clone().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_else(|| vec![String::new(); parameter_count]);
        Self {
            desired: original.clone(),
            original: Some(original),
            existing_names,
            parameter_count,
            labels,
            parked_labels: Vec::new(),
            training: None,
            reconciler: Reconciler::new(capabilities),
            training_days: DEFAULT_TRAINING_DAYS,
            now: Utc::now(),
        }
    }

    /// Open an edit session on `name`, fetching the group and the names in use.
    pub fn load(
        service: &dyn ConfigurationService,
        data_miner_id: i32,
        name: &str,
    ) -> Result<Self, ReconcileError> {
        let original = service
            .fetch_group(data_miner_id, name)?
            .ok_or_else(|| RadError::GroupNotFound(name.to_string()))?;
        let existing = service.fetch_group_names(original.data_miner_id)?;
        Ok(Self::edit(original, existing, service.capabilities()))
    }

    pub fn with_training_days(mut self, days: u32) -> Self {
        self.training_days = days;
        self
    }

    /// Pin the clock used for default training ranges.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn original(&self) -> Option<&GroupInfo> {
        self.original.as_ref()
    }

    pub fn desired(&self) -> &GroupInfo {
        &self.desired
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn training(&self) -> Option<&TrainingConfiguration> {
        self.training.as_ref()
    }

    // ── Mutation ───────────────────────────────────────────────

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.desired.name = name.into();
    }

    pub fn set_options(&mut self, options: GroupOptions) {
        self.desired.options = options;
    }

    /// Change the number of parameters per subgroup.
    ///
    /// Subgroups with another count stay as they are and fail validation until
    /// they are edited. Labels past the new count are parked and come back in
    /// order when the count grows again.
    pub fn set_parameter_count(&mut self, count: usize) {
        let current = self.labels.len();
        if count < current {
            let mut dropped = self.labels.split_off(count);
            dropped.append(&mut self.parked_labels);
            self.parked_labels = dropped;
        } else if count > current {
            let restore = (count - current).min(self.parked_labels.len());
            self.labels.extend(self.parked_labels.drain(..restore));
            self.labels.resize(count, String::new());
        }
        self.parameter_count = count;
        self.apply_labels();
    }

    /// Set the per-position parameter labels (shared-model groups).
    pub fn set_labels(&mut self, mut labels: Vec<String>) {
        labels.resize(self.parameter_count, String::new());
        self.labels = labels;
        self.apply_labels();
    }

    /// Add a subgroup to the working copy and return its id.
    ///
    /// Subgroups without an id get a fresh one, so training exclusions can
    /// refer to them before the store has seen them. When the subgroup turns
    /// out to be a stored one, the returned id still names it.
    pub fn add_subgroup(&mut self, mut subgroup: SubgroupInfo) -> Uuid {
        let id = *subgroup.id.get_or_insert_with(Uuid::new_v4);
        self.desired.subgroups.push(subgroup);
        self.apply_labels();
        id
    }

    /// Remove a subgroup from the working copy. Returns false if it was not there.
    pub fn remove_subgroup(&mut self, id: Uuid) -> bool {
        let before = self.desired.subgroups.len();
        self.desired.subgroups.retain(|s| s.id != Some(id));
        before != self.desired.subgroups.len()
    }

    /// Replace the subgroup with the given id, keeping the id.
    pub fn replace_subgroup(&mut self, id: Uuid, subgroup: SubgroupInfo) -> bool {
        let Some(slot) = self.desired.subgroups.iter_mut().find(|s| s.id == Some(id)) else {
            return false;
        };
        *slot = subgroup.with_id(id);
        self.apply_labels();
        true
    }

    /// Replace the whole working copy with a finished group definition.
    ///
    /// Parameter count and labels follow its first subgroup. An edit keeps the
    /// agent of the stored group.
    pub fn set_desired(&mut self, desired: GroupInfo) {
        if let Some(count) = desired.parameter_count() {
            self.parameter_count = count;
        }
        self.labels = desired
            .subgroups
            .first()
            .map(|s| {
                s.parameters
                    .iter()
                    .map(|p| p.label.clone().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        self.labels.resize(self.parameter_count, String::new());
        self.parked_labels.clear();

        if self.original.is_none() {
            self.desired.data_miner_id = desired.data_miner_id;
        }
        self.desired.name = desired.name;
        self.desired.options = desired.options;
        self.desired.subgroups.clear();
        for subgroup in desired.subgroups {
            self.add_subgroup(subgroup);
        }
    }

    pub fn set_training(&mut self, training: Option<TrainingConfiguration>) {
        self.training = training;
    }

    fn apply_labels(&mut self) {
        let count = self.parameter_count;
        for subgroup in self.desired.subgroups.iter_mut().filter(|s| s.parameter_count() == count) {
            for (param, label) in subgroup.parameters.iter_mut().zip(&self.labels) {
                param.label = Some(label.clone()).filter(|l| !l.trim().is_empty());
            }
        }
    }

    // ── Derived state ──────────────────────────────────────────

    /// True when at least one stored subgroup survives the edit, i.e. an
    /// existing model is kept and training is optional.
    pub fn has_preserved_subgroups(&self) -> bool {
        self.original.as_ref().is_some_and(|o| {
            match_subgroups(&o.subgroups, &self.desired.subgroups).preserved_count() > 0
        })
    }

    /// A brand new model has to be trained.
    pub fn force_training(&self) -> bool {
        !self.has_preserved_subgroups()
    }

    pub fn default_training_ranges(&self) -> Vec<TimeRange> {
        default_training_ranges(self.now, self.force_training(), self.training_days)
    }

    /// Training configuration in effect: the one set, or the default.
    fn effective_training(&self) -> TrainingConfiguration {
        self.training.clone().unwrap_or_else(|| {
            TrainingConfiguration::new(self.default_training_ranges(), Vec::new())
        })
    }

    /// Exclusions expressed in working-copy ids. A stored id of a preserved
    /// subgroup that carries another id in the working copy maps to that id.
    fn working_copy_exclusions(&self, config: &TrainingConfiguration) -> Vec<Uuid> {
        let Some(original) = &self.original else {
            return config.excluded_subgroup_ids.clone();
        };
        let aliases = match_subgroups(&original.subgroups, &self.desired.subgroups)
            .id_aliases(&original.subgroups, &self.desired.subgroups);
        config
            .excluded_subgroup_ids
            .iter()
            .map(|&id| {
                aliases
                    .iter()
                    .find(|&&(_, stored)| stored == id)
                    .map_or(id, |&(edited, _)| edited)
            })
            .collect()
    }

    // ── Validation and result ──────────────────────────────────

    pub fn validate(&self) -> ValidationResult {
        let original_name = self.original.as_ref().map(|o| o.name.as_str());
        let mut result = validate_group(&self.desired, &self.existing_names, original_name);

        for (i, subgroup) in self.desired.subgroups.iter().enumerate() {
            if subgroup.parameter_count() != self.parameter_count {
                result.error(
                    format!("subgroups[{}].parameters", i),
                    format!(
                        "Subgroup has {} parameters, the group is set to {}.",
                        subgroup.parameter_count(),
                        self.parameter_count
                    ),
                );
            }
        }

        if !self.desired.is_shared_model() {
            result.merge(validate_labels(&self.labels));
        }

        let ids: Vec<Uuid> = self.desired.subgroup_ids();
        let mut training = self.effective_training();
        training.excluded_subgroup_ids = self.working_copy_exclusions(&training);
        result.merge(validate_training(&training, &ids, self.force_training()));
        result
    }

    /// Validate and produce the plan with its training configuration.
    pub fn finish(&self) -> Result<EditOutcome, ReconcileError> {
        let validation = self.validate();
        if !validation.valid {
            return Err(ReconcileError::invalid(validation));
        }

        let plan = self.reconciler.plan(self.original.as_ref(), &self.desired);
        let training = propagate_training(
            Some(&self.effective_training()),
            &self.default_training_ranges(),
            &plan,
        );
        debug!(
            group = %plan.group_name,
            operations = plan.operations.len(),
            training = training.is_some(),
            "Edit session finished"
        );
        Ok(EditOutcome {
            plan,
            training,
            warnings: validation.warnings.into_iter().map(|w| w.message).collect(),
        })
    }

    /// `finish` followed by applying the plan.
    pub fn apply(
        &self,
        service: &mut dyn ConfigurationService,
    ) -> Result<ApplyReport, ReconcileError> {
        let outcome = self.finish()?;
        Ok(PlanExecutor::new(service).apply(&outcome.plan, outcome.training.as_ref()))
    }
}
