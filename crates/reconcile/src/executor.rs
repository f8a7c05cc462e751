//! Applies a plan against the configuration service.
//!
//! Operations run one at a time, in plan order. The first failure stops the
//! run: there is no retry and no rollback, the report says what got through.

use rad_core::validation::{human_readable_join, validate_training};
use rad_core::{
    ConfigurationService, GroupInfo, PersistableTrainingConfig, TimeRange, TrainingConfiguration,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::plan::{GroupOperation, ReconcilePlan};
use crate::ReconcileError;

/// The operation that stopped a run, with the service's error text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedOperation {
    pub operation: GroupOperation,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TrainingOutcome {
    NotRequested,
    /// Carried by the `AddGroup` call.
    SentWithGroup,
    /// Requested through a separate retrain call.
    Retrained,
    /// Group operations did not all succeed, so no training was requested.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyReport {
    pub succeeded: Vec<GroupOperation>,
    pub failed: Option<FailedOperation>,
    pub not_attempted: Vec<GroupOperation>,
    /// Stopped by the abort check rather than by a failure.
    pub aborted: bool,
    pub training: TrainingOutcome,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none() && !self.aborted
    }

    /// "Failed to <action> '<target>': <error>" for the operation that failed.
    pub fn failure_message(&self) -> Option<String> {
        self.failed.as_ref().map(|f| {
            format!(
                "Failed to {} '{}': {}",
                f.operation.action(),
                f.operation.target(),
                f.error
            )
        })
    }

    /// Non-blocking problems: the group was saved but training could not be requested.
    pub fn warnings(&self) -> Vec<String> {
        match &self.training {
            TrainingOutcome::Failed(e) => {
                vec![format!("Failed to start training of the model: {}", e)]
            }
            _ => Vec::new(),
        }
    }
}

/// Outcome of a bulk add or remove, which keeps going past failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    /// Verb used in the aggregated message ("create", "remove").
    pub action: String,
    pub succeeded: Vec<String>,
    /// (group name, error text)
    pub failed: Vec<(String, String)>,
}

impl BulkReport {
    fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// "Failed to create 'a' and 'b'" followed by the individual errors.
    pub fn failure_message(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        let names: Vec<String> = self.failed.iter().map(|(n, _)| format!("'{}'", n)).collect();
        let details: Vec<String> = self
            .failed
            .iter()
            .map(|(n, e)| format!("{}: {}", n, e))
            .collect();
        Some(format!(
            "Failed to {} {}\n{}",
            self.action,
            human_readable_join(&names),
            details.join("\n")
        ))
    }
}

pub struct PlanExecutor<'a> {
    service: &'a mut dyn ConfigurationService,
    should_continue: Box<dyn FnMut() -> bool + 'a>,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(service: &'a mut dyn ConfigurationService) -> Self {
        Self {
            service,
            should_continue: Box::new(|| true),
        }
    }

    /// Checked before every operation; returning `false` stops the run.
    pub fn with_abort_check(mut self, should_continue: impl FnMut() -> bool + 'a) -> Self {
        self.should_continue = Box::new(should_continue);
        self
    }

    /// Apply every operation of `plan`, then request training if needed.
    ///
    /// Training rides along with `AddGroup` when the platform allows it.
    /// Otherwise it is requested with a separate retrain call once all group
    /// operations succeeded.
    pub fn apply(
        &mut self,
        plan: &ReconcilePlan,
        training: Option<&PersistableTrainingConfig>,
    ) -> ApplyReport {
        let capabilities = self.service.capabilities();
        let training_in_add = capabilities.training_config_in_add_group;

        let mut report = ApplyReport {
            succeeded: Vec::new(),
            failed: None,
            not_attempted: Vec::new(),
            aborted: false,
            training: TrainingOutcome::NotRequested,
        };
        let mut training_sent = false;

        for (i, op) in plan.operations.iter().enumerate() {
            if !(self.should_continue)() {
                warn!(
                    group = %plan.group_name,
                    remaining = plan.operations.len() - i,
                    "Apply aborted"
                );
                report.aborted = true;
                report.not_attempted = plan.operations[i..].to_vec();
                break;
            }

            let with_training = match op {
                GroupOperation::AddGroup { .. } if training_in_add => training,
                _ => None,
            };
            debug!(operation = %op, "Applying");
            match self.apply_one(plan.data_miner_id, op, with_training) {
                Ok(()) => {
                    training_sent |= with_training.is_some();
                    report.succeeded.push(op.clone());
                }
                Err(e) => {
                    warn!(operation = %op, error = %e, "Operation failed");
                    report.failed = Some(FailedOperation {
                        operation: op.clone(),
                        error: e.to_string(),
                    });
                    report.not_attempted = plan.operations[i + 1..].to_vec();
                    break;
                }
            }
        }

        report.training = match training {
            None => TrainingOutcome::NotRequested,
            Some(_) if !report.is_success() => TrainingOutcome::Skipped,
            Some(_) if training_sent => TrainingOutcome::SentWithGroup,
            Some(t) => match self.service.retrain(
                plan.data_miner_id,
                &plan.group_name,
                &t.time_ranges,
                &t.excluded_subgroups,
            ) {
                Ok(()) => TrainingOutcome::Retrained,
                Err(e) => {
                    warn!(group = %plan.group_name, error = %e, "Retrain request failed");
                    TrainingOutcome::Failed(e.to_string())
                }
            },
        };

        if report.is_success() {
            info!(
                group = %plan.group_name,
                operations = report.succeeded.len(),
                "Group changes applied"
            );
        }
        report
    }

    fn apply_one(
        &mut self,
        data_miner_id: i32,
        op: &GroupOperation,
        training: Option<&PersistableTrainingConfig>,
    ) -> rad_core::Result<()> {
        match op {
            GroupOperation::RemoveGroup { name } => self.service.remove_group(data_miner_id, name),
            GroupOperation::RenameGroup { old_name, new_name } => {
                self.service.rename_group(data_miner_id, old_name, new_name)
            }
            GroupOperation::RemoveSubgroup {
                group_name,
                subgroup_id,
            } => self.service.remove_subgroup(data_miner_id, group_name, *subgroup_id),
            GroupOperation::AddSubgroup {
                group_name,
                subgroup,
            } => {
                let id = self.service.add_subgroup(data_miner_id, group_name, subgroup)?;
                debug!(group = %group_name, subgroup_id = %id, "Subgroup added");
                Ok(())
            }
            GroupOperation::AddGroup { group } => self.service.add_group(group, training),
            GroupOperation::UpdateGroupOptions { group_name, options } => {
                self.service.update_group_options(data_miner_id, group_name, options)
            }
            GroupOperation::UpdateSubgroup {
                group_name,
                subgroup_id,
                name,
                options,
            } => self.service.update_subgroup(
                data_miner_id,
                group_name,
                *subgroup_id,
                name.as_deref(),
                options,
            ),
        }
    }

    // ── Retrain ────────────────────────────────────────────────

    /// Retrain the model of a stored group on well-behaved `time_ranges`.
    ///
    /// Every subgroup takes part. At least one valid range is required.
    pub fn retrain(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        time_ranges: &[TimeRange],
    ) -> Result<(), ReconcileError> {
        let config = TrainingConfiguration::new(time_ranges.to_vec(), Vec::new());
        let validation = validate_training(&config, &[], true);
        if !validation.valid {
            return Err(ReconcileError::invalid(validation));
        }

        self.service.retrain(data_miner_id, group_name, time_ranges, &[])?;
        info!(group = %group_name, ranges = time_ranges.len(), "Model retrain requested");
        Ok(())
    }

    // ── Bulk flows ─────────────────────────────────────────────

    /// Add several groups, continuing past individual failures.
    pub fn add_groups(
        &mut self,
        groups: &[GroupInfo],
        training: Option<&PersistableTrainingConfig>,
    ) -> BulkReport {
        let training_in_add = self.service.capabilities().training_config_in_add_group;
        let mut report = BulkReport::new("create");
        for group in groups {
            if !(self.should_continue)() {
                break;
            }
            let result = if training_in_add {
                self.service.add_group(group, training)
            } else {
                self.service.add_group(group, None).and_then(|()| match training {
                    Some(t) => self.service.retrain(
                        group.data_miner_id,
                        &group.name,
                        &t.time_ranges,
                        &t.excluded_subgroups,
                    ),
                    None => Ok(()),
                })
            };
            match result {
                Ok(()) => report.succeeded.push(group.name.clone()),
                Err(e) => {
                    warn!(group = %group.name, error = %e, "Failed to add group");
                    report.failed.push((group.name.clone(), e.to_string()));
                }
            }
        }
        report
    }

    /// Remove several groups, continuing past individual failures.
    pub fn remove_groups(&mut self, data_miner_id: i32, names: &[String]) -> BulkReport {
        let mut report = BulkReport::new("remove");
        for name in names {
            if !(self.should_continue)() {
                break;
            }
            match self.service.remove_group(data_miner_id, name) {
                Ok(()) => report.succeeded.push(name.clone()),
                Err(e) => {
                    warn!(group = %name, error = %e, "Failed to remove group");
                    report.failed.push((name.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
