use std::cell::Cell;

use chrono::{Duration, TimeZone, Utc};
use rad_core::{
    ConfigurationService, GroupInfo, GroupOptions, ParameterKey, PersistableTrainingConfig,
    RadError, Result, ServiceCapabilities, SubgroupInfo, SubgroupOptions, TimeRange,
};
use rad_store::MemoryStore;
use uuid::Uuid;

use crate::engine::Reconciler;
use crate::executor::{PlanExecutor, TrainingOutcome};
use crate::plan::GroupOperation;
use crate::ReconcileError;

/// Memory store that fails the n-th mutating call (0-based) and optionally every retrain.
struct FlakyStore {
    inner: MemoryStore,
    fail_at: Option<usize>,
    fail_retrain: bool,
    calls: usize,
}

impl FlakyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_at: None,
            fail_retrain: false,
            calls: 0,
        }
    }

    fn tick(&mut self) -> Result<()> {
        let n = self.calls;
        self.calls += 1;
        if self.fail_at == Some(n) {
            return Err(RadError::Communication("connection reset".into()));
        }
        Ok(())
    }
}

impl ConfigurationService for FlakyStore {
    fn capabilities(&self) -> ServiceCapabilities {
        self.inner.capabilities()
    }
    fn fetch_group_names(&self, data_miner_id: i32) -> Result<Vec<String>> {
        self.inner.fetch_group_names(data_miner_id)
    }
    fn fetch_group(&self, data_miner_id: i32, name: &str) -> Result<Option<GroupInfo>> {
        self.inner.fetch_group(data_miner_id, name)
    }
    fn fetch_groups(&self) -> Result<Vec<GroupInfo>> {
        self.inner.fetch_groups()
    }
    fn add_group(
        &mut self,
        group: &GroupInfo,
        training: Option<&PersistableTrainingConfig>,
    ) -> Result<()> {
        self.tick()?;
        self.inner.add_group(group, training)
    }
    fn remove_group(&mut self, data_miner_id: i32, name: &str) -> Result<()> {
        self.tick()?;
        self.inner.remove_group(data_miner_id, name)
    }
    fn rename_group(&mut self, data_miner_id: i32, old_name: &str, new_name: &str) -> Result<()> {
        self.tick()?;
        self.inner.rename_group(data_miner_id, old_name, new_name)
    }
    fn add_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup: &SubgroupInfo,
    ) -> Result<Uuid> {
        self.tick()?;
        self.inner.add_subgroup(data_miner_id, group_name, subgroup)
    }
    fn remove_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
    ) -> Result<()> {
        self.tick()?;
        self.inner.remove_subgroup(data_miner_id, group_name, subgroup_id)
    }
    fn update_group_options(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        options: &GroupOptions,
    ) -> Result<()> {
        self.tick()?;
        self.inner.update_group_options(data_miner_id, group_name, options)
    }
    fn update_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
        name: Option<&str>,
        options: &SubgroupOptions,
    ) -> Result<()> {
        self.tick()?;
        self.inner
            .update_subgroup(data_miner_id, group_name, subgroup_id, name, options)
    }
    fn retrain(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        time_ranges: &[TimeRange],
        excluded_subgroups: &[usize],
    ) -> Result<()> {
        if self.fail_retrain {
            return Err(RadError::Communication("training service unavailable".into()));
        }
        self.inner
            .retrain(data_miner_id, group_name, time_ranges, excluded_subgroups)
    }
}

fn sub(a: i32, b: i32) -> SubgroupInfo {
    SubgroupInfo::from_keys([ParameterKey::new(1, 9, a), ParameterKey::new(1, 9, b)])
}

/// A store holding "Grp" with subgroups {1,2} and {3,4}; returns the stored copy too.
fn seeded(capabilities: ServiceCapabilities) -> (FlakyStore, GroupInfo) {
    let mut inner = MemoryStore::new(capabilities);
    inner
        .add_group(&GroupInfo::new("Grp", vec![sub(1, 2), sub(3, 4)]), None)
        .unwrap();
    let stored = inner.fetch_group(0, "Grp").unwrap().unwrap();
    (FlakyStore::new(inner), stored)
}

fn edited(stored: &GroupInfo) -> GroupInfo {
    let mut desired = stored.clone();
    desired.name = "Grp2".into();
    desired.subgroups = vec![stored.subgroups[0].clone(), sub(5, 6)];
    desired
}

#[test]
fn applies_every_operation_in_order() {
    let (mut store, stored) = seeded(ServiceCapabilities::default());
    let plan = Reconciler::default().reconcile(&stored, &edited(&stored));

    let report = PlanExecutor::new(&mut store).apply(&plan, None);
    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.training, TrainingOutcome::NotRequested);

    let group = store.fetch_group(0, "Grp2").unwrap().unwrap();
    assert_eq!(group.subgroups[0].id, stored.subgroups[0].id);
    assert_eq!(group.subgroups[1].normalized_keys(), sub(5, 6).normalized_keys());
}

#[test]
fn stops_at_first_failure() {
    let (mut store, stored) = seeded(ServiceCapabilities::default());
    store.fail_at = Some(1);
    let plan = Reconciler::default().reconcile(&stored, &edited(&stored));

    let report = PlanExecutor::new(&mut store).apply(&plan, None);
    assert!(!report.is_success());
    assert_eq!(report.succeeded.len(), 1);
    assert!(matches!(report.succeeded[0], GroupOperation::RenameGroup { .. }));
    assert_eq!(report.not_attempted.len(), 1);

    let message = report.failure_message().unwrap();
    assert!(message.starts_with("Failed to remove subgroup 'Grp2/"), "{}", message);
    assert!(message.ends_with("connection reset"), "{}", message);

    // No rollback: the rename stays.
    assert!(store.fetch_group(0, "Grp2").unwrap().is_some());
}

#[test]
fn abort_check_stops_before_the_next_operation() {
    let (mut store, stored) = seeded(ServiceCapabilities::default());
    let plan = Reconciler::default().reconcile(&stored, &edited(&stored));

    let remaining = Cell::new(1usize);
    let report = PlanExecutor::new(&mut store)
        .with_abort_check(|| {
            let left = remaining.get();
            remaining.set(left.saturating_sub(1));
            left > 0
        })
        .apply(&plan, None);

    assert!(report.aborted);
    assert!(report.failed.is_none());
    assert!(!report.is_success());
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.not_attempted.len(), 2);
}

fn training() -> PersistableTrainingConfig {
    PersistableTrainingConfig {
        time_ranges: vec![],
        excluded_subgroups: vec![0],
    }
}

#[test]
fn training_rides_along_with_add_group() {
    let mut store = FlakyStore::new(MemoryStore::new(ServiceCapabilities::default()));
    let plan = Reconciler::default().add(&GroupInfo::new("New", vec![sub(1, 2), sub(3, 4)]));

    let report = PlanExecutor::new(&mut store).apply(&plan, Some(&training()));
    assert_eq!(report.training, TrainingOutcome::SentWithGroup);
    assert_eq!(store.inner.training_requests().len(), 1);
}

#[test]
fn training_is_a_separate_retrain_when_add_cannot_carry_it() {
    let capabilities = ServiceCapabilities {
        training_config_in_add_group: false,
        ..ServiceCapabilities::default()
    };
    let mut store = FlakyStore::new(MemoryStore::new(capabilities));
    let plan =
        Reconciler::new(capabilities).add(&GroupInfo::new("New", vec![sub(1, 2), sub(3, 4)]));

    let report = PlanExecutor::new(&mut store).apply(&plan, Some(&training()));
    assert!(report.is_success());
    assert_eq!(report.training, TrainingOutcome::Retrained);
    assert_eq!(store.inner.training_requests()[0].group_name, "New");
}

#[test]
fn targeted_edit_requests_training_through_retrain() {
    let (mut store, stored) = seeded(ServiceCapabilities::default());
    let plan = Reconciler::default().reconcile(&stored, &edited(&stored));

    let report = PlanExecutor::new(&mut store).apply(&plan, Some(&training()));
    assert_eq!(report.training, TrainingOutcome::Retrained);
    assert_eq!(store.inner.training_requests()[0].group_name, "Grp2");
}

#[test]
fn retrain_failure_is_a_warning() {
    let capabilities = ServiceCapabilities {
        training_config_in_add_group: false,
        ..ServiceCapabilities::default()
    };
    let mut store = FlakyStore::new(MemoryStore::new(capabilities));
    store.fail_retrain = true;
    let plan = Reconciler::new(capabilities).add(&GroupInfo::new("New", vec![sub(1, 2)]));

    let report = PlanExecutor::new(&mut store).apply(&plan, Some(&training()));
    assert!(report.is_success());
    assert!(matches!(report.training, TrainingOutcome::Failed(_)));
    assert_eq!(report.warnings().len(), 1);
    assert!(store.fetch_group(0, "New").unwrap().is_some());
}

#[test]
fn training_is_skipped_after_a_failure() {
    let (mut store, stored) = seeded(ServiceCapabilities::default());
    store.fail_at = Some(0);
    let plan = Reconciler::default().reconcile(&stored, &edited(&stored));

    let report = PlanExecutor::new(&mut store).apply(&plan, Some(&training()));
    assert_eq!(report.training, TrainingOutcome::Skipped);
    assert!(store.inner.training_requests().is_empty());
}

#[test]
fn bulk_add_continues_past_failures() {
    let (mut store, _) = seeded(ServiceCapabilities::default());
    let groups = vec![
        GroupInfo::new("A", vec![sub(1, 2)]),
        GroupInfo::new("grp", vec![sub(1, 2)]),
        GroupInfo::new("B", vec![sub(1, 2)]),
        GroupInfo::new("A", vec![sub(3, 4)]),
    ];

    let report = PlanExecutor::new(&mut store).add_groups(&groups, None);
    assert_eq!(report.succeeded, vec!["A".to_string(), "B".to_string()]);
    let message = report.failure_message().unwrap();
    assert!(message.starts_with("Failed to create 'grp' and 'A'"), "{}", message);
}

#[test]
fn bulk_remove_reports_missing_groups() {
    let (mut store, _) = seeded(ServiceCapabilities::default());
    let names = vec!["Grp".to_string(), "Missing".to_string()];

    let report = PlanExecutor::new(&mut store).remove_groups(0, &names);
    assert_eq!(report.succeeded, vec!["Grp".to_string()]);
    assert!(report
        .failure_message()
        .unwrap()
        .starts_with("Failed to remove 'Missing'"));
    assert!(store.fetch_groups().unwrap().is_empty());
}

// ── Retrain ───────────────────────────────────────────────────

fn ranges(hours: &[(u32, u32)]) -> Vec<TimeRange> {
    let day = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    hours
        .iter()
        .map(|&(from, to)| {
            TimeRange::new(day + Duration::hours(from.into()), day + Duration::hours(to.into()))
        })
        .collect()
}

#[test]
fn retrain_uses_every_subgroup() {
    let (mut store, _) = seeded(ServiceCapabilities::default());
    PlanExecutor::new(&mut store)
        .retrain(-1, "grp", &ranges(&[(0, 6), (12, 18)]))
        .unwrap();

    let request = &store.inner.training_requests()[0];
    assert_eq!(request.group_name, "Grp");
    assert_eq!(request.time_ranges.len(), 2);
    assert!(request.excluded_subgroups.is_empty());
}

#[test]
fn retrain_needs_a_valid_time_range() {
    let (mut store, _) = seeded(ServiceCapabilities::default());

    let err = PlanExecutor::new(&mut store).retrain(0, "Grp", &[]).unwrap_err();
    assert_eq!(err.to_string(), "Select at least one time range to train the model.");

    let err = PlanExecutor::new(&mut store)
        .retrain(0, "Grp", &ranges(&[(6, 0)]))
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Invalid { .. }));
    assert!(store.inner.training_requests().is_empty());
}

#[test]
fn retrain_of_a_missing_group_is_a_service_error() {
    let (mut store, _) = seeded(ServiceCapabilities::default());
    let err = PlanExecutor::new(&mut store)
        .retrain(0, "Missing", &ranges(&[(0, 6)]))
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Service(RadError::GroupNotFound(_))));
}
