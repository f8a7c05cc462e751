//! The remote configuration service as seen by the rest of the workspace.
//!
//! Implementations own the transport; callers only rely on the semantics of
//! each call. Every call is blocking and may fail independently.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::group::{GroupInfo, GroupOptions, SubgroupInfo, SubgroupOptions};
use crate::training::{PersistableTrainingConfig, TimeRange};

/// Feature flags reported by the platform the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCapabilities {
    /// Shared-model groups (and the rename primitive that comes with them) exist.
    pub allow_shared_model_groups: bool,
    /// `add_group` accepts a training configuration; otherwise a separate retrain is needed.
    pub training_config_in_add_group: bool,
    pub historical_anomalies_available: bool,
    pub fit_score_available: bool,
}

impl Default for ServiceCapabilities {
    fn default() -> Self {
        Self {
            allow_shared_model_groups: true,
            training_config_in_add_group: true,
            historical_anomalies_available: true,
            fit_score_available: true,
        }
    }
}

pub trait ConfigurationService {
    fn capabilities(&self) -> ServiceCapabilities;

    /// Names of all groups on the given agent.
    fn fetch_group_names(&self, data_miner_id: i32) -> Result<Vec<String>>;

    /// Full group info, `None` if no group with that name exists.
    fn fetch_group(&self, data_miner_id: i32, name: &str) -> Result<Option<GroupInfo>>;

    /// Every group on every agent.
    fn fetch_groups(&self) -> Result<Vec<GroupInfo>>;

    fn add_group(
        &mut self,
        group: &GroupInfo,
        training: Option<&PersistableTrainingConfig>,
    ) -> Result<()>;

    fn remove_group(&mut self, data_miner_id: i32, name: &str) -> Result<()>;

    fn rename_group(&mut self, data_miner_id: i32, old_name: &str, new_name: &str) -> Result<()>;

    /// Adds a subgroup and returns the id the store assigned to it.
    fn add_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup: &SubgroupInfo,
    ) -> Result<Uuid>;

    fn remove_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
    ) -> Result<()>;

    fn update_group_options(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        options: &GroupOptions,
    ) -> Result<()>;

    fn update_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
        name: Option<&str>,
        options: &SubgroupOptions,
    ) -> Result<()>;

    /// Retrain a group's model on the given ranges, skipping subgroups by position.
    fn retrain(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        time_ranges: &[TimeRange],
        excluded_subgroups: &[usize],
    ) -> Result<()>;
}
