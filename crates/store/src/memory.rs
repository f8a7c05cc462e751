use chrono::{DateTime, Utc};
use rad_core::{
    names_equal, ConfigurationService, GroupInfo, GroupOptions, PersistableTrainingConfig,
    RadError, Result, ServiceCapabilities, SubgroupInfo, SubgroupOptions, TimeRange,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Everything a store holds. This is also the on-disk format of [`crate::FileStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
    #[serde(default)]
    pub training_requests: Vec<TrainingRequest>,
}

/// A recorded request to (re)train a group's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub data_miner_id: i32,
    pub group_name: String,
    pub time_ranges: Vec<TimeRange>,
    #[serde(default)]
    pub excluded_subgroups: Vec<usize>,
    pub requested_at: DateTime<Utc>,
}

/// In-process configuration store.
///
/// A negative agent id in a lookup matches groups on any agent.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    document: StoreDocument,
    capabilities: ServiceCapabilities,
}

impl MemoryStore {
    pub fn new(capabilities: ServiceCapabilities) -> Self {
        Self {
            document: StoreDocument::default(),
            capabilities,
        }
    }

    pub fn from_document(document: StoreDocument, capabilities: ServiceCapabilities) -> Self {
        Self { document, capabilities }
    }

    pub fn document(&self) -> &StoreDocument {
        &self.document
    }

    pub fn into_document(self) -> StoreDocument {
        self.document
    }

    pub fn training_requests(&self) -> &[TrainingRequest] {
        &self.document.training_requests
    }

    fn position(&self, data_miner_id: i32, name: &str) -> Option<usize> {
        self.document
            .groups
            .iter()
            .position(|g| on_agent(g, data_miner_id) && g.has_name(name))
    }

    fn group_mut(&mut self, data_miner_id: i32, name: &str) -> Result<&mut GroupInfo> {
        match self.position(data_miner_id, name) {
            Some(i) => Ok(&mut self.document.groups[i]),
            None => Err(RadError::GroupNotFound(name.to_string())),
        }
    }

    fn record_training(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        ranges: &[TimeRange],
        excluded: &[usize],
    ) {
        self.document.training_requests.push(TrainingRequest {
            data_miner_id,
            group_name: group_name.to_string(),
            time_ranges: ranges.to_vec(),
            excluded_subgroups: excluded.to_vec(),
            requested_at: Utc::now(),
        });
    }
}

fn on_agent(group: &GroupInfo, data_miner_id: i32) -> bool {
    data_miner_id < 0 || group.data_miner_id == data_miner_id
}

impl ConfigurationService for MemoryStore {
    fn capabilities(&self) -> ServiceCapabilities {
        self.capabilities
    }

    fn fetch_group_names(&self, data_miner_id: i32) -> Result<Vec<String>> {
        Ok(self
            .document
            .groups
            .iter()
            .filter(|g| on_agent(g, data_miner_id))
            .map(|g| g.name.clone())
            .collect())
    }

    fn fetch_group(&self, data_miner_id: i32, name: &str) -> Result<Option<GroupInfo>> {
        Ok(self.position(data_miner_id, name).map(|i| self.document.groups[i].clone()))
    }

    fn fetch_groups(&self) -> Result<Vec<GroupInfo>> {
        Ok(self.document.groups.clone())
    }

    fn add_group(
        &mut self,
        group: &GroupInfo,
        training: Option<&PersistableTrainingConfig>,
    ) -> Result<()> {
        if group.subgroups.is_empty() {
            return Err(RadError::InvalidGroup(format!("group '{}' has no subgroups", group.name)));
        }
        if group.is_shared_model() && !self.capabilities.allow_shared_model_groups {
            return Err(RadError::InvalidGroup(
                "shared model groups are not supported on this platform".into(),
            ));
        }
        if training.is_some() && !self.capabilities.training_config_in_add_group {
            return Err(RadError::Other(
                "training configuration cannot be passed when adding a group".into(),
            ));
        }
        if self.position(group.data_miner_id, &group.name).is_some() {
            return Err(RadError::DuplicateGroupName(group.name.clone()));
        }

        let mut stored = group.clone();
        for subgroup in &mut stored.subgroups {
            subgroup.id.get_or_insert_with(Uuid::new_v4);
        }
        self.document.groups.push(stored);
        if let Some(t) = training {
            self.record_training(
                group.data_miner_id,
                &group.name,
                &t.time_ranges,
                &t.excluded_subgroups,
            );
        }
        info!(group = %group.name, subgroups = group.subgroups.len(), "Group added");
        Ok(())
    }

    fn remove_group(&mut self, data_miner_id: i32, name: &str) -> Result<()> {
        let i = self
            .position(data_miner_id, name)
            .ok_or_else(|| RadError::GroupNotFound(name.to_string()))?;
        self.document.groups.remove(i);
        info!(group = %name, "Group removed");
        Ok(())
    }

    fn rename_group(&mut self, data_miner_id: i32, old_name: &str, new_name: &str) -> Result<()> {
        if !self.capabilities.allow_shared_model_groups {
            return Err(RadError::Other("renaming groups is not supported on this platform".into()));
        }
        let i = self
            .position(data_miner_id, old_name)
            .ok_or_else(|| RadError::GroupNotFound(old_name.to_string()))?;
        if !names_equal(old_name, new_name) && self.position(data_miner_id, new_name).is_some() {
            return Err(RadError::DuplicateGroupName(new_name.to_string()));
        }
        self.document.groups[i].name = new_name.to_string();
        info!(from = %old_name, to = %new_name, "Group renamed");
        Ok(())
    }

    fn add_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup: &SubgroupInfo,
    ) -> Result<Uuid> {
        let allow_shared = self.capabilities.allow_shared_model_groups;
        let group = self.group_mut(data_miner_id, group_name)?;
        if !allow_shared {
            return Err(RadError::InvalidGroup(
                "shared model groups are not supported on this platform".into(),
            ));
        }
        if group.parameter_count().is_some_and(|n| n != subgroup.parameter_count()) {
            return Err(RadError::InvalidGroup(format!(
                "subgroup has {} parameters, group '{}' expects {}",
                subgroup.parameter_count(),
                group.name,
                group.parameter_count().unwrap_or_default()
            )));
        }

        let mut stored = subgroup.clone();
        let id = *stored.id.get_or_insert_with(Uuid::new_v4);
        if group.find_subgroup(id).is_some() {
            return Err(RadError::InvalidGroup(format!("subgroup id {} is already in use", id)));
        }
        group.subgroups.push(stored);
        info!(group = %group_name, subgroup_id = %id, "Subgroup added");
        Ok(id)
    }

    fn remove_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
    ) -> Result<()> {
        let group = self.group_mut(data_miner_id, group_name)?;
        let i = group
            .subgroups
            .iter()
            .position(|s| s.id == Some(subgroup_id))
            .ok_or_else(|| RadError::SubgroupNotFound {
                group: group_name.to_string(),
                id: subgroup_id,
            })?;
        if group.subgroups.len() == 1 {
            return Err(RadError::InvalidGroup(format!(
                "cannot remove the last subgroup of group '{}'",
                group_name
            )));
        }
        group.subgroups.remove(i);
        info!(group = %group_name, subgroup_id = %subgroup_id, "Subgroup removed");
        Ok(())
    }

    fn update_group_options(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        options: &GroupOptions,
    ) -> Result<()> {
        self.group_mut(data_miner_id, group_name)?.options = options.clone();
        Ok(())
    }

    fn update_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
        name: Option<&str>,
        options: &SubgroupOptions,
    ) -> Result<()> {
        let group = self.group_mut(data_miner_id, group_name)?;
        let subgroup = group
            .subgroups
            .iter_mut()
            .find(|s| s.id == Some(subgroup_id))
            .ok_or_else(|| RadError::SubgroupNotFound {
                group: group_name.to_string(),
                id: subgroup_id,
            })?;
        subgroup.name = name.map(str::to_string);
        subgroup.options = options.clone();
        Ok(())
    }

    fn retrain(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        time_ranges: &[TimeRange],
        excluded_subgroups: &[usize],
    ) -> Result<()> {
        let group = self.group_mut(data_miner_id, group_name)?;
        let subgroup_count = group.subgroups.len();
        let name = group.name.clone();
        if let Some(&bad) = excluded_subgroups.iter().find(|&&i| i >= subgroup_count) {
            return Err(RadError::Other(format!(
                "excluded subgroup index {} out of range for group '{}'",
                bad, name
            )));
        }
        self.record_training(data_miner_id, &name, time_ranges, excluded_subgroups);
        info!(group = %name, ranges = time_ranges.len(), "Retrain requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rad_core::ParameterKey;

    fn subgroup(a: i32, b: i32) -> SubgroupInfo {
        SubgroupInfo::from_keys([ParameterKey::new(1, 5, a), ParameterKey::new(1, 5, b)])
    }

    fn store_with(group: GroupInfo) -> MemoryStore {
        let mut store = MemoryStore::new(ServiceCapabilities::default());
        store.add_group(&group, None).unwrap();
        store
    }

    #[test]
    fn add_assigns_subgroup_ids() {
        let pumps = GroupInfo::new("Pumps", vec![subgroup(1, 2), subgroup(3, 4)]);
        let store = store_with(pumps.with_data_miner_id(1));
        let stored = store.fetch_group(1, "pumps").unwrap().unwrap();
        assert_eq!(stored.subgroup_ids().len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let mut store = store_with(GroupInfo::new("Pumps", vec![subgroup(1, 2)]));
        let err = store
            .add_group(&GroupInfo::new("PUMPS", vec![subgroup(3, 4)]), None)
            .unwrap_err();
        assert!(matches!(err, RadError::DuplicateGroupName(_)));
    }

    #[test]
    fn groups_are_scoped_per_agent() {
        let mut store =
            store_with(GroupInfo::new("Pumps", vec![subgroup(1, 2)]).with_data_miner_id(1));
        store
            .add_group(&GroupInfo::new("Pumps", vec![subgroup(1, 2)]).with_data_miner_id(2), None)
            .unwrap();
        assert_eq!(store.fetch_group_names(1).unwrap(), vec!["Pumps".to_string()]);
        assert_eq!(store.fetch_group_names(-1).unwrap().len(), 2);
        assert!(store.fetch_group(3, "Pumps").unwrap().is_none());
    }

    #[test]
    fn rename_then_subgroup_changes() {
        let mut store = store_with(GroupInfo::new("Grp", vec![subgroup(1, 2), subgroup(3, 4)]));
        let removed = store.fetch_group(0, "Grp").unwrap().unwrap().subgroups[1].id.unwrap();

        store.rename_group(0, "Grp", "Grp2").unwrap();
        store.remove_subgroup(0, "Grp2", removed).unwrap();
        let added = store.add_subgroup(0, "Grp2", &subgroup(5, 6)).unwrap();

        let group = store.fetch_group(0, "Grp2").unwrap().unwrap();
        assert_eq!(group.subgroups.len(), 2);
        assert_eq!(group.subgroups[1].id, Some(added));
        assert!(store.fetch_group(0, "Grp").unwrap().is_none());
    }

    #[test]
    fn subgroup_shape_must_match() {
        let mut store = store_with(GroupInfo::new("Grp", vec![subgroup(1, 2)]));
        let three = SubgroupInfo::from_keys([
            ParameterKey::new(1, 5, 7),
            ParameterKey::new(1, 5, 8),
            ParameterKey::new(1, 5, 9),
        ]);
        assert!(matches!(
            store.add_subgroup(0, "Grp", &three),
            Err(RadError::InvalidGroup(_))
        ));
    }

    #[test]
    fn last_subgroup_cannot_be_removed() {
        let mut store = store_with(GroupInfo::new("Grp", vec![subgroup(1, 2)]));
        let id = store.fetch_group(0, "Grp").unwrap().unwrap().subgroups[0].id.unwrap();
        assert!(store.remove_subgroup(0, "Grp", id).is_err());
        assert!(matches!(
            store.remove_subgroup(0, "Grp", Uuid::new_v4()),
            Err(RadError::SubgroupNotFound { .. })
        ));
    }

    #[test]
    fn training_is_recorded() {
        let mut store = MemoryStore::new(ServiceCapabilities::default());
        let training = PersistableTrainingConfig {
            time_ranges: vec![],
            excluded_subgroups: vec![1],
        };
        store
            .add_group(
                &GroupInfo::new("Grp", vec![subgroup(1, 2), subgroup(3, 4)]),
                Some(&training),
            )
            .unwrap();
        store.retrain(0, "grp", &[], &[0]).unwrap();
        assert!(store.retrain(0, "Grp", &[], &[2]).is_err());

        let requests = store.training_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].excluded_subgroups, vec![1]);
        assert_eq!(requests[1].group_name, "Grp");
    }

    #[test]
    fn platform_without_shared_models() {
        let mut store = MemoryStore::new(ServiceCapabilities {
            allow_shared_model_groups: false,
            training_config_in_add_group: false,
            ..ServiceCapabilities::default()
        });
        assert!(store
            .add_group(&GroupInfo::new("Grp", vec![subgroup(1, 2), subgroup(3, 4)]), None)
            .is_err());
        store.add_group(&GroupInfo::new("Grp", vec![subgroup(1, 2)]), None).unwrap();
        assert!(store.rename_group(0, "Grp", "Other").is_err());
        let training = PersistableTrainingConfig::default();
        assert!(store
            .add_group(&GroupInfo::new("Other", vec![subgroup(1, 2)]), Some(&training))
            .is_err());
    }
}
