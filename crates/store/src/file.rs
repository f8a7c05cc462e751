use std::path::{Path, PathBuf};

use rad_core::{
    ConfigurationService, GroupInfo, GroupOptions, PersistableTrainingConfig, Result,
    ServiceCapabilities, SubgroupInfo, SubgroupOptions, TimeRange,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::memory::{MemoryStore, StoreDocument};

/// File-based store: one pretty-printed JSON document holding every group
/// and every training request.
///
/// The file is read on every call and rewritten after every successful
/// change, so several processes see each other's edits between calls.
pub struct FileStore {
    path: PathBuf,
    capabilities: ServiceCapabilities,
}

impl FileStore {
    /// Open (or prepare) the store at `path`, creating its parent directory.
    pub fn open(path: impl Into<PathBuf>, capabilities: ServiceCapabilities) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        info!(path = %path.display(), "File store initialized");
        Ok(Self { path, capabilities })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current on-disk document (empty if the file does not exist yet).
    pub fn load(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(StoreDocument::default());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, document: &StoreDocument) -> Result<()> {
        let data = serde_json::to_string_pretty(document)?;
        std::fs::write(&self.path, data)?;
        debug!(path = %self.path.display(), groups = document.groups.len(), "Store saved");
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryStore) -> Result<T>) -> Result<T> {
        let store = MemoryStore::from_document(self.load()?, self.capabilities);
        f(&store)
    }

    /// Load, apply `f`, and save only if `f` succeeded.
    fn modify<T>(&self, f: impl FnOnce(&mut MemoryStore) -> Result<T>) -> Result<T> {
        let mut store = MemoryStore::from_document(self.load()?, self.capabilities);
        let out = f(&mut store)?;
        self.save(store.document())?;
        Ok(out)
    }
}

impl ConfigurationService for FileStore {
    fn capabilities(&self) -> ServiceCapabilities {
        self.capabilities
    }

    fn fetch_group_names(&self, data_miner_id: i32) -> Result<Vec<String>> {
        self.read(|s| s.fetch_group_names(data_miner_id))
    }

    fn fetch_group(&self, data_miner_id: i32, name: &str) -> Result<Option<GroupInfo>> {
        self.read(|s| s.fetch_group(data_miner_id, name))
    }

    fn fetch_groups(&self) -> Result<Vec<GroupInfo>> {
        self.read(|s| s.fetch_groups())
    }

    fn add_group(
        &mut self,
        group: &GroupInfo,
        training: Option<&PersistableTrainingConfig>,
    ) -> Result<()> {
        self.modify(|s| s.add_group(group, training))
    }

    fn remove_group(&mut self, data_miner_id: i32, name: &str) -> Result<()> {
        self.modify(|s| s.remove_group(data_miner_id, name))
    }

    fn rename_group(&mut self, data_miner_id: i32, old_name: &str, new_name: &str) -> Result<()> {
        self.modify(|s| s.rename_group(data_miner_id, old_name, new_name))
    }

    fn add_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup: &SubgroupInfo,
    ) -> Result<Uuid> {
        self.modify(|s| s.add_subgroup(data_miner_id, group_name, subgroup))
    }

    fn remove_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
    ) -> Result<()> {
        self.modify(|s| s.remove_subgroup(data_miner_id, group_name, subgroup_id))
    }

    fn update_group_options(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        options: &GroupOptions,
    ) -> Result<()> {
        self.modify(|s| s.update_group_options(data_miner_id, group_name, options))
    }

    fn update_subgroup(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        subgroup_id: Uuid,
        name: Option<&str>,
        options: &SubgroupOptions,
    ) -> Result<()> {
        self.modify(|s| s.update_subgroup(data_miner_id, group_name, subgroup_id, name, options))
    }

    fn retrain(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        time_ranges: &[TimeRange],
        excluded_subgroups: &[usize],
    ) -> Result<()> {
        self.modify(|s| s.retrain(data_miner_id, group_name, time_ranges, excluded_subgroups))
    }
}
