//! Computes the operations that turn a stored group into an edited one.
//!
//! Preserving a subgroup preserves its trained model, so the engine prefers
//! targeted subgroup operations over recreating the group. The group is only
//! dropped and re-added when no subgroup survives the edit, or when the
//! platform lacks the primitive the targeted path would need.

use rad_core::{names_equal, GroupInfo, ServiceCapabilities, SubgroupInfo};
use tracing::debug;

use crate::matcher::{match_subgroups, SubgroupMatching};
use crate::plan::{GroupOperation, ReconcilePlan};


/// Plans group edits for one platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    capabilities: ServiceCapabilities,
}

impl Reconciler {
    pub fn new(capabilities: ServiceCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> ServiceCapabilities {
        self.capabilities
    }

    /// Plan for a group that does not exist yet.
    pub fn add(&self, desired: &GroupInfo) -> ReconcilePlan {
        ReconcilePlan {
            data_miner_id: desired.data_miner_id,
            group_name: desired.name.clone(),
            operations: vec![GroupOperation::AddGroup {
                group: desired.clone(),
            }],
            final_subgroups: desired.subgroups.clone(),
            id_aliases: Vec::new(),
        }
    }

    /// Plan for an add or an edit, depending on whether a stored group exists.
    pub fn plan(&self, original: Option<&GroupInfo>, desired: &GroupInfo) -> ReconcilePlan {
        match original {
            Some(original) => self.reconcile(original, desired),
            None => self.add(desired),
        }
    }

    /// Plan the edit from `original` (as stored) to `desired` (as edited).
    ///
    /// Both inputs are expected to have passed validation. Neither is modified.
    pub fn reconcile(&self, original: &GroupInfo, desired: &GroupInfo) -> ReconcilePlan {
        let mut plan = if original.is_simple() && desired.is_simple() {
            self.reconcile_simple(original, desired)
        } else {
            self.reconcile_shared(original, desired)
        };
        plan.id_aliases = match_subgroups(&original.subgroups, &desired.subgroups)
            .id_aliases(&original.subgroups, &desired.subgroups);
        debug!(
            group = %plan.group_name,
            operations = plan.operations.len(),
            "Planned group edit"
        );
        plan
    }

    // ── Simple groups ──────────────────────────────────────────

    fn reconcile_simple(&self, original: &GroupInfo, desired: &GroupInfo) -> ReconcilePlan {
        let stored = &original.subgroups[0];
        let edited = &desired.subgroups[0];
        if !stored.has_same_parameters(edited) {
            return self.replace(original, desired, desired.subgroups.clone());
        }

        let resolved = resolve_matched(stored, edited);
        let renamed = !names_equal(&original.name, &desired.name);
        if renamed && !self.capabilities.allow_shared_model_groups {
            // No rename primitive: recreate under the new name with the stored parameters.
            return self.replace(original, desired, vec![resolved]);
        }

        let mut operations = Vec::new();
        if renamed {
            operations.push(GroupOperation::RenameGroup {
                old_name: original.name.clone(),
                new_name: desired.name.clone(),
            });
        }
        push_option_updates(&mut operations, original, desired, &[(stored, &resolved)]);

        ReconcilePlan {
            data_miner_id: original.data_miner_id,
            group_name: desired.name.clone(),
            operations,
            final_subgroups: vec![resolved],
            id_aliases: Vec::new(),
        }
    }

    // ── Shared-model groups ────────────────────────────────────

    fn reconcile_shared(&self, original: &GroupInfo, desired: &GroupInfo) -> ReconcilePlan {
        let matching = match_subgroups(&original.subgroups, &desired.subgroups);
        let renamed = !names_equal(&original.name, &desired.name);
        let no_rename = renamed && !self.capabilities.allow_shared_model_groups;
        if matching.is_total_replacement() || no_rename {
            return self.replace(original, desired, desired.subgroups.clone());
        }

        let group_name = desired.name.clone();
        let mut operations = Vec::new();
        if renamed {
            operations.push(GroupOperation::RenameGroup {
                old_name: original.name.clone(),
                new_name: group_name.clone(),
            });
        }

        for &i in &matching.removed {
            match original.subgroups[i].id {
                Some(subgroup_id) => operations.push(GroupOperation::RemoveSubgroup {
                    group_name: group_name.clone(),
                    subgroup_id,
                }),
                None => debug!(
                    group = %original.name,
                    index = i,
                    "Stored subgroup has no id, nothing to remove"
                ),
            }
        }

        for &i in &matching.added {
            operations.push(GroupOperation::AddSubgroup {
                group_name: group_name.clone(),
                subgroup: desired.subgroups[i].clone(),
            });
        }

        let preserved = preserved_subgroups(original, desired, &matching);
        let pairs: Vec<(&SubgroupInfo, &SubgroupInfo)> = preserved
            .iter()
            .map(|(stored, resolved)| (*stored, resolved))
            .collect();
        push_option_updates(&mut operations, original, desired, &pairs);

        ReconcilePlan {
            data_miner_id: original.data_miner_id,
            group_name,
            operations,
            final_subgroups: final_order(original, desired, &matching),
            id_aliases: Vec::new(),
        }
    }

    fn replace(
        &self,
        original: &GroupInfo,
        desired: &GroupInfo,
        subgroups: Vec<SubgroupInfo>,
    ) -> ReconcilePlan {
        let mut group = desired.clone();
        group.data_miner_id = original.data_miner_id;
        group.subgroups = subgroups;
        ReconcilePlan {
            data_miner_id: original.data_miner_id,
            group_name: group.name.clone(),
            final_subgroups: group.subgroups.clone(),
            id_aliases: Vec::new(),
            operations: vec![
                GroupOperation::RemoveGroup {
                    name: original.name.clone(),
                },
                GroupOperation::AddGroup { group },
            ],
        }
    }
}

/// The edited subgroup as the store will hold it: no operation touches the
/// parameters of a preserved subgroup, so id and parameters (with their
/// labels) stay the stored ones. Name and overrides come from the edit.
fn resolve_matched(stored: &SubgroupInfo, edited: &SubgroupInfo) -> SubgroupInfo {
    SubgroupInfo {
        id: stored.id,
        parameters: stored.parameters.clone(),
        ..edited.clone()
    }
}

/// (stored, resolved edited) for every matched pair, in original order.
fn preserved_subgroups<'a>(
    original: &'a GroupInfo,
    desired: &GroupInfo,
    matching: &SubgroupMatching,
) -> Vec<(&'a SubgroupInfo, SubgroupInfo)> {
    let mut pairs: Vec<_> = matching.pairs.clone();
    pairs.sort_by_key(|p| p.original_index);
    pairs
        .into_iter()
        .map(|p| {
            let stored = &original.subgroups[p.original_index];
            (stored, resolve_matched(stored, &desired.subgroups[p.new_index]))
        })
        .collect()
}

/// Store order after the targeted path: surviving originals keep their
/// position, added subgroups are appended in edit order.
fn final_order(
    original: &GroupInfo,
    desired: &GroupInfo,
    matching: &SubgroupMatching,
) -> Vec<SubgroupInfo> {
    let mut subgroups: Vec<SubgroupInfo> = preserved_subgroups(original, desired, matching)
        .into_iter()
        .map(|(_, resolved)| resolved)
        .collect();
    subgroups.extend(matching.added.iter().map(|&i| desired.subgroups[i].clone()));
    subgroups
}

fn push_option_updates(
    operations: &mut Vec<GroupOperation>,
    original: &GroupInfo,
    desired: &GroupInfo,
    preserved: &[(&SubgroupInfo, &SubgroupInfo)],
) {
    if original.options != desired.options {
        operations.push(GroupOperation::UpdateGroupOptions {
            group_name: desired.name.clone(),
            options: desired.options.clone(),
        });
    }

    for (stored, edited) in preserved {
        let Some(subgroup_id) = stored.id else {
            continue;
        };
        if normalized_name(stored) == normalized_name(edited) && stored.options == edited.options {
            continue;
        }
        operations.push(GroupOperation::UpdateSubgroup {
            group_name: desired.name.clone(),
            subgroup_id,
            name: normalized_name(edited).map(str::to_string),
            options: edited.options.clone(),
        });
    }
}

fn normalized_name(subgroup: &SubgroupInfo) -> Option<&str> {
    subgroup.name.as_deref().filter(|n| !n.is_empty())
}
