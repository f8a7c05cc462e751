use std::fmt;

use rad_core::{GroupInfo, GroupOptions, SubgroupInfo, SubgroupOptions};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered list of service calls that turns the stored group into the edited one.
///
/// Operations must be applied in order. `final_subgroups` is the subgroup list
/// as the store will hold it once every operation succeeded, in store order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub data_miner_id: i32,
    /// Name of the group after the plan ran.
    pub group_name: String,
    pub operations: Vec<GroupOperation>,
    #[serde(default)]
    pub final_subgroups: Vec<SubgroupInfo>,
    /// `(edited id, stored id)` of preserved subgroups that came back under an
    /// id of their own. Either id names the same subgroup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_aliases: Vec<(Uuid, Uuid)>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// True when `a` and `b` identify the same subgroup of this plan.
    pub fn same_subgroup(&self, a: Uuid, b: Uuid) -> bool {
        a == b
            || self
                .id_aliases
                .iter()
                .any(|&(edited, stored)| (edited, stored) == (a, b) || (edited, stored) == (b, a))
    }

    /// Position in `final_subgroups` of the subgroup known by `id`.
    pub fn final_position(&self, id: Uuid) -> Option<usize> {
        self.final_subgroups
            .iter()
            .position(|s| s.id.is_some_and(|own| self.same_subgroup(own, id)))
    }

    /// True when the stored group is dropped and recreated.
    pub fn replaces_group(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, GroupOperation::RemoveGroup { .. }))
            && self.adds_group()
    }

    pub fn adds_group(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, GroupOperation::AddGroup { .. }))
    }
}

/// A single call against the configuration service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupOperation {
    RemoveGroup {
        name: String,
    },
    RenameGroup {
        old_name: String,
        new_name: String,
    },
    RemoveSubgroup {
        group_name: String,
        subgroup_id: Uuid,
    },
    AddSubgroup {
        group_name: String,
        subgroup: SubgroupInfo,
    },
    AddGroup {
        group: GroupInfo,
    },
    UpdateGroupOptions {
        group_name: String,
        options: GroupOptions,
    },
    UpdateSubgroup {
        group_name: String,
        subgroup_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        options: SubgroupOptions,
    },
}

impl GroupOperation {
    /// Verb phrase used in failure messages ("Failed to <action> ...").
    pub fn action(&self) -> &'static str {
        match self {
            GroupOperation::RemoveGroup { .. } => "remove group",
            GroupOperation::RenameGroup { .. } => "rename group",
            GroupOperation::RemoveSubgroup { .. } => "remove subgroup",
            GroupOperation::AddSubgroup { .. } => "add subgroup",
            GroupOperation::AddGroup { .. } => "add group",
            GroupOperation::UpdateGroupOptions { .. } => "update options of group",
            GroupOperation::UpdateSubgroup { .. } => "update subgroup",
        }
    }

    /// The group or subgroup the operation acts on, as shown to operators.
    pub fn target(&self) -> String {
        match self {
            GroupOperation::RemoveGroup { name } => name.clone(),
            GroupOperation::RenameGroup { old_name, .. } => old_name.clone(),
            GroupOperation::RemoveSubgroup {
                group_name,
                subgroup_id,
            }
            | GroupOperation::UpdateSubgroup {
                group_name,
                subgroup_id,
                ..
            } => format!("{}/{}", group_name, subgroup_id),
            GroupOperation::AddSubgroup {
                group_name,
                subgroup,
            } => match subgroup.name.as_deref().filter(|n| !n.is_empty()) {
                Some(n) => format!("{}/{}", group_name, n),
                None => group_name.clone(),
            },
            GroupOperation::AddGroup { group } => group.name.clone(),
            GroupOperation::UpdateGroupOptions { group_name, .. } => group_name.clone(),
        }
    }
}

impl fmt::Display for GroupOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupOperation::RenameGroup { old_name, new_name } => {
                write!(f, "rename group '{}' to '{}'", old_name, new_name)
            }
            GroupOperation::AddGroup { group } => write!(
                f,
                "add group '{}' with {} subgroup(s)",
                group.name,
                group.subgroups.len()
            ),
            other => write!(f, "{} '{}'", other.action(), other.target()),
        }
    }
}
