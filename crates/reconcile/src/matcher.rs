//! Pairs the subgroups of an edited group with the subgroups it started from.
//!
//! A subgroup is identified by its parameter set, not by its position or its
//! name. Matching is greedy: each new subgroup takes the first unmatched
//! original with the same (order-insensitive) parameters, so duplicates pair
//! up in original order. When the model shape (parameters per subgroup)
//! changed, nothing can be preserved.

use std::collections::HashMap;

use rad_core::{ParameterKey, SubgroupInfo};
use uuid::Uuid;

/// One preserved subgroup: `original[original_index]` lives on as `new[new_index]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub original_index: usize,
    pub new_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubgroupMatching {
    /// In new-subgroup order.
    pub pairs: Vec<MatchedPair>,
    /// Indices into the new list, in new order.
    pub added: Vec<usize>,
    /// Indices into the original list, in original order.
    pub removed: Vec<usize>,
}

impl SubgroupMatching {
    pub fn preserved_count(&self) -> usize {
        self.pairs.len()
    }

    /// True when nothing survives and the group has to be replaced wholesale.
    pub fn is_total_replacement(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Original index matched to the given new index, if any.
    pub fn original_for(&self, new_index: usize) -> Option<usize> {
        self.pairs
            .iter()
            .find(|p| p.new_index == new_index)
            .map(|p| p.original_index)
    }

    /// Store ids of the originals that have no counterpart any more.
    pub fn removed_ids(&self, original: &[SubgroupInfo]) -> Vec<Uuid> {
        self.removed.iter().filter_map(|&i| original[i].id).collect()
    }

    /// `(new id, stored id)` for every preserved subgroup that carries an id
    /// of its own, e.g. one re-added after removal or read from a file.
    pub fn id_aliases(&self, original: &[SubgroupInfo], new: &[SubgroupInfo]) -> Vec<(Uuid, Uuid)> {
        self.pairs
            .iter()
            .filter_map(|p| match (new[p.new_index].id, original[p.original_index].id) {
                (Some(edited), Some(stored)) if edited != stored => Some((edited, stored)),
                _ => None,
            })
            .collect()
    }
}

/// Match `new` against `original`. Neither list is modified.
pub fn match_subgroups(original: &[SubgroupInfo], new: &[SubgroupInfo]) -> SubgroupMatching {
    let original_shape = original.first().map(SubgroupInfo::parameter_count);
    let new_shape = new.first().map(SubgroupInfo::parameter_count);
    if original_shape != new_shape {
        return SubgroupMatching {
            pairs: Vec::new(),
            added: (0..new.len()).collect(),
            removed: (0..original.len()).collect(),
        };
    }

    // Normalized key set -> unmatched original indices, oldest first.
    let mut candidates: HashMap<Vec<ParameterKey>, Vec<usize>> = HashMap::new();
    for (i, subgroup) in original.iter().enumerate() {
        candidates.entry(subgroup.normalized_keys()).or_default().push(i);
    }

    let mut matching = SubgroupMatching::default();
    let mut taken = vec![false; original.len()];
    for (new_index, subgroup) in new.iter().enumerate() {
        let slot = candidates
            .get_mut(&subgroup.normalized_keys())
            .filter(|queue| !queue.is_empty());
        match slot {
            Some(queue) => {
                let original_index = queue.remove(0);
                taken[original_index] = true;
                matching.pairs.push(MatchedPair {
                    original_index,
                    new_index,
                });
            }
            None => matching.added.push(new_index),
        }
    }

    matching.removed = (0..original.len()).filter(|&i| !taken[i]).collect();
    matching
}
