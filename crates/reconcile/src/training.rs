use rad_core::{PersistableTrainingConfig, TimeRange, TrainingConfiguration};
use tracing::debug;

use crate::plan::ReconcilePlan;

/// Convert the editor's training configuration into the positional form the
/// training request expects.
///
/// Excluded subgroup ids become indices into `plan.final_subgroups` (store
/// order after the plan ran). A preserved subgroup is found under its edited
/// id as well as its stored id. Ids that are no longer present are dropped.
/// Returns `None` when there is nothing to request: no configuration, or one
/// equal to the editor default.
pub fn propagate_training(
    config: Option<&TrainingConfiguration>,
    default_ranges: &[TimeRange],
    plan: &ReconcilePlan,
) -> Option<PersistableTrainingConfig> {
    let config = config?;
    if config.is_noop(default_ranges) {
        return None;
    }

    let positions: Vec<Option<usize>> = config
        .excluded_subgroup_ids
        .iter()
        .map(|&id| plan.final_position(id))
        .collect();

    let dropped = positions.iter().filter(|p| p.is_none()).count();
    if dropped > 0 {
        debug!(dropped, "Ignoring exclusions of subgroups that are gone");
    }

    let mut excluded_subgroups: Vec<usize> = positions.into_iter().flatten().collect();
    excluded_subgroups.sort_unstable();
    excluded_subgroups.dedup();

    Some(PersistableTrainingConfig {
        time_ranges: config.time_ranges.clone(),
        excluded_subgroups,
    })
}
