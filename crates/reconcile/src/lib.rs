//! Turning an edited relational anomaly group into service operations.
//!
//! [`match_subgroups`] decides which subgroups survive an edit,
//! [`Reconciler`] plans the minimal operations, [`propagate_training`]
//! converts the training configuration, [`PlanExecutor`] applies the plan,
//! and [`EditSession`] ties them together for an editor.

pub mod engine;
pub mod executor;
pub mod matcher;
pub mod plan;
pub mod session;
pub mod training;

use rad_core::{RadError, ValidationResult};
use thiserror::Error;

pub use engine::Reconciler;
pub use executor::{ApplyReport, BulkReport, FailedOperation, PlanExecutor, TrainingOutcome};
pub use matcher::{match_subgroups, MatchedPair, SubgroupMatching};
pub use plan::{GroupOperation, ReconcilePlan};
pub use session::{EditOutcome, EditSession};
pub use training::propagate_training;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The edit does not pass validation; `result` holds every problem found.
    #[error("{message}")]
    Invalid {
        message: String,
        result: ValidationResult,
    },

    #[error(transparent)]
    Service(#[from] RadError),
}

impl ReconcileError {
    pub fn invalid(result: ValidationResult) -> Self {
        let message = result
            .first_error()
            .unwrap_or("The group settings are not valid.")
            .to_string();
        ReconcileError::Invalid { message, result }
    }
}
