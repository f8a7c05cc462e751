use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("A group with name '{0}' already exists")]
    DuplicateGroupName(String),

    #[error("Subgroup {id} not found in group '{group}'")]
    SubgroupNotFound { group: String, id: Uuid },

    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RadError>;
