use rad_core::RadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid value for argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Could not fetch info for group with name {name} (DataMiner ID={data_miner_id})")]
    GroupNotFound { name: String, data_miner_id: i32 },

    #[error("Arguments have not been processed")]
    NotReady,

    #[error(transparent)]
    Service(#[from] RadError),
}
