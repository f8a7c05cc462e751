pub mod config;
pub mod error;
pub mod group;
pub mod parameter;
pub mod service;
pub mod training;
pub mod validation;

pub use config::Config;
pub use error::*;
pub use group::*;
pub use parameter::*;
pub use service::{ConfigurationService, ServiceCapabilities};
pub use training::*;
pub use validation::{ValidationError, ValidationResult, ValidationWarning};
