//! Error types for contend-core

use crate::ResourceName;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Conflict operations target different resources: incumbent '{incumbent}', challenger '{challenger}'")]
    ResourceMismatch {
        incumbent: ResourceName,
        challenger: ResourceName,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceName),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
