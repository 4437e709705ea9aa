//! Fleet error types.

use thiserror::Error;

pub type FleetResult<T> = Result<T, FleetError>;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("compute backend error: {0}")]
    Backend(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("no reachable address for instance {0}")]
    AddressUnresolved(String),

    #[error("remote execution failed: {0}")]
    RemoteExec(String),
}
