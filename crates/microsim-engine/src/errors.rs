use microsim_store::StatusStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("config decode error: {0}")]
    ConfigDecode(String),
    #[error("service name was not found: {0}")]
    ResolutionMiss(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("status update lost: {0}")]
    PersistenceConflict(#[from] StatusStoreError),
    #[error("prerequisite load failed: {0}")]
    PrerequisiteLoad(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FaultError {
    #[error("fault type was not defined")]
    Undefined,
    #[error("fault type {0} is not implemented")]
    NotImplemented(String),
    #[error("invalid args for fault type {kind}: {message}")]
    InvalidArgs { kind: String, message: String },
    #[error("fault execution failed: {0}")]
    Execution(String),
}

impl From<FaultError> for SimError {
    fn from(error: FaultError) -> Self {
        SimError::ConfigDecode(error.to_string())
    }
}
