use super::EngineMode;
use crate::manager::ManagerError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine mode {0:?} is not supported")]
    UnsupportedMode(EngineMode),

    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("engine task failed: {0}")]
    Task(String),
}
