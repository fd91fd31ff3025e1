pub mod agents;
pub mod logging;
pub mod store;
pub mod tick;
pub mod work;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

pub use agents::{
    Agent, AgentBehavior, AgentId, AgentRegistry, AgentType, PlainAgent, Resolver, UnitKind,
};
pub use logging::{LogLevel, LogSettings};
pub use store::{load_tree, save_tree, MemoryTree, Params, PendingRecord, StoreError};
pub use tick::{
    AgentSeed, Orchestrator, RuntimeState, TickConfig, TickContext, TickError, TickReport,
};
pub use work::{
    BehaviorError, Objective, ObjectiveBehavior, RegistryError, StateMachine, StepOutcome, Task,
    TaskBehavior, TypeRegistry, UnitData, UnitSpec,
};
pub use world::{log_command_failure, CommandOutcome, CommandResult, ObjectId, World, WorldRef};

pub const STORE_ENV_VAR: &str = "HIVE_STORE";
pub const DEFAULT_STORE_FILE: &str = "hive_store.json";

#[derive(Debug, Error)]
pub enum StorePathError {
    #[error("environment variable {var} is not valid unicode: {value:?}")]
    NotUnicode { var: &'static str, value: OsString },
    #[error("environment variable {var} is set but empty")]
    Empty { var: &'static str },
}

/// Store file location: `HIVE_STORE` when set, otherwise `hive_store.json`
/// in the working directory.
pub fn resolve_store_path() -> Result<PathBuf, StorePathError> {
    match std::env::var(STORE_ENV_VAR) {
        Ok(raw) if raw.trim().is_empty() => Err(StorePathError::Empty { var: STORE_ENV_VAR }),
        Ok(raw) => Ok(PathBuf::from(raw)),
        Err(std::env::VarError::NotPresent) => Ok(PathBuf::from(DEFAULT_STORE_FILE)),
        Err(std::env::VarError::NotUnicode(value)) => Err(StorePathError::NotUnicode {
            var: STORE_ENV_VAR,
            value,
        }),
    }
}
