use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::agents::Agent;
use crate::tick::TickContext;
use crate::world::World;

use super::types::RegistryError;
use super::unit::UnitData;

#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error("missing attached reference '{key}'")]
    MissingReference { key: String },
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("agent profile {actual:?} is not one of {accepted:?}")]
    ProfileMismatch {
        accepted: Vec<String>,
        actual: Option<String>,
    },
    #[error("world command '{action}' failed: {reason}")]
    Command {
        action: String,
        reason: &'static str,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("behavior panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Other(String),
}

impl BehaviorError {
    pub fn missing(key: &str) -> Self {
        Self::MissingReference {
            key: key.to_string(),
        }
    }
}

/// Body of a task kind. Stateless; per-instance data lives in [`UnitData`].
pub trait TaskBehavior<W: World> {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, W>,
    ) -> Result<(), BehaviorError>;

    /// Polled after each execution; a finished task is dropped.
    fn finished(&self, _unit: &UnitData, _agent: &Agent, _ctx: &TickContext<'_, W>) -> bool {
        true
    }
}

/// Body of an objective kind. Objectives never finish on their own.
pub trait ObjectiveBehavior<W: World> {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, W>,
    ) -> Result<(), BehaviorError>;
}

/// Runs a behavior body, turning a panic into an error.
pub(crate) fn contain<T>(
    body: impl FnOnce() -> Result<T, BehaviorError>,
) -> Result<T, BehaviorError> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(BehaviorError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
