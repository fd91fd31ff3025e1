use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::error;

use crate::agents::{Agent, AgentType, UnitKind};
use crate::store::Params;

use super::behavior::BehaviorError;

/// State key holding the earliest tick a throttled unit may run again.
pub const NEXT_RUN_KEY: &str = "_next_run";

/// Params and mutable state of a task or objective, as seen by its behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitData {
    params: Params,
    state: Params,
}

impl UnitData {
    pub fn new(params: Params, state: Params) -> Self {
        Self { params, state }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, BehaviorError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|error| BehaviorError::InvalidParams(error.to_string()))
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn state(&self) -> &Params {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Params {
        &mut self.state
    }

    pub fn state_u64(&self, key: &str) -> Option<u64> {
        self.state.get(key).and_then(Value::as_u64)
    }

    pub fn state_str(&self, key: &str) -> Option<&str> {
        self.state.get(key).and_then(Value::as_str)
    }

    pub fn set_state(&mut self, key: &str, value: impl Into<Value>) {
        self.state.insert(key.to_string(), value.into());
    }
}

/// Shared core of tasks and objectives: type gate, throttle and data.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UnitCore {
    pub(crate) kind: UnitKind,
    pub(crate) applicable: AgentType,
    pub(crate) frequency: Option<u64>,
    pub(crate) data: UnitData,
    pub(crate) type_error: bool,
}

impl UnitCore {
    /// Decides whether the body runs this tick. A type mismatch latches.
    pub(crate) fn admit(&mut self, agent: &Agent, time: u64) -> bool {
        if self.type_error {
            return false;
        }
        if agent.agent_type() != &self.applicable {
            error!(
                unit_type = %self.kind,
                applicable = %self.applicable,
                agent = %agent.name(),
                agent_type = %agent.agent_type(),
                "unit_type_mismatch"
            );
            self.type_error = true;
            return false;
        }
        if self.throttle().is_some() {
            if let Some(next_run) = self.data.state_u64(NEXT_RUN_KEY) {
                if time < next_run {
                    return false;
                }
            }
        }
        true
    }

    pub(crate) fn record_run(&mut self, time: u64) {
        if let Some(frequency) = self.throttle() {
            self.data
                .set_state(NEXT_RUN_KEY, time.saturating_add(frequency));
        }
    }

    fn throttle(&self) -> Option<u64> {
        self.frequency.filter(|frequency| *frequency > 0)
    }
}
