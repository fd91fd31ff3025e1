use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::agents::{AgentBehavior, AgentType, UnitKind};
use crate::store::{ObjectiveRecord, Params, TaskRecord, DEFAULT_TASK_PRIORITY};
use crate::world::World;

use super::behavior::{ObjectiveBehavior, TaskBehavior};
use super::task::{Objective, Task};
use super::unit::{UnitCore, UnitData};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown agent type '{0}'")]
    UnknownAgentType(AgentType),
    #[error("unknown task type '{0}'")]
    UnknownTaskType(UnitKind),
    #[error("unknown objective type '{0}'")]
    UnknownObjectiveType(UnitKind),
    #[error("{what} '{name}' is already registered")]
    Duplicate { what: &'static str, name: String },
    #[error("params for '{kind}' must encode to a JSON object: {message}")]
    Params { kind: String, message: String },
}

/// Registration-time attributes of a task or objective kind.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    applicable: AgentType,
    frequency: Option<u64>,
    profiles: Option<Vec<String>>,
}

impl UnitSpec {
    pub fn new(applicable: impl Into<AgentType>) -> Self {
        Self {
            applicable: applicable.into(),
            frequency: None,
            profiles: None,
        }
    }

    pub fn every(mut self, ticks: u64) -> Self {
        self.frequency = Some(ticks);
        self
    }

    /// Restricts a task kind to agents carrying one of these profiles.
    pub fn for_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiles = Some(profiles.into_iter().map(Into::into).collect());
        self
    }
}

struct TaskEntry<W> {
    spec: UnitSpec,
    behavior: Arc<dyn TaskBehavior<W>>,
}

struct ObjectiveEntry<W> {
    spec: UnitSpec,
    behavior: Arc<dyn ObjectiveBehavior<W>>,
}

/// Maps persisted type tags to behaviors. Built once at startup.
pub struct TypeRegistry<W> {
    agents: BTreeMap<AgentType, Arc<dyn AgentBehavior<W>>>,
    tasks: BTreeMap<UnitKind, TaskEntry<W>>,
    objectives: BTreeMap<UnitKind, ObjectiveEntry<W>>,
}

impl<W: World> Default for TypeRegistry<W> {
    fn default() -> Self {
        Self {
            agents: BTreeMap::new(),
            tasks: BTreeMap::new(),
            objectives: BTreeMap::new(),
        }
    }
}

impl<W: World> TypeRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_agent(
        &mut self,
        agent_type: impl Into<AgentType>,
        behavior: impl AgentBehavior<W> + 'static,
    ) -> Result<(), RegistryError> {
        let agent_type = agent_type.into();
        if self.agents.contains_key(&agent_type) {
            return Err(RegistryError::Duplicate {
                what: "agent type",
                name: agent_type.to_string(),
            });
        }
        self.agents.insert(agent_type, Arc::new(behavior));
        Ok(())
    }

    pub fn register_task(
        &mut self,
        kind: impl Into<UnitKind>,
        spec: UnitSpec,
        behavior: impl TaskBehavior<W> + 'static,
    ) -> Result<(), RegistryError> {
        let kind = kind.into();
        if self.tasks.contains_key(&kind) {
            return Err(RegistryError::Duplicate {
                what: "task type",
                name: kind.to_string(),
            });
        }
        self.tasks.insert(
            kind,
            TaskEntry {
                spec,
                behavior: Arc::new(behavior),
            },
        );
        Ok(())
    }

    pub fn register_objective(
        &mut self,
        kind: impl Into<UnitKind>,
        spec: UnitSpec,
        behavior: impl ObjectiveBehavior<W> + 'static,
    ) -> Result<(), RegistryError> {
        let kind = kind.into();
        if self.objectives.contains_key(&kind) {
            return Err(RegistryError::Duplicate {
                what: "objective type",
                name: kind.to_string(),
            });
        }
        self.objectives.insert(
            kind,
            ObjectiveEntry {
                spec,
                behavior: Arc::new(behavior),
            },
        );
        Ok(())
    }

    pub fn has_agent_type(&self, agent_type: &AgentType) -> bool {
        self.agents.contains_key(agent_type)
    }

    pub fn agent_behavior(&self, agent_type: &AgentType) -> Option<&dyn AgentBehavior<W>> {
        self.agents.get(agent_type).map(|behavior| behavior.as_ref())
    }

    pub(crate) fn task_behavior(&self, kind: &UnitKind) -> Option<&dyn TaskBehavior<W>> {
        self.tasks.get(kind).map(|entry| entry.behavior.as_ref())
    }

    pub(crate) fn objective_behavior(&self, kind: &UnitKind) -> Option<&dyn ObjectiveBehavior<W>> {
        self.objectives.get(kind).map(|entry| entry.behavior.as_ref())
    }

    /// Builds a fresh task with empty state and the default priority.
    pub fn new_task(&self, kind: &str, params: impl Serialize) -> Result<Task, RegistryError> {
        let params = encode_params(kind, params)?;
        self.build_task(UnitKind::new(kind), params, Params::new(), DEFAULT_TASK_PRIORITY)
    }

    pub fn new_objective(
        &self,
        kind: &str,
        params: impl Serialize,
    ) -> Result<Objective, RegistryError> {
        let params = encode_params(kind, params)?;
        self.build_objective(UnitKind::new(kind), params, Params::new())
    }

    pub fn task_from_record(&self, record: TaskRecord) -> Result<Task, RegistryError> {
        self.build_task(record.kind, record.params, record.state, record.priority)
    }

    pub fn objective_from_record(
        &self,
        record: ObjectiveRecord,
    ) -> Result<Objective, RegistryError> {
        self.build_objective(record.kind, record.params, record.state)
    }

    fn build_task(
        &self,
        kind: UnitKind,
        params: Params,
        state: Params,
        priority: f64,
    ) -> Result<Task, RegistryError> {
        let Some(entry) = self.tasks.get(&kind) else {
            return Err(RegistryError::UnknownTaskType(kind));
        };
        let core = UnitCore {
            kind,
            applicable: entry.spec.applicable.clone(),
            frequency: entry.spec.frequency,
            data: UnitData::new(params, state),
            type_error: false,
        };
        Ok(Task::from_core(core, priority, entry.spec.profiles.clone()))
    }

    fn build_objective(
        &self,
        kind: UnitKind,
        params: Params,
        state: Params,
    ) -> Result<Objective, RegistryError> {
        let Some(entry) = self.objectives.get(&kind) else {
            return Err(RegistryError::UnknownObjectiveType(kind));
        };
        let core = UnitCore {
            kind,
            applicable: entry.spec.applicable.clone(),
            frequency: entry.spec.frequency,
            data: UnitData::new(params, state),
            type_error: false,
        };
        Ok(Objective::from_core(core))
    }
}

fn encode_params(kind: &str, params: impl Serialize) -> Result<Params, RegistryError> {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Params::new()),
        Ok(other) => Err(RegistryError::Params {
            kind: kind.to_string(),
            message: format!("got {other}"),
        }),
        Err(error) => Err(RegistryError::Params {
            kind: kind.to_string(),
            message: error.to_string(),
        }),
    }
}
