use tracing::{debug, warn};

use crate::agents::{Agent, AgentType, UnitKind};
use crate::store::{ObjectiveRecord, Params, TaskRecord, DEFAULT_TASK_PRIORITY};
use crate::tick::TickContext;
use crate::world::World;

use super::behavior::{contain, BehaviorError};
use super::types::RegistryError;
use super::unit::{UnitCore, UnitData};

/// Long-running goal owned by an agent. At most one per agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    core: UnitCore,
}

impl Objective {
    pub(crate) fn from_core(core: UnitCore) -> Self {
        Self { core }
    }

    pub fn kind(&self) -> &UnitKind {
        &self.core.kind
    }

    pub fn applicable_agent_type(&self) -> &AgentType {
        &self.core.applicable
    }

    pub fn frequency(&self) -> Option<u64> {
        self.core.frequency
    }

    pub fn data(&self) -> &UnitData {
        &self.core.data
    }

    pub fn params(&self) -> &Params {
        self.core.data.params()
    }

    pub fn has_type_error(&self) -> bool {
        self.core.type_error
    }

    /// Type gate, throttle, then the registered body.
    pub(crate) fn execute<W: World>(
        &mut self,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, W>,
    ) -> Result<(), BehaviorError> {
        let time = ctx.time();
        if !self.core.admit(agent, time) {
            return Ok(());
        }
        let types = ctx.types();
        let behavior = types
            .objective_behavior(&self.core.kind)
            .ok_or_else(|| RegistryError::UnknownObjectiveType(self.core.kind.clone()))?;
        debug!(agent = %agent.name(), objective_type = %self.core.kind, "objective_execute");
        contain(|| behavior.execute(&mut self.core.data, agent, ctx))?;
        self.core.record_run(time);
        Ok(())
    }

    pub fn dump(&self) -> ObjectiveRecord {
        ObjectiveRecord {
            kind: self.core.kind.clone(),
            params: self.core.data.params().clone(),
            state: self.core.data.state().clone(),
        }
    }
}

/// Unit of work queued on an agent, runnable until it reports finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    core: UnitCore,
    priority: f64,
    profiles: Option<Vec<String>>,
}

impl Task {
    pub(crate) fn from_core(core: UnitCore, priority: f64, profiles: Option<Vec<String>>) -> Self {
        let priority = finite_priority(&core.kind, priority);
        Self {
            core,
            priority,
            profiles,
        }
    }

    /// Non-finite priorities fall back to the default since JSON cannot
    /// carry them.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = finite_priority(&self.core.kind, priority);
        self
    }

    pub fn kind(&self) -> &UnitKind {
        &self.core.kind
    }

    pub fn applicable_agent_type(&self) -> &AgentType {
        &self.core.applicable
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn frequency(&self) -> Option<u64> {
        self.core.frequency
    }

    /// Agent profiles allowed to run this task; `None` accepts any agent.
    pub fn profiles(&self) -> Option<&[String]> {
        self.profiles.as_deref()
    }

    pub fn accepts_profile(&self, profile: Option<&str>) -> bool {
        match &self.profiles {
            None => true,
            Some(accepted) => {
                profile.is_some_and(|profile| accepted.iter().any(|entry| entry == profile))
            }
        }
    }

    pub fn data(&self) -> &UnitData {
        &self.core.data
    }

    pub fn params(&self) -> &Params {
        self.core.data.params()
    }

    pub fn has_type_error(&self) -> bool {
        self.core.type_error
    }

    /// Type gate, throttle, profile check, then the registered body.
    pub(crate) fn execute<W: World>(
        &mut self,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, W>,
    ) -> Result<(), BehaviorError> {
        let time = ctx.time();
        if !self.core.admit(agent, time) {
            return Ok(());
        }
        if !self.accepts_profile(agent.profile()) {
            return Err(BehaviorError::ProfileMismatch {
                accepted: self.profiles.clone().unwrap_or_default(),
                actual: agent.profile().map(ToString::to_string),
            });
        }
        let types = ctx.types();
        let behavior = types
            .task_behavior(&self.core.kind)
            .ok_or_else(|| RegistryError::UnknownTaskType(self.core.kind.clone()))?;
        debug!(agent = %agent.name(), task_type = %self.core.kind, "task_execute");
        contain(|| behavior.execute(&mut self.core.data, agent, ctx))?;
        self.core.record_run(time);
        Ok(())
    }

    /// True once latched on a type error, otherwise asks the body.
    pub(crate) fn finished<W: World>(
        &self,
        agent: &Agent,
        ctx: &TickContext<'_, W>,
    ) -> Result<bool, BehaviorError> {
        if self.core.type_error {
            return Ok(true);
        }
        let types = ctx.types();
        let behavior = types
            .task_behavior(&self.core.kind)
            .ok_or_else(|| RegistryError::UnknownTaskType(self.core.kind.clone()))?;
        contain(|| Ok(behavior.finished(&self.core.data, agent, ctx)))
    }

    pub fn dump(&self) -> TaskRecord {
        TaskRecord {
            kind: self.core.kind.clone(),
            params: self.core.data.params().clone(),
            state: self.core.data.state().clone(),
            priority: self.priority,
        }
    }
}

fn finite_priority(kind: &UnitKind, priority: f64) -> f64 {
    if priority.is_finite() {
        return priority;
    }
    warn!(task_type = %kind, priority, "task_priority_not_finite");
    DEFAULT_TASK_PRIORITY
}
