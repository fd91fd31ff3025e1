use kernel::store::agent_path;
use kernel::{Agent, AgentBehavior, AgentId, BehaviorError, ObjectId, Task, World, WorldRef};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::objectives::KeepWorkingParams;
use super::{HiveContext, KEEP_WORKING};
use crate::app::sim::SimWorld;

/// Top of the hierarchy. Owns the colonies.
pub(crate) struct HiveMind;

impl AgentBehavior<SimWorld> for HiveMind {}

/// One spawn room. Receives every creep its spawn actor produces.
pub(crate) struct Colony;

pub(crate) const CREEPS_LOST_KEY: &str = "creeps_lost";
const SOURCE_KEY_PREFIX: &str = "source_";

pub(crate) fn source_key(index: usize) -> String {
    format!("{SOURCE_KEY_PREFIX}{index}")
}

pub(crate) fn source_count(agent: &Agent) -> usize {
    agent
        .world_refs()
        .keys()
        .filter(|key| key.starts_with(SOURCE_KEY_PREFIX))
        .count()
}

fn creep_key(id: &AgentId) -> String {
    format!("creep_{id}")
}

impl AgentBehavior<SimWorld> for Colony {
    fn notify_deleted_agent(&self, agent: &mut Agent, key: &str, deleted: &AgentId) {
        let lost = agent
            .memory()
            .get(CREEPS_LOST_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        agent.memory_mut().insert(CREEPS_LOST_KEY.to_string(), json!(lost + 1));
        info!(colony = %agent.name(), key, creep = %deleted, "colony_creep_lost");
    }

    fn handle_new_agent(
        &self,
        agent: &mut Agent,
        new_agent: &AgentId,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        let sources = source_count(agent);
        if sources == 0 {
            return Err(BehaviorError::missing(&source_key(0)));
        }
        let assigned = agent
            .agent_refs()
            .keys()
            .filter(|key| key.starts_with("creep_"))
            .count();
        let source = source_key(assigned % sources);
        let params = KeepWorkingParams {
            source: required_object(agent, &source)?,
            spawn: required_object(agent, "spawn")?,
            controller: required_object(agent, "controller")?,
        };
        let objective = ctx.types().new_objective(KEEP_WORKING, &params)?;
        let Some(creep_actor) = ctx.agent_mut(new_agent) else {
            return Err(BehaviorError::missing(new_agent.as_str()));
        };
        creep_actor.set_objective(objective);
        info!(colony = %agent.name(), creep = %creep_actor.name(), source = %params.source, "colony_creep_assigned");
        agent.attach_agent(creep_key(new_agent), new_agent.clone());
        Ok(())
    }
}

fn required_object(agent: &Agent, key: &str) -> Result<ObjectId, BehaviorError> {
    agent
        .object(key)
        .cloned()
        .ok_or_else(|| BehaviorError::missing(key))
}

/// Drives one spawn structure.
pub(crate) struct SpawnActor;

impl AgentBehavior<SimWorld> for SpawnActor {}

/// Drives one creep. Persisted next to the creep's own memory so that an
/// actor prepared before its creep is born can be found by name.
pub(crate) struct CreepActor;

pub(crate) const CREEP_KEY: &str = "creep";

impl AgentBehavior<SimWorld> for CreepActor {
    fn memory_location(&self, agent: &Agent) -> String {
        match agent.world_ref(CREEP_KEY) {
            Some(WorldRef::Name(name)) => format!("creeps.{name}"),
            _ => agent_path(agent.id().as_str()),
        }
    }

    fn is_alive(&self, agent: &Agent, world: &SimWorld) -> bool {
        agent.object(CREEP_KEY).is_some_and(|creep| world.is_viable(creep))
    }

    fn notify_new_task(&self, agent: &Agent, task: &Task, _world: &mut SimWorld) {
        debug!(creep = %agent.name(), task_type = %task.kind(), "creep_says");
    }
}
