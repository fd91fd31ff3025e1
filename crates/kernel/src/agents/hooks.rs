use tracing::{debug, info};

use crate::store::agent_path;
use crate::tick::TickContext;
use crate::work::{BehaviorError, Task};
use crate::world::{ObjectId, World, WorldRef};

use super::agent::Agent;
use super::ids::AgentId;

/// Per-type hooks of an agent kind. Every hook has a working default, so a
/// plain coordinating agent can register an empty struct.
pub trait AgentBehavior<W: World> {
    /// Dot path the agent record is persisted under.
    fn memory_location(&self, agent: &Agent) -> String {
        agent_path(agent.id().as_str())
    }

    fn find_world_object(&self, _key: &str, reference: &WorldRef, world: &W) -> Option<ObjectId> {
        world.resolve(reference)
    }

    fn is_alive(&self, _agent: &Agent, _world: &W) -> bool {
        true
    }

    /// Called during `run` for each attached agent deleted this tick, before
    /// the reference is dropped.
    fn notify_deleted_agent(&self, agent: &mut Agent, key: &str, deleted: &AgentId) {
        info!(agent = %agent.name(), key, deleted = %deleted, "attached_agent_deleted");
    }

    fn notify_new_task(&self, agent: &Agent, task: &Task, _world: &mut W) {
        debug!(agent = %agent.name(), task_type = %task.kind(), "task_started");
    }

    fn notify_task_finished(&self, agent: &Agent, task: &Task) {
        info!(agent = %agent.name(), task_type = %task.kind(), "task_finished");
    }

    /// Receives an agent created from a pending registration naming this
    /// agent as handler.
    fn handle_new_agent(
        &self,
        _agent: &mut Agent,
        _new_agent: &AgentId,
        _ctx: &mut TickContext<'_, W>,
    ) -> Result<(), BehaviorError> {
        Ok(())
    }
}

/// Agent kind with no specialised hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAgent;

impl<W: World> AgentBehavior<W> for PlainAgent {}
