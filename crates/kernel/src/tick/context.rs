use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::agents::{Agent, AgentId, AgentRegistry, AgentType, Resolver};
use crate::store::{Params, PendingRecord};
use crate::work::{RegistryError, TypeRegistry};
use crate::world::{World, WorldRef};

use super::pending::PendingQueue;
use super::runtime_state::RuntimeState;

/// Everything a running agent, task or objective may touch during a tick.
pub struct TickContext<'t, W> {
    types: &'t TypeRegistry<W>,
    agents: &'t mut AgentRegistry,
    world: &'t mut W,
    runtime: &'t mut RuntimeState,
    pending: &'t mut PendingQueue,
}

impl<'t, W: World> TickContext<'t, W> {
    pub fn new(
        types: &'t TypeRegistry<W>,
        agents: &'t mut AgentRegistry,
        world: &'t mut W,
        runtime: &'t mut RuntimeState,
        pending: &'t mut PendingQueue,
    ) -> Self {
        Self {
            types,
            agents,
            world,
            runtime,
            pending,
        }
    }

    pub fn time(&self) -> u64 {
        self.world.time()
    }

    pub fn types(&self) -> &'t TypeRegistry<W> {
        self.types
    }

    pub fn agents(&self) -> &AgentRegistry {
        self.agents
    }

    pub fn agents_mut(&mut self) -> &mut AgentRegistry {
        self.agents
    }

    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agent_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    pub fn world(&self) -> &W {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        self.world
    }

    pub fn runtime(&self) -> &RuntimeState {
        self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut RuntimeState {
        self.runtime
    }

    pub fn pending(&self) -> &PendingQueue {
        self.pending
    }

    pub(crate) fn pending_mut(&mut self) -> &mut PendingQueue {
        self.pending
    }

    /// Next unused agent id. Skips ids still present in the registry.
    pub fn allocate_id(&mut self) -> AgentId {
        loop {
            let id = self.runtime.allocate_id();
            if !self.agents.contains(&id) && !self.agents.is_deleted_this_tick(&id) {
                return id;
            }
            warn!(agent_id = %id, "allocated_id_already_in_use");
        }
    }

    /// Constructs, initializes and registers a new agent.
    pub fn create_agent(&mut self, seed: AgentSeed) -> Result<AgentId, RegistryError> {
        let types = self.types;
        let Some(behavior) = types.agent_behavior(&seed.agent_type) else {
            return Err(RegistryError::UnknownAgentType(seed.agent_type));
        };
        let id = self.allocate_id();
        let mut agent = Agent::new(id.clone(), seed.agent_type);
        agent.set_profile(seed.profile);
        *agent.memory_mut() = seed.memory;
        let resolver = Resolver {
            agents: self.agents,
            world: self.world,
            behavior,
        };
        agent.initialize(seed.name, seed.agent_refs, seed.world_refs, &resolver);
        self.agents.add(agent);
        Ok(id)
    }

    /// Unregisters an agent. Its persisted state is purged at the end of the
    /// tick and agents referencing it are notified when they next run.
    pub fn delete_agent(&mut self, id: &AgentId) -> bool {
        if !self.agents.contains(id) {
            return false;
        }
        self.agents.remove(id);
        info!(agent_id = %id, "agent_deleted");
        true
    }

    /// Queues an agent to be created once its world object exists.
    pub fn register_pending(&mut self, mut record: PendingRecord) {
        record.registered_at = self.time();
        info!(
            agent_type = %record.agent_type,
            reference = %record.world_object,
            handler = %record.handler_agent_id,
            "pending_agent_registered"
        );
        self.pending.push(record);
    }
}

/// Initial state of an agent created at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSeed {
    agent_type: AgentType,
    name: String,
    profile: Option<String>,
    agent_refs: BTreeMap<String, AgentId>,
    world_refs: BTreeMap<String, WorldRef>,
    memory: Params,
}

impl AgentSeed {
    pub fn new(agent_type: impl Into<AgentType>, name: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            name: name.into(),
            profile: None,
            agent_refs: BTreeMap::new(),
            world_refs: BTreeMap::new(),
            memory: Params::new(),
        }
    }

    pub fn with_agent(mut self, key: impl Into<String>, id: AgentId) -> Self {
        self.agent_refs.insert(key.into(), id);
        self
    }

    pub fn with_object(mut self, key: impl Into<String>, reference: WorldRef) -> Self {
        self.world_refs.insert(key.into(), reference);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_memory(mut self, memory: Params) -> Self {
        self.memory = memory;
        self
    }
}
