use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::agent::Agent;
use super::ids::AgentId;

/// Live agents of the current tick, keyed by id, in registration order.
///
/// An agent being run or loaded is checked out: it still counts as
/// registered for [`AgentRegistry::contains`], but is not reachable through
/// [`AgentRegistry::get`] until checked back in.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, Agent>,
    order: Vec<AgentId>,
    checked_out: HashSet<AgentId>,
    deleted_this_tick: Vec<AgentId>,
    deleted_lookup: HashSet<AgentId>,
    needs_compaction: bool,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole population and starts a fresh tick.
    pub fn set_all(&mut self, agents: Vec<Agent>) {
        self.clear();
        for agent in agents {
            self.add(agent);
        }
    }

    pub fn clear(&mut self) {
        self.agents.clear();
        self.order.clear();
        self.checked_out.clear();
        self.deleted_this_tick.clear();
        self.deleted_lookup.clear();
        self.needs_compaction = false;
    }

    pub fn add(&mut self, agent: Agent) {
        let id = agent.id().clone();
        if self.contains(&id) {
            warn!(agent_id = %id, "agent_registered_twice");
            self.checked_out.remove(&id);
        } else {
            self.order.push(id.clone());
        }
        self.agents.insert(id, agent);
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id) || self.checked_out.contains(id)
    }

    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn get_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Unregisters an agent and records it as deleted this tick. Returns
    /// the agent unless it is currently checked out.
    pub fn remove(&mut self, id: &AgentId) -> Option<Agent> {
        if !self.contains(id) {
            return None;
        }
        let removed = self.agents.remove(id);
        self.checked_out.remove(id);
        if self.deleted_lookup.insert(id.clone()) {
            self.deleted_this_tick.push(id.clone());
        }
        self.needs_compaction = true;
        debug!(agent_id = %id, "agent_unregistered");
        removed
    }

    /// Ids of live agents in registration order.
    pub fn list(&mut self) -> &[AgentId] {
        if self.needs_compaction {
            let agents = &self.agents;
            let checked_out = &self.checked_out;
            self.order
                .retain(|id| agents.contains_key(id) || checked_out.contains(id));
            self.needs_compaction = false;
        }
        &self.order
    }

    pub fn ids(&mut self) -> Vec<AgentId> {
        self.list().to_vec()
    }

    /// Live, checked-in agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    pub fn len(&self) -> usize {
        self.agents.len() + self.checked_out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_deleted_this_tick(&self, id: &AgentId) -> bool {
        self.deleted_lookup.contains(id)
    }

    pub fn any_deleted_this_tick(&self) -> bool {
        !self.deleted_this_tick.is_empty()
    }

    pub fn deleted_this_tick(&self) -> &[AgentId] {
        &self.deleted_this_tick
    }

    pub fn check_out(&mut self, id: &AgentId) -> Option<Agent> {
        let agent = self.agents.remove(id)?;
        self.checked_out.insert(id.clone());
        Some(agent)
    }

    /// Returns a checked-out agent. An agent deleted while out is dropped.
    pub fn check_in(&mut self, agent: Agent) {
        let id = agent.id().clone();
        if !self.checked_out.remove(&id) {
            if self.is_deleted_this_tick(&id) {
                debug!(agent_id = %id, "deleted_agent_not_checked_in");
            } else {
                warn!(agent_id = %id, "agent_checked_in_without_check_out");
            }
            return;
        }
        self.agents.insert(id, agent);
    }
}
