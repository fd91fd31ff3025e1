use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::store::{AgentRecord, Params};
use crate::tick::TickContext;
use crate::work::{Objective, Task, TypeRegistry};
use crate::world::{ObjectId, World, WorldRef};

use super::hooks::AgentBehavior;
use super::ids::{AgentId, AgentType};
use super::registry::AgentRegistry;

/// What reference resolution may consult while an agent is initialized or
/// loaded.
pub struct Resolver<'a, W> {
    pub agents: &'a AgentRegistry,
    pub world: &'a W,
    pub behavior: &'a dyn AgentBehavior<W>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnresolvedAgents {
    Keep,
    Drop,
}

/// Persistent actor owning at most one running task, a queue of pending
/// tasks and at most one objective.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    id: AgentId,
    name: String,
    agent_type: AgentType,
    profile: Option<String>,
    agent_refs: BTreeMap<String, AgentId>,
    world_refs: BTreeMap<String, WorldRef>,
    attached_agents: BTreeMap<String, AgentId>,
    attached_objects: BTreeMap<String, ObjectId>,
    current_task: Option<Task>,
    current_objective: Option<Objective>,
    pending_tasks: Vec<Task>,
    memory: Params,
    task_in_flight: bool,
    objective_epoch: u64,
}

impl Agent {
    /// Blank agent; populate it with [`Agent::initialize`] or [`Agent::load`].
    pub fn new(id: AgentId, agent_type: AgentType) -> Self {
        Self {
            id,
            name: String::new(),
            agent_type,
            profile: None,
            agent_refs: BTreeMap::new(),
            world_refs: BTreeMap::new(),
            attached_agents: BTreeMap::new(),
            attached_objects: BTreeMap::new(),
            current_task: None,
            current_objective: None,
            pending_tasks: Vec::new(),
            memory: Params::new(),
            task_in_flight: false,
            objective_epoch: 0,
        }
    }

    /// Fresh agent state: no tasks, no objective, references resolved best
    /// effort. Unresolved references are logged and kept.
    pub fn initialize<W: World>(
        &mut self,
        name: impl Into<String>,
        agent_refs: BTreeMap<String, AgentId>,
        world_refs: BTreeMap<String, WorldRef>,
        resolver: &Resolver<'_, W>,
    ) {
        self.name = name.into();
        self.agent_refs = agent_refs;
        self.world_refs = world_refs;
        self.current_task = None;
        self.current_objective = None;
        self.pending_tasks.clear();
        self.task_in_flight = false;
        self.resolve_references(resolver, UnresolvedAgents::Keep);
        info!(
            agent_id = %self.id,
            agent = %self.name,
            agent_type = %self.agent_type,
            "agent_initialized"
        );
    }

    /// Restores persisted state. Agent references that no longer resolve are
    /// dropped; unknown task or objective kinds leave their slot empty.
    pub fn load<W: World>(
        &mut self,
        record: AgentRecord,
        types: &TypeRegistry<W>,
        resolver: &Resolver<'_, W>,
    ) {
        if record.id != self.id || record.agent_type != self.agent_type {
            warn!(
                agent_id = %self.id,
                record_id = %record.id,
                record_type = %record.agent_type,
                "agent_record_identity_mismatch"
            );
        }
        self.name = record.name;
        self.profile = record.profile;
        self.memory = record.memory;
        self.agent_refs = record.attached_agent_ids;
        self.world_refs = record.attached_world_object_ids;
        self.task_in_flight = false;
        self.resolve_references(resolver, UnresolvedAgents::Drop);

        self.current_task = record.current_task.and_then(|task| {
            types
                .task_from_record(task)
                .map_err(|err| error!(agent = %self.name, error = %err, "task_restore_failed"))
                .ok()
        });
        self.current_objective = record.current_objective.and_then(|objective| {
            types
                .objective_from_record(objective)
                .map_err(|err| error!(agent = %self.name, error = %err, "objective_restore_failed"))
                .ok()
        });
        self.pending_tasks = record
            .pending_tasks
            .into_iter()
            .filter_map(|task| {
                types
                    .task_from_record(task)
                    .map_err(|err| error!(agent = %self.name, error = %err, "task_restore_failed"))
                    .ok()
            })
            .collect();
        debug!(agent = %self.name, pending = self.pending_tasks.len(), "agent_loaded");
    }

    pub fn save(&self) -> AgentRecord {
        AgentRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            agent_type: self.agent_type.clone(),
            profile: self.profile.clone(),
            attached_agent_ids: self.agent_refs.clone(),
            attached_world_object_ids: self.world_refs.clone(),
            current_task: self.current_task.as_ref().map(Task::dump),
            current_objective: self.current_objective.as_ref().map(Objective::dump),
            pending_tasks: self.pending_tasks.iter().map(Task::dump).collect(),
            memory: self.memory.clone(),
        }
    }

    /// Builds the persisted record of an agent whose world object does not
    /// exist yet, without resolving anything.
    pub fn prepopulate(
        id: AgentId,
        agent_type: AgentType,
        name: impl Into<String>,
        world_refs: BTreeMap<String, WorldRef>,
        profile: Option<String>,
    ) -> AgentRecord {
        AgentRecord {
            id,
            name: name.into(),
            agent_type,
            profile,
            attached_agent_ids: BTreeMap::new(),
            attached_world_object_ids: world_refs,
            current_task: None,
            current_objective: None,
            pending_tasks: Vec::new(),
            memory: Params::new(),
        }
    }

    fn resolve_references<W: World>(&mut self, resolver: &Resolver<'_, W>, mode: UnresolvedAgents) {
        self.attached_agents.clear();
        let mut dropped = Vec::new();
        for (key, id) in &self.agent_refs {
            if resolver.agents.contains(id) {
                self.attached_agents.insert(key.clone(), id.clone());
            } else {
                warn!(agent = %self.name, key = %key, missing = %id, "attached_agent_unresolved");
                dropped.push(key.clone());
            }
        }
        if mode == UnresolvedAgents::Drop {
            for key in dropped {
                self.agent_refs.remove(&key);
            }
        }

        self.attached_objects.clear();
        for (key, reference) in &self.world_refs {
            match resolver.behavior.find_world_object(key, reference, resolver.world) {
                Some(object) => {
                    self.attached_objects.insert(key.clone(), object);
                }
                None => {
                    warn!(
                        agent = %self.name,
                        key = %key,
                        reference = %reference,
                        "attached_object_unresolved"
                    );
                }
            }
        }
    }

    /// One tick of agent work: deletion notices, task, objective, then
    /// promotion of the next pending task.
    pub fn run<W: World>(&mut self, behavior: &dyn AgentBehavior<W>, ctx: &mut TickContext<'_, W>) {
        let agents = ctx.agents();
        if agents.any_deleted_this_tick() {
            self.notice_deleted_agents(behavior, |id| agents.is_deleted_this_tick(id));
        }

        if self.is_idle() {
            debug!(agent = %self.name, "agent_idle");
        }

        if let Some(mut task) = self.current_task.take() {
            self.task_in_flight = true;
            let outcome = match task.execute(self, ctx) {
                Ok(()) => task.finished(self, ctx),
                Err(err) => Err(err),
            };
            self.task_in_flight = false;
            match outcome {
                Ok(false) => self.current_task = Some(task),
                Ok(true) => behavior.notify_task_finished(self, &task),
                Err(err) => {
                    error!(
                        agent = %self.name,
                        task_type = %task.kind(),
                        error = %err,
                        "task_failed"
                    );
                    behavior.notify_task_finished(self, &task);
                }
            }
        }

        if let Some(mut objective) = self.current_objective.take() {
            let epoch = self.objective_epoch;
            let outcome = objective.execute(self, ctx);
            match outcome {
                Ok(()) if self.objective_epoch == epoch => self.current_objective = Some(objective),
                Ok(()) => {}
                Err(err) => {
                    error!(
                        agent = %self.name,
                        objective_type = %objective.kind(),
                        error = %err,
                        "objective_failed"
                    );
                    if self.objective_epoch == epoch {
                        self.current_objective = None;
                    }
                }
            }
        }

        if self.current_task.is_none() {
            if let Some(next) = self.next_pending_index() {
                let task = self.pending_tasks.remove(next);
                behavior.notify_new_task(self, &task, ctx.world_mut());
                self.current_task = Some(task);
            }
        }
    }

    /// Tells the behavior about every attached agent that `is_deleted` flags
    /// and detaches it, so each deletion is reported once.
    pub(crate) fn notice_deleted_agents<W: World>(
        &mut self,
        behavior: &dyn AgentBehavior<W>,
        is_deleted: impl Fn(&AgentId) -> bool,
    ) -> usize {
        let deleted = self
            .agent_refs
            .iter()
            .filter(|(_, id)| is_deleted(id))
            .map(|(key, id)| (key.clone(), id.clone()))
            .collect::<Vec<_>>();
        for (key, id) in &deleted {
            behavior.notify_deleted_agent(self, key, id);
            self.agent_refs.remove(key);
            self.attached_agents.remove(key);
        }
        deleted.len()
    }

    /// Highest priority wins; among equal priorities the earliest queued.
    fn next_pending_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, task) in self.pending_tasks.iter().enumerate() {
            match best {
                Some((_, priority)) if task.priority().total_cmp(&priority) != Ordering::Greater => {}
                _ => best = Some((index, task.priority())),
            }
        }
        best.map(|(index, _)| index)
    }

    pub fn schedule_task(&mut self, task: Task) {
        if task.applicable_agent_type() != &self.agent_type {
            warn!(
                agent = %self.name,
                agent_type = %self.agent_type,
                task_type = %task.kind(),
                applicable = %task.applicable_agent_type(),
                "task_scheduled_on_wrong_agent_type"
            );
        }
        if !task.accepts_profile(self.profile()) {
            warn!(
                agent = %self.name,
                profile = ?self.profile,
                task_type = %task.kind(),
                "task_scheduled_on_wrong_profile"
            );
        }
        info!(
            agent = %self.name,
            task_type = %task.kind(),
            priority = task.priority(),
            params = %json_text(task.params()),
            "task_scheduled"
        );
        if self.current_task.is_none() && !self.task_in_flight {
            self.current_task = Some(task);
        } else {
            self.pending_tasks.push(task);
        }
    }

    pub fn set_objective(&mut self, objective: Objective) {
        info!(
            agent = %self.name,
            objective_type = %objective.kind(),
            params = %json_text(objective.params()),
            "objective_set"
        );
        self.objective_epoch = self.objective_epoch.wrapping_add(1);
        self.current_objective = Some(objective);
    }

    pub fn clear_objective(&mut self) {
        self.objective_epoch = self.objective_epoch.wrapping_add(1);
        self.current_objective = None;
    }

    pub fn attach_agent(&mut self, key: impl Into<String>, id: AgentId) {
        let key = key.into();
        self.agent_refs.insert(key.clone(), id.clone());
        self.attached_agents.insert(key, id);
    }

    pub fn detach_agent(&mut self, key: &str) -> Option<AgentId> {
        self.attached_agents.remove(key);
        self.agent_refs.remove(key)
    }

    pub fn attach_object(&mut self, key: impl Into<String>, id: ObjectId) {
        let key = key.into();
        self.world_refs.insert(key.clone(), WorldRef::Id(id.clone()));
        self.attached_objects.insert(key, id);
    }

    /// Records a by-name reference for an object that may not exist yet.
    pub fn attach_object_by_name(&mut self, key: impl Into<String>, name: impl Into<String>) {
        let key = key.into();
        self.attached_objects.remove(&key);
        self.world_refs.insert(key, WorldRef::Name(name.into()));
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent_type(&self) -> &AgentType {
        &self.agent_type
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn set_profile(&mut self, profile: Option<String>) {
        self.profile = profile;
    }

    pub fn memory(&self) -> &Params {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Params {
        &mut self.memory
    }

    pub fn agent_ref(&self, key: &str) -> Option<&AgentId> {
        self.attached_agents.get(key)
    }

    pub fn agent_refs(&self) -> &BTreeMap<String, AgentId> {
        &self.agent_refs
    }

    pub fn object(&self, key: &str) -> Option<&ObjectId> {
        self.attached_objects.get(key)
    }

    pub fn world_ref(&self, key: &str) -> Option<&WorldRef> {
        self.world_refs.get(key)
    }

    pub fn world_refs(&self) -> &BTreeMap<String, WorldRef> {
        &self.world_refs
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.as_ref()
    }

    pub fn current_objective(&self) -> Option<&Objective> {
        self.current_objective.as_ref()
    }

    pub fn pending_tasks(&self) -> &[Task] {
        &self.pending_tasks
    }

    pub fn is_idle(&self) -> bool {
        self.current_task.is_none()
            && self.pending_tasks.is_empty()
            && self.current_objective.is_none()
            && !self.task_in_flight
    }

    /// Current task first, then pending tasks in queue order.
    pub fn scheduled_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.current_task.iter().chain(self.pending_tasks.iter())
    }

    pub fn for_each_scheduled_task(&self, visit: impl FnMut(&Task)) {
        self.scheduled_tasks().for_each(visit);
    }

    pub fn has_task_scheduled(&self, kind: Option<&str>) -> bool {
        self.find_scheduled_task(kind, |_| true).is_some()
    }

    pub fn has_task_scheduled_where(&self, kind: Option<&str>, filter: impl Fn(&Task) -> bool) -> bool {
        self.find_scheduled_task(kind, filter).is_some()
    }

    pub fn find_scheduled_task(&self, kind: Option<&str>, filter: impl Fn(&Task) -> bool) -> Option<&Task> {
        self.scheduled_tasks()
            .find(|task| kind.map_or(true, |kind| task.kind() == kind) && filter(task))
    }

    pub fn nb_tasks_scheduled(&self, kind: Option<&str>) -> usize {
        self.scheduled_tasks()
            .filter(|task| kind.map_or(true, |kind| task.kind() == kind))
            .count()
    }

    pub fn has_objective(&self, kind: Option<&str>) -> bool {
        self.current_objective
            .as_ref()
            .is_some_and(|objective| kind.map_or(true, |kind| objective.kind() == kind))
    }
}

fn json_text(params: &Params) -> String {
    serde_json::to_string(&Value::Object(params.clone())).unwrap_or_default()
}
