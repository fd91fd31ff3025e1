use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::agents::{Agent, AgentId, AgentRegistry, Resolver};
use crate::store::{agent_path, AgentRecord, MemoryTree, StoreError, AGENT_INDEX_KEY};
use crate::work::{BehaviorError, TypeRegistry};
use crate::world::World;

use super::context::TickContext;
use super::pending::{resolve_pending, PendingQueue};
use super::runtime_state::RuntimeState;

pub const PENDING_TTL_ENV_VAR: &str = "HIVE_PENDING_TTL_TICKS";
pub const DEFAULT_PENDING_TTL_TICKS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    pub pending_ttl_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            pending_ttl_ticks: DEFAULT_PENDING_TTL_TICKS,
        }
    }
}

impl TickConfig {
    /// Defaults overridden by `HIVE_PENDING_TTL_TICKS` when it parses.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(PENDING_TTL_ENV_VAR) {
            match raw.trim().parse::<u64>() {
                Ok(ticks) => config.pending_ttl_ticks = ticks,
                Err(_) => warn!(
                    var = PENDING_TTL_ENV_VAR,
                    value = %raw,
                    "ignoring_unparseable_env_override"
                ),
            }
        }
        config
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub paused: bool,
    pub bootstrapped: bool,
    pub loaded: usize,
    pub purged_records: usize,
    pub resolved_pending: usize,
    pub waiting_pending: usize,
    pub swept: usize,
    pub ran: usize,
    pub late_deletion_notices: usize,
    pub saved: usize,
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[source] BehaviorError),
    #[error("bootstrap produced no agents")]
    EmptyBootstrap,
}

pub type Bootstrap<W> = Box<dyn for<'t> Fn(&mut TickContext<'t, W>) -> Result<AgentId, BehaviorError>>;

/// Drives the tick pipeline: instantiate, bootstrap, load, resolve pending,
/// sweep, run, save.
pub struct Orchestrator<W> {
    types: TypeRegistry<W>,
    bootstrap: Bootstrap<W>,
    config: TickConfig,
    registry: AgentRegistry,
}

impl<W: World> Orchestrator<W> {
    pub fn new<B>(types: TypeRegistry<W>, bootstrap: B, config: TickConfig) -> Self
    where
        B: for<'t> Fn(&mut TickContext<'t, W>) -> Result<AgentId, BehaviorError> + 'static,
    {
        Self {
            types,
            bootstrap: Box::new(bootstrap),
            config,
            registry: AgentRegistry::new(),
        }
    }

    pub fn types(&self) -> &TypeRegistry<W> {
        &self.types
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Agents of the most recent tick.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Wipes persisted state and the in-memory registry.
    pub fn reset(&mut self, store: &mut MemoryTree) -> Result<(), StoreError> {
        self.registry.clear();
        super::control::reset(store)
    }

    pub fn run_tick(&mut self, store: &mut MemoryTree, world: &mut W) -> Result<TickReport, TickError> {
        self.run_phases(store, world).map_err(|err| {
            error!(fatal = true, error = %err, "tick_aborted");
            err
        })
    }

    fn run_phases(&mut self, store: &mut MemoryTree, world: &mut W) -> Result<TickReport, TickError> {
        let time = world.time();
        let mut report = TickReport {
            tick: time,
            ..TickReport::default()
        };
        let mut runtime = RuntimeState::load(store)?;
        if runtime.paused {
            info!(tick = time, "tick_skipped_paused");
            report.paused = true;
            return Ok(report);
        }
        let mut pending = PendingQueue::load(store)?;
        let mut index = read_index(store)?;

        let records = self.instantiate(store, &mut index, &mut report);

        if self.registry.is_empty() {
            let mut ctx = TickContext::new(
                &self.types,
                &mut self.registry,
                world,
                &mut runtime,
                &mut pending,
            );
            let root = (self.bootstrap)(&mut ctx).map_err(TickError::Bootstrap)?;
            if self.registry.is_empty() {
                return Err(TickError::EmptyBootstrap);
            }
            info!(tick = time, root = %root, agents = self.registry.len(), "hive_bootstrapped");
            report.bootstrapped = true;
        }

        for (id, record) in records {
            self.load_one(&id, record, world);
            report.loaded += 1;
        }

        let pending_report = {
            let mut ctx = TickContext::new(
                &self.types,
                &mut self.registry,
                world,
                &mut runtime,
                &mut pending,
            );
            resolve_pending(&mut ctx, self.config.pending_ttl_ticks)
        };
        report.resolved_pending = pending_report.resolved;
        report.waiting_pending = pending_report.waiting;

        report.swept = self.sweep(world);
        report.ran = self.run_agents(world, &mut runtime, &mut pending);
        report.late_deletion_notices = self.notify_late_deletions();

        report.purged_records += self.purge_deleted(store, &mut index);
        report.saved = self.save_agents(store, &mut index)?;
        store.write(AGENT_INDEX_KEY, &index)?;
        pending.save(store)?;
        runtime.last_tick = Some(time);
        runtime.save(store)?;

        info!(
            tick = time,
            agents = self.registry.len(),
            loaded = report.loaded,
            ran = report.ran,
            swept = report.swept,
            pending_resolved = report.resolved_pending,
            pending_waiting = report.waiting_pending,
            "tick_complete"
        );
        Ok(report)
    }

    /// Phase 1: blank agents for every indexed record with a known type.
    fn instantiate(
        &mut self,
        store: &mut MemoryTree,
        index: &mut BTreeMap<AgentId, String>,
        report: &mut TickReport,
    ) -> Vec<(AgentId, AgentRecord)> {
        let mut blanks = Vec::new();
        let mut records = Vec::new();
        let mut purge = Vec::new();
        for (id, path) in index.iter() {
            match store.read::<AgentRecord>(path) {
                Ok(Some(record)) if self.types.has_agent_type(&record.agent_type) => {
                    blanks.push(Agent::new(id.clone(), record.agent_type.clone()));
                    records.push((id.clone(), record));
                }
                Ok(Some(record)) => {
                    error!(agent_id = %id, agent_type = %record.agent_type, "agent_type_unknown");
                    purge.push(id.clone());
                }
                Ok(None) => {
                    warn!(agent_id = %id, path = %path, "agent_record_missing");
                    purge.push(id.clone());
                }
                Err(err) => {
                    error!(agent_id = %id, error = %err, "agent_record_corrupt");
                    purge.push(id.clone());
                }
            }
        }
        for id in purge {
            if let Some(path) = index.remove(&id) {
                store.remove(&path);
                report.purged_records += 1;
            }
        }
        self.registry.set_all(blanks);
        records
    }

    /// Phase 3: populate a blank agent from its record.
    fn load_one(&mut self, id: &AgentId, record: AgentRecord, world: &W) {
        let Some(mut agent) = self.registry.check_out(id) else {
            warn!(agent_id = %id, "loaded_agent_not_registered");
            return;
        };
        let Some(behavior) = self.types.agent_behavior(agent.agent_type()) else {
            self.registry.check_in(agent);
            return;
        };
        let resolver = Resolver {
            agents: &self.registry,
            world,
            behavior,
        };
        agent.load(record, &self.types, &resolver);
        self.registry.check_in(agent);
    }

    /// Phase 5: unregister agents whose world presence ended.
    fn sweep(&mut self, world: &W) -> usize {
        let mut dead = Vec::new();
        for agent in self.registry.iter() {
            let alive = self
                .types
                .agent_behavior(agent.agent_type())
                .map_or(true, |behavior| behavior.is_alive(agent, world));
            if !alive {
                dead.push(agent.id().clone());
            }
        }
        for id in &dead {
            self.registry.remove(id);
            info!(agent_id = %id, "agent_swept_dead");
        }
        dead.len()
    }

    /// Phase 6: run a snapshot of the population in registration order.
    /// Agents created meanwhile first run next tick.
    fn run_agents(&mut self, world: &mut W, runtime: &mut RuntimeState, pending: &mut PendingQueue) -> usize {
        let types = &self.types;
        let registry = &mut self.registry;
        let mut ran = 0;
        for id in registry.ids() {
            let Some(mut agent) = registry.check_out(&id) else {
                continue;
            };
            let Some(behavior) = types.agent_behavior(agent.agent_type()) else {
                registry.check_in(agent);
                continue;
            };
            {
                let mut ctx = TickContext::new(types, registry, world, runtime, pending);
                agent.run(behavior, &mut ctx);
            }
            registry.check_in(agent);
            ran += 1;
        }
        ran
    }

    /// Phase 6b: agents that ran before a mid-run deletion still hold the
    /// deleted id; tell them now, before their records are saved.
    fn notify_late_deletions(&mut self) -> usize {
        if !self.registry.any_deleted_this_tick() {
            return 0;
        }
        let deleted = self.registry.deleted_this_tick().to_vec();
        let types = &self.types;
        let registry = &mut self.registry;
        let mut notices = 0;
        for id in registry.ids() {
            let Some(agent) = registry.get_mut(&id) else {
                continue;
            };
            let Some(behavior) = types.agent_behavior(agent.agent_type()) else {
                continue;
            };
            notices += agent.notice_deleted_agents(behavior, |gone| deleted.contains(gone));
        }
        if notices > 0 {
            debug!(notices, "late_deletion_notices_sent");
        }
        notices
    }

    fn purge_deleted(&self, store: &mut MemoryTree, index: &mut BTreeMap<AgentId, String>) -> usize {
        let mut purged = 0;
        for id in self.registry.deleted_this_tick() {
            if let Some(path) = index.remove(id) {
                store.remove(&path);
                purged += 1;
                debug!(agent_id = %id, path = %path, "agent_state_purged");
            }
        }
        purged
    }

    /// Phase 7: persist every live agent and keep the index in step.
    fn save_agents(
        &self,
        store: &mut MemoryTree,
        index: &mut BTreeMap<AgentId, String>,
    ) -> Result<usize, StoreError> {
        let mut saved = 0;
        for agent in self.registry.iter() {
            let path = self
                .types
                .agent_behavior(agent.agent_type())
                .map(|behavior| behavior.memory_location(agent))
                .unwrap_or_else(|| agent_path(agent.id().as_str()));
            if let Some(previous) = index.get(agent.id()) {
                if previous != &path {
                    store.remove(previous);
                }
            }
            store.write(&path, &agent.save())?;
            index.insert(agent.id().clone(), path);
            saved += 1;
        }
        Ok(saved)
    }
}

fn read_index(store: &MemoryTree) -> Result<BTreeMap<AgentId, String>, StoreError> {
    Ok(store.read(AGENT_INDEX_KEY)?.unwrap_or_default())
}
