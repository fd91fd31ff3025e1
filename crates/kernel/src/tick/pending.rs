use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::agents::{Agent, AgentId, Resolver};
use crate::store::{MemoryTree, PendingRecord, StoreError, PENDING_AGENTS_KEY};
use crate::work::{contain, BehaviorError};
use crate::world::World;

use super::context::TickContext;

/// Agents waiting for their world object, persisted under `pending_agents`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQueue {
    entries: Vec<PendingRecord>,
}

impl PendingQueue {
    pub fn load(tree: &MemoryTree) -> Result<Self, StoreError> {
        let entries = tree.read(PENDING_AGENTS_KEY)?.unwrap_or_default();
        Ok(Self { entries })
    }

    pub fn save(&self, tree: &mut MemoryTree) -> Result<(), StoreError> {
        tree.write(PENDING_AGENTS_KEY, &self.entries)
    }

    pub fn push(&mut self, record: PendingRecord) {
        self.entries.push(record);
    }

    pub fn entries(&self) -> &[PendingRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn take_entries(&mut self) -> Vec<PendingRecord> {
        std::mem::take(&mut self.entries)
    }

    /// Puts back unresolved entries ahead of anything queued meanwhile.
    pub(crate) fn restore_entries(&mut self, mut kept: Vec<PendingRecord>) {
        kept.append(&mut self.entries);
        self.entries = kept;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingReport {
    pub resolved: usize,
    pub waiting: usize,
    pub dropped: usize,
}

enum Resolution {
    Created,
    Waiting(PendingRecord),
    Dropped,
}

/// Turns pending registrations whose world object now exists and is viable
/// into live agents and hands each to its handler. Entries older than `ttl_ticks`
/// are dropped.
pub fn resolve_pending<W: World>(ctx: &mut TickContext<'_, W>, ttl_ticks: u64) -> PendingReport {
    let mut report = PendingReport::default();
    let mut kept = Vec::new();
    for record in ctx.pending_mut().take_entries() {
        match resolve_one(ctx, record, ttl_ticks) {
            Resolution::Created => report.resolved += 1,
            Resolution::Waiting(record) => {
                report.waiting += 1;
                kept.push(record);
            }
            Resolution::Dropped => report.dropped += 1,
        }
    }
    ctx.pending_mut().restore_entries(kept);
    report
}

fn resolve_one<W: World>(
    ctx: &mut TickContext<'_, W>,
    record: PendingRecord,
    ttl_ticks: u64,
) -> Resolution {
    let time = ctx.time();
    let types = ctx.types();
    let Some(behavior) = types.agent_behavior(&record.agent_type) else {
        error!(agent_type = %record.agent_type, "pending_agent_unknown_type");
        return Resolution::Dropped;
    };

    let found = behavior.find_world_object(
        &record.world_object_key,
        &record.world_object,
        ctx.world(),
    );
    let viable = found.as_ref().is_some_and(|id| ctx.world().is_viable(id));
    if !viable {
        let age = time.saturating_sub(record.registered_at);
        if age > ttl_ticks {
            warn!(
                agent_type = %record.agent_type,
                reference = %record.world_object,
                found = found.is_some(),
                age,
                "pending_agent_expired"
            );
            return Resolution::Dropped;
        }
        return Resolution::Waiting(record);
    }

    let id = match &record.prepared {
        Some(prepared) => prepared.id.clone(),
        None => ctx.allocate_id(),
    };
    if ctx.agents().contains(&id) {
        warn!(agent_id = %id, "pending_agent_already_registered");
        return Resolution::Dropped;
    }

    let mut agent = Agent::new(id.clone(), record.agent_type.clone());
    {
        let resolver = Resolver {
            agents: ctx.agents(),
            world: ctx.world(),
            behavior,
        };
        match record.prepared {
            Some(prepared) => agent.load(prepared, types, &resolver),
            None => {
                let name = record
                    .extra_params
                    .get("name")
                    .and_then(|value| value.as_str())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("{} {}", record.agent_type, record.world_object));
                let world_refs = BTreeMap::from([(
                    record.world_object_key.clone(),
                    record.world_object.clone(),
                )]);
                agent.initialize(name, BTreeMap::new(), world_refs, &resolver);
            }
        }
    }
    for (key, value) in record.extra_params {
        agent.memory_mut().insert(key, value);
    }

    if !behavior.is_alive(&agent, ctx.world()) {
        info!(agent_id = %id, agent = %agent.name(), "pending_agent_not_alive");
        return Resolution::Dropped;
    }
    ctx.agents_mut().add(agent);
    info!(agent_id = %id, handler = %record.handler_agent_id, "pending_agent_resolved");

    if let Err(err) = hand_over(ctx, &record.handler_agent_id, &id) {
        error!(
            agent_id = %id,
            handler = %record.handler_agent_id,
            error = %err,
            "pending_agent_handler_failed"
        );
    }
    Resolution::Created
}

fn hand_over<W: World>(
    ctx: &mut TickContext<'_, W>,
    handler_id: &AgentId,
    new_id: &AgentId,
) -> Result<(), BehaviorError> {
    let types = ctx.types();
    let Some(mut handler) = ctx.agents_mut().check_out(handler_id) else {
        return Err(BehaviorError::MissingReference {
            key: handler_id.to_string(),
        });
    };
    let result = match types.agent_behavior(handler.agent_type()) {
        Some(behavior) => contain(|| behavior.handle_new_agent(&mut handler, new_id, ctx)),
        None => Err(BehaviorError::Other(format!(
            "handler type '{}' is not registered",
            handler.agent_type()
        ))),
    };
    ctx.agents_mut().check_in(handler);
    result
}
