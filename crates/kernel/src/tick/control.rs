use std::collections::BTreeMap;

use tracing::info;

use crate::agents::{AgentId, AgentType};
use crate::logging::{LogLevel, LogSettings};
use crate::store::{AgentRecord, MemoryTree, StoreError, AGENT_INDEX_KEY};

use super::pending::PendingQueue;
use super::runtime_state::RuntimeState;

/// Stops ticks from doing any work until [`resume`].
pub fn pause(store: &mut MemoryTree) -> Result<(), StoreError> {
    let mut runtime = RuntimeState::load(store)?;
    runtime.paused = true;
    runtime.save(store)?;
    info!("hive_paused");
    Ok(())
}

pub fn resume(store: &mut MemoryTree) -> Result<(), StoreError> {
    let mut runtime = RuntimeState::load(store)?;
    runtime.paused = false;
    runtime.save(store)?;
    info!("hive_resumed");
    Ok(())
}

/// Erases every persisted node. The next tick bootstraps from scratch.
/// The paused flag survives so a paused hive stays paused.
pub fn reset(store: &mut MemoryTree) -> Result<(), StoreError> {
    let paused = RuntimeState::load(store).map(|runtime| runtime.paused).unwrap_or(false);
    let logging = LogSettings::load(store).unwrap_or_default();
    store.clear();
    if paused {
        let mut runtime = RuntimeState::default();
        runtime.paused = true;
        runtime.save(store)?;
    }
    logging.save(store)?;
    info!(paused, "hive_reset");
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSummary {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub path: String,
    pub current_task: Option<String>,
    pub pending_tasks: usize,
    pub objective: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiveStatus {
    pub paused: bool,
    pub last_tick: Option<u64>,
    pub ids_allocated: u64,
    pub agents: Vec<AgentSummary>,
    pub unreadable_agents: Vec<AgentId>,
    pub pending_agents: usize,
}

pub fn status(store: &MemoryTree) -> Result<HiveStatus, StoreError> {
    let runtime = RuntimeState::load(store)?;
    let pending = PendingQueue::load(store)?;
    let index: BTreeMap<AgentId, String> = store.read(AGENT_INDEX_KEY)?.unwrap_or_default();

    let mut agents = Vec::new();
    let mut unreadable_agents = Vec::new();
    for (id, path) in index {
        match store.read::<AgentRecord>(&path) {
            Ok(Some(record)) => agents.push(AgentSummary {
                id,
                name: record.name,
                agent_type: record.agent_type,
                path,
                current_task: record.current_task.map(|task| task.kind.to_string()),
                pending_tasks: record.pending_tasks.len(),
                objective: record
                    .current_objective
                    .map(|objective| objective.kind.to_string()),
            }),
            Ok(None) | Err(_) => unreadable_agents.push(id),
        }
    }

    Ok(HiveStatus {
        paused: runtime.paused,
        last_tick: runtime.last_tick,
        ids_allocated: runtime.ids_allocated(),
        agents,
        unreadable_agents,
        pending_agents: pending.len(),
    })
}

pub fn enable_log_scope(store: &mut MemoryTree, scope: &str, level: LogLevel) -> Result<(), StoreError> {
    let mut settings = LogSettings::load(store)?;
    settings.enable(scope, level);
    settings.save(store)
}

pub fn disable_log_scope(store: &mut MemoryTree, scope: &str) -> Result<(), StoreError> {
    let mut settings = LogSettings::load(store)?;
    settings.disable(scope);
    settings.save(store)
}

pub fn log_scopes(store: &MemoryTree) -> Result<Vec<(String, LogLevel)>, StoreError> {
    let settings = LogSettings::load(store)?;
    Ok(settings
        .scopes()
        .map(|(scope, level)| (scope.to_string(), level))
        .collect())
}
