use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agents::{AgentId, IdAllocator};
use crate::store::{MemoryTree, StoreError, RUNTIME_KEY};

/// Cross-tick bookkeeping persisted under `runtime`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub last_tick: Option<u64>,
    #[serde(default)]
    ids: IdAllocator,
    #[serde(default)]
    name_counters: BTreeMap<String, u64>,
}

impl RuntimeState {
    pub fn load(tree: &MemoryTree) -> Result<Self, StoreError> {
        Ok(tree.read(RUNTIME_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, tree: &mut MemoryTree) -> Result<(), StoreError> {
        tree.write(RUNTIME_KEY, self)
    }

    pub fn allocate_id(&mut self) -> AgentId {
        self.ids.allocate()
    }

    pub fn ids_allocated(&self) -> u64 {
        self.ids.peek_next()
    }

    /// Next display name for a role, e.g. `Harvester 4`.
    pub fn next_name(&mut self, role: &str) -> String {
        let counter = self.name_counters.entry(role.to_string()).or_insert(0);
        *counter += 1;
        format!("{} {}", capitalize(role), counter)
    }
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
