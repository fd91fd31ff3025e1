use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::agents::{AgentId, AgentType, UnitKind};
use crate::world::WorldRef;

use super::tree::decode_value;

/// Free-form JSON object used for unit params, unit state and agent memory.
pub type Params = Map<String, Value>;

pub const DEFAULT_TASK_PRIORITY: f64 = 1.0;

fn default_priority() -> f64 {
    DEFAULT_TASK_PRIORITY
}

/// `null` is what serde_json writes for a non-finite float.
fn priority_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(DEFAULT_TASK_PRIORITY))
}

/// One unreadable work slot empties that slot instead of failing the whole agent.
fn readable_slot<T: DeserializeOwned>(slot: &str, value: Value) -> Option<T> {
    if value.is_null() {
        return None;
    }
    decode_value(slot, value)
        .map_err(|err| warn!(slot, error = %err, "work_slot_unreadable"))
        .ok()
}

fn lenient_slot<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(readable_slot("work slot", value))
}

fn lenient_slots<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| readable_slot("pending_tasks", value))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "type")]
    pub kind: UnitKind,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub state: Params,
    #[serde(default = "default_priority", deserialize_with = "priority_or_default")]
    pub priority: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRecord {
    #[serde(rename = "type")]
    pub kind: UnitKind,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub state: Params,
}

/// Persisted form of an agent. `current_task` and `current_objective` are
/// always written, as `null` when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub attached_agent_ids: BTreeMap<String, AgentId>,
    #[serde(default)]
    pub attached_world_object_ids: BTreeMap<String, WorldRef>,
    #[serde(default, deserialize_with = "lenient_slot")]
    pub current_task: Option<TaskRecord>,
    #[serde(default, deserialize_with = "lenient_slot")]
    pub current_objective: Option<ObjectiveRecord>,
    #[serde(default, deserialize_with = "lenient_slots")]
    pub pending_tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub memory: Params,
}

/// Agent whose world object does not exist yet, plus who to hand it to once it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub world_object_key: String,
    pub world_object: WorldRef,
    pub handler_agent_id: AgentId,
    #[serde(default)]
    pub extra_params: Params,
    #[serde(default)]
    pub prepared: Option<AgentRecord>,
    #[serde(default)]
    pub registered_at: u64,
}
