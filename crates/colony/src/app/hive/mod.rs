//! Colony behaviors: who the agents are, what they can be told to do, and the
//! long-running goals that keep the population growing.

mod agents;
mod objectives;
mod tasks;

use kernel::{AgentId, AgentSeed, BehaviorError, RegistryError, TickContext, TypeRegistry, UnitSpec};
use serde_json::Value;

use super::sim::SimWorld;

pub(crate) const HIVE_MIND: &str = "hive_mind";
pub(crate) const COLONY: &str = "colony";
pub(crate) const SPAWN_ACTOR: &str = "spawn_actor";
pub(crate) const CREEP_ACTOR: &str = "creep_actor";

pub(crate) const GET_FACTION_STARTED: &str = "get_faction_started";
pub(crate) const INITIALIZE_COLONY: &str = "initialize_colony";
pub(crate) const SPAWN_CREEP: &str = "spawn_creep";
pub(crate) const HARVEST: &str = "harvest";
pub(crate) const TRANSFER: &str = "transfer";
pub(crate) const UPGRADE: &str = "upgrade";

pub(crate) const POPULATION_CONTROL: &str = "population_control";
pub(crate) const EXPAND_POPULATION: &str = "expand_population";
pub(crate) const KEEP_WORKING: &str = "keep_working";

pub(crate) const PROFILE_WORKER: &str = "worker";
pub(crate) const PROFILE_HARVESTER: &str = "harvester";
pub(crate) const PROFILE_UPGRADER: &str = "upgrader";

pub(crate) const HOME_SPAWN: &str = "Spawn1";

pub(crate) type HiveContext<'t> = TickContext<'t, SimWorld>;

pub(crate) fn hive_types() -> Result<TypeRegistry<SimWorld>, RegistryError> {
    let mut types = TypeRegistry::new();
    types.register_agent(HIVE_MIND, agents::HiveMind)?;
    types.register_agent(COLONY, agents::Colony)?;
    types.register_agent(SPAWN_ACTOR, agents::SpawnActor)?;
    types.register_agent(CREEP_ACTOR, agents::CreepActor)?;

    types.register_task(GET_FACTION_STARTED, UnitSpec::new(HIVE_MIND), tasks::GetFactionStarted)?;
    types.register_task(INITIALIZE_COLONY, UnitSpec::new(COLONY), tasks::InitializeColony)?;
    types.register_task(SPAWN_CREEP, UnitSpec::new(SPAWN_ACTOR), tasks::SpawnCreep)?;
    types.register_task(
        HARVEST,
        UnitSpec::new(CREEP_ACTOR).for_profiles([PROFILE_WORKER, PROFILE_HARVESTER]),
        tasks::Harvest,
    )?;
    types.register_task(
        TRANSFER,
        UnitSpec::new(CREEP_ACTOR).for_profiles([PROFILE_WORKER, PROFILE_HARVESTER]),
        tasks::Transfer,
    )?;
    types.register_task(
        UPGRADE,
        UnitSpec::new(CREEP_ACTOR).for_profiles([PROFILE_WORKER, PROFILE_UPGRADER]),
        tasks::Upgrade,
    )?;

    types.register_objective(
        POPULATION_CONTROL,
        UnitSpec::new(COLONY).every(10),
        objectives::PopulationControl::new(),
    )?;
    types.register_objective(
        EXPAND_POPULATION,
        UnitSpec::new(SPAWN_ACTOR).every(5),
        objectives::ExpandPopulation,
    )?;
    types.register_objective(KEEP_WORKING, UnitSpec::new(CREEP_ACTOR), objectives::KeepWorking)?;
    Ok(types)
}

/// Creates the hive mind. Everything else is built by its first task.
pub(crate) fn bootstrap(ctx: &mut HiveContext<'_>) -> Result<AgentId, BehaviorError> {
    let hive = ctx.create_agent(AgentSeed::new(HIVE_MIND, "Hive Mind"))?;
    let start = ctx.types().new_task(GET_FACTION_STARTED, Value::Null)?;
    if let Some(agent) = ctx.agent_mut(&hive) {
        agent.schedule_task(start);
    }
    Ok(hive)
}
