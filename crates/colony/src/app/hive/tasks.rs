use std::collections::BTreeMap;

use kernel::store::PendingRecord;
use kernel::{
    log_command_failure, Agent, AgentId, AgentSeed, BehaviorError, CommandOutcome, CommandResult,
    ObjectId, Params, TaskBehavior, UnitData, WorldRef,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::agents::{source_key, CREEP_KEY};
use super::{
    HiveContext, COLONY, CREEP_ACTOR, HOME_SPAWN, INITIALIZE_COLONY, POPULATION_CONTROL,
    SPAWN_ACTOR,
};
use crate::app::sim::SimWorld;

pub(crate) const PROFILES_SPAWNED_KEY: &str = "profiles_spawned";
const DONE_KEY: &str = "done";

fn creep_of(agent: &Agent) -> Result<ObjectId, BehaviorError> {
    agent
        .object(CREEP_KEY)
        .cloned()
        .ok_or_else(|| BehaviorError::missing(CREEP_KEY))
}

fn object_param(unit: &UnitData, key: &str) -> Result<ObjectId, BehaviorError> {
    unit.param_str(key)
        .map(ObjectId::new)
        .ok_or_else(|| BehaviorError::InvalidParams(format!("missing object id '{key}'")))
}

fn is_done(unit: &UnitData) -> bool {
    unit.state().get(DONE_KEY) == Some(&Value::Bool(true))
}

fn command_error(result: CommandResult, action: &str, agent: &Agent) -> BehaviorError {
    log_command_failure(result, action, agent.name());
    BehaviorError::Command {
        action: action.to_string(),
        reason: result.reason(),
    }
}

/// Founds the home colony: a spawn actor for the home spawn and a colony
/// owning the room's sources and controller.
pub(crate) struct GetFactionStarted;

impl TaskBehavior<SimWorld> for GetFactionStarted {
    fn execute(
        &self,
        _unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        let world = ctx.world();
        let spawn = world
            .spawn_named(HOME_SPAWN)
            .ok_or_else(|| BehaviorError::missing(HOME_SPAWN))?;
        let controller = world
            .controller_id()
            .ok_or_else(|| BehaviorError::missing("controller"))?;
        let sources = world.source_ids();

        let spawn_actor = ctx.create_agent(
            AgentSeed::new(SPAWN_ACTOR, format!("SpawnActor {HOME_SPAWN}"))
                .with_object("spawn", WorldRef::Id(spawn.clone())),
        )?;
        let mut seed = AgentSeed::new(COLONY, format!("Colony {HOME_SPAWN}"))
            .with_agent("spawn_actor", spawn_actor)
            .with_object("spawn", WorldRef::Id(spawn))
            .with_object("controller", WorldRef::Id(controller));
        for (index, source) in sources.into_iter().enumerate() {
            seed = seed.with_object(source_key(index), WorldRef::Id(source));
        }
        let colony = ctx.create_agent(seed)?;

        let initialize = ctx.types().new_task(INITIALIZE_COLONY, Value::Null)?;
        if let Some(colony_agent) = ctx.agent_mut(&colony) {
            colony_agent.schedule_task(initialize);
        }
        agent.attach_agent("main_colony", colony.clone());
        info!(colony = %colony, "faction_started");
        Ok(())
    }
}

/// Puts the colony under population control.
pub(crate) struct InitializeColony;

impl TaskBehavior<SimWorld> for InitializeColony {
    fn execute(
        &self,
        _unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        if !agent.has_objective(None) {
            let objective = ctx.types().new_objective(POPULATION_CONTROL, Value::Null)?;
            agent.set_objective(objective);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SpawnParams {
    profile: String,
    #[serde(default)]
    handler: Option<AgentId>,
}

/// Spawns one creep of a profile and registers the creep actor that will
/// drive it once the creep exists. Retries while the spawn is busy or short
/// on energy.
pub(crate) struct SpawnCreep;

impl TaskBehavior<SimWorld> for SpawnCreep {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        let params: SpawnParams = unit.params_as()?;
        let spawn = agent
            .object("spawn")
            .cloned()
            .ok_or_else(|| BehaviorError::missing("spawn"))?;
        let name = match unit.state_str("name") {
            Some(name) => name.to_string(),
            None => {
                let name = ctx.runtime_mut().next_name(&params.profile);
                unit.set_state("name", name.clone());
                name
            }
        };

        let result = ctx.world_mut().spawn_creep(&spawn, &name, &params.profile);
        match result.outcome() {
            CommandOutcome::Success => {}
            CommandOutcome::Retry => {
                debug!(spawn = %agent.name(), creep = %name, reason = result.reason(), "spawn_retry");
                return Ok(());
            }
            CommandOutcome::Failed if result == CommandResult::NotEnoughResources => {
                debug!(spawn = %agent.name(), creep = %name, "spawn_waiting_for_energy");
                return Ok(());
            }
            CommandOutcome::Failed => return Err(command_error(result, "spawn_creep", agent)),
        }

        let spawned = agent
            .memory_mut()
            .entry(PROFILES_SPAWNED_KEY)
            .or_insert_with(|| Value::Object(Params::new()));
        if let Value::Object(spawned) = spawned {
            spawned.insert(name.clone(), json!(params.profile));
        }

        let actor_id = ctx.allocate_id();
        let mut prepared = Agent::prepopulate(
            actor_id,
            CREEP_ACTOR.into(),
            format!("CreepActor {name}"),
            BTreeMap::from([(CREEP_KEY.to_string(), WorldRef::Name(name.clone()))]),
            Some(params.profile.clone()),
        );
        prepared
            .memory
            .insert("spawned_by".to_string(), json!(agent.id().as_str()));
        ctx.register_pending(PendingRecord {
            agent_type: CREEP_ACTOR.into(),
            world_object_key: CREEP_KEY.to_string(),
            world_object: WorldRef::Name(name),
            handler_agent_id: params.handler.unwrap_or_else(|| agent.id().clone()),
            extra_params: Params::new(),
            prepared: Some(prepared),
            registered_at: 0,
        });
        unit.set_state(DONE_KEY, true);
        Ok(())
    }

    fn finished(&self, unit: &UnitData, _agent: &Agent, _ctx: &HiveContext<'_>) -> bool {
        is_done(unit)
    }
}

/// Moves to a source and harvests until full.
pub(crate) struct Harvest;

impl TaskBehavior<SimWorld> for Harvest {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        let creep = creep_of(agent)?;
        let source = object_param(unit, "source")?;
        match ctx.world_mut().harvest(&creep, &source) {
            CommandResult::Ok => Ok(()),
            CommandResult::NotInRange => move_towards(ctx, agent, &creep, &source),
            CommandResult::Full => {
                unit.set_state(DONE_KEY, true);
                Ok(())
            }
            other => Err(command_error(other, "harvest", agent)),
        }
    }

    fn finished(&self, unit: &UnitData, agent: &Agent, ctx: &HiveContext<'_>) -> bool {
        is_done(unit) || creep_state(agent, ctx).map_or(true, |creep| creep.is_full())
    }
}

/// Carries energy back to a spawn until empty or the spawn is full.
pub(crate) struct Transfer;

impl TaskBehavior<SimWorld> for Transfer {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        let creep = creep_of(agent)?;
        let spawn = object_param(unit, "spawn")?;
        match ctx.world_mut().transfer(&creep, &spawn) {
            CommandResult::Ok => Ok(()),
            CommandResult::NotInRange => move_towards(ctx, agent, &creep, &spawn),
            CommandResult::Full | CommandResult::NotEnoughResources => {
                unit.set_state(DONE_KEY, true);
                Ok(())
            }
            other => Err(command_error(other, "transfer", agent)),
        }
    }

    fn finished(&self, unit: &UnitData, agent: &Agent, ctx: &HiveContext<'_>) -> bool {
        is_done(unit) || creep_state(agent, ctx).map_or(true, |creep| creep.is_empty())
    }
}

/// Spends carried energy on the room controller.
pub(crate) struct Upgrade;

impl TaskBehavior<SimWorld> for Upgrade {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        let creep = creep_of(agent)?;
        let controller = object_param(unit, "controller")?;
        match ctx.world_mut().upgrade_controller(&creep, &controller) {
            CommandResult::Ok => Ok(()),
            CommandResult::NotInRange => move_towards(ctx, agent, &creep, &controller),
            CommandResult::NotEnoughResources => {
                unit.set_state(DONE_KEY, true);
                Ok(())
            }
            other => Err(command_error(other, "upgrade_controller", agent)),
        }
    }

    fn finished(&self, unit: &UnitData, agent: &Agent, ctx: &HiveContext<'_>) -> bool {
        is_done(unit) || creep_state(agent, ctx).map_or(true, |creep| creep.is_empty())
    }
}

fn creep_state<'w>(agent: &Agent, ctx: &'w HiveContext<'_>) -> Option<&'w crate::app::sim::Creep> {
    agent.object(CREEP_KEY).and_then(|id| ctx.world().creep(id))
}

fn move_towards(
    ctx: &mut HiveContext<'_>,
    agent: &Agent,
    creep: &ObjectId,
    target: &ObjectId,
) -> Result<(), BehaviorError> {
    match ctx.world_mut().move_to(creep, target) {
        CommandResult::Ok => Ok(()),
        other => Err(command_error(other, "move_to", agent)),
    }
}
