use std::collections::BTreeMap;

use kernel::{
    Agent, AgentId, BehaviorError, ObjectId, ObjectiveBehavior, StateMachine, UnitData, World,
    WorldRef,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::agents::source_count;
use super::tasks::PROFILES_SPAWNED_KEY;
use super::{
    HiveContext, EXPAND_POPULATION, HARVEST, PROFILE_HARVESTER, PROFILE_UPGRADER, PROFILE_WORKER,
    SPAWN_CREEP, TRANSFER, UPGRADE,
};
use crate::app::sim::{SimWorld, SPAWN_ENERGY_CAPACITY};

const UPGRADERS_AT_LEVEL_TWO: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExpandParams {
    pub(crate) profiles: Vec<String>,
    #[serde(default)]
    pub(crate) handler: Option<AgentId>,
}

/// Colony population plan. `initial_workers` asks for one worker per source;
/// once the controller reaches level 2, `level_two_roles` switches to
/// dedicated harvesters and upgraders.
pub(crate) struct PopulationControl {
    machine: StateMachine<SimWorld>,
}

impl PopulationControl {
    pub(crate) fn new() -> Self {
        let machine = StateMachine::new("initial_workers")
            .state("initial_workers", |_, _| true, |_, colony, ctx| {
                let profiles = vec![PROFILE_WORKER.to_string(); source_count(colony)];
                expand_population(colony, ctx, profiles)?;
                Ok(Some("level_two_roles"))
            })
            .state(
                "level_two_roles",
                |colony, ctx| controller_level(colony, ctx.world()) >= 2,
                |_, colony, ctx| {
                    let mut profiles = vec![PROFILE_HARVESTER.to_string(); source_count(colony)];
                    profiles.extend(
                        std::iter::repeat(PROFILE_UPGRADER.to_string()).take(UPGRADERS_AT_LEVEL_TWO),
                    );
                    expand_population(colony, ctx, profiles)?;
                    Ok(Some("established"))
                },
            )
            .state("established", |_, _| false, |_, _, _| Ok(None));
        Self { machine }
    }
}

fn controller_level(colony: &Agent, world: &SimWorld) -> u32 {
    colony
        .object("controller")
        .and_then(|id| world.controller(id))
        .map_or(0, |controller| controller.level)
}

/// Replaces the spawn actor's population target.
fn expand_population(
    colony: &Agent,
    ctx: &mut HiveContext<'_>,
    profiles: Vec<String>,
) -> Result<(), BehaviorError> {
    let spawn_actor = colony
        .agent_ref("spawn_actor")
        .cloned()
        .ok_or_else(|| BehaviorError::missing("spawn_actor"))?;
    info!(colony = %colony.name(), profiles = ?profiles, "population_target_set");
    let objective = ctx.types().new_objective(
        EXPAND_POPULATION,
        ExpandParams {
            profiles,
            handler: Some(colony.id().clone()),
        },
    )?;
    let Some(actor) = ctx.agent_mut(&spawn_actor) else {
        return Err(BehaviorError::missing("spawn_actor"));
    };
    actor.set_objective(objective);
    Ok(())
}

impl ObjectiveBehavior<SimWorld> for PopulationControl {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        self.machine.step(unit, agent, ctx).map(|_| ())
    }
}

/// Keeps the spawn actor's living plus queued creeps at the target count per
/// profile by scheduling spawn tasks for whatever is missing.
pub(crate) struct ExpandPopulation;

impl ObjectiveBehavior<SimWorld> for ExpandPopulation {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        let params: ExpandParams = unit.params_as()?;
        let mut wanted = BTreeMap::<String, usize>::new();
        for profile in &params.profiles {
            *wanted.entry(profile.clone()).or_default() += 1;
        }

        let alive = prune_spawned(agent, ctx);
        for (profile, target) in wanted {
            let living = alive.get(&profile).copied().unwrap_or(0);
            let queued = agent
                .scheduled_tasks()
                .filter(|task| {
                    task.kind() == SPAWN_CREEP
                        && task.data().param_str("profile") == Some(profile.as_str())
                })
                .count();
            let missing = target.saturating_sub(living + queued);
            if missing > 0 {
                debug!(spawn = %agent.name(), profile = %profile, missing, "population_missing");
            }
            for _ in 0..missing {
                let task = ctx.types().new_task(
                    SPAWN_CREEP,
                    json!({"profile": profile, "handler": params.handler}),
                )?;
                agent.schedule_task(task);
            }
        }
        Ok(())
    }
}

/// Drops spawned creeps that are neither alive nor still awaiting birth and
/// counts the rest per profile.
fn prune_spawned(agent: &mut Agent, ctx: &HiveContext<'_>) -> BTreeMap<String, usize> {
    let mut alive = BTreeMap::new();
    let Some(Value::Object(spawned)) = agent.memory_mut().get_mut(PROFILES_SPAWNED_KEY) else {
        return alive;
    };
    spawned.retain(|name, _| {
        let living = ctx.world().id_for_name(name).is_some();
        let awaited = ctx
            .pending()
            .entries()
            .iter()
            .any(|entry| matches!(&entry.world_object, WorldRef::Name(awaited) if awaited == name));
        living || awaited
    });
    for profile in spawned.values().filter_map(Value::as_str) {
        *alive.entry(profile.to_string()).or_default() += 1;
    }
    alive
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct KeepWorkingParams {
    pub(crate) source: ObjectId,
    pub(crate) spawn: ObjectId,
    pub(crate) controller: ObjectId,
}

/// Gives an idle creep its next job: harvest when empty, otherwise deliver
/// according to its profile.
pub(crate) struct KeepWorking;

impl ObjectiveBehavior<SimWorld> for KeepWorking {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut HiveContext<'_>,
    ) -> Result<(), BehaviorError> {
        if agent.has_task_scheduled(None) {
            return Ok(());
        }
        let params: KeepWorkingParams = unit.params_as()?;
        let creep = agent
            .object(super::agents::CREEP_KEY)
            .and_then(|id| ctx.world().creep(id))
            .ok_or_else(|| BehaviorError::missing(super::agents::CREEP_KEY))?;

        let (kind, task_params) = if creep.is_empty() {
            (HARVEST, json!({"source": params.source}))
        } else {
            match agent.profile() {
                Some(PROFILE_HARVESTER) => (TRANSFER, json!({"spawn": params.spawn})),
                Some(PROFILE_UPGRADER) => (UPGRADE, json!({"controller": params.controller})),
                _ => {
                    let spawn_hungry = ctx
                        .world()
                        .spawn(&params.spawn)
                        .is_some_and(|spawn| spawn.energy < SPAWN_ENERGY_CAPACITY);
                    if spawn_hungry {
                        (TRANSFER, json!({"spawn": params.spawn}))
                    } else {
                        (UPGRADE, json!({"controller": params.controller}))
                    }
                }
            }
        };
        let task = ctx.types().new_task(kind, task_params)?;
        agent.schedule_task(task);
        Ok(())
    }
}
