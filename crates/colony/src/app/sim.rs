use std::collections::BTreeMap;

use kernel::{CommandResult, ObjectId, World};
use tracing::{debug, info};

pub(crate) const SPAWN_ENERGY_CAPACITY: u32 = 300;
pub(crate) const SPAWN_TICKS: u32 = 3;
pub(crate) const CREEP_CARRY_CAPACITY: u32 = 50;
pub(crate) const CREEP_LIFETIME_TICKS: u32 = 120;
pub(crate) const HARVEST_PER_TICK: u32 = 10;
pub(crate) const UPGRADE_PER_TICK: u32 = 5;
pub(crate) const CONTROLLER_LEVEL_PROGRESS: u32 = 200;

/// Body cost of a creep profile. Unknown profiles cannot be spawned.
pub(crate) fn profile_cost(profile: &str) -> Option<u32> {
    match profile {
        "worker" => Some(200),
        "harvester" => Some(250),
        "upgrader" => Some(200),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spawn {
    pub(crate) name: String,
    pub(crate) energy: u32,
    spawning: Option<Spawning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Spawning {
    name: String,
    profile: String,
    remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Creep {
    pub(crate) name: String,
    pub(crate) energy: u32,
    pub(crate) ticks_to_live: u32,
    pub(crate) hits: u32,
    at: Option<ObjectId>,
    heading: Option<ObjectId>,
}

impl Creep {
    pub(crate) fn is_full(&self) -> bool {
        self.energy >= CREEP_CARRY_CAPACITY
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.energy == 0
    }

    pub(crate) fn is_at(&self, target: &ObjectId) -> bool {
        self.at.as_ref() == Some(target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Controller {
    pub(crate) level: u32,
    pub(crate) progress: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SimObject {
    Spawn(Spawn),
    Creep(Creep),
    Source,
    Controller(Controller),
}

/// Deterministic single-room world: one spawn, a controller, sources and the
/// creeps the spawn produces. Commands take effect immediately; movement and
/// spawning complete in `advance`.
#[derive(Debug, Clone)]
pub(crate) struct SimWorld {
    time: u64,
    next_object: u64,
    objects: BTreeMap<ObjectId, SimObject>,
    creeps_by_name: BTreeMap<String, ObjectId>,
    spawns_by_name: BTreeMap<String, ObjectId>,
}

impl SimWorld {
    pub(crate) fn new() -> Self {
        Self {
            time: 0,
            next_object: 0,
            objects: BTreeMap::new(),
            creeps_by_name: BTreeMap::new(),
            spawns_by_name: BTreeMap::new(),
        }
    }

    /// The starting room: `Spawn1`, a level 1 controller and `sources` sources.
    pub(crate) fn starter_room(sources: usize) -> Self {
        let mut world = Self::new();
        world.add_spawn("Spawn1");
        world.add_controller();
        for _ in 0..sources {
            world.add_source();
        }
        world
    }

    fn next_id(&mut self, prefix: &str) -> ObjectId {
        self.next_object += 1;
        ObjectId::new(format!("{prefix}-{}", self.next_object))
    }

    pub(crate) fn add_spawn(&mut self, name: &str) -> ObjectId {
        let id = self.next_id("spawn");
        self.objects.insert(
            id.clone(),
            SimObject::Spawn(Spawn {
                name: name.to_string(),
                energy: SPAWN_ENERGY_CAPACITY,
                spawning: None,
            }),
        );
        self.spawns_by_name.insert(name.to_string(), id.clone());
        id
    }

    pub(crate) fn add_controller(&mut self) -> ObjectId {
        let id = self.next_id("controller");
        self.objects.insert(
            id.clone(),
            SimObject::Controller(Controller {
                level: 1,
                progress: 0,
            }),
        );
        id
    }

    pub(crate) fn add_source(&mut self) -> ObjectId {
        let id = self.next_id("source");
        self.objects.insert(id.clone(), SimObject::Source);
        id
    }

    pub(crate) fn spawn_named(&self, name: &str) -> Option<ObjectId> {
        self.spawns_by_name.get(name).cloned()
    }

    pub(crate) fn spawn(&self, id: &ObjectId) -> Option<&Spawn> {
        match self.objects.get(id) {
            Some(SimObject::Spawn(spawn)) => Some(spawn),
            _ => None,
        }
    }

    pub(crate) fn creep(&self, id: &ObjectId) -> Option<&Creep> {
        match self.objects.get(id) {
            Some(SimObject::Creep(creep)) => Some(creep),
            _ => None,
        }
    }

    pub(crate) fn controller(&self, id: &ObjectId) -> Option<Controller> {
        match self.objects.get(id) {
            Some(SimObject::Controller(controller)) => Some(*controller),
            _ => None,
        }
    }

    pub(crate) fn controller_id(&self) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| matches!(object, SimObject::Controller(_)))
            .map(|(id, _)| id.clone())
    }

    pub(crate) fn source_ids(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, object)| matches!(object, SimObject::Source))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub(crate) fn creep_count(&self) -> usize {
        self.creeps_by_name.len()
    }

    #[cfg(test)]
    pub(crate) fn kill_creep(&mut self, name: &str) -> bool {
        let Some(id) = self.creeps_by_name.remove(name) else {
            return false;
        };
        self.objects.remove(&id);
        true
    }

    pub(crate) fn spawn_creep(&mut self, spawn_id: &ObjectId, name: &str, profile: &str) -> CommandResult {
        let Some(cost) = profile_cost(profile) else {
            return CommandResult::InvalidArgs;
        };
        if self.creeps_by_name.contains_key(name) || self.is_being_spawned(name) {
            return CommandResult::NameExists;
        }
        let Some(SimObject::Spawn(spawn)) = self.objects.get_mut(spawn_id) else {
            return CommandResult::InvalidTarget;
        };
        if spawn.spawning.is_some() {
            return CommandResult::Busy;
        }
        if spawn.energy < cost {
            return CommandResult::NotEnoughResources;
        }
        spawn.energy -= cost;
        spawn.spawning = Some(Spawning {
            name: name.to_string(),
            profile: profile.to_string(),
            remaining: SPAWN_TICKS,
        });
        info!(spawn = %spawn.name, creep = name, profile, "creep_spawning");
        CommandResult::Ok
    }

    fn is_being_spawned(&self, name: &str) -> bool {
        self.objects.values().any(|object| {
            matches!(object, SimObject::Spawn(Spawn { spawning: Some(spawning), .. }) if spawning.name == name)
        })
    }

    pub(crate) fn move_to(&mut self, creep_id: &ObjectId, target: &ObjectId) -> CommandResult {
        if !self.objects.contains_key(target) {
            return CommandResult::InvalidTarget;
        }
        let Some(SimObject::Creep(creep)) = self.objects.get_mut(creep_id) else {
            return CommandResult::NotFound;
        };
        if creep.is_at(target) {
            return CommandResult::Ok;
        }
        creep.heading = Some(target.clone());
        CommandResult::Ok
    }

    pub(crate) fn harvest(&mut self, creep_id: &ObjectId, source: &ObjectId) -> CommandResult {
        if !matches!(self.objects.get(source), Some(SimObject::Source)) {
            return CommandResult::InvalidTarget;
        }
        let Some(SimObject::Creep(creep)) = self.objects.get_mut(creep_id) else {
            return CommandResult::NotFound;
        };
        if !creep.is_at(source) {
            return CommandResult::NotInRange;
        }
        if creep.is_full() {
            return CommandResult::Full;
        }
        creep.energy = (creep.energy + HARVEST_PER_TICK).min(CREEP_CARRY_CAPACITY);
        CommandResult::Ok
    }

    pub(crate) fn transfer(&mut self, creep_id: &ObjectId, spawn_id: &ObjectId) -> CommandResult {
        let room = match self.objects.get(spawn_id) {
            Some(SimObject::Spawn(spawn)) => SPAWN_ENERGY_CAPACITY.saturating_sub(spawn.energy),
            _ => return CommandResult::InvalidTarget,
        };
        let Some(SimObject::Creep(creep)) = self.objects.get_mut(creep_id) else {
            return CommandResult::NotFound;
        };
        if !creep.is_at(spawn_id) {
            return CommandResult::NotInRange;
        }
        if creep.is_empty() {
            return CommandResult::NotEnoughResources;
        }
        if room == 0 {
            return CommandResult::Full;
        }
        let amount = creep.energy.min(room);
        creep.energy -= amount;
        if let Some(SimObject::Spawn(spawn)) = self.objects.get_mut(spawn_id) {
            spawn.energy += amount;
        }
        CommandResult::Ok
    }

    pub(crate) fn upgrade_controller(&mut self, creep_id: &ObjectId, controller_id: &ObjectId) -> CommandResult {
        if !matches!(self.objects.get(controller_id), Some(SimObject::Controller(_))) {
            return CommandResult::InvalidTarget;
        }
        let Some(SimObject::Creep(creep)) = self.objects.get_mut(creep_id) else {
            return CommandResult::NotFound;
        };
        if !creep.is_at(controller_id) {
            return CommandResult::NotInRange;
        }
        if creep.is_empty() {
            return CommandResult::NotEnoughResources;
        }
        let spent = creep.energy.min(UPGRADE_PER_TICK);
        creep.energy -= spent;
        if let Some(SimObject::Controller(controller)) = self.objects.get_mut(controller_id) {
            controller.progress += spent;
            if controller.progress >= CONTROLLER_LEVEL_PROGRESS * controller.level {
                controller.progress = 0;
                controller.level += 1;
                info!(level = controller.level, "controller_level_up");
            }
        }
        CommandResult::Ok
    }

    /// Advances the world one tick: arrivals, spawn completion, ageing and
    /// spawn energy regeneration.
    pub(crate) fn advance(&mut self) {
        self.time += 1;
        let mut born = Vec::new();
        let mut dead = Vec::new();
        for (id, object) in &mut self.objects {
            match object {
                SimObject::Creep(creep) => {
                    if let Some(target) = creep.heading.take() {
                        creep.at = Some(target);
                    }
                    creep.ticks_to_live = creep.ticks_to_live.saturating_sub(1);
                    if creep.ticks_to_live == 0 {
                        dead.push((id.clone(), creep.name.clone()));
                    }
                }
                SimObject::Spawn(spawn) => {
                    if spawn.energy < SPAWN_ENERGY_CAPACITY {
                        spawn.energy += 1;
                    }
                    if let Some(spawning) = spawn.spawning.as_mut() {
                        spawning.remaining = spawning.remaining.saturating_sub(1);
                        if spawning.remaining == 0 {
                            born.extend(spawn.spawning.take().map(|done| (id.clone(), done)));
                        }
                    }
                }
                SimObject::Source | SimObject::Controller(_) => {}
            }
        }

        for (id, name) in dead {
            self.objects.remove(&id);
            self.creeps_by_name.remove(&name);
            info!(creep = %name, "creep_died");
        }
        for (spawn_id, spawning) in born {
            let id = self.next_id("creep");
            debug!(creep = %spawning.name, profile = %spawning.profile, creep_id = %id, "creep_born");
            self.creeps_by_name.insert(spawning.name.clone(), id.clone());
            self.objects.insert(
                id,
                SimObject::Creep(Creep {
                    name: spawning.name,
                    energy: 0,
                    ticks_to_live: CREEP_LIFETIME_TICKS,
                    hits: 100,
                    at: Some(spawn_id),
                    heading: None,
                }),
            );
        }
    }
}

impl World for SimWorld {
    fn time(&self) -> u64 {
        self.time
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    fn id_for_name(&self, name: &str) -> Option<ObjectId> {
        self.creeps_by_name
            .get(name)
            .or_else(|| self.spawns_by_name.get(name))
            .cloned()
    }

    fn is_viable(&self, id: &ObjectId) -> bool {
        match self.objects.get(id) {
            Some(SimObject::Creep(creep)) => creep.hits > 0 && creep.ticks_to_live > 0,
            Some(_) => true,
            None => false,
        }
    }
}
