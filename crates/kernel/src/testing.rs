use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::agents::{Agent, AgentBehavior, AgentId, AgentRegistry, PlainAgent};
use crate::store::PendingRecord;
use crate::tick::{AgentSeed, PendingQueue, RuntimeState, TickContext};
use crate::work::{
    BehaviorError, ObjectiveBehavior, StateMachine, Task, TaskBehavior, TypeRegistry, UnitData,
    UnitSpec,
};
use crate::world::{ObjectId, World, WorldRef};

#[derive(Debug, Clone, Default)]
pub(crate) struct TestWorld {
    pub(crate) time: u64,
    hits: BTreeMap<ObjectId, u32>,
    names: BTreeMap<String, ObjectId>,
}

impl TestWorld {
    pub(crate) fn at(time: u64) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    pub(crate) fn place(&mut self, id: &str, name: &str) -> ObjectId {
        let id = ObjectId::new(id);
        self.hits.insert(id.clone(), 100);
        self.names.insert(name.to_string(), id.clone());
        id
    }

    /// An object that exists but is not viable yet, e.g. still being built.
    pub(crate) fn place_unborn(&mut self, id: &str, name: &str) -> ObjectId {
        let id = self.place(id, name);
        self.hits.insert(id.clone(), 0);
        id
    }

    pub(crate) fn kill(&mut self, id: &str) {
        if let Some(hits) = self.hits.get_mut(&ObjectId::new(id)) {
            *hits = 0;
        }
    }
}

impl World for TestWorld {
    fn time(&self) -> u64 {
        self.time
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.hits.contains_key(id)
    }

    fn id_for_name(&self, name: &str) -> Option<ObjectId> {
        self.names.get(name).cloned()
    }

    fn is_viable(&self, id: &ObjectId) -> bool {
        self.hits.get(id).is_some_and(|hits| *hits > 0)
    }
}

pub(crate) fn log_of(agent: &Agent) -> Vec<String> {
    agent
        .memory()
        .get("log")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn append_log(agent: &mut Agent, entry: &str) {
    let log = agent
        .memory_mut()
        .entry("log")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(entries) = log {
        entries.push(Value::String(entry.to_string()));
    }
}

fn bump(agent: &mut Agent, key: &str) {
    let next = agent.memory().get(key).and_then(Value::as_u64).unwrap_or(0) + 1;
    agent.memory_mut().insert(key.to_string(), json!(next));
}

/// Lives as long as the object attached under `body` is viable.
struct Mortal;

impl AgentBehavior<TestWorld> for Mortal {
    fn memory_location(&self, agent: &Agent) -> String {
        format!("bodies.{}", agent.name())
    }

    fn is_alive(&self, agent: &Agent, world: &TestWorld) -> bool {
        agent.object("body").is_some_and(|id| world.is_viable(id))
    }
}

/// Records deletion notices and adopts agents handed over to it.
struct Watcher;

impl AgentBehavior<TestWorld> for Watcher {
    fn notify_deleted_agent(&self, agent: &mut Agent, key: &str, _deleted: &AgentId) {
        append_log(agent, &format!("deleted:{key}"));
    }

    fn handle_new_agent(
        &self,
        agent: &mut Agent,
        new_agent: &AgentId,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let name = ctx
            .agent(new_agent)
            .map(|recruit| recruit.name().to_string())
            .ok_or_else(|| BehaviorError::missing("recruit"))?;
        agent.attach_agent(format!("recruit:{name}"), new_agent.clone());
        append_log(agent, &format!("adopted:{name}"));
        Ok(())
    }
}

struct Note;

impl TaskBehavior<TestWorld> for Note {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        _ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let label = unit.param_str("label").unwrap_or("note").to_string();
        append_log(agent, &label);
        Ok(())
    }
}

struct Count;

impl TaskBehavior<TestWorld> for Count {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        _ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let n = unit.state_u64("n").unwrap_or(0) + 1;
        unit.set_state("n", n);
        append_log(agent, &format!("count:{n}"));
        Ok(())
    }

    fn finished(&self, unit: &UnitData, _agent: &Agent, _ctx: &TickContext<'_, TestWorld>) -> bool {
        let until = unit.params().get("until").and_then(Value::as_u64).unwrap_or(1);
        unit.state_u64("n").unwrap_or(0) >= until
    }
}

struct Fail;

impl TaskBehavior<TestWorld> for Fail {
    fn execute(
        &self,
        _unit: &mut UnitData,
        _agent: &mut Agent,
        _ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        Err(BehaviorError::Other("task refused".to_string()))
    }

    fn finished(&self, _unit: &UnitData, _agent: &Agent, _ctx: &TickContext<'_, TestWorld>) -> bool {
        false
    }
}

struct Explode;

impl TaskBehavior<TestWorld> for Explode {
    fn execute(
        &self,
        _unit: &mut UnitData,
        _agent: &mut Agent,
        _ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        panic!("task exploded");
    }
}

/// Schedules a follow-up note on its own agent while running.
struct Requeue;

impl TaskBehavior<TestWorld> for Requeue {
    fn execute(
        &self,
        _unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let followup = ctx.types().new_task("note", json!({"label": "followup"}))?;
        agent.schedule_task(followup);
        append_log(agent, "requeue");
        Ok(())
    }
}

struct DeleteTarget;

impl TaskBehavior<TestWorld> for DeleteTarget {
    fn execute(
        &self,
        unit: &mut UnitData,
        _agent: &mut Agent,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let target = unit
            .param_str("target")
            .ok_or_else(|| BehaviorError::InvalidParams("target".to_string()))?;
        ctx.delete_agent(&AgentId::new(target));
        Ok(())
    }
}

/// Creates a new worker with a note already scheduled.
struct Hire;

impl TaskBehavior<TestWorld> for Hire {
    fn execute(
        &self,
        unit: &mut UnitData,
        _agent: &mut Agent,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let name = unit.param_str("name").unwrap_or("Hire").to_string();
        let id = ctx.create_agent(AgentSeed::new("worker", name))?;
        let note = ctx.types().new_task("note", json!({"label": "hired"}))?;
        if let Some(hired) = ctx.agent_mut(&id) {
            hired.schedule_task(note);
        }
        Ok(())
    }
}

struct Throttled;

impl TaskBehavior<TestWorld> for Throttled {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let runs = unit.state_u64("runs").unwrap_or(0) + 1;
        unit.set_state("runs", runs);
        append_log(agent, &format!("throttled@{}", ctx.time()));
        Ok(())
    }

    fn finished(&self, _unit: &UnitData, _agent: &Agent, _ctx: &TickContext<'_, TestWorld>) -> bool {
        false
    }
}

struct BumpMemory(&'static str);

impl ObjectiveBehavior<TestWorld> for BumpMemory {
    fn execute(
        &self,
        _unit: &mut UnitData,
        agent: &mut Agent,
        _ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        bump(agent, self.0);
        Ok(())
    }
}

/// Counts real executions in unit state `x`.
struct Tally;

impl ObjectiveBehavior<TestWorld> for Tally {
    fn execute(
        &self,
        unit: &mut UnitData,
        _agent: &mut Agent,
        _ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let x = unit.state_u64("x").unwrap_or(0) + 1;
        unit.set_state("x", x);
        Ok(())
    }
}

struct Broken;

impl ObjectiveBehavior<TestWorld> for Broken {
    fn execute(
        &self,
        _unit: &mut UnitData,
        _agent: &mut Agent,
        _ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        Err(BehaviorError::Other("objective refused".to_string()))
    }
}

struct ReplaceSelf;

impl ObjectiveBehavior<TestWorld> for ReplaceSelf {
    fn execute(
        &self,
        _unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        let next = ctx.types().new_objective("always", Value::Null)?;
        agent.set_objective(next);
        Ok(())
    }
}

/// Registers one pending `mortal` for the body named in params.
struct Recruit;

impl ObjectiveBehavior<TestWorld> for Recruit {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        if unit.state().contains_key("registered") {
            return Ok(());
        }
        let body = unit
            .param_str("body")
            .ok_or_else(|| BehaviorError::InvalidParams("body".to_string()))?
            .to_string();
        ctx.register_pending(PendingRecord {
            agent_type: "mortal".into(),
            world_object_key: "body".to_string(),
            world_object: WorldRef::Name(body.clone()),
            handler_agent_id: agent.id().clone(),
            extra_params: serde_json::Map::from_iter([("name".to_string(), json!(body))]),
            prepared: None,
            registered_at: 0,
        });
        unit.set_state("registered", true);
        Ok(())
    }
}

/// `start` -> `middle` -> `done`; `middle` waits for memory flag `go`.
struct Phases {
    machine: StateMachine<TestWorld>,
}

impl Phases {
    fn new() -> Self {
        let machine = StateMachine::new("start")
            .state("start", |_, _| true, |_, _, _| Ok(Some("middle")))
            .state(
                "middle",
                |agent, _| agent.memory().get("go") == Some(&Value::Bool(true)),
                |_, agent, _| {
                    append_log(agent, "phases:done");
                    Ok(Some("done"))
                },
            );
        Self { machine }
    }
}

impl ObjectiveBehavior<TestWorld> for Phases {
    fn execute(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, TestWorld>,
    ) -> Result<(), BehaviorError> {
        self.machine.step(unit, agent, ctx).map(|_| ())
    }
}

pub(crate) fn fixture_types() -> TypeRegistry<TestWorld> {
    let mut types = TypeRegistry::new();
    types.register_agent("root", PlainAgent).expect("root");
    types.register_agent("worker", PlainAgent).expect("worker");
    types.register_agent("mortal", Mortal).expect("mortal");
    types.register_agent("watcher", Watcher).expect("watcher");

    types.register_task("note", UnitSpec::new("worker"), Note).expect("note");
    types.register_task("count", UnitSpec::new("worker"), Count).expect("count");
    types.register_task("fail", UnitSpec::new("worker"), Fail).expect("fail");
    types.register_task("explode", UnitSpec::new("worker"), Explode).expect("explode");
    types.register_task("requeue", UnitSpec::new("worker"), Requeue).expect("requeue");
    types
        .register_task("delete_target", UnitSpec::new("worker"), DeleteTarget)
        .expect("delete_target");
    types.register_task("hire", UnitSpec::new("worker"), Hire).expect("hire");
    types
        .register_task("throttled", UnitSpec::new("worker").every(3), Throttled)
        .expect("throttled");
    types
        .register_task("miner_note", UnitSpec::new("worker").for_profiles(["miner"]), Note)
        .expect("miner_note");

    types
        .register_objective("ticker", UnitSpec::new("worker").every(5), Tally)
        .expect("ticker");
    types
        .register_objective("always", UnitSpec::new("worker"), BumpMemory("objective_runs"))
        .expect("always");
    types.register_objective("broken", UnitSpec::new("worker"), Broken).expect("broken");
    types
        .register_objective("replace_self", UnitSpec::new("worker"), ReplaceSelf)
        .expect("replace_self");
    types.register_objective("recruit", UnitSpec::new("watcher"), Recruit).expect("recruit");
    types.register_objective("phases", UnitSpec::new("worker"), Phases::new()).expect("phases");
    types
}

/// Registry, world and tick state wired together outside the orchestrator.
pub(crate) struct Harness {
    pub(crate) types: TypeRegistry<TestWorld>,
    pub(crate) agents: AgentRegistry,
    pub(crate) world: TestWorld,
    pub(crate) runtime: RuntimeState,
    pub(crate) pending: PendingQueue,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self {
            types: fixture_types(),
            agents: AgentRegistry::new(),
            world: TestWorld::at(100),
            runtime: RuntimeState::default(),
            pending: PendingQueue::default(),
        }
    }

    pub(crate) fn ctx(&mut self) -> TickContext<'_, TestWorld> {
        TickContext::new(
            &self.types,
            &mut self.agents,
            &mut self.world,
            &mut self.runtime,
            &mut self.pending,
        )
    }

    pub(crate) fn spawn(&mut self, seed: AgentSeed) -> AgentId {
        self.ctx().create_agent(seed).expect("create agent")
    }

    pub(crate) fn task(&self, kind: &str, params: Value) -> Task {
        self.types.new_task(kind, params).expect("task")
    }

    pub(crate) fn agent(&self, id: &AgentId) -> &Agent {
        self.agents.get(id).expect("agent registered")
    }

    pub(crate) fn agent_mut(&mut self, id: &AgentId) -> &mut Agent {
        self.agents.get_mut(id).expect("agent registered")
    }

    pub(crate) fn run(&mut self, id: &AgentId) {
        let types = &self.types;
        let mut agent = self.agents.check_out(id).expect("check out");
        let behavior = types
            .agent_behavior(agent.agent_type())
            .expect("agent type registered");
        let mut ctx = TickContext::new(
            types,
            &mut self.agents,
            &mut self.world,
            &mut self.runtime,
            &mut self.pending,
        );
        agent.run(behavior, &mut ctx);
        self.agents.check_in(agent);
    }
}
