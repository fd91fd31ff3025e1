use serde_json::{json, Value};

use super::*;
use crate::agents::AgentId;
use crate::store::{MemoryTree, AGENT_INDEX_KEY, DEFAULT_TASK_PRIORITY};
use crate::testing::{fixture_types, log_of, TestWorld};
use crate::work::BehaviorError;

/// Root hive with one worker counting to three and one watcher recruiting
/// a body named "Body 1".
fn hive(config: TickConfig) -> Orchestrator<TestWorld> {
    Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let root = ctx.create_agent(AgentSeed::new("root", "Hive"))?;
            let worker = ctx.create_agent(AgentSeed::new("worker", "Worker 1").with_agent("root", root.clone()))?;
            let watcher = ctx.create_agent(AgentSeed::new("watcher", "Watcher"))?;
            let count = ctx.types().new_task("count", json!({"until": 3}))?;
            let recruit = ctx.types().new_objective("recruit", json!({"body": "Body 1"}))?;
            if let Some(agent) = ctx.agent_mut(&worker) {
                agent.schedule_task(count);
            }
            if let Some(agent) = ctx.agent_mut(&watcher) {
                agent.set_objective(recruit);
            }
            Ok(root)
        },
        config,
    )
}

fn agent_named<'a>(orchestrator: &'a Orchestrator<TestWorld>, name: &str) -> Option<&'a crate::agents::Agent> {
    orchestrator
        .registry()
        .iter()
        .find(|agent| agent.name() == name)
}

fn index_len(store: &MemoryTree) -> usize {
    store
        .get(AGENT_INDEX_KEY)
        .and_then(Value::as_object)
        .map_or(0, |index| index.len())
}

#[test]
fn empty_store_bootstraps_and_persists_agents() {
    let mut orchestrator = hive(TickConfig::default());
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);

    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick");

    assert!(report.bootstrapped);
    assert_eq!(report.ran, 3);
    assert_eq!(report.saved, 3);
    assert_eq!(index_len(&store), 3);
    assert_eq!(store.get("agents.a000000.name"), Some(&json!("Hive")));
    assert_eq!(store.get("agents.a000000.current_task"), Some(&Value::Null));
    assert_eq!(store.get("runtime.last_tick"), Some(&json!(1)));
}

#[test]
fn later_ticks_resume_from_persisted_state() {
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);
    hive(TickConfig::default())
        .run_tick(&mut store, &mut world)
        .expect("tick 1");

    for time in 2..=3 {
        world.time = time;
        let mut fresh = hive(TickConfig::default());
        let report = fresh.run_tick(&mut store, &mut world).expect("tick");
        assert!(!report.bootstrapped);
        assert_eq!(report.loaded, 3);
    }

    let mut last = hive(TickConfig::default());
    world.time = 4;
    last.run_tick(&mut store, &mut world).expect("tick 4");
    let worker = agent_named(&last, "Worker 1").expect("worker");
    assert_eq!(log_of(worker), vec!["count:1", "count:2", "count:3"]);
    assert!(worker.current_task().is_none());
    assert!(worker.agent_ref("root").is_some());
}

#[test]
fn paused_hive_does_nothing() {
    let mut orchestrator = hive(TickConfig::default());
    let mut store = MemoryTree::new();
    control::pause(&mut store).expect("pause");
    let before = store.clone();

    let report = orchestrator
        .run_tick(&mut store, &mut TestWorld::at(1))
        .expect("tick");

    assert!(report.paused);
    assert_eq!(store, before);

    control::resume(&mut store).expect("resume");
    let report = orchestrator
        .run_tick(&mut store, &mut TestWorld::at(2))
        .expect("tick");
    assert!(report.bootstrapped);
}

#[test]
fn reset_leads_to_fresh_bootstrap() {
    let mut orchestrator = hive(TickConfig::default());
    let mut store = MemoryTree::new();
    orchestrator
        .run_tick(&mut store, &mut TestWorld::at(1))
        .expect("tick 1");

    orchestrator.reset(&mut store).expect("reset");
    assert!(orchestrator.registry().is_empty());
    assert_eq!(index_len(&store), 0);

    let report = orchestrator
        .run_tick(&mut store, &mut TestWorld::at(2))
        .expect("tick 2");
    assert!(report.bootstrapped);
    assert_eq!(index_len(&store), 3);
}

#[test]
fn pending_agent_resolves_after_object_appears_then_dies() {
    let mut orchestrator = hive(TickConfig::default());
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);

    orchestrator.run_tick(&mut store, &mut world).expect("tick 1");
    assert_eq!(store.get("pending_agents").and_then(Value::as_array).map(Vec::len), Some(1));

    world.time = 2;
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 2");
    assert_eq!(report.resolved_pending, 0);
    assert_eq!(report.waiting_pending, 1);

    world.time = 3;
    world.place("obj-body-1", "Body 1");
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 3");
    assert_eq!(report.resolved_pending, 1);
    let recruit = agent_named(&orchestrator, "Body 1").expect("recruit");
    let recruit_id = recruit.id().clone();
    let watcher = agent_named(&orchestrator, "Watcher").expect("watcher");
    assert_eq!(log_of(watcher), vec!["adopted:Body 1"]);
    assert_eq!(watcher.agent_ref("recruit:Body 1"), Some(&recruit_id));
    assert_eq!(
        store.get(&format!("agent_index.{recruit_id}")),
        Some(&json!("bodies.Body 1"))
    );
    assert!(store.get("bodies.Body 1").is_some());
    assert_eq!(store.get("pending_agents"), Some(&json!([])));

    world.time = 4;
    world.kill("obj-body-1");
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 4");
    assert_eq!(report.swept, 1);
    let watcher = agent_named(&orchestrator, "Watcher").expect("watcher");
    assert_eq!(log_of(watcher), vec!["adopted:Body 1", "deleted:recruit:Body 1"]);
    assert!(watcher.agent_refs().is_empty());
    assert!(store.get("bodies.Body 1").is_none());
    assert!(store.get(&format!("agent_index.{recruit_id}")).is_none());
}

#[test]
fn unresolved_pending_agent_expires() {
    let mut orchestrator = hive(TickConfig {
        pending_ttl_ticks: 2,
    });
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(10);

    orchestrator.run_tick(&mut store, &mut world).expect("tick 10");
    for time in 11..=12 {
        world.time = time;
        let report = orchestrator.run_tick(&mut store, &mut world).expect("tick");
        assert_eq!(report.waiting_pending, 1);
    }
    world.time = 13;
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 13");
    assert_eq!(report.waiting_pending, 0);
    assert_eq!(store.get("pending_agents"), Some(&json!([])));
}

#[test]
fn records_of_unknown_type_or_corrupt_shape_are_purged() {
    let mut orchestrator = hive(TickConfig::default());
    let mut store = MemoryTree::new();
    orchestrator
        .run_tick(&mut store, &mut TestWorld::at(1))
        .expect("tick 1");

    store
        .set("agent_index.zz000001", json!("agents.zz000001"))
        .expect("index");
    store
        .set(
            "agents.zz000001",
            json!({"id": "zz000001", "name": "Relic", "type": "retired_kind"}),
        )
        .expect("record");
    store
        .set("agent_index.zz000002", json!("agents.zz000002"))
        .expect("index");
    store
        .set("agents.zz000002", json!({"id": 5, "name": []}))
        .expect("record");

    let report = orchestrator
        .run_tick(&mut store, &mut TestWorld::at(2))
        .expect("tick 2");

    assert_eq!(report.purged_records, 2);
    assert_eq!(report.loaded, 3);
    assert!(store.get("agents.zz000001").is_none());
    assert!(store.get("agents.zz000002").is_none());
    assert_eq!(index_len(&store), 3);
}

#[test]
fn agents_created_while_running_first_run_next_tick() {
    let mut orchestrator = Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let boss = ctx.create_agent(AgentSeed::new("worker", "Boss"))?;
            let hire = ctx.types().new_task("hire", json!({"name": "Recruit"}))?;
            if let Some(agent) = ctx.agent_mut(&boss) {
                agent.schedule_task(hire);
            }
            Ok(boss)
        },
        TickConfig::default(),
    );
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);

    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 1");
    assert_eq!(report.ran, 1);
    assert_eq!(report.saved, 2);
    let recruit = agent_named(&orchestrator, "Recruit").expect("recruit");
    assert!(log_of(recruit).is_empty());
    assert!(recruit.has_task_scheduled(Some("note")));

    world.time = 2;
    orchestrator.run_tick(&mut store, &mut world).expect("tick 2");
    let recruit = agent_named(&orchestrator, "Recruit").expect("recruit");
    assert_eq!(log_of(recruit), vec!["hired"]);
}

#[test]
fn deleting_an_agent_purges_its_persisted_state() {
    let mut orchestrator = Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let doomed = ctx.create_agent(AgentSeed::new("worker", "Doomed"))?;
            let killer = ctx.create_agent(AgentSeed::new("worker", "Killer"))?;
            let wait = ctx.types().new_task("count", json!({"until": 1}))?;
            let delete = ctx
                .types()
                .new_task("delete_target", json!({"target": doomed.as_str()}))?;
            if let Some(agent) = ctx.agent_mut(&killer) {
                agent.schedule_task(wait);
                agent.schedule_task(delete);
            }
            Ok(killer)
        },
        TickConfig::default(),
    );
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);

    orchestrator.run_tick(&mut store, &mut world).expect("tick 1");
    assert_eq!(index_len(&store), 2);

    world.time = 2;
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 2");
    assert_eq!(report.purged_records, 1);
    assert_eq!(index_len(&store), 1);
    assert!(store.get("agents.a000000").is_none());
    assert!(agent_named(&orchestrator, "Doomed").is_none());
}

#[test]
fn ids_stay_unique_across_ticks() {
    let mut orchestrator = Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let boss = ctx.create_agent(AgentSeed::new("worker", "Boss"))?;
            for n in 0..3 {
                let hire = ctx
                    .types()
                    .new_task("hire", json!({"name": format!("Recruit {n}")}))?;
                if let Some(agent) = ctx.agent_mut(&boss) {
                    agent.schedule_task(hire);
                }
            }
            Ok(boss)
        },
        TickConfig::default(),
    );
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);
    for time in 1..=4 {
        world.time = time;
        orchestrator.run_tick(&mut store, &mut world).expect("tick");
    }

    let mut ids = orchestrator
        .registry()
        .iter()
        .map(|agent| agent.id().clone())
        .collect::<Vec<_>>();
    assert_eq!(ids.len(), 4);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(store.get("runtime.ids"), Some(&json!(4)));
}

#[test]
fn failing_bootstrap_aborts_tick_without_saving() {
    let mut orchestrator = Orchestrator::new(
        fixture_types(),
        |_: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            Err(BehaviorError::Other("no spawn yet".to_string()))
        },
        TickConfig::default(),
    );
    let mut store = MemoryTree::new();

    let error = orchestrator
        .run_tick(&mut store, &mut TestWorld::at(1))
        .expect_err("bootstrap failure");
    assert!(matches!(error, TickError::Bootstrap(_)));
    assert!(store.is_empty());
}

#[test]
fn bootstrap_persists_single_root_with_initial_objective() {
    let mut orchestrator = Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let root = ctx.create_agent(AgentSeed::new("worker", "Root"))?;
            let objective = ctx.types().new_objective("always", Value::Null)?;
            if let Some(agent) = ctx.agent_mut(&root) {
                agent.set_objective(objective);
            }
            Ok(root)
        },
        TickConfig::default(),
    );
    let mut store = MemoryTree::new();

    let report = orchestrator
        .run_tick(&mut store, &mut TestWorld::at(1))
        .expect("tick");

    assert!(report.bootstrapped);
    assert_eq!(index_len(&store), 1);
    assert_eq!(
        store.get("agents.a000000.current_objective.type"),
        Some(&json!("always"))
    );
    assert_eq!(store.get("agents.a000000.memory.objective_runs"), Some(&json!(1)));
}

#[test]
fn failing_agent_does_not_stop_the_others() {
    let mut orchestrator = Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let doomed = ctx.create_agent(AgentSeed::new("worker", "Doomed"))?;
            let steady = ctx.create_agent(AgentSeed::new("worker", "Steady"))?;
            let explode = ctx.types().new_task("explode", Value::Null)?;
            let note = ctx.types().new_task("note", json!({"label": "steady"}))?;
            if let Some(agent) = ctx.agent_mut(&doomed) {
                agent.schedule_task(explode);
            }
            if let Some(agent) = ctx.agent_mut(&steady) {
                agent.schedule_task(note);
            }
            Ok(doomed)
        },
        TickConfig::default(),
    );
    let mut store = MemoryTree::new();

    let report = orchestrator
        .run_tick(&mut store, &mut TestWorld::at(1))
        .expect("tick");

    assert_eq!(report.ran, 2);
    let steady = agent_named(&orchestrator, "Steady").expect("steady");
    assert_eq!(log_of(steady), vec!["steady"]);
    let doomed = agent_named(&orchestrator, "Doomed").expect("doomed");
    assert!(doomed.current_task().is_none());
}

#[test]
fn pending_agent_waits_while_object_is_not_viable() {
    let mut orchestrator = hive(TickConfig::default());
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);
    orchestrator.run_tick(&mut store, &mut world).expect("tick 1");

    world.time = 2;
    world.place_unborn("obj-body-1", "Body 1");
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 2");
    assert_eq!(report.resolved_pending, 0);
    assert_eq!(report.waiting_pending, 1);
    assert_eq!(store.get("pending_agents").and_then(Value::as_array).map(Vec::len), Some(1));
    assert!(agent_named(&orchestrator, "Body 1").is_none());

    world.time = 3;
    world.place("obj-body-1", "Body 1");
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 3");
    assert_eq!(report.resolved_pending, 1);
    let watcher = agent_named(&orchestrator, "Watcher").expect("watcher");
    assert_eq!(log_of(watcher), vec!["adopted:Body 1"]);
    assert_eq!(store.get("pending_agents"), Some(&json!([])));
}

#[test]
fn agent_that_ran_before_a_deletion_is_told_the_same_tick() {
    let mut orchestrator = Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let doomed = ctx.create_agent(AgentSeed::new("worker", "Doomed"))?;
            let watcher =
                ctx.create_agent(AgentSeed::new("watcher", "Watcher").with_agent("pal", doomed.clone()))?;
            let killer = ctx.create_agent(AgentSeed::new("worker", "Killer"))?;
            let wait = ctx.types().new_task("count", json!({"until": 1}))?;
            let delete = ctx
                .types()
                .new_task("delete_target", json!({"target": doomed.as_str()}))?;
            if let Some(agent) = ctx.agent_mut(&killer) {
                agent.schedule_task(wait);
                agent.schedule_task(delete);
            }
            Ok(watcher)
        },
        TickConfig::default(),
    );
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);
    orchestrator.run_tick(&mut store, &mut world).expect("tick 1");
    assert_eq!(store.get("agents.a000001.attached_agent_ids.pal"), Some(&json!("a000000")));

    world.time = 2;
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 2");
    assert_eq!(report.purged_records, 1);
    assert_eq!(report.late_deletion_notices, 1);
    let watcher = agent_named(&orchestrator, "Watcher").expect("watcher");
    assert_eq!(log_of(watcher), vec!["deleted:pal"]);
    assert_eq!(store.get("agents.a000001.attached_agent_ids"), Some(&json!({})));

    world.time = 3;
    let report = orchestrator.run_tick(&mut store, &mut world).expect("tick 3");
    assert_eq!(report.late_deletion_notices, 0);
    let watcher = agent_named(&orchestrator, "Watcher").expect("watcher");
    assert_eq!(log_of(watcher), vec!["deleted:pal"]);
}

fn lone_counter() -> Orchestrator<TestWorld> {
    Orchestrator::new(
        fixture_types(),
        |ctx: &mut TickContext<'_, TestWorld>| -> Result<AgentId, BehaviorError> {
            let worker = ctx.create_agent(AgentSeed::new("worker", "Counter"))?;
            let count = ctx.types().new_task("count", json!({"until": 3}))?;
            let note = ctx
                .types()
                .new_task("note", json!({"label": "late"}))?
                .with_priority(f64::INFINITY);
            if let Some(agent) = ctx.agent_mut(&worker) {
                agent.schedule_task(count);
                agent.schedule_task(note);
            }
            Ok(worker)
        },
        TickConfig::default(),
    )
}

#[test]
fn non_finite_priority_survives_a_reload() {
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);
    lone_counter().run_tick(&mut store, &mut world).expect("tick 1");
    assert_eq!(
        store.get("agents.a000000.pending_tasks"),
        Some(&json!([{"type": "note", "params": {"label": "late"}, "state": {}, "priority": DEFAULT_TASK_PRIORITY}]))
    );

    world.time = 2;
    let mut reloaded = lone_counter();
    let report = reloaded.run_tick(&mut store, &mut world).expect("tick 2");
    assert!(!report.bootstrapped);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.purged_records, 0);
    let counter = agent_named(&reloaded, "Counter").expect("counter");
    assert_eq!(counter.nb_tasks_scheduled(Some("note")), 1);
}

#[test]
fn unreadable_task_slot_leaves_the_agent_in_place() {
    let mut store = MemoryTree::new();
    let mut world = TestWorld::at(1);
    lone_counter().run_tick(&mut store, &mut world).expect("tick 1");
    store
        .set("agents.a000000.current_task", json!({"type": 5}))
        .expect("corrupt current task");
    store
        .set(
            "agents.a000000.pending_tasks",
            json!([{"type": "note", "params": {"label": "late"}, "priority": null}]),
        )
        .expect("null priority");

    world.time = 2;
    let mut reloaded = lone_counter();
    let report = reloaded.run_tick(&mut store, &mut world).expect("tick 2");

    assert!(!report.bootstrapped);
    assert_eq!(report.purged_records, 0);
    let counter = agent_named(&reloaded, "Counter").expect("counter");
    let task = counter.current_task().expect("note promoted");
    assert_eq!(task.kind(), "note");
    assert_eq!(task.priority(), DEFAULT_TASK_PRIORITY);
    assert_eq!(counter.nb_tasks_scheduled(None), 1);
}
