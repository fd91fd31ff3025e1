use std::path::Path;
use std::process::ExitCode;

use kernel::{load_tree, save_tree, Orchestrator, StoreError, TickError, TickReport, World};
use thiserror::Error;
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::sim::SimWorld;

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tick(#[from] TickError),
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        store_path,
        ticks,
        mut orchestrator,
        mut world,
    } = app;

    for _ in 0..ticks {
        world.advance();
        match run_one_tick(&store_path, &mut orchestrator, &mut world) {
            Ok(report) if report.paused => {
                info!(tick = report.tick, "hive_paused");
            }
            Ok(_) => {}
            Err(err) => {
                error!(tick = world.time(), error = %err, "tick_failed");
                return ExitCode::FAILURE;
            }
        }
    }

    info!(ticks, creeps = world.creep_count(), "simulation_finished");
    ExitCode::SUCCESS
}

/// Reloads the store from disk, runs one tick and writes the store back, so
/// nothing but the world carries over between ticks.
pub(crate) fn run_one_tick(
    store_path: &Path,
    orchestrator: &mut Orchestrator<SimWorld>,
    world: &mut SimWorld,
) -> Result<TickReport, RunError> {
    let mut store = load_tree(store_path)?;
    let report = orchestrator.run_tick(&mut store, world)?;
    if !report.paused {
        save_tree(store_path, &store)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use kernel::{tick::control, TickConfig};
    use serde_json::json;

    use super::*;
    use crate::app::hive;

    fn orchestrator() -> Orchestrator<SimWorld> {
        Orchestrator::new(
            hive::hive_types().expect("hive types"),
            hive::bootstrap,
            TickConfig::default(),
        )
    }

    #[test]
    fn ticks_round_trip_through_the_store_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hive_store.json");
        let mut world = SimWorld::starter_room(1);

        for _ in 0..3 {
            world.advance();
            let mut fresh = orchestrator();
            run_one_tick(&path, &mut fresh, &mut world).expect("tick");
        }

        let store = load_tree(&path).expect("reload");
        assert_eq!(store.get("agents.a000000.name"), Some(&json!("Hive Mind")));
        assert_eq!(store.get("runtime.last_tick"), Some(&json!(3)));
        assert_eq!(
            store.get("agents.a000001.current_objective.type"),
            Some(&json!(hive::EXPAND_POPULATION))
        );
    }

    #[test]
    fn paused_store_is_left_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hive_store.json");
        let mut store = kernel::MemoryTree::new();
        control::pause(&mut store).expect("pause");
        save_tree(&path, &store).expect("save");
        let before = std::fs::read_to_string(&path).expect("read");

        let mut world = SimWorld::starter_room(1);
        world.advance();
        let report = run_one_tick(&path, &mut orchestrator(), &mut world).expect("tick");

        assert!(report.paused);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
    }

    #[test]
    fn corrupt_store_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hive_store.json");
        std::fs::write(&path, "{\"agents\": [").expect("write");

        let mut world = SimWorld::starter_room(1);
        world.advance();
        let error = run_one_tick(&path, &mut orchestrator(), &mut world).expect_err("corrupt");

        assert!(matches!(error, RunError::Store(StoreError::Parse { .. })));
    }
}
