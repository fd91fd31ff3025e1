use std::path::{Path, PathBuf};

use kernel::{
    load_tree, resolve_store_path, LogSettings, Orchestrator, RegistryError, StorePathError,
    TickConfig,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::hive;
use super::sim::SimWorld;

pub(crate) const TICKS_ENV_VAR: &str = "HIVE_TICKS";
pub(crate) const DEFAULT_TICKS: u64 = 20;
const STARTER_SOURCES: usize = 2;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error(transparent)]
    StorePath(#[from] StorePathError),
    #[error("behavior registration failed: {0}")]
    Registry(#[from] RegistryError),
}

pub(crate) struct AppWiring {
    pub(crate) store_path: PathBuf,
    pub(crate) ticks: u64,
    pub(crate) orchestrator: Orchestrator<SimWorld>,
    pub(crate) world: SimWorld,
}

pub(crate) fn build_app() -> Result<AppWiring, StartupError> {
    let store_path = resolve_store_path();
    init_tracing(store_path.as_deref().ok());
    info!("=== Hive Startup ===");

    let store_path = store_path?;
    let config = TickConfig::from_env();
    let ticks = ticks_from_env();
    info!(
        store = %store_path.display(),
        ticks,
        pending_ttl_ticks = config.pending_ttl_ticks,
        "hive_configured"
    );

    let orchestrator = Orchestrator::new(hive::hive_types()?, hive::bootstrap, config);
    Ok(AppWiring {
        store_path,
        ticks,
        orchestrator,
        world: SimWorld::starter_room(STARTER_SOURCES),
    })
}

/// `RUST_LOG` (or `info`) plus the log scopes persisted in the store.
fn init_tracing(store_path: Option<&Path>) {
    let base = std::env::var("RUST_LOG")
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    let directives = store_path
        .and_then(|path| load_tree(path).ok())
        .and_then(|tree| LogSettings::load(&tree).ok())
        .map_or_else(|| base.clone(), |settings| settings.directives(&base));
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn ticks_from_env() -> u64 {
    match std::env::var(TICKS_ENV_VAR) {
        Ok(raw) => parse_ticks(&raw).unwrap_or_else(|| {
            warn!(var = TICKS_ENV_VAR, value = %raw, "ignoring_unparseable_env_override");
            DEFAULT_TICKS
        }),
        Err(_) => DEFAULT_TICKS,
    }
}

fn parse_ticks(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|ticks| *ticks > 0)
}
