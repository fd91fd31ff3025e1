mod context;
pub mod control;
mod orchestrator;
mod pending;
mod runtime_state;

pub use context::{AgentSeed, TickContext};
pub use orchestrator::{
    Bootstrap, Orchestrator, TickConfig, TickError, TickReport, DEFAULT_PENDING_TTL_TICKS,
    PENDING_TTL_ENV_VAR,
};
pub use pending::{resolve_pending, PendingQueue, PendingReport};
pub use runtime_state::RuntimeState;

#[cfg(test)]
mod tests;
