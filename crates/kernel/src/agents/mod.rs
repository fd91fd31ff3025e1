mod agent;
mod hooks;
mod ids;
mod registry;

pub use agent::{Agent, Resolver};
pub use hooks::{AgentBehavior, PlainAgent};
pub use ids::{AgentId, AgentType, IdAllocator, UnitKind};
pub use registry::AgentRegistry;
