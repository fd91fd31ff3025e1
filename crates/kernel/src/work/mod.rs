mod behavior;
mod state_machine;
mod task;
mod types;
mod unit;

pub(crate) use behavior::contain;
pub use behavior::{BehaviorError, ObjectiveBehavior, TaskBehavior};
pub use state_machine::{Guard, StateMachine, StepOutcome, Transition, CURRENT_STATE_KEY};
pub use task::{Objective, Task};
pub use types::{RegistryError, TypeRegistry, UnitSpec};
pub use unit::{UnitData, NEXT_RUN_KEY};
