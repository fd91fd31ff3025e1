use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::agents::Agent;
use crate::tick::TickContext;
use crate::world::World;

use super::behavior::BehaviorError;
use super::unit::UnitData;

/// Unit state key holding the current state label.
pub const CURRENT_STATE_KEY: &str = "current_state";

pub type Guard<W> = for<'c> fn(&Agent, &TickContext<'c, W>) -> bool;
pub type Transition<W> = for<'c> fn(
    &mut UnitData,
    &mut Agent,
    &mut TickContext<'c, W>,
) -> Result<Option<&'static str>, BehaviorError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced { from: String, to: String },
    Stayed,
    Blocked,
    Undefined,
}

/// Label-keyed guards and transitions for objectives that progress through
/// named phases. The label lives in the unit state so it survives ticks.
pub struct StateMachine<W> {
    initial: &'static str,
    guards: BTreeMap<&'static str, Guard<W>>,
    transitions: BTreeMap<&'static str, Transition<W>>,
}

impl<W: World> StateMachine<W> {
    pub fn new(initial: &'static str) -> Self {
        Self {
            initial,
            guards: BTreeMap::new(),
            transitions: BTreeMap::new(),
        }
    }

    pub fn state(mut self, label: &'static str, guard: Guard<W>, transition: Transition<W>) -> Self {
        self.guards.insert(label, guard);
        self.transitions.insert(label, transition);
        self
    }

    pub fn guard(mut self, label: &'static str, guard: Guard<W>) -> Self {
        self.guards.insert(label, guard);
        self
    }

    pub fn transition(mut self, label: &'static str, transition: Transition<W>) -> Self {
        self.transitions.insert(label, transition);
        self
    }

    pub fn current<'u>(&self, unit: &'u UnitData) -> &'u str {
        unit.state_str(CURRENT_STATE_KEY).unwrap_or(self.initial)
    }

    /// One evaluation: guard of the current label, then its transition.
    pub fn step(
        &self,
        unit: &mut UnitData,
        agent: &mut Agent,
        ctx: &mut TickContext<'_, W>,
    ) -> Result<StepOutcome, BehaviorError> {
        let label = self.current(unit).to_string();
        if unit.state_str(CURRENT_STATE_KEY).is_none() {
            unit.set_state(CURRENT_STATE_KEY, label.clone());
        }
        let (Some(guard), Some(transition)) = (
            self.guards.get(label.as_str()),
            self.transitions.get(label.as_str()),
        ) else {
            warn!(agent = %agent.name(), state = %label, "state_machine_state_undefined");
            return Ok(StepOutcome::Undefined);
        };
        if !guard(&*agent, &*ctx) {
            return Ok(StepOutcome::Blocked);
        }
        match transition(unit, agent, ctx)? {
            Some(next) => {
                debug!(agent = %agent.name(), from = %label, to = next, "state_machine_advanced");
                unit.set_state(CURRENT_STATE_KEY, next);
                Ok(StepOutcome::Advanced {
                    from: label,
                    to: next.to_string(),
                })
            }
            None => Ok(StepOutcome::Stayed),
        }
    }
}
