use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted reference to a world object. Most objects are addressed by id;
/// units that do not exist yet (a creep still spawning) are addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldRef {
    Id(ObjectId),
    Name(String),
}

impl fmt::Display for WorldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Name(name) => write!(f, "name:{name}"),
        }
    }
}

/// Read access to the external simulation the agents act on.
pub trait World {
    fn time(&self) -> u64;
    fn contains(&self, id: &ObjectId) -> bool;
    fn id_for_name(&self, name: &str) -> Option<ObjectId>;
    /// Whether the object is currently usable (present and not dead).
    fn is_viable(&self, id: &ObjectId) -> bool;

    fn resolve(&self, reference: &WorldRef) -> Option<ObjectId> {
        match reference {
            WorldRef::Id(id) => self.contains(id).then(|| id.clone()),
            WorldRef::Name(name) => self.id_for_name(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Retry,
    Failed,
}

/// Result code of a world command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResult {
    Ok,
    NotOwner,
    NoPath,
    NameExists,
    Busy,
    NotFound,
    NotEnoughResources,
    InvalidTarget,
    Full,
    NotInRange,
    InvalidArgs,
    Tired,
    NoBodypart,
    RclNotEnough,
    GclNotEnough,
}

impl CommandResult {
    const ALL: [CommandResult; 15] = [
        Self::Ok,
        Self::NotOwner,
        Self::NoPath,
        Self::NameExists,
        Self::Busy,
        Self::NotFound,
        Self::NotEnoughResources,
        Self::InvalidTarget,
        Self::Full,
        Self::NotInRange,
        Self::InvalidArgs,
        Self::Tired,
        Self::NoBodypart,
        Self::RclNotEnough,
        Self::GclNotEnough,
    ];

    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::NotOwner => -1,
            Self::NoPath => -2,
            Self::NameExists => -3,
            Self::Busy => -4,
            Self::NotFound => -5,
            Self::NotEnoughResources => -6,
            Self::InvalidTarget => -7,
            Self::Full => -8,
            Self::NotInRange => -9,
            Self::InvalidArgs => -10,
            Self::Tired => -11,
            Self::NoBodypart => -12,
            Self::RclNotEnough => -14,
            Self::GclNotEnough => -15,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|result| result.code() == code)
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotOwner => "ERR_NOT_OWNER",
            Self::NoPath => "ERR_NO_PATH",
            Self::NameExists => "ERR_NAME_EXISTS",
            Self::Busy => "ERR_BUSY",
            Self::NotFound => "ERR_NOT_FOUND",
            Self::NotEnoughResources => "ERR_NOT_ENOUGH_RESOURCES",
            Self::InvalidTarget => "ERR_INVALID_TARGET",
            Self::Full => "ERR_FULL",
            Self::NotInRange => "ERR_NOT_IN_RANGE",
            Self::InvalidArgs => "ERR_INVALID_ARGS",
            Self::Tired => "ERR_TIRED",
            Self::NoBodypart => "ERR_NO_BODYPART",
            Self::RclNotEnough => "ERR_RCL_NOT_ENOUGH",
            Self::GclNotEnough => "ERR_GCL_NOT_ENOUGH",
        }
    }

    pub fn outcome(self) -> CommandOutcome {
        match self {
            Self::Ok => CommandOutcome::Success,
            Self::NotInRange | Self::Tired | Self::Busy => CommandOutcome::Retry,
            _ => CommandOutcome::Failed,
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}

/// Logs a non-success command result with its symbolic reason.
pub fn log_command_failure(result: CommandResult, action: &str, actor: &str) {
    if result == CommandResult::Ok {
        return;
    }
    warn!(
        target: "world_command",
        code = result.code(),
        reason = result.reason(),
        action,
        actor,
        "world_command_failed"
    );
}
