use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::{MemoryTree, StoreError, LOGGING_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" | "fatal" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Operator-controlled log scopes persisted under `logging`. Scopes are
/// tracing targets such as `kernel::agents` or `world_command`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogSettings {
    scopes: BTreeMap<String, LogLevel>,
}

impl LogSettings {
    pub fn load(tree: &MemoryTree) -> Result<Self, StoreError> {
        Ok(tree.read(LOGGING_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, tree: &mut MemoryTree) -> Result<(), StoreError> {
        tree.write(LOGGING_KEY, self)
    }

    pub fn enable(&mut self, scope: &str, level: LogLevel) {
        self.scopes.insert(scope.to_string(), level);
    }

    pub fn disable(&mut self, scope: &str) {
        self.scopes.insert(scope.to_string(), LogLevel::Off);
    }

    pub fn forget(&mut self, scope: &str) -> bool {
        self.scopes.remove(scope).is_some()
    }

    pub fn scopes(&self) -> impl Iterator<Item = (&str, LogLevel)> + '_ {
        self.scopes
            .iter()
            .map(|(scope, level)| (scope.as_str(), *level))
    }

    /// Filter directives in `EnvFilter` syntax, appended to `base`.
    pub fn directives(&self, base: &str) -> String {
        let mut parts = Vec::new();
        if !base.trim().is_empty() {
            parts.push(base.trim().to_string());
        }
        parts.extend(
            self.scopes
                .iter()
                .map(|(scope, level)| format!("{scope}={level}")),
        );
        parts.join(",")
    }
}
