use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NyxError;

/// Type tag of the Nyx checker in persisted checker maps.
pub const NYX_CHECKER_TYPE: &str = "NyxTriggerChecker";

/// Identity assigned to a trigger by the Nyx service.
///
/// `-1` is reserved to mean "not registered"; see [`TriggerId::UNREGISTERED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(i64);

impl TriggerId {
    pub const UNREGISTERED: TriggerId = TriggerId(-1);

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub const fn is_registered(self) -> bool {
        self.0 != Self::UNREGISTERED.0
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::UNREGISTERED
    }
}

impl From<i64> for TriggerId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TriggerId {
    type Err = NyxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(TriggerId)
            .map_err(|e| NyxError::Serialization(format!("invalid trigger id '{s}': {e}")))
    }
}

/// Lifecycle state of a checker, derived from its trigger id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerState {
    Unregistered,
    Registered(TriggerId),
}

impl From<TriggerId> for TriggerState {
    fn from(id: TriggerId) -> Self {
        if id.is_registered() {
            TriggerState::Registered(id)
        } else {
            TriggerState::Unregistered
        }
    }
}
