use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of one executor's assignment to a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentState {
    /// Scheduled onto the executor, not yet picked up
    Assigned,
    /// The executor is running the task
    Executing,
    /// The executor finished the task
    Executed,
}

impl AssignmentState {
    /// Position in the wire enumeration
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Assigned => 0,
            Self::Executing => 1,
            Self::Executed => 2,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Assigned),
            1 => Some(Self::Executing),
            2 => Some(Self::Executed),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed)
    }

    /// Whether `next` directly follows this state
    pub fn can_advance_to(&self, next: AssignmentState) -> bool {
        matches!(
            (self, next),
            (Self::Assigned, Self::Executing) | (Self::Executing, Self::Executed)
        )
    }
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Executing => write!(f, "EXECUTING"),
            Self::Executed => write!(f, "EXECUTED"),
        }
    }
}

impl std::str::FromStr for AssignmentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSIGNED" => Ok(Self::Assigned),
            "EXECUTING" => Ok(Self::Executing),
            "EXECUTED" => Ok(Self::Executed),
            _ => Err(format!("Invalid assignment state: {s}")),
        }
    }
}
