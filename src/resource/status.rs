//! The batch status vocabulary reported by the ForestSens server.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Status of a ForestSens batch.
///
/// The server vocabulary may grow over time, so anything we don't recognize
/// is passed through opaquely in `Other` instead of failing to deserialize.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum BatchStatus {
    /// The batch exists but has not been started.
    Created,
    /// The batch is being processed.
    Running,
    /// Processing finished successfully; results are available.
    Completed,
    /// Processing failed.
    Failed,
    /// A status string this client doesn't know about.
    Other(String),
}

impl BatchStatus {
    /// The status exactly as the server reported it.
    pub fn as_str(&self) -> &str {
        match self {
            BatchStatus::Created => "created",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Other(s) => s,
        }
    }

    /// Has the batch reached a status from which no further transition
    /// occurs? Unrecognized statuses count as non-terminal, so polling keeps
    /// going until the server reports something we know to be final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }

    /// Did the batch finish successfully?
    pub fn is_success(&self) -> bool {
        *self == BatchStatus::Completed
    }

    /// Did the batch fail?
    pub fn is_err(&self) -> bool {
        *self == BatchStatus::Failed
    }
}

impl Default for BatchStatus {
    fn default() -> Self {
        BatchStatus::Created
    }
}

impl FromStr for BatchStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "created" => BatchStatus::Created,
            "running" => BatchStatus::Running,
            "completed" => BatchStatus::Completed,
            "failed" => BatchStatus::Failed,
            other => BatchStatus::Other(other.to_owned()),
        })
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

impl Serialize for BatchStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BatchStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // `from_str` is infallible.
        Ok(s.parse().unwrap())
    }
}
