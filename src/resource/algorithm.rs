//! Algorithms offered by the ForestSens service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A numeric algorithm identifier, as accepted by batch creation.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct AlgorithmId(i64);

impl AlgorithmId {
    /// The raw numeric id.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for AlgorithmId {
    fn from(id: i64) -> AlgorithmId {
        AlgorithmId(id)
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// An algorithm as described by `GET /algorithms`. Read-only; sourced
/// entirely from the server.
#[derive(Clone, Debug, Deserialize)]
#[non_exhaustive]
pub struct Algorithm {
    /// The id to pass to `Client::create_batch`.
    #[serde(alias = "algorithm_id")]
    pub id: AlgorithmId,

    /// Human-readable name.
    #[serde(default, alias = "algorithm_name")]
    pub name: Option<String>,

    /// Longer description, if the server provides one.
    #[serde(default)]
    pub description: Option<String>,
}

/// Wire shape of `GET /algorithms`.
#[derive(Debug, Deserialize)]
pub(crate) struct AlgorithmList {
    #[serde(default)]
    pub(crate) algorithms: Vec<Algorithm>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_parses_either_id_spelling() {
        let list: AlgorithmList = serde_json::from_value(json!({
            "algorithms": [
                {"id": 26, "name": "Single tree detection"},
                {"algorithm_id": 31, "algorithm_name": "Canopy height model",
                 "description": "CHM from point clouds"}
            ]
        }))
        .unwrap();
        assert_eq!(list.algorithms.len(), 2);
        assert_eq!(list.algorithms[0].id, AlgorithmId::from(26));
        assert_eq!(list.algorithms[1].id.as_i64(), 31);
        assert_eq!(
            list.algorithms[1].description.as_deref(),
            Some("CHM from point clouds")
        );
    }
}
