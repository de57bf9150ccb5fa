//! Batches and their identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use url::Url;

use super::algorithm::AlgorithmId;
use super::status::BatchStatus;
use crate::errors::{Error, Result};

/// A server-assigned batch identifier.
///
/// The service has been observed to emit these as both JSON strings and JSON
/// numbers, so we accept either and keep the string form.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BatchId(String);

impl BatchId {
    /// Get this identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> BatchId {
        BatchId(id.to_owned())
    }
}

impl From<String> for BatchId {
    fn from(id: String) -> BatchId {
        BatchId(id)
    }
}

impl FromStr for BatchId {
    type Err = Error;

    fn from_str(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(Error::config("batch id must be non-empty"));
        }
        Ok(BatchId(id.to_owned()))
    }
}

impl fmt::Debug for BatchId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", &self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", &self.0)
    }
}

impl Serialize for BatchId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BatchId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Int(i64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => Ok(BatchId(s)),
            Raw::Int(i) => Ok(BatchId(i.to_string())),
        }
    }
}

/// A batch as reported by the server. The client only mirrors server state;
/// the sole transition it ever requests is `Client::start_batch`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Batch {
    /// The ID of this batch.
    pub batch_id: BatchId,

    /// The name given at creation.
    #[serde(default)]
    pub batch_name: Option<String>,

    /// The algorithm this batch runs.
    #[serde(default)]
    pub algorithm: Option<AlgorithmId>,

    /// Current status, verbatim from the server.
    pub status: BatchStatus,

    /// When the batch was created.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// Where a batch's input files go: a pre-authenticated request (PAR) URL
/// issued per batch, valid until `expires`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct UploadTarget {
    /// The PAR URL. Object names are appended to its path.
    #[serde(rename = "object_storage_url")]
    pub par_url: Url,

    /// When the PAR URL stops working, if the server says.
    #[serde(default, rename = "object_storage_url_expires")]
    pub expires: Option<DateTime<Utc>>,
}

/// Response to batch creation: the new batch plus its upload target.
#[derive(Clone, Debug, Deserialize)]
#[non_exhaustive]
pub struct CreatedBatch {
    /// The ID of the new batch.
    pub batch_id: BatchId,

    /// The name the server recorded.
    #[serde(default)]
    pub batch_name: Option<String>,

    /// The algorithm the batch will run.
    #[serde(default)]
    pub algorithm: Option<AlgorithmId>,

    /// Status at creation. Servers that omit it mean `created`.
    #[serde(default)]
    pub status: BatchStatus,

    /// Where to upload this batch's input files.
    #[serde(flatten)]
    pub upload_target: UploadTarget,
}

/// What `Client::run_batch` hands back once the batch is underway.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct StartedBatch {
    /// The ID to poll and fetch results with.
    pub batch_id: BatchId,

    /// Status observed right after starting.
    pub status: BatchStatus,
}

/// Wire arguments for `POST /batches`.
#[derive(Debug, Serialize)]
pub(crate) struct CreateBatchArgs {
    pub(crate) algorithm: AlgorithmId,
    pub(crate) batch_name: String,
}

/// Wire shape of `GET /batches`.
#[derive(Debug, Deserialize)]
pub(crate) struct BatchList {
    #[serde(default)]
    pub(crate) batches: Vec<Batch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_id_accepts_strings_and_numbers() {
        let s: BatchId = serde_json::from_value(json!("abc-123")).unwrap();
        assert_eq!(s.as_str(), "abc-123");
        let n: BatchId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(n.as_str(), "42");
        assert_eq!(serde_json::to_value(&n).unwrap(), json!("42"));
    }

    #[test]
    fn created_batch_parses_the_creation_response() {
        let created: CreatedBatch = serde_json::from_value(json!({
            "batch_id": 17,
            "batch_name": "Test Batch",
            "algorithm": 26,
            "status": "created",
            "object_storage_url":
                "https://objectstorage.example/p/TOKEN/n/ns/b/bucket/o/batch-17/"
        }))
        .unwrap();
        assert_eq!(created.batch_id.as_str(), "17");
        assert_eq!(created.batch_name.as_deref(), Some("Test Batch"));
        assert_eq!(created.status, BatchStatus::Created);
        assert!(created
            .upload_target
            .par_url
            .path()
            .ends_with("/o/batch-17/"));
        assert!(created.upload_target.expires.is_none());
    }

    #[test]
    fn creation_status_defaults_to_created_when_omitted() {
        let created: CreatedBatch = serde_json::from_value(json!({
            "batch_id": "b1",
            "object_storage_url": "https://objectstorage.example/p/T/o/"
        }))
        .unwrap();
        assert_eq!(created.status, BatchStatus::Created);
    }

    #[test]
    fn batch_list_tolerates_sparse_records() {
        let list: BatchList = serde_json::from_value(json!({
            "batches": [
                {"batch_id": "b2", "status": "running"},
                {"batch_id": "b1", "status": "completed", "batch_name": "older"}
            ]
        }))
        .unwrap();
        assert_eq!(list.batches.len(), 2);
        assert_eq!(list.batches[0].batch_id.as_str(), "b2");
        assert_eq!(list.batches[0].status, BatchStatus::Running);
        assert!(list.batches[0].batch_name.is_none());
    }
}
