//! Result sets of completed batches.

use serde::Deserialize;
use url::Url;

use crate::errors::Result;
use crate::storage::object_url;

/// One downloadable artifact of a batch.
#[derive(Clone, Debug, Deserialize)]
#[non_exhaustive]
pub struct ResultFile {
    /// The artifact name, also used as the local file name on download.
    /// May contain `/` separators for nested output.
    pub name: String,

    /// Size in bytes, if the server reports it.
    #[serde(default)]
    pub size: Option<u64>,
}

/// The result set of a batch: the artifacts plus the PAR URL they live
/// under, as returned by `GET /batches/{id}/results`.
///
/// An empty `result_files` list is only meaningful once the batch status is
/// terminal; before that the server may legitimately report a partial or
/// empty set.
#[derive(Clone, Debug, Deserialize)]
#[non_exhaustive]
pub struct ResultSet {
    /// Time-limited download URL prefix for the artifacts.
    pub par_url: Url,

    /// The downloadable artifacts.
    #[serde(default)]
    pub result_files: Vec<ResultFile>,
}

impl ResultSet {
    /// The download URL of one artifact: its name joined onto the PAR URL.
    pub fn file_url(&self, file: &ResultFile) -> Result<Url> {
        object_url(&self.par_url, &file.name)
    }

    /// Does this result set contain no artifacts?
    pub fn is_empty(&self) -> bool {
        self.result_files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_set() -> ResultSet {
        serde_json::from_value(json!({
            "par_url": "https://objectstorage.example/p/TOKEN/n/ns/b/bucket/o/batch-17",
            "result_files": [
                {"name": "trees.gpkg", "size": 123456},
                {"name": "tiles/chm_1.tif"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn artifact_urls_join_onto_the_par_url() {
        let results = result_set();
        let url = results.file_url(&results.result_files[0]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://objectstorage.example/p/TOKEN/n/ns/b/bucket/o/batch-17/trees.gpkg"
        );
        // Nested names keep their path structure.
        let url = results.file_url(&results.result_files[1]).unwrap();
        assert!(url.path().ends_with("/o/batch-17/tiles/chm_1.tif"));
    }

    #[test]
    fn missing_result_files_means_empty() {
        let results: ResultSet = serde_json::from_value(json!({
            "par_url": "https://objectstorage.example/p/T/o/"
        }))
        .unwrap();
        assert!(results.is_empty());
    }
}
