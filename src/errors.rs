//! Declare our error types, mapping HTTP responses onto them.

use reqwest::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::result;
use thiserror::Error;
use url::Url;

use crate::resource::{BatchId, BatchStatus};

/// A custom `Result`, for convenience.
pub type Result<T, E = Error> = result::Result<T, E>;

/// A ForestSens-related error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The server rejected our API token (401 or 403).
    #[non_exhaustive]
    #[error("authentication failed for {url} ({status}: {body})")]
    Auth {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// The batch reached a terminal failure status.
    #[non_exhaustive]
    #[error("batch {batch_id} failed (status '{status}')")]
    BatchFailed {
        batch_id: BatchId,
        status: BatchStatus,
    },

    /// We could not resolve a usable client configuration.
    #[non_exhaustive]
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The server refused a state transition, typically starting a batch
    /// that is no longer in `created` status.
    #[non_exhaustive]
    #[error("conflict for {url} ({status}: {body})")]
    Conflict {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// We could not build a URL from the pieces the server gave us.
    #[non_exhaustive]
    #[error("could not parse URL from '{url}': {source}")]
    CouldNotParseUrl {
        url: String,
        source: url::ParseError,
    },

    /// We could not read a local file.
    #[non_exhaustive]
    #[error("could not read file {path:?}: {source}")]
    CouldNotReadFile { path: PathBuf, source: io::Error },

    /// We could not write a local file or directory.
    #[non_exhaustive]
    #[error("could not write {path:?}: {source}")]
    CouldNotWriteFile { path: PathBuf, source: io::Error },

    /// One or more artifacts failed to download. Artifacts not listed here
    /// were written successfully and are still on disk.
    #[non_exhaustive]
    #[error(
        "{} artifact(s) of batch {batch_id} failed to download: {}",
        failures.len(),
        list_failures(failures)
    )]
    Download {
        batch_id: BatchId,
        failures: Vec<TransferFailure>,
    },

    /// A batch name the client refuses to send.
    #[non_exhaustive]
    #[error("invalid batch name {name:?}: must be non-empty")]
    InvalidBatchName { name: String },

    /// The server knows no such resource for this token.
    #[non_exhaustive]
    #[error("not found: {url} ({body})")]
    NotFound {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// Results were requested before the batch reached terminal success.
    #[non_exhaustive]
    #[error("results for batch {batch_id} are not ready (status '{status}')")]
    NotReady {
        batch_id: BatchId,
        status: BatchStatus,
    },

    /// A step of `run_batch` failed. When `batch_id` is present, the batch
    /// was created and survives server-side; resume with `upload_files` /
    /// `start_batch` instead of creating a new one.
    #[non_exhaustive]
    #[error("could not {step}{}: {source}", resume_context(batch_id))]
    RunBatchFailed {
        batch_id: Option<BatchId>,
        step: RunBatchStep,
        source: Box<Error>,
    },

    /// We received an unexpected HTTP status code.
    #[non_exhaustive]
    #[error("{status} for {url} ({body})")]
    Service {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// The operation timed out.
    #[non_exhaustive]
    #[error("the operation timed out")]
    Timeout {},

    /// A network-level failure talking to the server or to object storage.
    #[non_exhaustive]
    #[error("error accessing '{url}': {source}")]
    Transport { url: Url, source: reqwest::Error },

    /// The server answered 2xx but the body did not parse as expected.
    #[non_exhaustive]
    #[error("could not parse response from {url}: {source} (body: {body})")]
    UnexpectedResponse {
        url: Url,
        body: String,
        source: serde_json::Error,
    },

    /// One or more files failed to upload. Files not listed here were
    /// uploaded successfully; retry only the failed subset.
    #[non_exhaustive]
    #[error("{} file(s) failed to upload: {}", failures.len(), list_failures(failures))]
    Upload { failures: Vec<TransferFailure> },

    /// The server rejected the request contents (4xx), for example an
    /// algorithm id that `list_algorithms` does not offer.
    #[non_exhaustive]
    #[error("request rejected by {url} ({status}: {body})")]
    Validation {
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// Another kind of error occurred.
    #[non_exhaustive]
    #[error("{source}")]
    Other {
        /// The original error.
        ///
        /// We add `Send + Sync` to make it easy to use in the presence of
        /// threads, and `'static` to make sure it depends on no borrowed data.
        #[from]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl Error {
    /// Map a non-2xx response onto our error taxonomy. The body is carried
    /// verbatim so server-defined error payloads stay visible.
    pub(crate) fn from_response(url: &Url, status: StatusCode, body: String) -> Error {
        let url = url.to_owned();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::Auth { url, status, body }
            }
            StatusCode::NOT_FOUND => Error::NotFound { url, status, body },
            StatusCode::CONFLICT => Error::Conflict { url, status, body },
            s if s.is_client_error() => Error::Validation { url, status, body },
            _ => Error::Service { url, status, body },
        }
    }

    /// Construct an `Error::Config` value.
    pub(crate) fn config<S: Into<String>>(message: S) -> Error {
        Error::Config {
            message: message.into(),
        }
    }

    pub(crate) fn could_not_parse_url<S: Into<String>>(
        url: S,
        source: url::ParseError,
    ) -> Error {
        Error::CouldNotParseUrl {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn could_not_read_file<P: Into<PathBuf>>(
        path: P,
        source: io::Error,
    ) -> Error {
        Error::CouldNotReadFile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn could_not_write_file<P: Into<PathBuf>>(
        path: P,
        source: io::Error,
    ) -> Error {
        Error::CouldNotWriteFile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(url: &Url, source: reqwest::Error) -> Error {
        Error::Transport {
            url: url.to_owned(),
            source,
        }
    }

    pub(crate) fn unexpected_response(
        url: &Url,
        body: &str,
        source: serde_json::Error,
    ) -> Error {
        Error::UnexpectedResponse {
            url: url.to_owned(),
            body: body.to_owned(),
            source,
        }
    }

    pub(crate) fn run_batch_failed(
        batch_id: Option<BatchId>,
        step: RunBatchStep,
        source: Error,
    ) -> Error {
        Error::RunBatchFailed {
            batch_id,
            step,
            source: Box::new(source),
        }
    }

    /// Is this error likely to be temporary?
    pub fn might_be_temporary(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            // Some HTTP status codes also tend to correspond to temporary errors.
            Error::Service { status, .. } => matches!(
                *status,
                StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            Error::RunBatchFailed { source, .. } => source.might_be_temporary(),
            Error::Upload { failures } | Error::Download { failures, .. } => {
                failures.iter().any(|f| f.source.might_be_temporary())
            }
            _ => false,
        }
    }

    /// The batch id attached to this error, if a composite operation left a
    /// usable batch behind. Resume against this id rather than re-creating.
    pub fn batch_id(&self) -> Option<&BatchId> {
        match self {
            Error::RunBatchFailed { batch_id, .. } => batch_id.as_ref(),
            Error::BatchFailed { batch_id, .. }
            | Error::Download { batch_id, .. }
            | Error::NotReady { batch_id, .. } => Some(batch_id),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Other {
            source: error.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::Other {
            source: error.into(),
        }
    }
}

/// Which step of the composite `run_batch` operation failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RunBatchStep {
    /// `create_batch` failed; nothing exists server-side.
    Create,
    /// Uploading input files failed; the created batch is still unstarted.
    Upload,
    /// `start_batch` failed; inputs are uploaded, the batch is unstarted.
    Start,
    /// Fetching the post-start status failed; the batch is running.
    Status,
}

impl fmt::Display for RunBatchStep {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunBatchStep::Create => "create batch",
            RunBatchStep::Upload => "upload input files",
            RunBatchStep::Start => "start batch",
            RunBatchStep::Status => "fetch batch status",
        };
        write!(fmt, "{}", s)
    }
}

/// A single file or artifact that failed to transfer.
#[derive(Debug, Error)]
#[error("{name}: {source}")]
pub struct TransferFailure {
    /// The object or artifact name involved.
    pub name: String,
    /// What went wrong for this file.
    pub source: Box<Error>,
}

impl TransferFailure {
    pub(crate) fn new<S: Into<String>>(name: S, source: Error) -> TransferFailure {
        TransferFailure {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

fn list_failures(failures: &[TransferFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn resume_context(batch_id: &Option<BatchId>) -> String {
    match batch_id {
        Some(id) => format!(" (batch {} survives unstarted)", id),
        None => String::new(),
    }
}
