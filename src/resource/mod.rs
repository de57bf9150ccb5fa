//! Typed records mirrored from the ForestSens API.
//!
//! These are read-only views of server state. The server remains the source
//! of truth; nothing here is cached or persisted beyond the current process.

// We re-export the main names from our resource submodules. For any other
// types, use a fully-qualified name.
pub use self::algorithm::{Algorithm, AlgorithmId};
pub use self::batch::{Batch, BatchId, CreatedBatch, StartedBatch, UploadTarget};
pub use self::result::{ResultFile, ResultSet};
pub use self::status::BatchStatus;

pub mod algorithm;
pub mod batch;
pub mod result;
pub mod status;
