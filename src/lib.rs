//! An unofficial Rust client for the ForestSens batch-processing API.
//!
//! ForestSens runs forest-inventory algorithms over remote-sensing data. The
//! workflow is always the same: create a batch, upload its input files to
//! the object-storage URL the server hands out, start the batch, poll until
//! it finishes, then download the result artifacts. This crate wraps each of
//! those steps and also offers them as one composite operation:
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use forestsens::{Client, Config, WaitOptions};
//! use forestsens::resource::AlgorithmId;
//!
//! # async fn example() -> forestsens::Result<()> {
//! let config = Config::new("https://forestsens.example/api/", "my-token")?;
//! let client = Client::new(config)?;
//!
//! let started = client
//!     .run_batch(AlgorithmId::from(26), Path::new("./plots"), "May survey")
//!     .await?;
//!
//! let options = WaitOptions::default().timeout(Duration::from_secs(3600));
//! client.wait_for_batch(&started.batch_id, &options).await?;
//!
//! client
//!     .download_results(&started.batch_id, Path::new("./results"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! If `run_batch` fails after the batch was created, the error carries the
//! batch id ([`Error::batch_id`]), so you can resume with the step-level
//! operations instead of creating a duplicate batch.

#![warn(missing_docs)]

pub use crate::client::Client;
pub use crate::config::Config;
pub use crate::errors::*;
pub use crate::progress::{ProgressCallback, ProgressOptions};
pub use crate::wait::WaitOptions;

mod client;
mod config;
mod errors;
mod progress;
pub mod resource;
pub mod storage;
pub mod wait;
