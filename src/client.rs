//! A client connection to the ForestSens service.

use futures::{stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};
use url::Url;

use crate::config::Config;
use crate::errors::{Error, Result, RunBatchStep, TransferFailure};
use crate::progress::ProgressOptions;
use crate::resource::algorithm::AlgorithmList;
use crate::resource::batch::{BatchList, CreateBatchArgs};
use crate::resource::{
    Algorithm, AlgorithmId, Batch, BatchId, CreatedBatch, ResultSet, StartedBatch,
    UploadTarget,
};
use crate::storage::{ObjectStore, ParStore};
use crate::wait::{wait, WaitOptions, WaitStatus};
use crate::{try_with_permanent_failure, try_with_temporary_failure};

/// Every request authenticates with this header.
const APITOKEN_HEADER: &str = "apitoken";

/// How many file transfers the composite operations run at once. Ordering
/// between transfers is not guaranteed and nothing may depend on it.
const TRANSFER_CONCURRENCY: usize = 4;

/// How many batches `list_batches` asks for when the caller doesn't say.
const DEFAULT_LIST_LIMIT: u32 = 20;

/// A client connection to ForestSens.
///
/// The client holds only immutable credentials and connection pools, so one
/// instance can be shared freely across tasks; every operation is
/// independent.
#[derive(Clone)]
pub struct Client {
    config: Config,
    http: reqwest::Client,
    store: Arc<dyn ObjectStore>,
}

impl Client {
    /// Create a new `Client` from a resolved configuration.
    pub fn new(config: Config) -> Result<Client> {
        Ok(Client {
            config,
            http: reqwest::Client::new(),
            store: Arc::new(ParStore::new()),
        })
    }

    /// Create a new `Client` configured from the environment. See
    /// [`Config::from_env`].
    pub fn from_env() -> Result<Client> {
        Client::new(Config::from_env()?)
    }

    /// Replace the object-storage backend. Useful for tests and for storage
    /// vendors that need more than plain PAR-URL HTTP.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Client {
        self.store = store;
        self
    }

    /// Generate a URL with the specified path under the base URL.
    fn url(&self, path: &str) -> Url {
        let mut url = self.config.base_url().clone();
        let base_path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{}/{}", base_path, path.trim_start_matches('/')));
        url
    }

    /// List the algorithms available to this token.
    pub async fn list_algorithms(&self) -> Result<Vec<Algorithm>> {
        let url = self.url("algorithms");
        let list: AlgorithmList = self.get_json(&url).await?;
        Ok(list.algorithms)
    }

    /// List batches, most recent first (server-defined ordering). `limit`
    /// caps the count returned and defaults to 20.
    pub async fn list_batches(&self, limit: Option<u32>) -> Result<Vec<Batch>> {
        let mut url = self.url("batches");
        let n = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        url.query_pairs_mut().append_pair("n", &n.to_string());
        let list: BatchList = self.get_json(&url).await?;
        Ok(list.batches)
    }

    /// Create a new batch running `algorithm`, in `created` status, and get
    /// back its upload target. `algorithm` must reference a value from
    /// `list_algorithms`; the server rejects anything else.
    pub async fn create_batch(
        &self,
        algorithm: AlgorithmId,
        name: &str,
    ) -> Result<CreatedBatch> {
        if name.trim().is_empty() {
            return Err(Error::InvalidBatchName {
                name: name.to_owned(),
            });
        }
        let url = self.url("batches");
        let args = CreateBatchArgs {
            algorithm,
            batch_name: name.to_owned(),
        };
        self.post_json(&url, &args).await
    }

    /// Fetch the current state of a batch.
    pub async fn get_batch(&self, batch_id: &BatchId) -> Result<Batch> {
        let url = self.url(&format!("batches/{}", batch_id));
        self.get_json(&url).await
    }

    /// Ask the server to start a created batch.
    ///
    /// Whether re-starting a batch that is no longer in `created` status is
    /// an error or a no-op is the server's decision; a 409 surfaces as
    /// `Error::Conflict` and anything else is reported as received.
    pub async fn start_batch(&self, batch_id: &BatchId) -> Result<()> {
        let url = self.url(&format!("batches/{}", batch_id));
        debug!("POST {}", url);
        let res = self
            .http
            .post(url.clone())
            .header(APITOKEN_HEADER, self.config.apitoken())
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;
        let status = res.status();
        let body = res.text().await.map_err(|e| Error::transport(&url, e))?;
        if status.is_success() {
            debug!("batch {} started: {}", batch_id, body);
            Ok(())
        } else {
            debug!("error status: {} body: {}", status, body);
            Err(Error::from_response(&url, status, body))
        }
    }

    /// Fetch result metadata for a batch.
    ///
    /// The listing is only complete once the batch status is
    /// terminal-success; check `get_batch` before treating it as such (or
    /// use [`Client::download_results`], which does).
    pub async fn get_results(&self, batch_id: &BatchId) -> Result<ResultSet> {
        let url = self.url(&format!("batches/{}/results", batch_id));
        self.get_json(&url).await
    }

    /// Upload local files to a batch's upload target. Object names are the
    /// files' base names.
    ///
    /// Transfers run a few at a time. Failures are collected per file into
    /// `Error::Upload`, so a caller can retry exactly the failed subset;
    /// files not named there were uploaded.
    pub async fn upload_files<P: AsRef<Path>>(
        &self,
        target: &UploadTarget,
        paths: &[P],
    ) -> Result<Vec<PathBuf>> {
        let mut named = Vec::with_capacity(paths.len());
        for p in paths {
            let path = p.as_ref().to_owned();
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => {
                    return Err(Error::could_not_read_file(
                        &path,
                        io::Error::new(io::ErrorKind::InvalidInput, "not a file"),
                    ))
                }
            };
            named.push((name, path));
        }
        self.upload_named(target, named).await
    }

    /// Upload a single file, or everything under a directory, to a batch's
    /// upload target. Directory layout is preserved: object names are
    /// `/`-joined paths relative to `input_path`.
    pub async fn upload_path(
        &self,
        target: &UploadTarget,
        input_path: &Path,
    ) -> Result<Vec<PathBuf>> {
        let named = collect_input_files(input_path)?;
        self.upload_named(target, named).await
    }

    async fn upload_named(
        &self,
        target: &UploadTarget,
        files: Vec<(String, PathBuf)>,
    ) -> Result<Vec<PathBuf>> {
        info!(
            "uploading {} file(s) to {}",
            files.len(),
            target.par_url
        );
        let outcomes = stream::iter(files.into_iter().map(|(name, path)| {
            let store = self.store.clone();
            let par_url = target.par_url.clone();
            async move {
                let result = store.upload(&par_url, &name, &path).await;
                (name, path, result)
            }
        }))
        .buffer_unordered(TRANSFER_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

        let mut uploaded = Vec::new();
        let mut failures = Vec::new();
        for (name, path, result) in outcomes {
            match result {
                Ok(()) => {
                    debug!("uploaded {} as {}", path.display(), name);
                    uploaded.push(path);
                }
                Err(err) => {
                    error!("failed to upload {}: {}", name, err);
                    failures.push(TransferFailure::new(name, err));
                }
            }
        }
        if failures.is_empty() {
            Ok(uploaded)
        } else {
            Err(Error::Upload { failures })
        }
    }

    /// Download all artifacts of a batch into `output_dir`, creating it if
    /// absent, each file named per its descriptor.
    ///
    /// Refuses with `Error::NotReady` until the batch reports terminal
    /// success (`Error::BatchFailed` if it failed). One artifact failing,
    /// remotely or on the local write, does not abort the others; the
    /// failures come back collected in `Error::Download`, and everything
    /// else stays on disk.
    pub async fn download_results(
        &self,
        batch_id: &BatchId,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let batch = self.get_batch(batch_id).await?;
        if batch.status.is_err() {
            return Err(Error::BatchFailed {
                batch_id: batch_id.clone(),
                status: batch.status,
            });
        }
        if !batch.status.is_success() {
            return Err(Error::NotReady {
                batch_id: batch_id.clone(),
                status: batch.status,
            });
        }

        let results = self.get_results(batch_id).await?;
        fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::could_not_write_file(output_dir, e))?;

        info!(
            "downloading {} artifact(s) for batch {}",
            results.result_files.len(),
            batch_id
        );
        let outcomes = stream::iter(results.result_files.iter().map(|file| {
            let results = &results;
            async move {
                let result = self.download_artifact(results, file, output_dir).await;
                (file.name.clone(), result)
            }
        }))
        .buffer_unordered(TRANSFER_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

        let mut written = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in outcomes {
            match result {
                Ok(path) => written.push(path),
                Err(err) => {
                    error!("failed to download {}: {}", name, err);
                    failures.push(TransferFailure::new(name, err));
                }
            }
        }
        if failures.is_empty() {
            Ok(written)
        } else {
            Err(Error::Download {
                batch_id: batch_id.clone(),
                failures,
            })
        }
    }

    async fn download_artifact(
        &self,
        results: &ResultSet,
        file: &crate::resource::ResultFile,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let url = results.file_url(file)?;
        let local = artifact_path(output_dir, &file.name)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::could_not_write_file(parent, e))?;
        }
        let mut body = self.store.download(&url).await?;
        let mut out = fs::File::create(&local)
            .await
            .map_err(|e| Error::could_not_write_file(&local, e))?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            out.write_all(&chunk)
                .await
                .map_err(|e| Error::could_not_write_file(&local, e))?;
        }
        out.flush()
            .await
            .map_err(|e| Error::could_not_write_file(&local, e))?;
        debug!("saved {}", local.display());
        Ok(local)
    }

    /// Create a batch, upload everything under `input_path` (a file or a
    /// directory), and start it.
    ///
    /// All uploads complete before `start_batch` is issued; if any upload
    /// fails, the batch is never started. There is no server-side
    /// atomicity: once creation succeeds, any later failure is wrapped in
    /// `Error::RunBatchFailed` carrying the batch id, so the caller can
    /// finish the workflow manually instead of re-creating the batch.
    pub async fn run_batch(
        &self,
        algorithm: AlgorithmId,
        input_path: &Path,
        name: &str,
    ) -> Result<StartedBatch> {
        info!("creating batch {:?} with algorithm {}", name, algorithm);
        let created = self
            .create_batch(algorithm, name)
            .await
            .map_err(|e| Error::run_batch_failed(None, RunBatchStep::Create, e))?;
        let batch_id = created.batch_id.clone();

        info!("uploading input from {}", input_path.display());
        self.upload_path(&created.upload_target, input_path)
            .await
            .map_err(|e| {
                Error::run_batch_failed(
                    Some(batch_id.clone()),
                    RunBatchStep::Upload,
                    e,
                )
            })?;

        info!("starting batch {}", batch_id);
        self.start_batch(&batch_id).await.map_err(|e| {
            Error::run_batch_failed(Some(batch_id.clone()), RunBatchStep::Start, e)
        })?;

        let batch = self.get_batch(&batch_id).await.map_err(|e| {
            Error::run_batch_failed(Some(batch_id.clone()), RunBatchStep::Status, e)
        })?;
        Ok(StartedBatch {
            batch_id,
            status: batch.status,
        })
    }

    /// Poll a batch at a fixed interval until it reaches terminal success,
    /// honoring the timeout in `options`. On expiry this returns
    /// `Error::Timeout` without touching the server-side batch; dropping the
    /// future cancels the poll.
    pub async fn wait_for_batch(
        &self,
        batch_id: &BatchId,
        options: &WaitOptions,
    ) -> Result<Batch> {
        let mut progress_options = ProgressOptions::default();
        self.wait_for_batch_opt(batch_id, options, &mut progress_options)
            .await
    }

    /// Poll a batch until terminal, reporting every observed `Batch` to the
    /// progress callback.
    pub async fn wait_for_batch_opt<'a, 'b>(
        &self,
        batch_id: &'a BatchId,
        options: &'a WaitOptions,
        progress_options: &'a mut ProgressOptions<'b, Batch>,
    ) -> Result<Batch> {
        debug!("waiting for batch {}", batch_id);

        // The callback is `&mut` state that can't escape an `FnMut` closure
        // into the futures it returns, so we hand it around behind a lock.
        let progress_options = Arc::new(Mutex::new(progress_options));

        wait(options, || {
            let progress_options = progress_options.clone();
            async move {
                let batch = try_with_temporary_failure!(self.get_batch(batch_id).await);
                try_with_permanent_failure!(report_progress(&progress_options, &batch));
                if batch.status.is_success() {
                    WaitStatus::Finished(batch)
                } else if batch.status.is_err() {
                    WaitStatus::FailedPermanently(Error::BatchFailed {
                        batch_id: batch_id.clone(),
                        status: batch.status,
                    })
                } else {
                    WaitStatus::Waiting
                }
            }
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        debug!("GET {}", url);
        let res = self
            .http
            .get(url.clone())
            .header(APITOKEN_HEADER, self.config.apitoken())
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;
        self.handle_response(url, res).await
    }

    async fn post_json<B, T>(&self, url: &Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {} {:?}", url, serde_json::to_string(body));
        let res = self
            .http
            .post(url.clone())
            .header(APITOKEN_HEADER, self.config.apitoken())
            .json(body)
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;
        self.handle_response(url, res).await
    }

    /// Handle a response from the server, deserializing it as the
    /// appropriate type.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        url: &Url,
        res: reqwest::Response,
    ) -> Result<T> {
        let status = res.status();
        let body = res.text().await.map_err(|e| Error::transport(url, e))?;
        if status.is_success() {
            debug!("success body: {}", body);
            serde_json::from_str(&body).map_err(|e| Error::unexpected_response(url, &body, e))
        } else {
            debug!("error status: {} body: {}", status, body);
            Err(Error::from_response(url, status, body))
        }
    }
}

/// Report one observed `Batch` to the progress callback, if there is one.
/// A callback that panicked on an earlier poll poisons the lock; later polls
/// keep reporting rather than compounding the panic.
fn report_progress(
    progress: &Mutex<&mut ProgressOptions<'_, Batch>>,
    batch: &Batch,
) -> Result<()> {
    let mut guard = progress.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(ref mut callback) = guard.callback {
        callback(batch)?;
    }
    Ok(())
}

/// Collect `(object_name, local_path)` pairs for a file or directory input.
fn collect_input_files(input: &Path) -> Result<Vec<(String, PathBuf)>> {
    if input.is_dir() {
        let mut out = Vec::new();
        walk_dir(input, input, &mut out)?;
        Ok(out)
    } else if input.is_file() {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::could_not_read_file(
                    input,
                    io::Error::new(io::ErrorKind::InvalidInput, "not a file"),
                )
            })?;
        Ok(vec![(name, input.to_owned())])
    } else {
        Err(Error::could_not_read_file(
            input,
            io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
        ))
    }
}

fn walk_dir(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| Error::could_not_read_file(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::could_not_read_file(dir, e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| Error::could_not_read_file(&path, e))?;
        // Recurse only into real directories. A symlinked directory is
        // skipped rather than followed, so a cycle can't loop the walk.
        if file_type.is_dir() {
            walk_dir(root, &path, out)?;
        } else if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((name, path.to_owned()));
        }
    }
    Ok(())
}

/// Local path for an artifact. Artifact names are server-supplied; they may
/// nest, but must not escape the output directory.
fn artifact_path(output_dir: &Path, name: &str) -> Result<PathBuf> {
    let rel = Path::new(name);
    let suspicious = name.is_empty()
        || rel.is_absolute()
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if suspicious {
        return Err(Error::could_not_write_file(
            name,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "artifact name escapes the output directory",
            ),
        ));
    }
    Ok(output_dir.join(rel))
}
