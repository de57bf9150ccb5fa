//! Integration tests against a real ForestSens deployment.
//!
//! These talk to whatever `FORESTSENS_URL` / `FORESTSENS_APITOKEN` point at,
//! so they're `#[ignore]`d by default. Run them with:
//!
//! ```sh
//! FORESTSENS_URL=... FORESTSENS_APITOKEN=... cargo test -- --ignored
//! ```

use anyhow::{Context, Result};
use forestsens::{Client, WaitOptions};
use std::io::Write;
use std::time::Duration;

/// Create a client using environment variables to authenticate.
fn new_client() -> Result<Client> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    std::env::var("FORESTSENS_URL").context("must specify FORESTSENS_URL")?;
    std::env::var("FORESTSENS_APITOKEN").context("must specify FORESTSENS_APITOKEN")?;
    Ok(Client::from_env()?)
}

#[tokio::test]
#[ignore]
async fn list_algorithms() -> Result<()> {
    let client = new_client()?;
    let algorithms = client.list_algorithms().await?;
    assert!(!algorithms.is_empty());
    for algorithm in &algorithms {
        println!("{}: {:?}", algorithm.id, algorithm.name);
    }
    Ok(())
}

#[tokio::test]
#[ignore]
async fn list_recent_batches() -> Result<()> {
    let client = new_client()?;
    let batches = client.list_batches(Some(5)).await?;
    assert!(batches.len() <= 5);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn full_batch_lifecycle() -> Result<()> {
    let client = new_client()?;

    let algorithms = client.list_algorithms().await?;
    let algorithm = algorithms.first().context("no algorithms available")?;

    let input = tempfile::tempdir()?;
    let mut file = std::fs::File::create(input.path().join("input.csv"))?;
    writeln!(file, "id,x,y\n1,10.0,59.0")?;

    let started = client
        .run_batch(algorithm.id, input.path(), "forestsens-rs live test")
        .await?;
    println!("started batch {} ({})", started.batch_id, started.status);

    let options = WaitOptions::default()
        .retry_interval(Duration::from_secs(10))
        .timeout(Duration::from_secs(1800));
    let batch = client.wait_for_batch(&started.batch_id, &options).await?;
    assert!(batch.status.is_success());

    let output = tempfile::tempdir()?;
    let written = client
        .download_results(&started.batch_id, output.path())
        .await?;
    for path in &written {
        println!("downloaded {}", path.display());
    }
    Ok(())
}
