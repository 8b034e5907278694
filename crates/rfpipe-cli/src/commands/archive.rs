use crate::cli::ArchiveArgs;
use crate::config::builder::{WorkerOverrides, build_config};
use crate::error::{CliError, Result};
use rfpipe::workflows::archive::{self, JobArchive};
use std::path::{Path, PathBuf};
use tracing::info;

fn deliver(archive: &JobArchive, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(archive.persist_to(destination)?)
}

pub async fn run(args: ArchiveArgs) -> Result<()> {
    let config = build_config(&args.config, &WorkerOverrides::default())?;
    let jobs_root = config.jobs_root.clone();
    let job_id = args.job_id.clone();
    let scope = args.scope;

    info!("Building {} archive for job '{}'", scope, &job_id);
    let archive = tokio::task::spawn_blocking(move || {
        archive::build_archive(&jobs_root, &job_id, scope)
    })
    .await
    .map_err(|e| CliError::Other(anyhow::anyhow!("Archive task failed: {}", e)))??;

    let destination = args
        .output
        .unwrap_or_else(|| PathBuf::from(archive.file_name()));
    let bytes = deliver(&archive, &destination)?;

    info!(
        "Wrote {} archive of job '{}': {} entries ({} bytes) to {:?}",
        archive.scope(),
        archive.job_id(),
        archive.entries(),
        bytes,
        &destination
    );
    eprintln!("Archive written to {}", destination.display());
    Ok(())
}
