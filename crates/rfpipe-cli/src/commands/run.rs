use crate::cli::RunArgs;
use crate::config::builder::{WorkerOverrides, build_config};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use rfpipe::engine::job::UploadedFile;
use rfpipe::engine::progress::ProgressReporter;
use rfpipe::engine::stage::DesignParameters;
use rfpipe::workflows::pipeline::{JobRequest, Pipeline};
use std::path::Path;
use tempfile::TempDir;
use tracing::{info, warn};

/// Copies a user file into `staging` the way an upload would arrive: at a
/// temporary path, with the client's file name carried alongside.
fn stage_upload(source: &Path, staging: &TempDir, slot: &str) -> Result<UploadedFile> {
    if !source.is_file() {
        return Err(CliError::Argument(format!(
            "{} structure {:?} does not exist or is not a file",
            slot, source
        )));
    }
    let original = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::Argument(format!("{} path {:?} has no file name", slot, source)))?;

    let temporary = staging.path().join(format!("{slot}.upload"));
    std::fs::copy(source, &temporary)?;
    Ok(UploadedFile::new(temporary, &original))
}

pub async fn run(args: RunArgs) -> Result<()> {
    let overrides = WorkerOverrides {
        name: args.worker.clone(),
        local: args.local,
        stage_timeout_secs: args.stage_timeout,
    };
    let pipeline = Pipeline::from_config(build_config(&args.config, &overrides)?);
    info!(
        "Using jobs root {:?} and worker '{}'",
        &pipeline.config().jobs_root,
        &pipeline.config().worker.name
    );

    let staging = tempfile::Builder::new().prefix("rfpipe-upload-").tempdir()?;
    let request = JobRequest {
        job_name: args.job_name,
        mode: args.mode,
        fold: args.fold,
        hotspots: args.hotspots,
        design_loops: args.design_loops,
        params: DesignParameters {
            rf_diffusion_designs: args.designs,
            rf_diffusion_final_step: args.final_step,
            rf_diffusion_deterministic: args.deterministic,
            rf_diffusion_diffuser_t: args.diffuser_t,
            protein_mpnn_designs: args.mpnn_designs,
        },
        framework: stage_upload(&args.framework, &staging, "framework")?,
        target: stage_upload(&args.target, &staging, "target")?,
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the pipeline workflow...");
    let result = pipeline.orchestrate(request, &reporter).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.is_error() {
        let stage = result.stage.clone().unwrap_or_default();
        warn!(
            "Job {} failed at stage '{}': {}",
            result.job_id,
            stage,
            result.note.as_deref().unwrap_or("no details")
        );
        return Err(CliError::StageFailed {
            job_id: result.job_id,
            stage,
        });
    }

    info!("Job {} finished with status {:?}", result.job_id, result.status);
    Ok(())
}
