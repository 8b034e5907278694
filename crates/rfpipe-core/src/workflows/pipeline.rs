use crate::core::io::af3;
use crate::core::sanitize;
use crate::engine::channel::{CommandExecutor, ShellChannel, WorkerLock};
use crate::engine::config::PipelineConfig;
use crate::engine::error::PipelineError;
use crate::engine::job::{JobLayout, UploadedFile};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::stage::{
    self, AF3_INPUT_DIR, DesignParameters, FoldBackend, GENERATION_DIR, PREDICTION_DIR, REPACK_STEP,
    SEQUENCE_DESIGN_DIR, Stage, StageOutcome, StageSpec,
};
use crate::engine::tail::truncate_front;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

/// Marker written into `output/` once every stage has passed.
pub const SENTINEL_FILE: &str = "heartbeat.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Antibody,
    Nanobody,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Antibody => write!(f, "Antibody"),
            Mode::Nanobody => write!(f, "Nanobody"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "antibody" => Ok(Mode::Antibody),
            "nanobody" => Ok(Mode::Nanobody),
            other => Err(format!("unknown mode '{other}', expected Antibody or Nanobody")),
        }
    }
}

/// Everything the transport collects for one job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_name: String,
    pub mode: Mode,
    pub fold: FoldBackend,
    /// Free-text hotspot list; `None` or blank means no hotspots.
    pub hotspots: Option<String>,
    /// Free-text design-loop list; blank omits the loop argument.
    pub design_loops: String,
    pub params: DesignParameters,
    pub framework: UploadedFile,
    pub target: UploadedFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Empty,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_name: String,
    pub mode: Mode,
    pub fold: FoldBackend,
}

/// Per-stage transport tails. The prediction tail is reported under
/// `rf2_tail` whichever backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLogs {
    pub rfdiffusion_tail: String,
    pub proteinmpnn_tail: String,
    pub rf2_tail: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLinks {
    pub job_zip: String,
    pub output_zip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    pub download: DownloadLinks,
}

impl Links {
    fn for_job(job_id: &str) -> Self {
        Self {
            download: DownloadLinks {
                job_zip: format!("/jobs/{job_id}/archive?scope=job"),
                output_zip: format!("/jobs/{job_id}/archive?scope=output"),
            },
        }
    }
}

/// Outcome of one orchestration, shaped for JSON transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub job: JobSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<StageLogs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub links: Links,
}

impl JobResult {
    pub fn is_error(&self) -> bool {
        self.status == JobStatus::Error
    }

    fn failed(job: &JobLayout, summary: JobSummary, outcome: StageOutcome, budget: usize) -> Self {
        let job_id = job.id().to_string();
        Self {
            status: JobStatus::Error,
            stage: Some(outcome.stage.name().to_string()),
            links: Links::for_job(&job_id),
            job_id,
            job: summary,
            artifacts: Vec::new(),
            logs: None,
            log_tail: Some(truncate_front(&outcome.tail, budget).to_string()),
            note: outcome.note,
        }
    }
}

/// Counts files under `output_dir`, ignoring the sentinel.
fn output_status(output_dir: &Path) -> io::Result<JobStatus> {
    let sentinel = output_dir.join(SENTINEL_FILE);
    for entry in WalkDir::new(output_dir).min_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path() != sentinel {
            return Ok(JobStatus::Ok);
        }
    }
    Ok(JobStatus::Empty)
}

/// The job orchestrator.
///
/// Holds the configuration, the execution channel and the lock that serializes
/// jobs on the shared worker. Cloning the [`WorkerLock`] into several pipelines
/// makes them share one worker slot.
pub struct Pipeline<E> {
    config: PipelineConfig,
    executor: E,
    lock: WorkerLock,
}

impl Pipeline<ShellChannel> {
    pub fn from_config(config: PipelineConfig) -> Self {
        let executor = ShellChannel::from_config(&config);
        Self::new(config, executor)
    }
}

impl<E: CommandExecutor> Pipeline<E> {
    pub fn new(config: PipelineConfig, executor: E) -> Self {
        Self {
            config,
            executor,
            lock: WorkerLock::new(),
        }
    }

    pub fn with_lock(mut self, lock: WorkerLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs one job end to end.
    ///
    /// A stage that fails its gate ends the job early with a
    /// [`JobStatus::Error`] result. `Err` is reserved for conditions that leave no
    /// meaningful result: an unavailable worker, an unwritable job tree, or a
    /// malformed request.
    #[instrument(skip_all, name = "pipeline_workflow", fields(job_name = %request.job_name))]
    pub async fn orchestrate(
        &self,
        request: JobRequest,
        reporter: &ProgressReporter<'_>,
    ) -> Result<JobResult, PipelineError> {
        if request.framework.file_name == request.target.file_name {
            return Err(PipelineError::InvalidRequest(format!(
                "framework and target uploads share the file name '{}'",
                request.framework.file_name
            )));
        }

        // === Phase 0: Job allocation ===
        let job = JobLayout::create(&self.config.jobs_root, &request.job_name)?;
        let framework = job.adopt_upload(&request.framework)?;
        let target = job.adopt_upload(&request.target)?;
        let summary = JobSummary {
            job_name: request.job_name.clone(),
            mode: request.mode,
            fold: request.fold,
        };
        info!(
            job = %job.id(),
            mode = %request.mode,
            fold = %request.fold,
            "Job allocated at {:?}",
            job.root()
        );
        reporter.report(Progress::Message(format!("Job {}", job.id())));

        let loops = sanitize::design_loops(&request.design_loops);
        let hotspots = match request.hotspots.as_deref() {
            Some(text) => sanitize::hotspots(text),
            None => "[]".to_string(),
        };

        if self.lock.is_busy() {
            info!(job = %job.id(), "Waiting for the worker to become free");
            reporter.report(Progress::Message("Waiting for worker".to_string()));
        }
        let _worker = self.lock.acquire().await?;

        let budget = self.config.transport_tail_bytes;
        let tools = &self.config.tools;
        let out = job.output_dir();

        // === Phase 1: Structure generation ===
        let generation = StageSpec::structure_generation(
            tools,
            &out,
            &target,
            &framework,
            &hotspots,
            &loops,
            &request.params,
        );
        let generated = stage::run_stage(&self.executor, &job, &generation, reporter).await?;
        if !generated.success() {
            return Ok(JobResult::failed(&job, summary, generated, budget));
        }

        let repack = stage::repack_command(&out).render();
        let repacked = self.executor.execute(&repack, &job, REPACK_STEP).await?;
        if repacked.exit_code != 0 {
            warn!(job = %job.id(), "Repacking exited with code {}", repacked.exit_code);
        }

        // === Phase 2: Sequence design ===
        let design_in = out.join(GENERATION_DIR);
        let design_out = out.join(SEQUENCE_DESIGN_DIR);
        fs::create_dir_all(&design_out).map_err(PipelineError::job_io(&design_out))?;
        let design = StageSpec::sequence_design(tools, &design_in, &design_out, &request.params);
        let designed = stage::run_stage(&self.executor, &job, &design, reporter).await?;
        if !designed.success() {
            return Ok(JobResult::failed(&job, summary, designed, budget));
        }

        // === Phase 3: Structure prediction ===
        let fold_out = out.join(PREDICTION_DIR);
        fs::create_dir_all(&fold_out).map_err(PipelineError::job_io(&fold_out))?;
        let fold_in = match request.fold {
            FoldBackend::Rf2 => design_out.clone(),
            FoldBackend::Af3 => {
                let af3_in = out.join(AF3_INPUT_DIR);
                reporter.report(Progress::Message("Preparing AlphaFold3 inputs".to_string()));
                if let Err(e) = af3::prepare_inputs(&design_out, &af3_in, tools.af3_model_seed) {
                    error!(job = %job.id(), "AlphaFold3 input preparation failed: {}", e);
                    let aborted = StageOutcome::aborted(
                        Stage::StructurePrediction(FoldBackend::Af3),
                        format!("input preparation failed: {e}"),
                    );
                    return Ok(JobResult::failed(&job, summary, aborted, budget));
                }
                af3_in
            }
        };
        let prediction = StageSpec::structure_prediction(tools, request.fold, &fold_in, &fold_out);
        let predicted = stage::run_stage(&self.executor, &job, &prediction, reporter).await?;
        if !predicted.success() {
            return Ok(JobResult::failed(&job, summary, predicted, budget));
        }

        // === Phase 4: Result ===
        let sentinel = out.join(SENTINEL_FILE);
        fs::write(&sentinel, "ok\n").map_err(PipelineError::job_io(&sentinel))?;
        let status = output_status(&out).map_err(PipelineError::job_io(&out))?;

        let job_id = job.id().to_string();
        info!(job = %job_id, ?status, "Job finished");
        Ok(JobResult {
            status,
            stage: None,
            artifacts: vec![format!("/jobs/{job_id}/archive")],
            logs: Some(StageLogs {
                rfdiffusion_tail: truncate_front(&generated.tail, budget).to_string(),
                proteinmpnn_tail: truncate_front(&designed.tail, budget).to_string(),
                rf2_tail: truncate_front(&predicted.tail, budget).to_string(),
                logs_dir: format!("/files/jobs/{job_id}/logs"),
            }),
            log_tail: None,
            note: None,
            links: Links::for_job(&job_id),
            job_id,
            job: summary,
        })
    }
}
