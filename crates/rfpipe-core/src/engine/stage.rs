//! Declarative stage specs and the runner that evaluates them.
//!
//! A stage is data: the command to run, the directory its outputs land in, and the
//! pattern at least one of those outputs must match. [`run_stage`] executes the
//! command through a [`CommandExecutor`] and applies the same gate to every stage:
//! exit code zero *and* at least one matching regular file.

use super::channel::{CommandExecutor, ExecOutcome};
use super::command::{ShellCommand, quote};
use super::config::ToolchainConfig;
use super::error::PipelineError;
use super::job::JobLayout;
use super::progress::{Progress, ProgressReporter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// File name prefix of every structure-generation output.
pub const GENERATION_PREFIX: &str = "ab_des";
pub const GENERATION_DIR: &str = "rfdiffusion";
pub const SEQUENCE_DESIGN_DIR: &str = "mpnn";
pub const PREDICTION_DIR: &str = "fold";
pub const AF3_INPUT_DIR: &str = "af3_input";
/// Log name of the best-effort step that gathers structure-generation outputs.
pub const REPACK_STEP: &str = "collect_rfdiffusion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FoldBackend {
    #[default]
    #[serde(rename = "AF3")]
    Af3,
    #[serde(rename = "RF2")]
    Rf2,
}

impl FoldBackend {
    pub fn stage_name(&self) -> &'static str {
        match self {
            FoldBackend::Af3 => "af3",
            FoldBackend::Rf2 => "rf2",
        }
    }
}

impl fmt::Display for FoldBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldBackend::Af3 => write!(f, "AF3"),
            FoldBackend::Rf2 => write!(f, "RF2"),
        }
    }
}

impl FromStr for FoldBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AF3" => Ok(FoldBackend::Af3),
            "RF2" => Ok(FoldBackend::Rf2),
            other => Err(format!("unknown fold backend '{other}', expected AF3 or RF2")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    StructureGeneration,
    SequenceDesign,
    StructurePrediction(FoldBackend),
}

impl Stage {
    /// Name used for the stage's log file, progress events and failure reports.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::StructureGeneration => "rfdiffusion",
            Stage::SequenceDesign => "proteinmpnn",
            Stage::StructurePrediction(backend) => backend.stage_name(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which files in a stage's output directory count as its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPattern {
    Prefix(&'static str),
    Suffix(&'static str),
}

impl OutputPattern {
    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            OutputPattern::Prefix(prefix) => file_name.starts_with(prefix),
            OutputPattern::Suffix(suffix) => file_name.ends_with(suffix),
        }
    }

    /// Counts regular files directly inside `dir` whose names match. A missing
    /// directory counts as zero.
    pub fn count_matches(&self, dir: &Path) -> io::Result<usize> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut count = 0;
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() && self.matches(&entry.file_name().to_string_lossy()) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Numeric and boolean knobs passed through to the stage tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignParameters {
    pub rf_diffusion_designs: u32,
    pub rf_diffusion_final_step: u32,
    pub rf_diffusion_deterministic: bool,
    pub rf_diffusion_diffuser_t: u32,
    pub protein_mpnn_designs: u32,
}

impl Default for DesignParameters {
    fn default() -> Self {
        Self {
            rf_diffusion_designs: 1,
            rf_diffusion_final_step: 48,
            rf_diffusion_deterministic: false,
            rf_diffusion_diffuser_t: 50,
            protein_mpnn_designs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub stage: Stage,
    pub command: ShellCommand,
    pub output_dir: PathBuf,
    pub expect: OutputPattern,
}

impl StageSpec {
    /// RFdiffusion over the uploaded target and framework. Outputs are written
    /// with the `ab_des` prefix directly into `output_dir`.
    ///
    /// `hotspots` and `design_loops` must already be sanitized; an empty
    /// `design_loops` omits the loop argument.
    pub fn structure_generation(
        tools: &ToolchainConfig,
        output_dir: &Path,
        target: &Path,
        framework: &Path,
        hotspots: &str,
        design_loops: &str,
        params: &DesignParameters,
    ) -> Self {
        let mut command = ShellCommand::new(&tools.python)
            .path(Path::new(&tools.rfdiffusion_script))
            .option("--config-name", &tools.rfdiffusion_config_name)
            .assign_path("antibody.target_pdb", target)
            .assign_path("antibody.framework_pdb", framework)
            .assign("inference.ckpt_override_path", &tools.rfdiffusion_checkpoint)
            .assign("ppi.hotspot_res", hotspots)
            .assign("inference.num_designs", params.rf_diffusion_designs.to_string())
            .assign("inference.final_step", params.rf_diffusion_final_step.to_string())
            .assign(
                "inference.deterministic",
                params.rf_diffusion_deterministic.to_string(),
            )
            .assign("diffuser.T", params.rf_diffusion_diffuser_t.to_string())
            .assign_path("inference.output_prefix", &output_dir.join(GENERATION_PREFIX));
        if !design_loops.is_empty() {
            command = command.assign("antibody.design_loops", design_loops);
        }

        Self {
            stage: Stage::StructureGeneration,
            command,
            output_dir: output_dir.to_path_buf(),
            expect: OutputPattern::Prefix(GENERATION_PREFIX),
        }
    }

    /// ProteinMPNN over the gathered structure-generation outputs.
    pub fn sequence_design(
        tools: &ToolchainConfig,
        input_dir: &Path,
        output_dir: &Path,
        params: &DesignParameters,
    ) -> Self {
        let command = ShellCommand::new(&tools.python)
            .path(Path::new(&tools.proteinmpnn_script))
            .arg("-pdbdir")
            .path(input_dir)
            .arg("-outpdbdir")
            .path(output_dir)
            .option("-seqs_per_struct", params.protein_mpnn_designs.to_string());

        Self {
            stage: Stage::SequenceDesign,
            command,
            output_dir: output_dir.to_path_buf(),
            expect: OutputPattern::Suffix(".pdb"),
        }
    }

    /// Structure prediction with the selected backend. For AlphaFold3,
    /// `input_dir` is the directory of prepared JSON input descriptions; for
    /// RoseTTAFold2 it is the sequence-design output directory.
    pub fn structure_prediction(
        tools: &ToolchainConfig,
        backend: FoldBackend,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Self {
        let command = match backend {
            FoldBackend::Rf2 => ShellCommand::new(&tools.python)
                .path(Path::new(&tools.rf2_script))
                .assign_path("input.pdb_dir", input_dir)
                .assign_path("output.pdb_dir", output_dir)
                .assign("model.model_weights", &tools.rf2_weights),
            FoldBackend::Af3 => ShellCommand::new(&tools.python)
                .path(Path::new(&tools.af3_script))
                .assign_path("--input_dir", input_dir)
                .assign_path("--output_dir", output_dir)
                .assign("--model_dir", &tools.af3_model_dir)
                .arg("--run_inference")
                .assign("--run_data_pipeline", "false")
                .assign("--num_recycles", tools.af3_num_recycles.to_string())
                .assign("--num_seeds", tools.af3_num_seeds.to_string()),
        };

        Self {
            stage: Stage::StructurePrediction(backend),
            command,
            output_dir: output_dir.to_path_buf(),
            expect: OutputPattern::Suffix(".pdb"),
        }
    }
}

/// Moves structure-generation outputs (and the `traj` directory) from
/// `output_dir` into its `rfdiffusion/` subdirectory. Always exits zero.
pub fn repack_command(output_dir: &Path) -> ShellCommand {
    let od = quote(&output_dir.to_string_lossy());
    let target = output_dir.join(GENERATION_DIR);
    ShellCommand::new("mkdir")
        .arg("-p")
        .path(&target)
        .raw("&&")
        .raw("mv")
        .path(&output_dir.join("traj"))
        .raw(&format!("{od}/{GENERATION_PREFIX}*"))
        .path(&target)
        .raw("2>/dev/null || true")
}

/// What one stage produced, and whether it passed its gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub exit_code: i32,
    pub tail: String,
    /// Number of output files matching the stage's pattern.
    pub matched: usize,
    /// Why the stage failed; `None` on success.
    pub note: Option<String>,
}

impl StageOutcome {
    pub fn evaluate(stage: Stage, exec: ExecOutcome, matched: usize) -> Self {
        let note = if let Some(limit) = exec.timed_out {
            Some(format!("timed out after {}s", limit.as_secs_f64()))
        } else if exec.exit_code != 0 {
            Some(format!("exit code {}", exec.exit_code))
        } else if matched == 0 {
            Some(format!("expected outputs missing (found {matched})"))
        } else {
            None
        };

        Self {
            stage,
            exit_code: exec.exit_code,
            tail: exec.tail,
            matched,
            note,
        }
    }

    /// A stage that failed before its command could be issued.
    pub fn aborted(stage: Stage, note: impl Into<String>) -> Self {
        Self {
            stage,
            exit_code: -1,
            tail: String::new(),
            matched: 0,
            note: Some(note.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.note.is_none()
    }
}

/// Runs one stage and evaluates its gate.
///
/// A failed gate is a normal [`StageOutcome`]. Only conditions that make the
/// whole job impossible, such as an unavailable worker, are returned as `Err`.
pub async fn run_stage<E: CommandExecutor>(
    executor: &E,
    job: &JobLayout,
    spec: &StageSpec,
    reporter: &ProgressReporter<'_>,
) -> Result<StageOutcome, PipelineError> {
    let name = spec.stage.name();
    reporter.report(Progress::StageStart { name });

    let exec = executor.execute(&spec.command.render(), job, name).await?;
    let matched = spec
        .expect
        .count_matches(&spec.output_dir)
        .map_err(PipelineError::job_io(&spec.output_dir))?;
    let outcome = StageOutcome::evaluate(spec.stage, exec, matched);

    match &outcome.note {
        None => info!(job = %job.id(), stage = name, matched, "Stage succeeded"),
        Some(note) => warn!(job = %job.id(), stage = name, matched, "Stage failed: {}", note),
    }
    reporter.report(Progress::StageFinish {
        name,
        success: outcome.success(),
    });
    Ok(outcome)
}
