use clap::{Args, Parser, Subcommand};
use rfpipe::engine::stage::FoldBackend;
use rfpipe::workflows::archive::ArchiveScope;
use rfpipe::workflows::pipeline::Mode;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "KandO Lab",
    version,
    about = "rfpipe - Runs the RFantibody design pipeline (RFdiffusion, ProteinMPNN, AF3/RF2) inside a worker container and packages its results.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one design job end to end and print its JSON result.
    Run(RunArgs),
    /// Package a finished job (or only its outputs) into a zip file.
    Archive(ArchiveArgs),
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a TOML configuration file. Defaults to the platform config directory.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory holding one subdirectory per job.
    #[arg(long, env = "JOBS_ROOT", value_name = "PATH")]
    pub jobs_root: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S worker.stage-timeout-secs=3600
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Job ---
    /// Human-readable job name; a random suffix is appended to form the job id.
    #[arg(short = 'n', long, value_name = "NAME")]
    pub job_name: String,

    /// Antibody framework structure (PDB).
    #[arg(long, value_name = "PATH")]
    pub framework: PathBuf,

    /// Target structure (PDB).
    #[arg(long, value_name = "PATH")]
    pub target: PathBuf,

    /// Design mode, recorded with the job.
    #[arg(long, default_value_t = Mode::Antibody, value_name = "MODE")]
    pub mode: Mode,

    /// Structure prediction backend: AF3 or RF2.
    #[arg(long, default_value_t = FoldBackend::Af3, value_name = "BACKEND")]
    pub fold: FoldBackend,

    /// Target hotspots, e.g. "A10-A12, B5".
    #[arg(long, value_name = "LIST")]
    pub hotspots: Option<String>,

    /// CDR loops to design, e.g. "H3:5-10, L1".
    #[arg(long, default_value = "", value_name = "LIST")]
    pub design_loops: String,

    // --- Stage Parameters ---
    /// Number of RFdiffusion designs.
    #[arg(long, default_value_t = 1, value_name = "INT")]
    pub designs: u32,

    /// RFdiffusion final step.
    #[arg(long, default_value_t = 48, value_name = "INT")]
    pub final_step: u32,

    /// Run RFdiffusion deterministically.
    #[arg(long)]
    pub deterministic: bool,

    /// RFdiffusion diffusion step count.
    #[arg(long, default_value_t = 50, value_name = "INT")]
    pub diffuser_t: u32,

    /// Sequences per structure for ProteinMPNN.
    #[arg(long, default_value_t = 1, value_name = "INT")]
    pub mpnn_designs: u32,

    // --- Worker Overrides ---
    /// Name of the running worker container.
    #[arg(long, env = "RF_WORKER_NAME", value_name = "NAME")]
    pub worker: Option<String>,

    /// Run stage commands on this host instead of inside the worker container.
    #[arg(long)]
    pub local: bool,

    /// Kill any stage command running longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    pub stage_timeout: Option<u64>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments for the `archive` subcommand.
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Identifier of the job, as reported in `jobId`.
    #[arg(required = true, value_name = "JOB_ID")]
    pub job_id: String,

    /// What to package: the whole job or only its outputs.
    #[arg(long, default_value_t = ArchiveScope::Job, value_name = "SCOPE")]
    pub scope: ArchiveScope,

    /// Destination of the zip file. Defaults to `./{job_id}_{scope}.zip`.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse_with_defaults() {
        let cli = Cli::try_parse_from([
            "rfpipe",
            "run",
            "-n",
            "abx",
            "--framework",
            "fw.pdb",
            "--target",
            "tg.pdb",
            "--hotspots",
            "A10-A12",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.job_name, "abx");
        assert_eq!(args.fold, FoldBackend::Af3);
        assert_eq!(args.mode, Mode::Antibody);
        assert_eq!(args.designs, 1);
        assert_eq!(args.final_step, 48);
        assert_eq!(args.diffuser_t, 50);
        assert!(!args.deterministic);
        assert_eq!(args.hotspots.as_deref(), Some("A10-A12"));
        assert_eq!(args.design_loops, "");
    }

    #[test]
    fn run_accepts_backend_and_mode_in_any_case() {
        let cli = Cli::try_parse_from([
            "rfpipe", "run", "-n", "x", "--framework", "a", "--target", "b", "--fold", "rf2",
            "--mode", "nanobody",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.fold, FoldBackend::Rf2);
        assert_eq!(args.mode, Mode::Nanobody);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result = Cli::try_parse_from([
            "rfpipe", "run", "-n", "x", "--framework", "a", "--target", "b", "--fold", "af2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn archive_scope_defaults_to_job() {
        let cli = Cli::try_parse_from(["rfpipe", "archive", "abx_0badc0de"]).unwrap();
        let Commands::Archive(args) = cli.command else {
            panic!("expected archive");
        };
        assert_eq!(args.job_id, "abx_0badc0de");
        assert_eq!(args.scope, ArchiveScope::Job);
        assert!(args.output.is_none());
    }

    #[test]
    fn set_values_accumulate() {
        let cli = Cli::try_parse_from([
            "rfpipe",
            "archive",
            "j",
            "-S",
            "logs.tail-bytes=20000",
            "--set",
            "worker.name=w2",
        ])
        .unwrap();
        let Commands::Archive(args) = cli.command else {
            panic!("expected archive");
        };
        assert_eq!(args.config.set_values, vec!["logs.tail-bytes=20000", "worker.name=w2"]);
    }
}
