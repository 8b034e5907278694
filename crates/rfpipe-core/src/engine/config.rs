use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TAIL_BYTES: usize = 10_000;
pub const DEFAULT_TRANSPORT_TAIL_BYTES: usize = 4_000;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {parameter}: {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// How commands reach the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    /// `docker exec` into a named, already-running container.
    Docker,
    /// Run the shell directly on this host.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub name: String,
    pub workdir: PathBuf,
    pub shell: String,
    pub launcher: Launcher,
    pub stage_timeout: Option<Duration>,
}

/// Tool locations inside the worker image and backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    pub python: String,
    pub rfdiffusion_script: String,
    pub rfdiffusion_config_name: String,
    pub rfdiffusion_checkpoint: String,
    pub proteinmpnn_script: String,
    pub rf2_script: String,
    pub rf2_weights: String,
    pub af3_script: String,
    pub af3_model_dir: String,
    pub af3_num_recycles: u32,
    pub af3_num_seeds: u32,
    pub af3_model_seed: u32,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: "poetry run python".to_string(),
            rfdiffusion_script: "/home/src/rfantibody/rfdiffusion/rfdiffusion_inference.py"
                .to_string(),
            rfdiffusion_config_name: "antibody".to_string(),
            rfdiffusion_checkpoint: "/home/weights/RFdiffusion_Ab.pt".to_string(),
            proteinmpnn_script:
                "/home/src/rfantibody/proteinmpnn/proteinmpnn_interface_design.py".to_string(),
            rf2_script: "/home/src/rfantibody/rf2/rf2_predict.py".to_string(),
            rf2_weights: "/home/weights/RF2_ab.pt".to_string(),
            af3_script: "/home/src/rfantibody/af3/run_alphafold.py".to_string(),
            af3_model_dir: "/home/weights/af3".to_string(),
            af3_num_recycles: 3,
            af3_num_seeds: 1,
            af3_model_seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub jobs_root: PathBuf,
    pub worker: WorkerConfig,
    pub tools: ToolchainConfig,
    pub tail_bytes: usize,
    pub transport_tail_bytes: usize,
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    jobs_root: Option<PathBuf>,
    worker_name: Option<String>,
    worker_workdir: Option<PathBuf>,
    shell: Option<String>,
    launcher: Option<Launcher>,
    stage_timeout: Option<Duration>,
    tools: Option<ToolchainConfig>,
    tail_bytes: Option<usize>,
    transport_tail_bytes: Option<usize>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs_root(mut self, path: PathBuf) -> Self {
        self.jobs_root = Some(path);
        self
    }
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }
    pub fn worker_workdir(mut self, path: PathBuf) -> Self {
        self.worker_workdir = Some(path);
        self
    }
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }
    pub fn launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = Some(launcher);
        self
    }
    pub fn stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }
    pub fn tools(mut self, tools: ToolchainConfig) -> Self {
        self.tools = Some(tools);
        self
    }
    pub fn tail_bytes(mut self, bytes: usize) -> Self {
        self.tail_bytes = Some(bytes);
        self
    }
    pub fn transport_tail_bytes(mut self, bytes: usize) -> Self {
        self.transport_tail_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let tail_bytes = self.tail_bytes.unwrap_or(DEFAULT_TAIL_BYTES);
        if tail_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "tail_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        let transport_tail_bytes = self
            .transport_tail_bytes
            .unwrap_or(DEFAULT_TRANSPORT_TAIL_BYTES);
        if transport_tail_bytes > tail_bytes {
            return Err(ConfigError::InvalidValue {
                parameter: "transport_tail_bytes",
                reason: format!("must not exceed tail_bytes ({tail_bytes})"),
            });
        }

        let worker = WorkerConfig {
            name: self
                .worker_name
                .ok_or(ConfigError::MissingParameter("worker_name"))?,
            workdir: self.worker_workdir.unwrap_or_else(|| PathBuf::from("/home")),
            shell: self.shell.unwrap_or_else(|| "/bin/bash".to_string()),
            launcher: self.launcher.unwrap_or(Launcher::Docker),
            stage_timeout: self.stage_timeout,
        };

        Ok(PipelineConfig {
            jobs_root: self
                .jobs_root
                .ok_or(ConfigError::MissingParameter("jobs_root"))?,
            worker,
            tools: self.tools.unwrap_or_default(),
            tail_bytes,
            transport_tail_bytes,
        })
    }
}
