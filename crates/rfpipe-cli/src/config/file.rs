use crate::error::{CliError, Result};
use directories::ProjectDirs;
use rfpipe::engine::config::{Launcher, ToolchainConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileLauncher {
    Docker,
    Local,
}

impl From<FileLauncher> for Launcher {
    fn from(l: FileLauncher) -> Self {
        match l {
            FileLauncher::Docker => Launcher::Docker,
            FileLauncher::Local => Launcher::Local,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileWorkerConfig {
    pub name: Option<String>,
    pub workdir: Option<PathBuf>,
    pub shell: Option<String>,
    pub launcher: Option<FileLauncher>,
    pub stage_timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileLogsConfig {
    pub tail_bytes: Option<usize>,
    pub transport_tail_bytes: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileToolsConfig {
    pub python: Option<String>,
    pub rfdiffusion_script: Option<String>,
    pub rfdiffusion_config_name: Option<String>,
    pub rfdiffusion_checkpoint: Option<String>,
    pub proteinmpnn_script: Option<String>,
    pub rf2_script: Option<String>,
    pub rf2_weights: Option<String>,
    pub af3_script: Option<String>,
    pub af3_model_dir: Option<String>,
    pub af3_num_recycles: Option<u32>,
    pub af3_num_seeds: Option<u32>,
    pub af3_model_seed: Option<u32>,
}

impl FileToolsConfig {
    /// Overlays every value present in the file onto `base`.
    pub fn merge_into(self, mut base: ToolchainConfig) -> ToolchainConfig {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        set(&mut base.python, self.python);
        set(&mut base.rfdiffusion_script, self.rfdiffusion_script);
        set(&mut base.rfdiffusion_config_name, self.rfdiffusion_config_name);
        set(&mut base.rfdiffusion_checkpoint, self.rfdiffusion_checkpoint);
        set(&mut base.proteinmpnn_script, self.proteinmpnn_script);
        set(&mut base.rf2_script, self.rf2_script);
        set(&mut base.rf2_weights, self.rf2_weights);
        set(&mut base.af3_script, self.af3_script);
        set(&mut base.af3_model_dir, self.af3_model_dir);
        set(&mut base.af3_num_recycles, self.af3_num_recycles);
        set(&mut base.af3_num_seeds, self.af3_num_seeds);
        set(&mut base.af3_model_seed, self.af3_model_seed);
        base
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub jobs_root: Option<PathBuf>,
    pub worker: Option<FileWorkerConfig>,
    pub logs: Option<FileLogsConfig>,
    pub tools: Option<FileToolsConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// `config.toml` in the platform configuration directory, if one exists.
    pub fn default_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("bio", "kando", "rfpipe")?;
        let path = dirs.config_dir().join(CONFIG_FILE_NAME);
        path.is_file().then_some(path)
    }

    /// Reads `explicit` if given, otherwise the platform default file, otherwise
    /// an empty configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) => Self::from_file(&path),
                None => {
                    debug!("No configuration file found, using built-in defaults.");
                    Ok(Self::default())
                }
            },
        }
    }
}
