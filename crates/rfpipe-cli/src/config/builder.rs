use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileLauncher};
use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};
use rfpipe::engine::config::{Launcher, PipelineConfig, PipelineConfigBuilder, ToolchainConfig};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Worker settings given directly on the command line (or via environment).
#[derive(Debug, Default, Clone)]
pub struct WorkerOverrides {
    pub name: Option<String>,
    pub local: bool,
    pub stage_timeout_secs: Option<u64>,
}

pub fn build_config(args: &ConfigArgs, overrides: &WorkerOverrides) -> Result<PipelineConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = FileConfig::load(args.config.as_deref())?;
    let file_config = apply_set_values(file_config, &args.set_values)?;

    let worker_file = file_config.worker.unwrap_or_default();
    let logs_file = file_config.logs.unwrap_or_default();
    let tools = file_config
        .tools
        .unwrap_or_default()
        .merge_into(ToolchainConfig::default());

    let jobs_root = args
        .jobs_root
        .clone()
        .or(file_config.jobs_root)
        .unwrap_or(defaults.jobs_root);
    let worker_name = overrides
        .name
        .clone()
        .or(worker_file.name)
        .unwrap_or(defaults.worker_name);
    let launcher = if overrides.local {
        Launcher::Local
    } else {
        worker_file
            .launcher
            .map(Into::into)
            .unwrap_or(Launcher::Docker)
    };
    let timeout_secs = overrides
        .stage_timeout_secs
        .or(worker_file.stage_timeout_secs)
        .unwrap_or(defaults.stage_timeout_secs);
    let stage_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

    debug!(
        "Resolved jobs root {:?}, worker '{}' ({:?})",
        &jobs_root, &worker_name, launcher
    );

    let config = PipelineConfigBuilder::new()
        .jobs_root(jobs_root)
        .worker_name(worker_name)
        .worker_workdir(worker_file.workdir.unwrap_or(defaults.worker_workdir))
        .shell(worker_file.shell.unwrap_or(defaults.shell))
        .launcher(launcher)
        .stage_timeout(stage_timeout)
        .tools(tools)
        .tail_bytes(logs_file.tail_bytes.unwrap_or(defaults.tail_bytes))
        .transport_tail_bytes(
            logs_file
                .transport_tail_bytes
                .unwrap_or(defaults.transport_tail_bytes),
        )
        .build()?;

    Ok(config)
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value))
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        if key == "jobs-root" {
            config.jobs_root = Some(value_str.into());
            continue;
        }

        if let Some(worker_key) = key.strip_prefix("worker.") {
            let worker = config.worker.get_or_insert_with(Default::default);
            match worker_key {
                "name" => worker.name = Some(value_str.to_string()),
                "workdir" => worker.workdir = Some(value_str.into()),
                "shell" => worker.shell = Some(value_str.to_string()),
                "launcher" => {
                    worker.launcher = Some(match value_str.trim() {
                        "docker" => FileLauncher::Docker,
                        "local" => FileLauncher::Local,
                        other => {
                            return Err(CliError::Config(format!(
                                "Invalid launcher for {}: {} (expected docker or local)",
                                key, other
                            )));
                        }
                    })
                }
                "stage-timeout-secs" => {
                    worker.stage_timeout_secs = Some(parse_value(key, value_str, "integer")?)
                }
                _ => return Err(unsupported(key)),
            }
            continue;
        }

        if let Some(logs_key) = key.strip_prefix("logs.") {
            let logs = config.logs.get_or_insert_with(Default::default);
            match logs_key {
                "tail-bytes" => logs.tail_bytes = Some(parse_value(key, value_str, "integer")?),
                "transport-tail-bytes" => {
                    logs.transport_tail_bytes = Some(parse_value(key, value_str, "integer")?)
                }
                _ => return Err(unsupported(key)),
            }
            continue;
        }

        if let Some(tools_key) = key.strip_prefix("tools.") {
            let tools = config.tools.get_or_insert_with(Default::default);
            let text = Some(value_str.to_string());
            match tools_key {
                "python" => tools.python = text,
                "rfdiffusion-script" => tools.rfdiffusion_script = text,
                "rfdiffusion-config-name" => tools.rfdiffusion_config_name = text,
                "rfdiffusion-checkpoint" => tools.rfdiffusion_checkpoint = text,
                "proteinmpnn-script" => tools.proteinmpnn_script = text,
                "rf2-script" => tools.rf2_script = text,
                "rf2-weights" => tools.rf2_weights = text,
                "af3-script" => tools.af3_script = text,
                "af3-model-dir" => tools.af3_model_dir = text,
                "af3-num-recycles" => {
                    tools.af3_num_recycles = Some(parse_value(key, value_str, "integer")?)
                }
                "af3-num-seeds" => tools.af3_num_seeds = Some(parse_value(key, value_str, "integer")?),
                "af3-model-seed" => {
                    tools.af3_model_seed = Some(parse_value(key, value_str, "integer")?)
                }
                _ => return Err(unsupported(key)),
            }
            continue;
        }

        return Err(unsupported(key));
    }
    Ok(config)
}

fn unsupported(key: &str) -> CliError {
    CliError::Config(format!(
        "Unsupported configuration key for --set: '{}'",
        key
    ))
}
