use rfpipe::engine::config::{DEFAULT_TAIL_BYTES, DEFAULT_TRANSPORT_TAIL_BYTES};
use std::path::PathBuf;

pub struct DefaultsConfig {
    pub jobs_root: PathBuf,
    pub worker_name: String,
    pub worker_workdir: PathBuf,
    pub shell: String,
    pub stage_timeout_secs: u64,
    pub tail_bytes: usize,
    pub transport_tail_bytes: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            jobs_root: PathBuf::from("/data/jobs"),
            worker_name: "rfantibody-worker".to_string(),
            worker_workdir: PathBuf::from("/home"),
            shell: "/bin/bash".to_string(),
            stage_timeout_secs: 0,
            tail_bytes: DEFAULT_TAIL_BYTES,
            transport_tail_bytes: DEFAULT_TRANSPORT_TAIL_BYTES,
        }
    }
}
