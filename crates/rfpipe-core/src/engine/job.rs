//! Job identities and their on-disk layout.
//!
//! ```text
//! {jobs_root}/{job_id}/
//!     input/      uploaded structures, under their original basenames
//!     output/     per-stage output directories and the completion sentinel
//!     logs/       one append-only log file per stage
//! ```

use super::error::PipelineError;
use rand::Rng;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const INPUT_DIR: &str = "input";
pub const OUTPUT_DIR: &str = "output";
pub const LOGS_DIR: &str = "logs";

const SUFFIX_HEX_DIGITS: usize = 8;
const MAX_CREATE_ATTEMPTS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid job identifier: '{0}'")]
pub struct InvalidJobId(pub String);

/// Makes a human-supplied job name safe to use as a directory name.
pub fn sanitize_job_name(name: &str) -> String {
    let mut safe: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let leading_dots = safe.chars().take_while(|&c| c == '.').count();
    safe.replace_range(..leading_dots, &"_".repeat(leading_dots));
    if safe.is_empty() {
        safe.push_str("job");
    }
    safe
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// `{sanitized_name}_{8 random hex digits}`.
    pub fn generate(job_name: &str) -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..=u32::MAX);
        Self(format!(
            "{}_{:0width$x}",
            sanitize_job_name(job_name),
            suffix,
            width = SUFFIX_HEX_DIGITS
        ))
    }

    /// Validates an identifier received from outside, without touching the
    /// filesystem. Anything other than a single plain path component is rejected.
    pub fn parse(raw: &str) -> Result<Self, InvalidJobId> {
        let invalid = || InvalidJobId(raw.to_string());
        if raw.is_empty() || raw.contains(['/', '\\', '\0']) {
            return Err(invalid());
        }
        let mut components = Path::new(raw).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(Self(raw.to_string())),
            _ => Err(invalid()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structure file already materialized by the transport at a temporary path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub file_name: String,
}

impl UploadedFile {
    /// `original_name` is the client-side name; only its last path component is
    /// kept.
    pub fn new(path: impl Into<PathBuf>, original_name: &str) -> Self {
        let path = path.into();
        let base = original_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();
        let file_name = match base {
            "" | "." | ".." => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string()),
            name => name.to_string(),
        };
        Self { path, file_name }
    }
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                "rename {:?} -> {:?} failed ({}), falling back to copy",
                from, to, rename_err
            );
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Directory tree of one job. Paths are derived, never stored separately.
#[derive(Debug, Clone)]
pub struct JobLayout {
    id: JobId,
    root: PathBuf,
}

impl JobLayout {
    /// Allocates a fresh identity under `jobs_root` and creates `input/` and
    /// `output/`. The job directory itself is created exclusively, so an existing
    /// directory is never reused.
    pub fn create(jobs_root: &Path, job_name: &str) -> Result<Self, PipelineError> {
        fs::create_dir_all(jobs_root).map_err(PipelineError::job_io(jobs_root))?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = JobId::generate(job_name);
            let root = jobs_root.join(id.as_str());
            match fs::create_dir(&root) {
                Ok(()) => {
                    let layout = Self { id, root };
                    for dir in [layout.input_dir(), layout.output_dir()] {
                        fs::create_dir_all(&dir).map_err(PipelineError::job_io(&dir))?;
                    }
                    info!("Created job directory {:?}", layout.root());
                    return Ok(layout);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("Job directory {:?} already exists, drawing a new suffix", root);
                }
                Err(e) => return Err(PipelineError::job_io(&root)(e)),
            }
        }

        Err(PipelineError::InvalidRequest(format!(
            "could not allocate a unique job directory for '{job_name}'"
        )))
    }

    /// Layout of an existing job. Performs no filesystem access.
    pub fn open(jobs_root: &Path, id: JobId) -> Self {
        let root = jobs_root.join(id.as_str());
        Self { id, root }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join(INPUT_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn log_file(&self, stage: &str) -> PathBuf {
        self.logs_dir().join(format!("{stage}.log"))
    }

    /// Moves an uploaded file into `input/` under its original basename. The
    /// temporary source no longer exists afterwards.
    pub fn adopt_upload(&self, upload: &UploadedFile) -> Result<PathBuf, PipelineError> {
        let target = self.input_dir().join(&upload.file_name);
        move_file(&upload.path, &target).map_err(PipelineError::job_io(&upload.path))?;
        debug!("Moved upload {:?} to {:?}", &upload.path, &target);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use tempfile::tempdir;

    #[test]
    fn generated_ids_have_name_and_hex_suffix() {
        let id = JobId::generate("abx");
        let pattern = Regex::new(r"^abx_[0-9a-f]{8}$").unwrap();
        assert!(pattern.is_match(id.as_str()), "unexpected id {}", id);
    }

    #[test]
    fn same_name_yields_distinct_ids() {
        let ids: std::collections::HashSet<_> = (0..64).map(|_| JobId::generate("dup")).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn sanitize_job_name_replaces_unsafe_characters() {
        assert_eq!(sanitize_job_name("my job/../x"), "my_job_.._x");
        assert_eq!(sanitize_job_name("..hidden"), "__hidden");
        assert_eq!(sanitize_job_name("  "), "job");
        assert_eq!(sanitize_job_name("anti-HER2.v1"), "anti-HER2.v1");
    }

    #[test]
    fn parse_accepts_plain_identifiers() {
        assert_eq!(JobId::parse("abx_0123abcd").unwrap().as_str(), "abx_0123abcd");
    }

    #[test]
    fn parse_rejects_traversal_and_separators() {
        for raw in ["", ".", "..", "../etc", "a/../../b", "a/b", "..\\x", "/abs", "a\0b"] {
            assert_eq!(
                JobId::parse(raw),
                Err(InvalidJobId(raw.to_string())),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn create_builds_input_and_output_dirs() {
        let root = tempdir().unwrap();
        let layout = JobLayout::create(root.path(), "abx").unwrap();

        assert!(layout.root().starts_with(root.path()));
        assert!(layout.input_dir().is_dir());
        assert!(layout.output_dir().is_dir());
        assert_eq!(layout.log_file("rfdiffusion"), layout.root().join("logs/rfdiffusion.log"));
    }

    #[test]
    fn create_twice_with_same_name_never_collides() {
        let root = tempdir().unwrap();
        let a = JobLayout::create(root.path(), "same").unwrap();
        let b = JobLayout::create(root.path(), "same").unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn uploaded_file_keeps_only_the_basename() {
        let upload = UploadedFile::new("/tmp/tmp123", "../../etc/framework.pdb");
        assert_eq!(upload.file_name, "framework.pdb");

        let upload = UploadedFile::new("/tmp/tmp123", "C:\\models\\target.pdb");
        assert_eq!(upload.file_name, "target.pdb");

        let upload = UploadedFile::new("/tmp/tmp123", "..");
        assert_eq!(upload.file_name, "tmp123");
    }

    #[test]
    fn adopt_upload_moves_the_file() {
        let root = tempdir().unwrap();
        let staging = tempdir().unwrap();
        let tmp_path = staging.path().join("tmp_upload");
        fs::write(&tmp_path, "ATOM").unwrap();

        let layout = JobLayout::create(root.path(), "abx").unwrap();
        let placed = layout
            .adopt_upload(&UploadedFile::new(&tmp_path, "framework.pdb"))
            .unwrap();

        assert_eq!(placed, layout.input_dir().join("framework.pdb"));
        assert_eq!(fs::read_to_string(&placed).unwrap(), "ATOM");
        assert!(!tmp_path.exists());
    }
}
