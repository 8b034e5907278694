//! Zip packaging of job trees.
//!
//! An archive of the `job` scope contains the whole job directory; the `output`
//! scope contains only `output/`, but entry names stay relative to the job root so
//! both kinds unpack into the same layout.

use crate::engine::job::{InvalidJobId, JobId, JobLayout};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveScope {
    #[default]
    Job,
    Output,
}

impl ArchiveScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveScope::Job => "job",
            ArchiveScope::Output => "output",
        }
    }
}

impl fmt::Display for ArchiveScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "job" => Ok(ArchiveScope::Job),
            "output" => Ok(ArchiveScope::Output),
            other => Err(format!("unknown archive scope '{other}', expected job or output")),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    InvalidJobId(#[from] InvalidJobId),

    #[error("No {scope} directory found for job '{job_id}'")]
    NotFound { job_id: String, scope: ArchiveScope },

    #[error("Nothing to archive in the {scope} scope of job '{job_id}'")]
    Empty { job_id: String, scope: ArchiveScope },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to walk job directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to write zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl ArchiveError {
    /// HTTP status a transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ArchiveError::InvalidJobId(_) => 400,
            ArchiveError::NotFound { .. } | ArchiveError::Empty { .. } => 404,
            _ => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// A finished zip file inside its own temporary directory.
///
/// The directory, and the zip with it, is removed when the value is dropped, so
/// deliver the file (or [`persist_to`](Self::persist_to) a permanent location)
/// before letting it go.
#[derive(Debug)]
pub struct JobArchive {
    _dir: TempDir,
    path: PathBuf,
    job_id: JobId,
    scope: ArchiveScope,
    entries: usize,
}

impl JobArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Suggested download name, `{job_id}_{scope}.zip`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.zip", self.job_id, self.scope)
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn scope(&self) -> ArchiveScope {
        self.scope
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Copies the zip to `dest` and returns the number of bytes written.
    pub fn persist_to(&self, dest: &Path) -> io::Result<u64> {
        std::fs::copy(&self.path, dest)
    }
}

fn entry_name(job_root: &Path, file: &Path) -> io::Result<String> {
    let relative = file.strip_prefix(job_root).map_err(|_| {
        io::Error::other(format!(
            "{:?} is not inside job directory {:?}",
            file, job_root
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

/// Regular files under `base`, depth-first in name order. Symbolic links are not
/// followed and not included.
fn collect_files(base: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(base).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Builds a zip of one job's `scope` in a fresh temporary directory.
///
/// `job_id` is validated lexically before any filesystem access; anything that
/// is not a single plain path component is rejected as [`ArchiveError::InvalidJobId`].
#[instrument(skip(jobs_root), name = "archive_workflow")]
pub fn build_archive(
    jobs_root: &Path,
    job_id: &str,
    scope: ArchiveScope,
) -> Result<JobArchive, ArchiveError> {
    let id = JobId::parse(job_id)?;
    let job = JobLayout::open(jobs_root, id);

    let base = match scope {
        ArchiveScope::Job => job.root().to_path_buf(),
        ArchiveScope::Output => job.output_dir(),
    };
    if !base.is_dir() {
        return Err(ArchiveError::NotFound {
            job_id: job_id.to_string(),
            scope,
        });
    }

    let files = collect_files(&base)?;
    if files.is_empty() {
        return Err(ArchiveError::Empty {
            job_id: job_id.to_string(),
            scope,
        });
    }

    let dir = tempfile::Builder::new().prefix("rfpipe-archive-").tempdir()?;
    let path = dir.path().join(format!("{}_{}.zip", job.id(), scope));
    let mut writer = ZipWriter::new(BufWriter::new(File::create(&path)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for file in &files {
        let name = entry_name(job.root(), file)?;
        let size = file.metadata()?.len();
        writer.start_file(name.as_str(), options.large_file(size >= u32::MAX as u64))?;
        io::copy(&mut File::open(file)?, &mut writer)?;
        debug!("Added {} ({} bytes)", name, size);
    }
    writer.finish()?.flush()?;

    info!("Archived {} file(s) into {:?}", files.len(), &path);
    Ok(JobArchive {
        _dir: dir,
        path,
        job_id: job.id().clone(),
        scope,
        entries: files.len(),
    })
}
