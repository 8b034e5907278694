//! Input descriptions for the AlphaFold3 prediction backend.
//!
//! AlphaFold3 consumes one JSON document per prediction job. The pipeline derives
//! one document per designed structure, naming each protein chain by its chain
//! identifier and carrying the chain's one-letter sequence.

use crate::core::io::pdb::{PdbError, PdbFile};
use crate::core::io::traits::StructureFile;
use crate::core::models::structure::Structure;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const DIALECT: &str = "alphafold3";
pub const SCHEMA_VERSION: u32 = 4;

#[derive(Debug, Error)]
pub enum Af3InputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to read structure '{path}': {source}", path = path.display())]
    Structure {
        path: PathBuf,
        #[source]
        source: PdbError,
    },
    #[error("Structure '{path}' contains no protein chain with a standard sequence", path = path.display())]
    NoProteinChains { path: PathBuf },
    #[error("Failed to serialize input description: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinChain {
    pub id: String,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub protein: ProteinChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Af3Input {
    pub name: String,
    pub model_seeds: Vec<u32>,
    pub sequences: Vec<SequenceEntry>,
    pub dialect: String,
    pub version: u32,
}

impl Af3Input {
    /// Builds the description for one structure. Chains without any standard amino
    /// acid are left out.
    pub fn from_structure(name: &str, structure: &Structure, model_seed: u32) -> Self {
        let sequences = structure
            .chains()
            .iter()
            .map(|chain| (chain.id, chain.sequence()))
            .filter(|(_, sequence)| !sequence.is_empty())
            .map(|(id, sequence)| SequenceEntry {
                protein: ProteinChain {
                    id: id.to_string(),
                    sequence,
                },
            })
            .collect();

        Self {
            name: name.to_string(),
            model_seeds: vec![model_seed],
            sequences,
            dialect: DIALECT.to_string(),
            version: SCHEMA_VERSION,
        }
    }
}

fn structure_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "pdb") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Converts every `*.pdb` file in `input_dir` into `<stem>.json` under `output_dir`.
///
/// Returns the paths written, in name order. The output directory is created if
/// needed.
pub fn prepare_inputs(
    input_dir: &Path,
    output_dir: &Path,
    model_seed: u32,
) -> Result<Vec<PathBuf>, Af3InputError> {
    fs::create_dir_all(output_dir)?;
    let mut written = Vec::new();

    for path in structure_files(input_dir)? {
        let structure = PdbFile::read_from_path(&path).map_err(|source| Af3InputError::Structure {
            path: path.clone(),
            source,
        })?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let input = Af3Input::from_structure(&stem, &structure, model_seed);
        if input.sequences.is_empty() {
            return Err(Af3InputError::NoProteinChains { path });
        }

        let target = output_dir.join(format!("{stem}.json"));
        fs::write(&target, serde_json::to_string_pretty(&input)?)?;
        debug!("Wrote AlphaFold3 input description {:?}", &target);
        written.push(target);
    }

    info!(
        "Prepared {} AlphaFold3 input description(s) in {:?}",
        written.len(),
        output_dir
    );
    Ok(written)
}
