use super::residue::one_letter_code;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub number: isize,           // Residue sequence number from source file
    pub insertion_code: char,    // Insertion code, ' ' when absent
    pub name: String,            // Three-letter residue name (e.g., "ALA")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: char,
    residues: Vec<Residue>,
}

impl Chain {
    pub fn new(id: char) -> Self {
        Self {
            id,
            residues: Vec::new(),
        }
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    pub(crate) fn push_residue(&mut self, residue: Residue) {
        self.residues.push(residue);
    }

    /// One-letter sequence of the standard amino acids in this chain, in file order.
    pub fn sequence(&self) -> String {
        self.residues
            .iter()
            .filter_map(|r| one_letter_code(&r.name))
            .collect()
    }
}

/// Chains of a single model, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    chains: Vec<Chain>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn find_chain(&self, id: char) -> Option<&Chain> {
        self.chains.iter().find(|c| c.id == id)
    }

    pub(crate) fn chain_mut(&mut self, id: char) -> &mut Chain {
        let idx = match self.chains.iter().position(|c| c.id == id) {
            Some(idx) => idx,
            None => {
                self.chains.push(Chain::new(id));
                self.chains.len() - 1
            }
        };
        &mut self.chains[idx]
    }
}
