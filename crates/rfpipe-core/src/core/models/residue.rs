use phf::{Map, phf_map};

static THREE_TO_ONE: Map<&'static str, char> = phf_map! {
    "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
    "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
    "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
    "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
};

/// One-letter code for one of the twenty standard amino acids.
///
/// Matching ignores case and surrounding whitespace. Non-standard residues
/// (ligands, waters, modified amino acids) yield `None`.
pub fn one_letter_code(residue_name: &str) -> Option<char> {
    let name = residue_name.trim().to_ascii_uppercase();
    THREE_TO_ONE.get(name.as_str()).copied()
}
