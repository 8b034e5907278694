pub mod residue;
pub mod structure;
