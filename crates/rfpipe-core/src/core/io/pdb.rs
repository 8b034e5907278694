use crate::core::io::traits::StructureFile;
use crate::core::models::structure::{Residue, Structure};
use std::io::{self, BufRead};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Missing required record: {0}")]
    MissingRecord(String),
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Line is too short for ATOM/HETATM record (must be at least 26 chars)")]
    LineTooShort,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

/// Columns 1-6, or the whole line for short records such as a bare `END`.
fn record_name(line: &str) -> &str {
    line.get(..6).unwrap_or(line).trim()
}

/// Reader for fixed-column PDB files.
///
/// Only the first model is read. Residues are delimited by changes of residue
/// number or insertion code within a chain; a blank chain identifier is read as
/// `'A'`.
pub struct PdbFile;

impl StructureFile for PdbFile {
    type Error = PdbError;

    fn read_from(reader: &mut impl BufRead) -> Result<Structure, Self::Error> {
        let mut structure = Structure::new();
        let mut seen_atoms = false;
        let mut current: Option<(char, isize, char)> = None;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;

            match record_name(&line) {
                "ATOM" | "HETATM" => {
                    if line.len() < 26 {
                        return Err(PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::LineTooShort,
                        });
                    }

                    let res_name = slice_and_trim(&line, 17, 20);
                    let chain_id = slice_and_trim(&line, 21, 22).chars().next().unwrap_or('A');
                    let res_seq_str = slice_and_trim(&line, 22, 26);
                    let insertion_code = line.get(26..27).and_then(|s| s.chars().next()).unwrap_or(' ');

                    let res_seq: isize = res_seq_str.parse().map_err(|_| PdbError::Parse {
                        line: line_num,
                        kind: PdbParseErrorKind::InvalidInt {
                            columns: "23-26".into(),
                            value: res_seq_str.into(),
                        },
                    })?;

                    seen_atoms = true;
                    let key = (chain_id, res_seq, insertion_code);
                    if current != Some(key) {
                        structure.chain_mut(chain_id).push_residue(Residue {
                            number: res_seq,
                            insertion_code,
                            name: res_name.to_string(),
                        });
                        current = Some(key);
                    }
                }
                "TER" => current = None,
                "ENDMDL" | "END" => break,
                _ => {}
            }
        }

        if !seen_atoms {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }
        Ok(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn atom(serial: usize, name: &str, res_name: &str, chain: char, res_seq: isize) -> String {
        format!(
            "ATOM  {:>5} {:<4} {:>3} {}{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00           C",
            serial, name, res_name, chain, res_seq, 1.0, 2.0, 3.0
        )
    }

    fn parse(text: &str) -> Result<Structure, PdbError> {
        PdbFile::read_from(&mut Cursor::new(text.as_bytes()))
    }

    #[test]
    fn reads_chains_and_sequences_in_file_order() {
        let text = [
            atom(1, "N", "GLU", 'H', 1),
            atom(2, "CA", "GLU", 'H', 1),
            atom(3, "N", "VAL", 'H', 2),
            "TER".to_string(),
            atom(4, "N", "LYS", 'T', 10),
            atom(5, "CA", "LYS", 'T', 10),
            atom(6, "N", "TRP", 'T', 11),
            "END".to_string(),
        ]
        .join("\n");

        let structure = parse(&text).unwrap();
        let ids: Vec<char> = structure.chains().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!['H', 'T']);
        assert_eq!(structure.find_chain('H').unwrap().sequence(), "EV");
        assert_eq!(structure.find_chain('T').unwrap().sequence(), "KW");
        assert_eq!(structure.find_chain('T').unwrap().residues()[0].number, 10);
    }

    #[test]
    fn reads_only_the_first_model() {
        let text = [
            "MODEL        1".to_string(),
            atom(1, "CA", "ALA", 'A', 1),
            "ENDMDL".to_string(),
            "MODEL        2".to_string(),
            atom(2, "CA", "GLY", 'A', 1),
            "ENDMDL".to_string(),
        ]
        .join("\n");

        let structure = parse(&text).unwrap();
        assert_eq!(structure.find_chain('A').unwrap().sequence(), "A");
    }

    #[test]
    fn bare_end_record_stops_reading() {
        let text = [
            atom(1, "CA", "ALA", 'A', 1),
            "END".to_string(),
            atom(2, "CA", "GLY", 'B', 1),
        ]
        .join("\n");

        let structure = parse(&text).unwrap();
        let ids: Vec<char> = structure.chains().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!['A']);
    }

    #[test]
    fn bare_ter_record_closes_the_current_residue() {
        let text = [
            atom(1, "CA", "ALA", 'A', 1),
            "TER".to_string(),
            atom(2, "CA", "GLY", 'A', 1),
        ]
        .join("\n");

        let structure = parse(&text).unwrap();
        assert_eq!(structure.find_chain('A').unwrap().sequence(), "AG");
    }

    #[test]
    fn insertion_codes_start_new_residues() {
        let mut with_insertion = atom(2, "CA", "SER", 'H', 52);
        with_insertion.replace_range(26..27, "A");
        let text = [atom(1, "CA", "GLY", 'H', 52), with_insertion].join("\n");

        let structure = parse(&text).unwrap();
        let chain = structure.find_chain('H').unwrap();
        assert_eq!(chain.residues().len(), 2);
        assert_eq!(chain.residues()[1].insertion_code, 'A');
        assert_eq!(chain.sequence(), "GS");
    }

    #[test]
    fn blank_chain_id_defaults_to_a() {
        let line = atom(1, "CA", "ALA", ' ', 1);
        let structure = parse(&line).unwrap();
        assert!(structure.find_chain('A').is_some());
    }

    #[test]
    fn short_atom_line_is_a_parse_error() {
        let result = parse("ATOM      1  CA  ALA A");
        assert!(matches!(
            result,
            Err(PdbError::Parse {
                line: 1,
                kind: PdbParseErrorKind::LineTooShort
            })
        ));
    }

    #[test]
    fn invalid_residue_number_is_reported_with_columns() {
        let mut line = atom(1, "CA", "ALA", 'A', 1);
        line.replace_range(22..26, "  x1");
        let result = parse(&line);
        assert!(matches!(
            result,
            Err(PdbError::Parse {
                kind: PdbParseErrorKind::InvalidInt { .. },
                ..
            })
        ));
    }

    #[test]
    fn file_without_atoms_is_rejected() {
        let result = parse("HEADER    TEST\nEND\n");
        assert!(matches!(result, Err(PdbError::MissingRecord(_))));
    }
}
