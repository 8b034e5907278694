//! # Core Module
//!
//! Stateless building blocks shared by the engine and the workflows.
//!
//! - **Argument Sanitizing** ([`sanitize`]) - Normalizes free-text hotspot and
//!   design-loop fields into a grammar that is safe to embed in a worker command.
//! - **Structure Representation** ([`models`]) - Chains and residues as read from
//!   a structure file, plus the standard amino-acid alphabet.
//! - **File I/O** ([`io`]) - Reading PDB files and writing the per-structure input
//!   descriptions consumed by the AlphaFold3 backend.

pub mod io;
pub mod models;
pub mod sanitize;
