//! Provides input/output functionality for structure file formats.
//!
//! The pipeline only reads structures to derive per-chain sequences, and only
//! writes the JSON input descriptions expected by the AlphaFold3 backend. Both
//! sides are kept behind small, format-specific modules.

pub mod af3;
pub mod pdb;
pub mod traits;
