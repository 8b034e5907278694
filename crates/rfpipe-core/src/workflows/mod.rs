//! # Workflows Module
//!
//! Top-level entry points of the library.
//!
//! ## Overview
//!
//! Workflows tie the engine together into complete operations. They own the
//! sequencing, the short-circuit rules and the shape of what is handed back to a
//! transport layer, leaving command execution and file layout to the engine.
//!
//! ## Architecture
//!
//! - **Job Orchestration** ([`pipeline`]) - Allocates a job, adopts its uploads, runs
//!   structure generation, sequence design and structure prediction in order, and
//!   reports a JSON-serializable [`pipeline::JobResult`].
//! - **Archive Building** ([`archive`]) - Packages a job tree, or just its outputs,
//!   into a zip file in a self-cleaning temporary location.

pub mod archive;
pub mod pipeline;
