//! # rfpipe Core Library
//!
//! Orchestration core for a fixed three-stage antibody design pipeline: structure
//! generation, sequence design and structure prediction. Each stage runs as a shell
//! command inside an already-running worker, with its output streamed to durable
//! per-stage logs and a bounded in-memory tail.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer layout so that each concern can be tested in
//! isolation.
//!
//! - **[`core`]: The Foundation.** Stateless pieces: the command argument sanitizer,
//!   the structure model, and the structure file I/O used to prepare inputs for the
//!   prediction backend.
//!
//! - **[`engine`]: The Plumbing.** Configuration, errors, progress reporting, the
//!   execution channel into the worker, the tail buffer, job directory layout, and
//!   the declarative stage specs evaluated by the stage runner.
//!
//! - **[`workflows`]: The Public API.** The job orchestrator that sequences the three
//!   stages into a [`workflows::pipeline::JobResult`], and the archive builder that
//!   packages a job tree for retrieval.

pub mod core;
pub mod engine;
pub mod workflows;
