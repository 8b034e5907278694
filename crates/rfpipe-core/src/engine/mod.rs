//! # Engine Module
//!
//! Stateful plumbing between the orchestrator and the worker process.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Jobs root, worker coordinates, tool paths and buffer budgets
//! - **Error Handling** ([`error`]) - Fatal, operator-level errors that abort a job
//! - **Progress Monitoring** ([`progress`]) - Stage start/finish notifications for front ends
//! - **Tail Buffer** ([`tail`]) - Bounded retention of the most recent stage output
//! - **Command Construction** ([`command`]) - Shell-quoted assembly of worker command lines
//! - **Execution Channel** ([`channel`]) - Streaming command sessions inside the worker
//! - **Job Layout** ([`job`]) - Job identities and their private directory trees
//! - **Stages** ([`stage`]) - Declarative stage specs and the runner that gates on them

pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod job;
pub mod progress;
pub mod stage;
pub mod tail;
