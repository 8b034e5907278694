//! Layered configuration for the CLI.
//!
//! Values are resolved in order of precedence: command-line flags (and their
//! environment variables), `--set KEY=VALUE` overrides, the TOML file, and finally
//! the built-in defaults.

pub mod builder;
pub mod defaults;
pub mod file;
