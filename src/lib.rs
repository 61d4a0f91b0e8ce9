//! Symfold - symbol and folding-region extraction over LSP
//!
//! Drives an external language server through the Language Server Protocol,
//! collects the document symbols and folding ranges of a single file, and
//! correlates the two result sets.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod infra;
pub mod models;
pub mod services;

pub use error::{ConfigError, LspError, SymfoldError, SymfoldResult};
