//! Infrastructure layer for Symfold
//!
//! Contains the language server transport and session plumbing.

pub mod lsp;
