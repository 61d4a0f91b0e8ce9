//! Domain models for Symfold

pub mod config;
pub mod lsp;
pub mod symbol;

pub use config::{OutputFormat, SymfoldConfig};
pub use lsp::{DocumentIdentity, FoldingRangeKind, FoldingRegion, Position, Range};
pub use symbol::{CorrelatedElement, Language, SymbolEntry, SymbolKind};
