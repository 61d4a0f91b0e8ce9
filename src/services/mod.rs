//! Service layer for Symfold

pub mod analysis;
pub mod config;
pub mod correlate;

pub use analysis::{AnalysisReport, AnalysisService, ServerCommand};
pub use config::{ConfigService, DefaultConfigService};
pub use correlate::{CorrelationRule, correlate};
