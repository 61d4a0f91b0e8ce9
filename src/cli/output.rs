//! Output formatting for analysis results

use serde::Serialize;

use crate::models::config::OutputFormat;
use crate::models::lsp::FoldingRegion;
use crate::models::symbol::{CorrelatedElement, SymbolEntry};
use crate::services::analysis::AnalysisReport;

/// Output context for consistent formatting
///
/// Text mode prints one line per item; JSON mode wraps data in a
/// `{"success": ..., ...}` envelope.
#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    format: OutputFormat,
}

impl OutputContext {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn print_report(&self, report: &AnalysisReport) {
        match self.format {
            OutputFormat::Text => {
                for line in render_text(report) {
                    println!("{line}");
                }
            }
            OutputFormat::Json => self.print_success(report),
        }
    }

    /// Print a successful response
    pub fn print_success<T: Serialize>(&self, data: T) {
        let response = serde_json::json!({
            "success": true,
            "data": data
        });
        print_json(&response);
    }

    /// Print an error response
    pub fn print_error(&self, message: &str, code: Option<i32>) {
        match self.format {
            OutputFormat::Text => eprintln!("error: {message}"),
            OutputFormat::Json => print_json(&error_envelope(message, code)),
        }
    }
}

/// `{"success": false, "error": ..., "code": ...}`; `code` is omitted when unknown
pub fn error_envelope(message: &str, code: Option<i32>) -> serde_json::Value {
    let mut envelope = serde_json::json!({
        "success": false,
        "error": message
    });
    if let Some(code) = code {
        envelope["code"] = code.into();
    }
    envelope
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

/// Symbols, then folding ranges, then correlated elements
pub fn render_text(report: &AnalysisReport) -> Vec<String> {
    report
        .symbols
        .iter()
        .map(symbol_line)
        .chain(report.folding_ranges.iter().map(folding_line))
        .chain(report.correlated.iter().map(correlated_line))
        .collect()
}

pub fn symbol_line(symbol: &SymbolEntry) -> String {
    let range = &symbol.range;
    format!(
        "[{}] Name: {}. Start: {},{}. End: {}, {}",
        symbol.kind,
        symbol.name,
        range.start.line,
        range.start.character,
        range.end.line,
        range.end.character
    )
}

pub fn folding_line(region: &FoldingRegion) -> String {
    format!(
        "Folding Range. Start: {}, {}. End: {}, {}",
        region.start_line,
        optional(region.start_character),
        region.end_line,
        optional(region.end_character)
    )
}

pub fn correlated_line(element: &CorrelatedElement) -> String {
    let range = &element.symbol.range;
    format!(
        "{} '{}' Folding Range: Start Line {}, Start Character {}, End Line {}, End Character {}",
        element.symbol.kind,
        element.symbol.name,
        range.start.line,
        range.start.character,
        range.end.line,
        range.end.character
    )
}

fn optional(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
