//! Symbol / folding-region correlation
//!
//! Pairs each symbol with the folding region covering the same block. Both
//! inputs come from independent server requests with no ordering or
//! one-to-one guarantee, so matching is purely positional.

use crate::models::config::CorrelationConfig;
use crate::models::lsp::FoldingRegion;
use crate::models::symbol::{CorrelatedElement, SymbolEntry, SymbolKind};

/// Positional matching rule.
///
/// A region matches a symbol when both start on the same line and
/// `region.end_line + end_line_offset == symbol.range.end.line`. Servers
/// commonly report folds one line short of the symbol's end, hence the
/// default offset of 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationRule {
    pub end_line_offset: i64,
    pub excluded_kinds: Vec<SymbolKind>,
}

impl Default for CorrelationRule {
    fn default() -> Self {
        Self::from(&CorrelationConfig::default())
    }
}

impl From<&CorrelationConfig> for CorrelationRule {
    fn from(config: &CorrelationConfig) -> Self {
        Self {
            end_line_offset: config.end_line_offset,
            excluded_kinds: config.excluded_kinds.clone(),
        }
    }
}

impl CorrelationRule {
    pub fn is_excluded(&self, kind: SymbolKind) -> bool {
        self.excluded_kinds.contains(&kind)
    }

    pub fn matches(&self, symbol: &SymbolEntry, region: &FoldingRegion) -> bool {
        region.start_line == symbol.range.start.line
            && i64::from(region.end_line) + self.end_line_offset
                == i64::from(symbol.range.end.line)
    }

    /// First region in input order that matches `symbol`
    pub fn find_region<'a>(
        &self,
        symbol: &SymbolEntry,
        regions: &'a [FoldingRegion],
    ) -> Option<&'a FoldingRegion> {
        regions.iter().find(|region| self.matches(symbol, region))
    }
}

/// Correlate symbols with folding regions.
///
/// Output keeps the symbol input order. Excluded kinds and symbols without
/// a matching region are dropped; unmatched regions never appear.
pub fn correlate(
    symbols: &[SymbolEntry],
    regions: &[FoldingRegion],
    rule: &CorrelationRule,
) -> Vec<CorrelatedElement> {
    symbols
        .iter()
        .filter(|symbol| !rule.is_excluded(symbol.kind))
        .filter_map(|symbol| {
            rule.find_region(symbol, regions)
                .map(|region| CorrelatedElement {
                    symbol: symbol.clone(),
                    region: region.clone(),
                })
        })
        .collect()
}
