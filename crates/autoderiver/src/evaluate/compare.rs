use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::{ExportRow, export_all};
use crate::error::EngineError;
use crate::format::stringify;
use crate::require::Resolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonSummary {
    Differing(usize),
    AllIdentical,
}

impl fmt::Display for ComparisonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonSummary::Differing(1) => f.write_str("1 differing position"),
            ComparisonSummary::Differing(count) => write!(f, "{count} differing positions"),
            ComparisonSummary::AllIdentical => f.write_str("all schemas agree on every position"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub summary: ComparisonSummary,
    /// Only the records where the schemas disagree.
    pub rows: Vec<ExportRow>,
}

impl Comparison {
    pub fn plain_text(&self) -> String {
        let mut text = self.summary.to_string();
        for row in &self.rows {
            text.push('\n');
            text.push_str(&row.plain_text());
        }
        text
    }
}

fn all_agree(row: &ExportRow) -> bool {
    let mut keys = row.outputs.iter().map(|nodes| stringify(nodes));
    match keys.next() {
        Some(first) => keys.all(|key| key == first),
        None => true,
    }
}

/// Run every schema over the domain and keep the records they disagree on.
pub fn compare(resolver: &Resolver<'_>) -> Result<Comparison, EngineError> {
    if resolver.registry().is_empty() {
        return Err(EngineError::NoSchemas);
    }
    let rows = export_all(resolver)?
        .into_iter()
        .filter(|row| !all_agree(row))
        .collect::<Vec<_>>();
    let summary = if rows.is_empty() {
        ComparisonSummary::AllIdentical
    } else {
        ComparisonSummary::Differing(rows.len())
    };
    debug!(%summary, "comparison finished");
    Ok(Comparison { summary, rows })
}
