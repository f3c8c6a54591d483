use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::{Outputs, outputs_key, outputs_text};
use crate::domain::CategoryRecord;
use crate::error::EngineError;
use crate::require::Resolver;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub record: CategoryRecord,
    pub representative: Option<char>,
    pub outputs: Outputs,
}

impl ExportRow {
    pub fn plain_text(&self) -> String {
        let representative = self.representative.map(String::from).unwrap_or_default();
        format!("{}\t{}\t{}", self.record, representative, outputs_text(&self.outputs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyllableCount {
    pub outputs: Outputs,
    pub count: usize,
}

/// Derive every record of the domain, in enumeration order. The
/// representative character is passed as `head`.
pub fn export_all(resolver: &Resolver<'_>) -> Result<Vec<ExportRow>, EngineError> {
    let domain = resolver.domain();
    let rows = domain
        .all_records()
        .map(|record| {
            let representative = domain.representative(record);
            let head = representative.map(String::from);
            Ok(ExportRow {
                record,
                representative,
                outputs: resolver.derive_all(record, head.as_deref())?,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    debug!(rows = rows.len(), "exported all records");
    Ok(rows)
}

fn counted(resolver: &Resolver<'_>) -> Result<Vec<SyllableCount>, EngineError> {
    let mut counts: IndexMap<String, SyllableCount> = IndexMap::new();
    for row in export_all(resolver)? {
        counts
            .entry(outputs_key(&row.outputs))
            .and_modify(|syllable| syllable.count += 1)
            .or_insert(SyllableCount {
                outputs: row.outputs,
                count: 1,
            });
    }
    Ok(counts.into_values().collect())
}

/// Distinct outputs, in order of first occurrence.
pub fn export_unique(resolver: &Resolver<'_>) -> Result<Vec<Outputs>, EngineError> {
    Ok(counted(resolver)?
        .into_iter()
        .map(|syllable| syllable.outputs)
        .collect())
}

/// Distinct outputs with their number of records, most frequent first. Ties
/// keep the order of first occurrence.
pub fn export_with_count(resolver: &Resolver<'_>) -> Result<Vec<SyllableCount>, EngineError> {
    let mut counts = counted(resolver)?;
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(counts)
}
