//! Evaluation passes over an article or the whole domain.
//!
//! Every pass derives with all registered schemas. A derivation error aborts
//! the pass; partial results are discarded.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::format::{ResultNode, plain_text, stringify};
use crate::require::Resolver;

mod article;
pub use article::{
    Article, ArticleSegment, Candidate, CandidateGroup, ArticleToken, evaluate_article,
    tokenize_article,
};

mod export;
pub use export::{ExportRow, SyllableCount, export_all, export_unique, export_with_count};

mod compare;
pub use compare::{Comparison, ComparisonSummary, compare};

/// One rendered result per schema, in registry order.
pub type Outputs = Vec<Vec<ResultNode>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    Article,
    ExportAll,
    ExportUnique,
    ExportWithCount,
    Compare,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    pub operation: Operation,
    /// Also look up orthographic variants of article characters.
    pub convert_variants: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", content = "result", rename_all = "snake_case")]
pub enum EvaluationOutput {
    Article(Article),
    ExportAll(Vec<ExportRow>),
    ExportUnique(Vec<Outputs>),
    ExportWithCount(Vec<SyllableCount>),
    Compare(Comparison),
}

impl EvaluationOutput {
    pub fn plain_text(&self) -> String {
        match self {
            EvaluationOutput::Article(article) => article.plain_text(),
            EvaluationOutput::ExportAll(rows) => lines(rows.iter().map(ExportRow::plain_text)),
            EvaluationOutput::ExportUnique(syllables) => {
                lines(syllables.iter().map(|outputs| outputs_text(outputs)))
            }
            EvaluationOutput::ExportWithCount(counts) => lines(
                counts
                    .iter()
                    .map(|count| format!("{}\t{}", outputs_text(&count.outputs), count.count)),
            ),
            EvaluationOutput::Compare(comparison) => comparison.plain_text(),
        }
    }
}

/// Run the pass selected by `options`.
pub fn evaluate(
    resolver: &Resolver<'_>,
    article: &str,
    options: &EvaluationOptions,
) -> Result<EvaluationOutput, EngineError> {
    debug!(operation = ?options.operation, schemas = resolver.registry().len(), "evaluation started");
    let output = match options.operation {
        Operation::Article => EvaluationOutput::Article(evaluate_article(
            resolver,
            article,
            options.convert_variants,
        )?),
        Operation::ExportAll => EvaluationOutput::ExportAll(export_all(resolver)?),
        Operation::ExportUnique => EvaluationOutput::ExportUnique(export_unique(resolver)?),
        Operation::ExportWithCount => EvaluationOutput::ExportWithCount(export_with_count(resolver)?),
        Operation::Compare => EvaluationOutput::Compare(compare(resolver)?),
    };
    debug!(operation = ?options.operation, "evaluation finished");
    Ok(output)
}

/// Canonical key of a row's outputs, used for deduplication.
pub fn outputs_key(outputs: &[Vec<ResultNode>]) -> String {
    let parts = outputs.iter().map(|nodes| stringify(nodes)).collect::<Vec<_>>();
    format!("[{}]", parts.join(","))
}

pub fn outputs_text(outputs: &[Vec<ResultNode>]) -> String {
    outputs
        .iter()
        .map(|nodes| plain_text(nodes))
        .collect::<Vec<_>>()
        .join("\t")
}

fn lines(lines: impl Iterator<Item = String>) -> String {
    lines.collect::<Vec<_>>().join("\n")
}
