//! Script errors and their diagnostic reports.

use std::fmt;
use std::io::Cursor;

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

use super::{ParseError, ScriptSource, Span};

/// What went wrong while compiling or running a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("syntax error: {}", messages.join("; "))]
    Syntax { messages: Vec<String> },
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{on} has no field '{field}'")]
    UnknownField { field: String, on: String },
    #[error("{function}: expected {expected}, found {found}")]
    TypeMismatch {
        function: String,
        expected: &'static str,
        found: String,
    },
    #[error("{function}: missing argument '{argument}'")]
    MissingArgument { function: String, argument: String },
    #[error("{function}: unexpected argument '{argument}'")]
    UnexpectedArgument { function: String, argument: String },
    #[error("'{0}' refers to itself")]
    RecursiveBinding(String),
    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("no WHEN arm matches {0}")]
    NoMatchingArm(String),
    #[error("cannot pipe into this expression")]
    InvalidPipe,
    #[error("WHEN needs a value piped into it")]
    MissingPipeInput,
    #[error("FUNCTION is only allowed at the top level")]
    NestedFunction,
    #[error("{0}")]
    Raised(String),
    #[error("require is not available in configuration mode")]
    RequireUnavailable,
    #[error("schema not found: {0}")]
    SchemaNotFound(String),
    #[error("circular require: {}", chain.join(" -> "))]
    RequireCycle { chain: Vec<String> },
    #[error("{0}")]
    Domain(String),
}

/// One frame of the unwinding trace: a function or schema boundary that the
/// error crossed, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    pub schema: Option<String>,
    pub function: Option<String>,
    pub span: Option<Span>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.schema, &self.function) {
            (Some(schema), Some(function)) => write!(f, "at {function} ({schema})")?,
            (Some(schema), None) => write!(f, "at {schema}")?,
            (None, Some(function)) => write!(f, "at {function}")?,
            (None, None) => write!(f, "at <script>")?,
        }
        if let Some(span) = self.span {
            write!(f, " [{}..{}]", span.start, span.end)?;
        }
        Ok(())
    }
}

/// An error raised by the script language.
///
/// `span` points at the innermost expression that failed; `trace` keeps
/// the boundaries crossed while the error unwound, so nested `require`
/// calls stay diagnosable after the error is wrapped at the schema boundary.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub trace: Vec<TraceFrame>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span: Some(span),
            trace: Vec::new(),
        }
    }

    pub fn unlocated(kind: ErrorKind) -> Self {
        Self {
            kind,
            span: None,
            trace: Vec::new(),
        }
    }

    pub fn syntax<'code, T: fmt::Display + 'code>(
        errors: impl IntoIterator<Item = ParseError<'code, T>>,
    ) -> Self {
        let mut span = None;
        let messages = errors
            .into_iter()
            .map(|error| {
                span.get_or_insert(*error.span());
                format!("{} at {}..{}", error, error.span().start, error.span().end)
            })
            .collect::<Vec<_>>();
        let messages = if messages.is_empty() {
            vec!["no tokens".to_owned()]
        } else {
            messages
        };
        Self {
            kind: ErrorKind::Syntax { messages },
            span,
            trace: Vec::new(),
        }
    }

    /// Attach a location if the error does not carry one yet.
    pub fn at(mut self, span: Span) -> Self {
        self.span.get_or_insert(span);
        self
    }

    /// Record a boundary crossed while unwinding.
    pub fn within(mut self, schema: Option<&str>, function: Option<&str>, span: Option<Span>) -> Self {
        self.trace.push(TraceFrame {
            schema: schema.map(str::to_owned),
            function: function.map(str::to_owned),
            span,
        });
        self
    }

    /// The schema whose source `span` points into: the innermost schema
    /// boundary the error crossed, if any.
    pub fn origin(&self) -> Option<&str> {
        self.trace.iter().find_map(|frame| frame.schema.as_deref())
    }

    /// The diagnostic text: an ariadne report against `source` followed by the
    /// unwinding trace.
    pub fn report(&self, filename: &str, source: &ScriptSource) -> String {
        let mut report_string = match self.span {
            Some(span) => render_report(filename, source, span, &self.kind.to_string())
                .unwrap_or_else(|| self.kind.to_string()),
            None => self.kind.to_string(),
        };
        for frame in &self.trace {
            report_string.push_str("\n    ");
            report_string.push_str(&frame.to_string());
        }
        report_string
    }
}

impl From<ErrorKind> for ScriptError {
    fn from(kind: ErrorKind) -> Self {
        Self::unlocated(kind)
    }
}

fn render_report(filename: &str, source: &ScriptSource, span: Span, message: &str) -> Option<String> {
    let range = span.start.min(source.len())..span.end.min(source.len());
    let mut report_bytes = Cursor::new(Vec::new());
    Report::build(ReportKind::Error, (filename, range.clone()))
        .with_config(Config::default().with_color(false))
        .with_message(message)
        .with_label(Label::new((filename, range)).with_message(message))
        .finish()
        .write((filename, Source::from(source.as_str())), &mut report_bytes)
        .ok()?;
    String::from_utf8(report_bytes.into_inner()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_the_chain() {
        let error = ScriptError::unlocated(ErrorKind::RequireCycle {
            chain: vec!["A".into(), "B".into(), "A".into()],
        });
        assert_eq!(error.to_string(), "circular require: A -> B -> A");
    }

    #[test]
    fn report_includes_message_and_trace() {
        let source = ScriptSource::from("x: 1\nError/raise(message: 'boom')");
        let error = ScriptError::new(ErrorKind::Raised("boom".into()), (5..32).into())
            .within(Some("inner"), Some("helper"), Some((0..1).into()));
        let report = error.report("inner", &source);
        assert!(report.contains("boom"));
        assert!(report.contains("at helper (inner)"));
    }

    #[test]
    fn at_keeps_innermost_span() {
        let error = ScriptError::new(ErrorKind::InvalidPipe, (3..4).into()).at((0..10).into());
        assert_eq!(error.span, Some((3..4).into()));
    }
}
