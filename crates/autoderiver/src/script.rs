//! The schema script language.
//!
//! A schema is plain source text compiled into a [`Program`]. The program is
//! evaluated as a function of four positional parameters, pre-bound as
//! `record`, `head`, `options` and `require`; the value of its last bare
//! expression is the return value.

use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::fmt;

mod lexer;
pub use lexer::{Token, lexer};

mod source;
pub use source::ScriptSource;

mod value;
pub use value::{RequireHandle, Value};
pub(crate) use value::format_number;

mod evaluator;
pub use evaluator::{DEFAULT_MAX_CALL_DEPTH, Invocation, Requirer, evaluate};

mod builtins;

mod report;
pub use report::{ErrorKind, ScriptError, TraceFrame};

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// A compiled script: its top-level items in source order.
#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Spanned<Expression>>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.items.iter().filter_map(|item| match &item.node {
            Expression::Function(function) => Some(function.as_ref()),
            _ => None,
        })
    }
}

/// Lex and parse a script.
///
/// Comments are dropped between the two passes. All lexer and parser
/// diagnostics are collected into one [`ScriptError`].
pub fn compile(source: &ScriptSource) -> Result<Program, ScriptError> {
    let code = source.as_str();
    let (tokens, lex_errors) = lexer().parse(code).into_output_errors();
    if !lex_errors.is_empty() {
        return Err(ScriptError::syntax(lex_errors));
    }
    let Some(mut tokens) = tokens else {
        return Err(ScriptError::syntax(Vec::<ParseError<'_, char>>::new()));
    };
    tokens.retain(|spanned_token| !matches!(spanned_token.node, Token::Comment(_)));

    let end_of_input: Span = (code.len()..code.len()).into();
    let (items, parse_errors) = parser()
        .parse(tokens.map(end_of_input, |Spanned { node, span }| (node, span)))
        .into_output_errors();
    if !parse_errors.is_empty() {
        return Err(ScriptError::syntax(parse_errors));
    }
    Ok(Program {
        items: items.unwrap_or_default(),
    })
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Expression>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let newlines = just(Token::Newline).repeated();

    recursive(|expression| {
        let colon = just(Token::Colon);
        let dot = just(Token::Dot);
        // Items are separated by commas or line breaks; brackets may hug
        // blank lines on the inside.
        let separator = just(Token::Comma).ignored().or(newlines);
        let round_open = just(Token::BracketRoundOpen).then(newlines);
        let round_close = newlines.then(just(Token::BracketRoundClose));
        let curly_open = just(Token::BracketCurlyOpen).then(newlines);
        let curly_close = newlines.then(just(Token::BracketCurlyClose));

        let snake_case_identifier =
            select! { Token::SnakeCaseIdentifier(identifier) => identifier.to_owned() };
        let pascal_case_identifier =
            select! { Token::PascalCaseIdentifier(identifier) => identifier.to_owned() };

        let variable = group((snake_case_identifier, colon, expression.clone()))
            .map(|(name, _, value)| Variable { name, value });

        let spanned_variable = variable.clone().map_with(|variable, extra| Spanned {
            node: variable,
            span: extra.span(),
        });

        let expression_variable = variable
            .clone()
            .map(|variable| Expression::Variable(Box::new(variable)));

        let function_call = {
            let path = pascal_case_identifier
                .then_ignore(just(Token::Slash))
                .repeated()
                .collect::<Vec<_>>()
                .then(snake_case_identifier)
                .map(|(mut path, function_name)| {
                    path.push(function_name);
                    path
                });

            // `name: value`, or just `name` as a shorthand for `name: name`
            let argument = snake_case_identifier
                .then(group((colon, expression.clone())).or_not())
                .map_with(|(name, value), extra| Spanned {
                    node: Argument {
                        name,
                        value: value.map(|(_, value)| value),
                    },
                    span: extra.span(),
                });

            path.then(
                argument
                    .separated_by(separator.clone())
                    .collect()
                    .delimited_by(round_open.clone(), round_close.clone()),
            )
            .map(|(path, arguments)| Expression::FunctionCall { path, arguments })
        };

        let number = select! { Token::Number(number) => Literal::Number(number) };
        let text = select! { Token::Text(text) => Literal::Text(text.to_owned()) };
        let tag = pascal_case_identifier.map(Literal::Tag);

        let literal = choice((number, text, tag));
        let expression_literal = literal.clone().map(Expression::Literal);

        let list = just(Token::List)
            .ignore_then(
                expression
                    .clone()
                    .separated_by(separator.clone())
                    .collect()
                    .delimited_by(curly_open.clone(), curly_close.clone()),
            )
            .map(|items| Expression::List { items });

        let object = spanned_variable
            .clone()
            .separated_by(separator.clone())
            .collect()
            .delimited_by(
                just(Token::BracketSquareOpen).then(newlines),
                newlines.then(just(Token::BracketSquareClose)),
            )
            .map(|fields| Expression::Object { fields });

        let alias = snake_case_identifier
            .separated_by(dot)
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|parts| Expression::Alias { parts });

        let function = {
            let parameters = snake_case_identifier
                .map_with(|parameter_name, extra| Spanned {
                    node: parameter_name,
                    span: extra.span(),
                })
                .separated_by(separator.clone())
                .collect()
                .delimited_by(round_open.clone(), round_close.clone());

            just(Token::Function)
                .ignore_then(snake_case_identifier)
                .then(parameters)
                .then(expression.clone().delimited_by(curly_open.clone(), curly_close.clone()))
                .map(|((name, parameters), body)| {
                    Expression::Function(Box::new(FunctionDefinition {
                        name,
                        parameters,
                        body,
                    }))
                })
        };

        let pattern = choice((
            just(Token::Wildcard).to(Pattern::WildCard),
            literal.map(Pattern::Literal),
            snake_case_identifier.map(|name| Pattern::Alias { name }),
        ));

        let arm = pattern
            .then_ignore(just(Token::Implies))
            .then(expression.clone())
            .map(|(pattern, body)| Arm { pattern, body });

        let when = just(Token::When)
            .ignore_then(
                arm.separated_by(separator.clone())
                    .collect()
                    .delimited_by(curly_open.clone(), curly_close.clone()),
            )
            .map(|arms| Expression::When { arms });

        // TEXT { {initial}{rhyme} } - `{path}` parts are interpolated
        let text_literal = select! { Token::TextContent(content) => content }
            .map(|content: &str| Expression::TextLiteral {
                parts: split_text_parts(content),
            });

        // BLOCK { var: value, var2: value2, output_expression }
        let block = just(Token::Block)
            .ignore_then(
                spanned_variable
                    .separated_by(separator.clone())
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .then(expression.clone())
                    .delimited_by(curly_open.clone(), curly_close.clone()),
            )
            .map(|(variables, output)| Expression::Block {
                variables,
                output: Box::new(output),
            });

        let nested = expression.delimited_by(round_open.clone(), round_close.clone());

        let expression = choice((
            expression_variable,
            function_call,
            list,
            object,
            expression_literal,
            text_literal,
            function,
            alias,
            when,
            block,
        ));

        // Line breaks may precede an operand, but only `|>` continues an
        // expression onto a new line; any other line start begins a new item.
        newlines
            .ignore_then(
                expression
                    .map_with(|expression, extra| Spanned {
                        node: expression,
                        span: extra.span(),
                    })
                    .or(nested),
            )
            .pratt((
                // Precedence 1 (lowest): Pipe
                infix(left(1), newlines.then(just(Token::Pipe)), |l, _, r, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Pipe {
                        from: Box::new(l),
                        to: Box::new(r),
                    },
                }),
                infix(left(2), just(Token::Coalesce), |l, _, r, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Coalesce {
                        value: Box::new(l),
                        fallback: Box::new(r),
                    },
                }),
                infix(left(3), just(Token::Or), |l, _, r, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Logical(Logical::Or {
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    }),
                }),
                infix(left(4), just(Token::And), |l, _, r, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Logical(Logical::And {
                        operand_a: Box::new(l),
                        operand_b: Box::new(r),
                    }),
                }),
                prefix(5, newlines.then(just(Token::Not)), |_, operand, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Logical(Logical::Not {
                        operand: Box::new(operand),
                    }),
                }),
                // Precedence 6: Comparison operators
                infix(left(6), just(Token::Equal), |l, _, r, extra| {
                    comparator(Comparison::Equal, l, r, extra.span())
                }),
                infix(left(6), just(Token::NotEqual), |l, _, r, extra| {
                    comparator(Comparison::NotEqual, l, r, extra.span())
                }),
                infix(left(6), just(Token::Greater), |l, _, r, extra| {
                    comparator(Comparison::Greater, l, r, extra.span())
                }),
                infix(left(6), just(Token::GreaterOrEqual), |l, _, r, extra| {
                    comparator(Comparison::GreaterOrEqual, l, r, extra.span())
                }),
                infix(left(6), just(Token::Less), |l, _, r, extra| {
                    comparator(Comparison::Less, l, r, extra.span())
                }),
                infix(left(6), just(Token::LessOrEqual), |l, _, r, extra| {
                    comparator(Comparison::LessOrEqual, l, r, extra.span())
                }),
                // Precedence 8: Additive operators
                infix(left(8), just(Token::Plus), |l, _, r, extra| {
                    arithmetic(Arithmetic::Add, l, r, extra.span())
                }),
                infix(left(8), just(Token::Minus), |l, _, r, extra| {
                    arithmetic(Arithmetic::Subtract, l, r, extra.span())
                }),
                // Precedence 10: Multiplicative operators
                infix(left(10), just(Token::Asterisk), |l, _, r, extra| {
                    arithmetic(Arithmetic::Multiply, l, r, extra.span())
                }),
                // Token::Slash is also the function path separator; paths are
                // tried first, so division only applies between expressions.
                infix(left(10), just(Token::Slash), |l, _, r, extra| {
                    arithmetic(Arithmetic::Divide, l, r, extra.span())
                }),
                prefix(12, newlines.then(just(Token::Minus)), |_, operand, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Negate {
                        operand: Box::new(operand),
                    },
                }),
            ))
    })
    .repeated()
    .collect()
    .padded_by(newlines)
}

fn comparator(
    comparison: Comparison,
    operand_a: Spanned<Expression>,
    operand_b: Spanned<Expression>,
    span: Span,
) -> Spanned<Expression> {
    Spanned {
        span,
        node: Expression::Comparator {
            comparison,
            operand_a: Box::new(operand_a),
            operand_b: Box::new(operand_b),
        },
    }
}

fn arithmetic(
    operator: Arithmetic,
    operand_a: Spanned<Expression>,
    operand_b: Spanned<Expression>,
    span: Span,
) -> Spanned<Expression> {
    Spanned {
        span,
        node: Expression::ArithmeticOperator {
            operator,
            operand_a: Box::new(operand_a),
            operand_b: Box::new(operand_b),
        },
    }
}

fn split_text_parts(content: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current_text_start = 0;
    let mut chars = content.char_indices();

    while let Some((i, c)) = chars.next() {
        if c != '{' {
            continue;
        }
        if i > current_text_start {
            parts.push(TextPart::Text(content[current_text_start..i].to_owned()));
        }
        let path_start = i + 1;
        let mut path_end = content.len();
        for (j, c2) in chars.by_ref() {
            if c2 == '}' {
                path_end = j;
                break;
            }
        }
        let path = content[path_start..path_end].trim();
        if !path.is_empty() {
            parts.push(TextPart::Interpolation {
                path: path.split('.').map(|part| part.trim().to_owned()).collect(),
            });
        }
        current_text_start = (path_end + 1).min(content.len());
    }

    if current_text_start < content.len() {
        parts.push(TextPart::Text(content[current_text_start..].to_owned()));
    }
    parts
}

#[derive(Debug, Clone)]
pub enum Expression {
    Variable(Box<Variable>),
    Literal(Literal),
    List {
        items: Vec<Spanned<Self>>,
    },
    Object {
        fields: Vec<Spanned<Variable>>,
    },
    Function(Box<FunctionDefinition>),
    FunctionCall {
        path: Vec<String>,
        arguments: Vec<Spanned<Argument>>,
    },
    Alias {
        parts: Vec<String>,
    },
    When {
        arms: Vec<Arm>,
    },
    Pipe {
        from: Box<Spanned<Self>>,
        to: Box<Spanned<Self>>,
    },
    Block {
        variables: Vec<Spanned<Variable>>,
        output: Box<Spanned<Self>>,
    },
    Coalesce {
        value: Box<Spanned<Self>>,
        fallback: Box<Spanned<Self>>,
    },
    Logical(Logical),
    Comparator {
        comparison: Comparison,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    ArithmeticOperator {
        operator: Arithmetic,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    Negate {
        operand: Box<Spanned<Self>>,
    },
    TextLiteral {
        parts: Vec<TextPart>,
    },
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameters: Vec<Spanned<String>>,
    pub body: Spanned<Expression>,
}

#[derive(Debug, Clone)]
pub enum Logical {
    And {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    Or {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    Not {
        operand: Box<Spanned<Expression>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone)]
pub enum TextPart {
    Text(String),
    Interpolation { path: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Spanned<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Tag(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "'{text}'"),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub value: Option<Spanned<Expression>>,
}

#[derive(Debug, Clone)]
pub struct Arm {
    pub pattern: Pattern,
    pub body: Spanned<Expression>,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(Literal),
    Alias { name: String },
    WildCard,
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! parse_and_test {
        ($code:expr, $test:expr) => {{
            let program = compile(&ScriptSource::from($code)).unwrap();
            let expr = &program.items.into_iter().last().unwrap().node;
            $test(expr)
        }};
    }

    #[test]
    fn test_text_literal_with_interpolation() {
        parse_and_test!("TEXT { {record.initial}-{head} }", |expr: &Expression| {
            if let Expression::TextLiteral { parts } = expr {
                assert_eq!(parts.len(), 3);
                assert!(
                    matches!(&parts[0], TextPart::Interpolation { path } if path == &["record", "initial"])
                );
                assert!(matches!(&parts[1], TextPart::Text(text) if text == "-"));
                assert!(matches!(&parts[2], TextPart::Interpolation { path } if path == &["head"]));
            } else {
                panic!("Expected TextLiteral, got {:?}", expr);
            }
        });
    }

    #[test]
    fn test_when_statement() {
        parse_and_test!("x |> WHEN { True => 1, __ => 0 }", |expr: &Expression| {
            let Expression::Pipe { to, .. } = expr else {
                panic!("Expected Pipe, got {:?}", expr);
            };
            if let Expression::When { arms } = &to.node {
                assert_eq!(arms.len(), 2);
                assert!(matches!(arms[1].pattern, Pattern::WildCard));
            } else {
                panic!("Expected When, got {:?}", to.node);
            }
        });
    }

    #[test]
    fn test_block_statement() {
        parse_and_test!("BLOCK {\nx: 1\ny: 2\nx\n}", |expr: &Expression| {
            if let Expression::Block { variables, output } = expr {
                assert_eq!(variables.len(), 2);
                assert!(matches!(output.node, Expression::Alias { .. }));
            } else {
                panic!("Expected Block, got {:?}", expr);
            }
        });
    }

    #[test]
    fn test_function_call_path_and_shorthand_argument() {
        parse_and_test!("Record/is(record, expr: '幫母')", |expr: &Expression| {
            let Expression::FunctionCall { path, arguments } = expr else {
                panic!("Expected FunctionCall, got {:?}", expr);
            };
            assert_eq!(path, &["Record", "is"]);
            assert_eq!(arguments.len(), 2);
            assert_eq!(arguments[0].node.name, "record");
            assert!(arguments[0].node.value.is_none());
            assert!(arguments[1].node.value.is_some());
        });
    }

    #[test]
    fn test_coalesce_binds_tighter_than_pipe() {
        parse_and_test!("options.x ?? 1 |> Number/to_text()", |expr: &Expression| {
            let Expression::Pipe { from, .. } = expr else {
                panic!("Expected Pipe, got {:?}", expr);
            };
            assert!(matches!(from.node, Expression::Coalesce { .. }));
        });
    }

    #[test]
    fn test_not_wraps_comparison() {
        parse_and_test!("NOT a == b AND c", |expr: &Expression| {
            let Expression::Logical(Logical::And { operand_a, .. }) = expr else {
                panic!("Expected And, got {:?}", expr);
            };
            let Expression::Logical(Logical::Not { operand }) = &operand_a.node else {
                panic!("Expected Not, got {:?}", operand_a.node);
            };
            assert!(matches!(
                operand.node,
                Expression::Comparator { comparison: Comparison::Equal, .. }
            ));
        });
    }

    #[test]
    fn test_arithmetic_precedence() {
        parse_and_test!("1 + 2 * 3", |expr: &Expression| {
            let Expression::ArithmeticOperator { operator, operand_b, .. } = expr else {
                panic!("Expected arithmetic, got {:?}", expr);
            };
            assert_eq!(*operator, Arithmetic::Add);
            assert!(matches!(
                operand_b.node,
                Expression::ArithmeticOperator { operator: Arithmetic::Multiply, .. }
            ));
        });
    }

    #[test]
    fn test_top_level_items() {
        let program = compile(&ScriptSource::from(
            "-- a comment\nFUNCTION twice(x) { x + x }\nvalue: 2\ntwice(x: value)\n",
        ))
        .unwrap();
        assert_eq!(program.items.len(), 3);
        assert_eq!(program.functions().count(), 1);
        assert!(matches!(program.items[1].node, Expression::Variable(_)));
    }

    #[test]
    fn test_line_starting_with_minus_is_a_new_item() {
        let program = compile(&ScriptSource::from("x: 5\n-1")).unwrap();
        assert_eq!(program.items.len(), 2);
        let Expression::Variable(variable) = &program.items[0].node else {
            panic!("Expected Variable, got {:?}", program.items[0].node);
        };
        assert!(matches!(
            variable.value.node,
            Expression::Literal(Literal::Number(number)) if number == 5.0
        ));
        assert!(matches!(program.items[1].node, Expression::Negate { .. }));
    }

    #[test]
    fn test_pipe_continues_on_next_line() {
        parse_and_test!("'a'\n    |> Text/length()\n    |> Number/to_text()", |expr: &Expression| {
            let Expression::Pipe { from, .. } = expr else {
                panic!("Expected Pipe, got {:?}", expr);
            };
            assert!(matches!(from.node, Expression::Pipe { .. }));
        });
        let program = compile(&ScriptSource::from("(\n  1 +\n  2\n)")).unwrap();
        assert_eq!(program.items.len(), 1);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let error = compile(&ScriptSource::from("LIST { 1, ")).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Syntax { .. }));
    }
}
