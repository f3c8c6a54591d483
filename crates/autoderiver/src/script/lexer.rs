use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Number(f64),
    Pipe,
    Coalesce,
    Wildcard,
    Implies,
    Colon,
    Comma,
    Dot,
    Newline,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Equal,
    Minus,
    Plus,
    Asterisk,
    Slash,
    Text(&'code str),
    SnakeCaseIdentifier(&'code str),
    PascalCaseIdentifier(&'code str),
    List,
    Function,
    When,
    Block,
    And,
    Or,
    Not,
    /// Raw content between `TEXT {` and the matching `}`.
    TextContent(&'code str),
}

impl Token<'_> {
    fn symbol(&self) -> Option<&'static str> {
        Some(match self {
            Self::BracketRoundOpen => "(",
            Self::BracketRoundClose => ")",
            Self::BracketCurlyOpen => "{",
            Self::BracketCurlyClose => "}",
            Self::BracketSquareOpen => "[",
            Self::BracketSquareClose => "]",
            Self::Pipe => "|>",
            Self::Coalesce => "??",
            Self::Wildcard => "__",
            Self::Implies => "=>",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Newline => "newline",
            Self::NotEqual => "=/=",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
            Self::LessOrEqual => "<=",
            Self::Less => "<",
            Self::Equal => "==",
            Self::Minus => "-",
            Self::Plus => "+",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::List => "LIST",
            Self::Function => "FUNCTION",
            Self::When => "WHEN",
            Self::Block => "BLOCK",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            _ => return None,
        })
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(symbol) = self.symbol() {
            return f.write_str(symbol);
        }
        match self {
            Self::Comment(comment) => f.write_str(comment),
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "'{text}'"),
            Self::SnakeCaseIdentifier(name) | Self::PascalCaseIdentifier(name) => f.write_str(name),
            Self::TextContent(content) => write!(f, "TEXT {{ {content} }}"),
            _ => Ok(()),
        }
    }
}

fn keyword(word: &str) -> Option<Token<'static>> {
    Some(match word {
        "LIST" => Token::List,
        "FUNCTION" => Token::Function,
        "WHEN" => Token::When,
        "BLOCK" => Token::Block,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        _ => return None,
    })
}

/// Sort an ASCII word into an identifier or a keyword.
///
/// `snake_case` names start lowercase; tags start uppercase and contain a
/// lowercase letter or digit (or are a single letter); all-caps words are
/// keywords.
fn classify(word: &str) -> Result<Token<'_>, String> {
    let mut chars = word.chars();
    let first = chars.next().unwrap_or('_');
    let rest = chars.as_str();
    if first.is_ascii_lowercase()
        && rest
            .chars()
            .all(|c| c == '_' || c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Ok(Token::SnakeCaseIdentifier(word));
    }
    if first.is_ascii_uppercase() && !word.contains('_') {
        if rest.is_empty() || rest.chars().any(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Ok(Token::PascalCaseIdentifier(word));
        }
        return keyword(word).ok_or_else(|| format!("unknown keyword '{word}'"));
    }
    Err(format!(
        "'{word}' is neither a snake_case name, a PascalCase tag nor a keyword"
    ))
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    // Longest symbols first so `=/=`, `>=` and `|>` win over their prefixes.
    let symbol = choice((
        just("=/=").to(Token::NotEqual),
        just("|>").to(Token::Pipe),
        just("??").to(Token::Coalesce),
        just("__").to(Token::Wildcard),
        just("=>").to(Token::Implies),
        just(">=").to(Token::GreaterOrEqual),
        just("<=").to(Token::LessOrEqual),
        just("==").to(Token::Equal),
        one_of("(){}[]:,.><-+*/").map(|c| match c {
            '(' => Token::BracketRoundOpen,
            ')' => Token::BracketRoundClose,
            '{' => Token::BracketCurlyOpen,
            '}' => Token::BracketCurlyClose,
            '[' => Token::BracketSquareOpen,
            ']' => Token::BracketSquareClose,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '>' => Token::Greater,
            '<' => Token::Less,
            '-' => Token::Minus,
            '+' => Token::Plus,
            '*' => Token::Asterisk,
            _ => Token::Slash,
        }),
    ));

    let comment = just("--")
        .then(none_of("\r\n").repeated())
        .to_slice()
        .map(|comment: &str| Token::Comment(comment.trim_end()));

    // Unsigned; `-` is a prefix operator in the parser.
    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    // Text literals take any character except the closing quote, CJK
    // included; there are no escapes.
    let text = none_of('\'')
        .repeated()
        .to_slice()
        .delimited_by(just('\''), just('\''))
        .map(Token::Text);

    let word = text::ascii::ident().try_map(|word: &str, span| {
        classify(word).map_err(|message| ParseError::custom(span, message))
    });

    // Nested braces are kept so `{name}` interpolations stay inside.
    let braced = recursive(|braced| {
        choice((
            braced.delimited_by(just('{'), just('}')).to_slice(),
            none_of("{}").to_slice(),
        ))
        .repeated()
        .to_slice()
    });

    let text_content = just("TEXT")
        .then(text::inline_whitespace())
        .ignore_then(braced.delimited_by(just('{'), just('}')))
        .map(|content: &str| Token::TextContent(content.trim()));

    choice((
        comment,
        text_content,
        text::newline().to(Token::Newline),
        number,
        text,
        symbol,
        word,
    ))
    .map_with(|token, extra| Spanned {
        node: token,
        span: extra.span(),
    })
    .padded_by(text::inline_whitespace())
    .recover_with(skip_then_retry_until(any().ignored(), end()))
    .repeated()
    .collect()
}
