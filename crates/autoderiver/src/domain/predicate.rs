//! Membership predicates such as `幫組 或 (見母 且 開口)`.

use std::fmt;

use chumsky::prelude::*;
use thiserror::Error;

use super::CategoryRecord;
use super::record::{DIVISIONS, RARE_CLASSES, ROUNDINGS, TONES};

const MAX_GROUP_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("cannot parse '{expr}': {}", messages.join("; "))]
    Syntax { expr: String, messages: Vec<String> },
    #[error("unknown term '{0}'")]
    UnknownTerm(String),
    #[error("group definitions nest too deeply at '{0}'")]
    GroupTooDeep(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Word(String),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'code> {
    Word(&'code str),
    Or,
    And,
    Not,
    Open,
    Close,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => f.write_str(word),
            Token::Or => f.write_str("或"),
            Token::And => f.write_str("且"),
            Token::Not => f.write_str("非"),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
        }
    }
}

/// A parsed predicate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    root: Node,
}

fn lexer<'code>() -> impl Parser<'code, &'code str, Vec<Token<'code>>, extra::Err<Rich<'code, char>>>
{
    let word = any()
        .filter(|c: &char| !c.is_whitespace() && !matches!(c, '(' | ')' | '（' | '）'))
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|word: &str| match word {
            "或" => Token::Or,
            "且" => Token::And,
            "非" => Token::Not,
            word => Token::Word(word),
        });

    choice((
        one_of("(（").to(Token::Open),
        one_of(")）").to(Token::Close),
        word,
    ))
    .padded()
    .repeated()
    .collect()
}

fn parser<'tokens, 'code: 'tokens>()
-> impl Parser<'tokens, &'tokens [Token<'code>], Node, extra::Err<Rich<'tokens, Token<'code>>>> {
    recursive(|expression| {
        let word = select! { Token::Word(word) => Node::Word(word.to_owned()) };
        let atom = word.or(expression.delimited_by(just(Token::Open), just(Token::Close)));

        let unary = just(Token::Not)
            .repeated()
            .foldr(atom, |_, operand| Node::Not(Box::new(operand)));

        let conjunction = unary.clone().foldl(
            just(Token::And).or_not().ignore_then(unary).repeated(),
            |a, b| Node::And(Box::new(a), Box::new(b)),
        );

        conjunction.clone().foldl(
            just(Token::Or).ignore_then(conjunction).repeated(),
            |a, b| Node::Or(Box::new(a), Box::new(b)),
        )
    })
}

impl Predicate {
    pub fn parse(expr: &str) -> Result<Self, PredicateError> {
        let syntax = |messages: Vec<String>| PredicateError::Syntax {
            expr: expr.to_owned(),
            messages,
        };
        let tokens = lexer()
            .parse(expr)
            .into_result()
            .map_err(|errors| syntax(errors.iter().map(ToString::to_string).collect()))?;
        let root = parser()
            .parse(tokens.as_slice())
            .into_result()
            .map_err(|errors| syntax(errors.iter().map(ToString::to_string).collect()))?;
        Ok(Self { root })
    }

    /// Test `record`. Words that are not feature sets are looked up through
    /// `group`.
    pub fn matches(
        &self,
        record: CategoryRecord,
        group: &dyn Fn(&str) -> Option<Predicate>,
    ) -> Result<bool, PredicateError> {
        eval(&self.root, record, group, 0)
    }
}

fn eval(
    node: &Node,
    record: CategoryRecord,
    group: &dyn Fn(&str) -> Option<Predicate>,
    depth: usize,
) -> Result<bool, PredicateError> {
    match node {
        Node::Word(word) => {
            if let Some(definition) = group(word) {
                if depth >= MAX_GROUP_DEPTH {
                    return Err(PredicateError::GroupTooDeep(word.clone()));
                }
                return eval(&definition.root, record, group, depth + 1);
            }
            feature_matches(word, record)
        }
        Node::Not(operand) => Ok(!eval(operand, record, group, depth)?),
        Node::And(a, b) => Ok(eval(a, record, group, depth)? && eval(b, record, group, depth)?),
        Node::Or(a, b) => Ok(eval(a, record, group, depth)? || eval(b, record, group, depth)?),
    }
}

fn feature_matches(word: &str, record: CategoryRecord) -> Result<bool, PredicateError> {
    let unknown = || PredicateError::UnknownTerm(word.to_owned());
    let mut values = word.chars();
    let suffix = values.next_back().ok_or_else(unknown)?;
    let values = values.as_str();
    if values.is_empty() {
        return Err(unknown());
    }
    let within = |allowed: &[char]| values.chars().all(|value| allowed.contains(&value));
    let accepts = |feature: Option<char>| feature.is_some_and(|feature| values.contains(feature));
    match suffix {
        '母' => Ok(accepts(Some(record.initial))),
        '韻' => Ok(accepts(Some(record.rhyme))),
        '口' if within(&ROUNDINGS) => Ok(accepts(record.rounding)),
        '等' if within(&DIVISIONS) => Ok(accepts(Some(record.division))),
        '類' if within(&RARE_CLASSES) => Ok(accepts(record.rare)),
        '聲' => match values {
            "仄" => Ok(record.tone != '平'),
            "舒" => Ok(record.tone != '入'),
            _ if within(&TONES) => Ok(accepts(Some(record.tone))),
            _ => Err(unknown()),
        },
        _ => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(description: &str) -> CategoryRecord {
        description.parse().unwrap()
    }

    fn is(description: &str, expr: &str) -> bool {
        let groups = |name: &str| match name {
            "脣音" => Some(Predicate::parse("幫滂並明母").unwrap()),
            "重紐韻" => Some(Predicate::parse("支脂祭眞仙宵侵鹽韻").unwrap()),
            _ => None,
        };
        Predicate::parse(expr)
            .unwrap()
            .matches(record(description), &groups)
            .unwrap()
    }

    #[test]
    fn feature_sets() {
        assert!(is("幫三A眞平", "幫母"));
        assert!(is("幫三A眞平", "三等"));
        assert!(is("幫三A眞平", "A類"));
        assert!(is("見開一歌平", "開口"));
        assert!(!is("幫三A眞平", "開口"));
        assert!(is("見開一歌平", "一二等"));
        assert!(is("匣合四先入", "仄聲"));
    }

    #[test]
    fn connectives_and_groups() {
        assert!(is("幫三A眞平", "脣音 且 重紐韻"));
        assert!(is("幫三A眞平", "脣音 重紐韻"));
        assert!(is("見開一歌平", "脣音 或 歌韻"));
        assert!(is("見開一歌平", "非 脣音"));
        assert!(!is("見開一歌平", "非 (見母 或 幫母)"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // 見母 或 (幫母 且 上聲)
        assert!(is("見開一歌平", "見母 或 幫母 上聲"));
    }

    #[test]
    fn unknown_words_are_errors() {
        let error = Predicate::parse("火星母音")
            .unwrap()
            .matches(record("幫三A眞平"), &|_| None)
            .unwrap_err();
        assert_eq!(error, PredicateError::UnknownTerm("火星母音".to_owned()));
        assert!(matches!(
            Predicate::parse("(幫母"),
            Err(PredicateError::Syntax { .. })
        ));
        assert!(Predicate::parse("").is_err());
    }

    #[test]
    fn self_referencing_group_is_bounded() {
        let looping = |_: &str| Some(Predicate::parse("環").unwrap());
        let error = Predicate::parse("環")
            .unwrap()
            .matches(record("幫三A眞平"), &looping)
            .unwrap_err();
        assert!(matches!(error, PredicateError::GroupTooDeep(_)));
    }
}
