use serde::Serialize;
use tracing::debug;

use super::{Outputs, outputs_key};
use crate::domain::{CategoryDomain, CategoryRecord, Entry};
use crate::error::EngineError;
use crate::format::plain_text;
use crate::require::Resolver;

/// One character of an article, with the reading its `字(描述)` annotation
/// asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleToken {
    pub character: char,
    pub requested: Option<CategoryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub record: CategoryRecord,
    /// The character the reading was found under; differs from the article
    /// character for variants.
    pub character: char,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
}

/// Readings whose outputs are identical, presented as one choice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateGroup {
    pub outputs: Outputs,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArticleSegment {
    Text {
        text: String,
    },
    Character {
        character: char,
        groups: Vec<CandidateGroup>,
        selected: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Article {
    pub segments: Vec<ArticleSegment>,
}

impl Article {
    fn push_text(&mut self, character: char) {
        if let Some(ArticleSegment::Text { text }) = self.segments.last_mut() {
            text.push(character);
        } else {
            self.segments.push(ArticleSegment::Text {
                text: character.to_string(),
            });
        }
    }

    /// `字(selected|other)` for every annotated character.
    pub fn plain_text(&self) -> String {
        let group_text = |group: &CandidateGroup| {
            group
                .outputs
                .iter()
                .map(|nodes| plain_text(nodes))
                .collect::<Vec<_>>()
                .join(" / ")
        };
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                ArticleSegment::Text { text: plain } => text.push_str(plain),
                ArticleSegment::Character {
                    character,
                    groups,
                    selected,
                } => {
                    let mut alternatives = Vec::with_capacity(groups.len());
                    alternatives.extend(groups.get(*selected).map(group_text));
                    alternatives.extend(
                        groups
                            .iter()
                            .enumerate()
                            .filter(|(index, _)| index != selected)
                            .map(|(_, group)| group_text(group)),
                    );
                    text.push(*character);
                    text.push('(');
                    text.push_str(&alternatives.join("|"));
                    text.push(')');
                }
            }
        }
        text
    }
}

/// Split an article into characters, recognizing `字(描述)` annotations.
/// Parentheses that do not hold a valid description stay in the text.
pub fn tokenize_article(article: &str, domain: &dyn CategoryDomain) -> Vec<ArticleToken> {
    let chars = article.chars().collect::<Vec<_>>();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut index = 0;
    while index < chars.len() {
        let character = chars[index];
        index += 1;
        let requested = annotation(&chars[index..]).and_then(|(description, length)| {
            let record = domain.parse_description(&description).ok()?;
            Some((record, length))
        });
        match requested {
            Some((record, length)) => {
                index += length;
                tokens.push(ArticleToken {
                    character,
                    requested: Some(record),
                });
            }
            None => tokens.push(ArticleToken {
                character,
                requested: None,
            }),
        }
    }
    tokens
}

/// `(…)` at the start of `rest`: its content and its length in chars.
fn annotation(rest: &[char]) -> Option<(String, usize)> {
    let (open, rest) = rest.split_first()?;
    let close = match open {
        '(' => ')',
        '（' => '）',
        _ => return None,
    };
    let end = rest.iter().position(|c| *c == close)?;
    Some((rest[..end].iter().collect(), end + 2))
}

fn candidates(domain: &dyn CategoryDomain, character: char, convert_variants: bool) -> Vec<(char, Entry)> {
    let mut candidates = domain
        .lookup_by_character(character)
        .into_iter()
        .map(|entry| (character, entry))
        .collect::<Vec<_>>();
    if convert_variants {
        for variant in domain.variants(character) {
            for entry in domain.lookup_by_character(variant) {
                if !candidates.iter().any(|(_, known)| known.record == entry.record) {
                    candidates.push((variant, entry));
                }
            }
        }
    }
    candidates
}

/// Group the readings of one character by output.
fn group(
    resolver: &Resolver<'_>,
    groups: &mut Vec<CandidateGroup>,
    keys: &mut Vec<String>,
    candidate: Candidate,
) -> Result<usize, EngineError> {
    let head = candidate.character.to_string();
    let outputs = resolver.derive_all(candidate.record, Some(&head))?;
    let key = outputs_key(&outputs);
    match keys.iter().position(|known| *known == key) {
        Some(index) => {
            groups[index].candidates.push(candidate);
            Ok(index)
        }
        None => {
            keys.push(key);
            groups.push(CandidateGroup {
                outputs,
                candidates: vec![candidate],
            });
            Ok(groups.len() - 1)
        }
    }
}

/// Annotate every character of `article` with its derived readings.
///
/// The first reading in domain order is pre-selected unless the character
/// carries an annotation; an annotated reading that is not among the
/// candidates is derived and added.
pub fn evaluate_article(
    resolver: &Resolver<'_>,
    article: &str,
    convert_variants: bool,
) -> Result<Article, EngineError> {
    let domain = resolver.domain();
    let mut result = Article::default();
    for token in tokenize_article(article, domain) {
        let found = candidates(domain, token.character, convert_variants);
        if found.is_empty() && token.requested.is_none() {
            result.push_text(token.character);
            continue;
        }

        let mut groups = Vec::new();
        let mut keys = Vec::new();
        for (character, entry) in found {
            group(
                resolver,
                &mut groups,
                &mut keys,
                Candidate {
                    record: entry.record,
                    character,
                    gloss: entry.gloss,
                },
            )?;
        }

        let selected = match token.requested {
            None => 0,
            Some(record) => {
                let known = groups.iter().position(|group| {
                    group
                        .candidates
                        .iter()
                        .any(|candidate| candidate.record == record)
                });
                match known {
                    Some(index) => index,
                    None => group(
                        resolver,
                        &mut groups,
                        &mut keys,
                        Candidate {
                            record,
                            character: token.character,
                            gloss: None,
                        },
                    )?,
                }
            }
        };

        result.segments.push(ArticleSegment::Character {
            character: token.character,
            groups,
            selected,
        });
    }
    debug!(segments = result.segments.len(), "article evaluated");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TableDomain;

    #[test]
    fn annotations_need_a_valid_description() {
        let domain = TableDomain::default();
        let tokens = tokenize_article("行(匣開二庚平)x(y)", &domain);
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0].character, '行');
        assert_eq!(
            tokens[0].requested.map(|record| record.description()),
            Some("匣開二庚平".to_owned())
        );
        assert_eq!(
            tokens.iter().skip(1).map(|token| token.character).collect::<String>(),
            "x(y)"
        );
    }

    #[test]
    fn full_width_parentheses_are_accepted() {
        let domain = TableDomain::default();
        let tokens = tokenize_article("行（匣開二庚平）", &domain);
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].requested.is_some());
    }
}
