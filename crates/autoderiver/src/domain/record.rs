use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ROUNDINGS: [char; 2] = ['開', '合'];
pub const DIVISIONS: [char; 4] = ['一', '二', '三', '四'];
pub const RARE_CLASSES: [char; 3] = ['A', 'B', 'C'];
pub const TONES: [char; 4] = ['平', '上', '去', '入'];

/// One phonological position.
///
/// Serializes as its canonical description, e.g. `幫三A眞平`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CategoryRecord {
    pub initial: char,
    pub rounding: Option<char>,
    pub division: char,
    pub rare: Option<char>,
    pub rhyme: char,
    pub tone: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid category description '{description}': {reason}")]
pub struct DescriptionError {
    pub description: String,
    pub reason: &'static str,
}

impl CategoryRecord {
    pub fn description(&self) -> String {
        self.to_string()
    }

    pub fn without_rounding(self) -> Self {
        Self {
            rounding: None,
            ..self
        }
    }

    pub fn without_rare(self) -> Self {
        Self { rare: None, ..self }
    }
}

impl fmt::Display for CategoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.initial)?;
        if let Some(rounding) = self.rounding {
            write!(f, "{rounding}")?;
        }
        write!(f, "{}", self.division)?;
        if let Some(rare) = self.rare {
            write!(f, "{rare}")?;
        }
        write!(f, "{}{}", self.rhyme, self.tone)
    }
}

impl FromStr for CategoryRecord {
    type Err = DescriptionError;

    fn from_str(description: &str) -> Result<Self, Self::Err> {
        let error = |reason| DescriptionError {
            description: description.to_owned(),
            reason,
        };
        let mut chars = description.chars().peekable();
        let initial = chars.next().ok_or_else(|| error("empty description"))?;
        let rounding = chars.next_if(|c| ROUNDINGS.contains(c));
        let division = chars
            .next_if(|c| DIVISIONS.contains(c))
            .ok_or_else(|| error("expected a division (一二三四)"))?;
        let rare = chars.next_if(|c| RARE_CLASSES.contains(c));
        let rhyme = chars.next().ok_or_else(|| error("missing rhyme"))?;
        let tone = chars
            .next_if(|c| TONES.contains(c))
            .ok_or_else(|| error("expected a tone (平上去入)"))?;
        if chars.next().is_some() {
            return Err(error("trailing characters"));
        }
        Ok(Self {
            initial,
            rounding,
            division,
            rare,
            rhyme,
            tone,
        })
    }
}

impl From<CategoryRecord> for String {
    fn from(record: CategoryRecord) -> Self {
        record.description()
    }
}

impl TryFrom<String> for CategoryRecord {
    type Error = DescriptionError;

    fn try_from(description: String) -> Result<Self, Self::Error> {
        description.parse()
    }
}
