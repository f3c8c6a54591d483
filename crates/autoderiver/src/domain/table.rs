//! A category domain loaded from a JSON table.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{CategoryDomain, CategoryRecord, Entry, Predicate, PredicateError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainTable {
    /// Named groups usable as predicate words, e.g. `"脣音": "幫滂並明母"`.
    #[serde(default)]
    pub groups: IndexMap<String, String>,
    pub records: Vec<RecordRow>,
    /// Character to its orthographic variants, e.g. `"峯": "峰"`.
    #[serde(default)]
    pub variants: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    pub description: CategoryRecord,
    #[serde(default)]
    pub characters: Vec<EntryRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRow {
    pub character: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read domain table: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed domain table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("group '{name}': {source}")]
    Group {
        name: String,
        source: PredicateError,
    },
    #[error("record {0} is listed twice")]
    DuplicateRecord(CategoryRecord),
}

#[derive(Debug, Default)]
pub struct TableDomain {
    records: Vec<CategoryRecord>,
    entries: HashMap<char, Vec<Entry>>,
    representatives: HashMap<CategoryRecord, char>,
    variants: HashMap<char, Vec<char>>,
    groups: HashMap<String, Predicate>,
    parsed: RefCell<HashMap<String, Predicate>>,
}

impl TableDomain {
    pub fn from_table(table: DomainTable) -> Result<Self, TableError> {
        let mut domain = Self::default();

        for (name, definition) in table.groups {
            let predicate = Predicate::parse(&definition).map_err(|source| TableError::Group {
                name: name.clone(),
                source,
            })?;
            domain.groups.insert(name, predicate);
        }

        let mut seen = HashSet::with_capacity(table.records.len());
        for row in table.records {
            if !seen.insert(row.description) {
                return Err(TableError::DuplicateRecord(row.description));
            }
            domain.records.push(row.description);
            if let Some(first) = row.characters.first() {
                domain.representatives.insert(row.description, first.character);
            }
            for entry in row.characters {
                domain.entries.entry(entry.character).or_default().push(Entry {
                    record: row.description,
                    gloss: entry.gloss,
                });
            }
        }

        for (character, variants) in table.variants {
            let Some(character) = character.chars().next() else {
                continue;
            };
            for variant in variants.chars().filter(|variant| *variant != character) {
                push_unique(domain.variants.entry(character).or_default(), variant);
                push_unique(domain.variants.entry(variant).or_default(), character);
            }
        }

        debug!(
            records = domain.records.len(),
            characters = domain.entries.len(),
            groups = domain.groups.len(),
            "domain table loaded"
        );
        Ok(domain)
    }

    pub fn from_json(json: &str) -> Result<Self, TableError> {
        Self::from_table(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn push_unique(list: &mut Vec<char>, character: char) {
    if !list.contains(&character) {
        list.push(character);
    }
}

impl CategoryDomain for TableDomain {
    fn all_records(&self) -> Box<dyn Iterator<Item = CategoryRecord> + '_> {
        Box::new(self.records.iter().copied())
    }

    fn belongs_to(&self, record: CategoryRecord, expr: &str) -> Result<bool, PredicateError> {
        let cached = self.parsed.borrow().get(expr).cloned();
        let predicate = match cached {
            Some(predicate) => predicate,
            None => {
                let predicate = Predicate::parse(expr)?;
                self.parsed
                    .borrow_mut()
                    .insert(expr.to_owned(), predicate.clone());
                predicate
            }
        };
        predicate.matches(record, &|name| self.groups.get(name).cloned())
    }

    fn lookup_by_character(&self, character: char) -> Vec<Entry> {
        self.entries.get(&character).cloned().unwrap_or_default()
    }

    fn variants(&self, character: char) -> Vec<char> {
        self.variants.get(&character).cloned().unwrap_or_default()
    }

    fn representative(&self, record: CategoryRecord) -> Option<char> {
        self.representatives.get(&record).copied()
    }
}
