//! The phonological category domain: records, membership predicates and the
//! character table the engine derives against.

mod record;
pub use record::{CategoryRecord, DescriptionError};

mod predicate;
pub use predicate::{Predicate, PredicateError};

mod table;
pub use table::{DomainTable, EntryRow, RecordRow, TableDomain, TableError};

/// One reading of a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub record: CategoryRecord,
    pub gloss: Option<String>,
}

/// The opaque oracle the engine derives against.
pub trait CategoryDomain {
    /// Every record, in a fixed enumeration order. Restartable.
    fn all_records(&self) -> Box<dyn Iterator<Item = CategoryRecord> + '_>;

    fn describe(&self, record: CategoryRecord) -> String {
        record.description()
    }

    fn belongs_to(&self, record: CategoryRecord, expr: &str) -> Result<bool, PredicateError>;

    /// Readings of `character`, in domain order.
    fn lookup_by_character(&self, character: char) -> Vec<Entry>;

    /// Orthographic variants of `character`, excluding itself.
    fn variants(&self, _character: char) -> Vec<char> {
        Vec::new()
    }

    fn parse_description(&self, description: &str) -> Result<CategoryRecord, DescriptionError> {
        description.parse()
    }

    /// A character that represents `record` in exports.
    fn representative(&self, record: CategoryRecord) -> Option<char>;
}
