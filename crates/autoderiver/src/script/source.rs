//! Script source text management.
//!
//! A `ScriptSource` is the full text of one schema. It is immutable: every
//! edit produces a new `ScriptSource` and the old one stays valid for as
//! long as anything (a compiled program, an error report) still holds it.
//!
//! The text is wrapped in `Arc<str>` so clones are cheap and the compiled
//! program, the diagnostics and the application state can all share one
//! allocation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Immutable, cheaply clonable script text.
#[derive(Clone)]
pub struct ScriptSource(Arc<str>);

impl ScriptSource {
    /// Create a new source from anything string-like.
    pub fn new(code: impl Into<Arc<str>>) -> Self {
        ScriptSource(code.into())
    }

    /// Get the full source as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the source in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the source is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both values share the same allocation.
    pub fn ptr_eq(&self, other: &ScriptSource) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for ScriptSource {
    fn default() -> Self {
        ScriptSource::new("")
    }
}

impl fmt::Debug for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptSource({} bytes)", self.0.len())
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for ScriptSource {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for ScriptSource {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.as_str() == other.as_str()
    }
}

impl Eq for ScriptSource {}

impl Hash for ScriptSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<&str> for ScriptSource {
    fn from(code: &str) -> Self {
        ScriptSource::new(code)
    }
}

impl From<String> for ScriptSource {
    fn from(code: String) -> Self {
        ScriptSource::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_allocation() {
        let source = ScriptSource::from("'a'");
        let clone = source.clone();
        assert!(source.ptr_eq(&clone));
        assert_eq!(source, clone);
    }

    #[test]
    fn equal_text_is_equal_source() {
        assert_eq!(ScriptSource::from("x"), ScriptSource::from(String::from("x")));
        assert!(!ScriptSource::from("x").ptr_eq(&ScriptSource::from("x")));
    }
}
