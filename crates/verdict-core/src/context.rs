use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EvaluationError, EvaluationResult};
use crate::value::{Type, Value};

// ---------------------------------------------------------------------------
// ContentStore — external lookup data for selector expressions
// ---------------------------------------------------------------------------

/// Minimal interface to externally managed lookup data. Implementations are
/// read-only during evaluation and swapped wholesale with the same
/// discipline as the policy root.
pub trait ContentStore: Send + Sync {
    /// Resolves one item of content under the given evaluated keys.
    fn lookup(&self, item: &str, keys: &[Value]) -> EvaluationResult<Value>;
}

/// Table-backed content store: item name, then the display form of the
/// first key. Enough for tests and for small static data sets.
#[derive(Default)]
pub struct TableContentStore {
    tables: HashMap<String, HashMap<String, Value>>,
}

impl TableContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(
        mut self,
        item: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.tables
            .entry(item.into())
            .or_default()
            .insert(key.into(), value);
        self
    }
}

impl ContentStore for TableContentStore {
    fn lookup(&self, item: &str, keys: &[Value]) -> EvaluationResult<Value> {
        let table = self
            .tables
            .get(item)
            .ok_or_else(|| EvaluationError::function("select", format!("no content item {:?}", item)))?;
        let key = keys
            .first()
            .ok_or_else(|| EvaluationError::function("select", "no key given"))?;
        table
            .get(&key.to_string())
            .cloned()
            .ok_or_else(|| EvaluationError::function("select", format!("no entry for key {}", key)))
    }
}

// ---------------------------------------------------------------------------
// Context — the immutable per-request attribute bag
// ---------------------------------------------------------------------------

/// Attribute mapping for one request. Built once by the transport, then
/// read-only for the whole evaluation.
#[derive(Clone, Default)]
pub struct Context {
    attributes: HashMap<String, Value>,
    content: Option<Arc<dyn ContentStore>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one attribute; later inserts with the same id win.
    pub fn with_attribute(mut self, id: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(id.into(), value);
        self
    }

    pub fn with_content(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    /// Looks an attribute up by id and expected type. An absent id and a
    /// present id of the wrong type are the same failure: the typed
    /// attribute the caller asked for is missing.
    pub fn attribute(&self, id: &str, ty: Type) -> EvaluationResult<&Value> {
        match self.attributes.get(id) {
            Some(value) if value.type_of() == ty => Ok(value),
            _ => Err(EvaluationError::missing_attribute(id, ty)),
        }
    }

    pub fn content(&self) -> Option<&dyn ContentStore> {
        self.content.as_deref()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Context {
            attributes: iter.into_iter().collect(),
            content: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("attributes", &self.attributes)
            .field("content", &self.content.as_ref().map(|_| "..."))
            .finish()
    }
}
