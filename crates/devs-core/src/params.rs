//! Run parameters handed to every model before a run.
//!
//! Parameters are keyed by `(model URI, name)` so that one map can configure
//! a whole tree; each model looks up only its own entries.  Values are stored
//! type-erased and shared (`Arc`) so the same map can be reused across runs
//! and sent to a real-time driver thread.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type ParamValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct RunParameters {
    entries: HashMap<(String, String), ParamValue>,
}

impl RunParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` for the model `model_uri`, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        model_uri: impl Into<String>,
        name: impl Into<String>,
        value: T,
    ) -> &mut Self {
        self.entries.insert((model_uri.into(), name.into()), Arc::new(value));
        self
    }

    /// Builder-style [`insert`][Self::insert].
    pub fn with<T: Any + Send + Sync>(
        mut self,
        model_uri: impl Into<String>,
        name: impl Into<String>,
        value: T,
    ) -> Self {
        self.insert(model_uri, name, value);
        self
    }

    /// The value of `name` for `model_uri`, `None` if absent or of another type.
    pub fn get<T: Any>(&self, model_uri: &str, name: &str) -> Option<&T> {
        self.entries
            .get(&(model_uri.to_owned(), name.to_owned()))?
            .downcast_ref::<T>()
    }

    pub fn contains(&self, model_uri: &str, name: &str) -> bool {
        self.entries.contains_key(&(model_uri.to_owned(), name.to_owned()))
    }

    /// Names of every parameter addressed to `model_uri`.
    pub fn names_for<'a>(&'a self, model_uri: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .keys()
            .filter(move |(uri, _)| uri == model_uri)
            .map(|(_, name)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .map(|(uri, name)| format!("{uri}:{name}"))
            .collect();
        keys.sort();
        f.debug_struct("RunParameters").field("keys", &keys).finish()
    }
}
