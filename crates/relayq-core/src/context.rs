//! Page-context reader port.
//!
//! Read-only key/value lookup, queried only at enqueue time for a fixed
//! small set of fields that get snapshotted into item metadata.

use std::collections::HashMap;

pub const URL_FIELD: &str = "url";
pub const ENTITY_BUNDLE_FIELD: &str = "entityBundle";
pub const ENTITY_NID_FIELD: &str = "entityNid";
pub const ENTITY_TNID_FIELD: &str = "entityTnid";

pub trait ContextReader: Send + Sync {
    /// Look up one context field. `None` when the field is not known.
    fn get(&self, field: &str) -> Option<String>;
}

/// Map-backed reader for embeddings and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    fields: HashMap<String, String>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

impl ContextReader for StaticContext {
    fn get(&self, field: &str) -> Option<String> {
        self.fields.get(field).cloned()
    }
}
