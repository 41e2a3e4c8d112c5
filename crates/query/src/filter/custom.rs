//! Custom filter handlers.
//!
//! Configuration maps an operator key to a handler name
//! (`custom_filters: {"near": "geo_near"}`); the handler itself is
//! registered in code and looked up by name each time the operator is used.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::predicate::Predicate;

/// A pluggable filter operator.
pub trait CustomFilter: Send + Sync {
    /// Checks the operand before anything is built.
    fn validate(&self, value: &Value) -> Result<(), String>;

    /// Builds the predicate for `field` (a column on the model in scope).
    fn apply(&self, field: &str, value: &Value) -> Predicate;
}

/// Registered handlers keyed by name. Clones share the same table.
#[derive(Clone, Default)]
pub struct CustomFilterRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn CustomFilter>>>>,
}

impl CustomFilterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one with the same name.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn CustomFilter>) {
        self.handlers.write().insert(name.into(), handler);
    }

    /// Removes a handler.
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    /// Looks up a handler.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomFilter>> {
        self.handlers.read().get(name).cloned()
    }

    /// Registered handler names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for CustomFilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFilterRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::StoreOperator;
    use serde_json::json;

    struct Positive;

    impl CustomFilter for Positive {
        fn validate(&self, value: &Value) -> Result<(), String> {
            match value.as_i64() {
                Some(n) if n > 0 => Ok(()),
                _ => Err("expected a positive integer".to_string()),
            }
        }

        fn apply(&self, field: &str, value: &Value) -> Predicate {
            Predicate::Compare {
                column: field.to_string(),
                op: StoreOperator::Gte,
                value: value.clone(),
            }
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = CustomFilterRegistry::new();
        registry.register("positive", Arc::new(Positive));
        let handler = registry.get("positive").unwrap();
        assert!(handler.validate(&json!(3)).is_ok());
        assert!(handler.validate(&json!(-3)).is_err());
        assert_eq!(registry.names(), vec!["positive".to_string()]);
    }

    #[test]
    fn test_clones_share_handlers() {
        let registry = CustomFilterRegistry::new();
        let clone = registry.clone();
        clone.register("positive", Arc::new(Positive));
        assert!(registry.get("positive").is_some());
        assert!(registry.unregister("positive"));
        assert!(clone.get("positive").is_none());
    }
}
