//! A small type-erased, name-keyed service bag — the `services` map the
//! Service Initializer assembles and every factory (tool factories, route
//! handlers) reads from.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ServiceBag {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ServiceBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.entries.insert(name.into(), value as Arc<dyn Any + Send + Sync>);
    }

    /// Insert an already type-erased value, for callers (e.g. the Service
    /// Initializer) that only have `Arc<dyn Any + Send + Sync>` in hand.
    pub fn insert_any(&mut self, name: impl Into<String>, value: Arc<dyn Any + Send + Sync>) {
        self.entries.insert(name.into(), value);
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name)?.clone().downcast::<T>().ok()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_typed_value_by_name() {
        let mut bag = ServiceBag::new();
        bag.insert("count", Arc::new(42u32));
        assert_eq!(*bag.get::<u32>("count").unwrap(), 42);
        assert!(bag.has("count"));
        assert!(!bag.has("missing"));
    }

    #[test]
    fn wrong_type_lookup_returns_none() {
        let mut bag = ServiceBag::new();
        bag.insert("count", Arc::new(42u32));
        assert!(bag.get::<String>("count").is_none());
    }
}
