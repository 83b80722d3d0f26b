// src/task/context.rs

//! Opaque per-run context handed to every task body, condition and
//! compensation action.
//!
//! The engine never interprets it. Callers use it to carry string properties
//! (for example values passed on the command line) and shared services
//! (clients, pools, ...) that task bodies resolve by type.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct ContextInner {
    properties: BTreeMap<String, String>,
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

/// Shared, immutable execution context.
///
/// Cloning is cheap; all clones see the same properties and services.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.inner.properties.get(key).map(|s| s.as_str())
    }

    /// `true` when the property is set to something other than an empty
    /// string, `0`, `false`, `no` or `off` (case-insensitive).
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.property(key) {
            None => false,
            Some(v) => !matches!(
                v.trim().to_lowercase().as_str(),
                "" | "0" | "false" | "no" | "off"
            ),
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve a service registered with [`ExecutionContextBuilder::service`].
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|svc| svc.downcast::<T>().ok())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("properties", &self.inner.properties)
            .field("services", &self.inner.services.len())
            .finish()
    }
}

#[derive(Default)]
pub struct ExecutionContextBuilder {
    inner: ContextInner,
}

impl ExecutionContextBuilder {
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.properties.insert(key.into(), value.into());
        self
    }

    /// Register a service; a later registration of the same type wins.
    pub fn service<T: Send + Sync + 'static>(mut self, service: T) -> Self {
        self.inner
            .services
            .insert(TypeId::of::<T>(), Arc::new(service));
        self
    }

    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            inner: Arc::new(self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter {
        greeting: &'static str,
    }

    #[test]
    fn services_resolve_by_type() {
        let ctx = ExecutionContext::builder()
            .service(Greeter { greeting: "hello" })
            .service(5_u32)
            .build();

        assert_eq!(ctx.service::<Greeter>().unwrap().greeting, "hello");
        assert_eq!(*ctx.service::<u32>().unwrap(), 5);
        assert!(ctx.service::<String>().is_none());
    }

    #[test]
    fn truthy_properties() {
        let ctx = ExecutionContext::builder()
            .property("deploy", "yes")
            .property("dry", "false")
            .property("empty", "")
            .build();

        assert!(ctx.is_truthy("deploy"));
        assert!(!ctx.is_truthy("dry"));
        assert!(!ctx.is_truthy("empty"));
        assert!(!ctx.is_truthy("missing"));
    }
}
