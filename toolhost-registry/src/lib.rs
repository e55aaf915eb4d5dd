//! The Tool Registry: a passive container mapping tool name to descriptor.
//! It never invokes handlers — that's the Dispatcher's job.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use toolhost_core::services::ServiceBag;

#[derive(Debug)]
pub struct ToolError(pub String);

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ToolError {}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A tool handler: a function from argument object to result value. Per the
/// data model, handlers must be idempotent-safe for repeated dispatch of
/// the same arguments unless documented otherwise.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        (self)(args).await
    }
}

pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub domain: Option<String>,
    /// Which session counter field the Dispatcher bumps on a successful call
    /// (one of `judgments`/`digests`/`feedback`), or `None` for tools that
    /// don't move a session counter.
    pub counter_field: Option<String>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            domain: None,
            counter_field: None,
            handler,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_counter_field(mut self, field: impl Into<String>) -> Self {
        self.counter_field = Some(field.into());
        self
    }
}

pub enum ToolOutput {
    One(ToolDescriptor),
    Many(Vec<ToolDescriptor>),
}

/// Produces zero or more [`ToolDescriptor`]s once its required services are
/// present. Registered in insertion order; that order is preserved by
/// [`ToolRegistry::create_all`].
pub trait ToolFactory: Send + Sync {
    fn name(&self) -> &str;
    fn requires(&self) -> Vec<&str> {
        Vec::new()
    }
    fn domain(&self) -> Option<&str> {
        None
    }
    /// Returns `None` to be silently skipped (e.g. an optional integration
    /// that chose not to register anything).
    fn create(&self, services: &ServiceBag) -> Option<ToolOutput>;
}

#[derive(Default)]
pub struct ToolRegistry {
    factories: Vec<Arc<dyn ToolFactory>>,
    tools: RwLock<HashMap<String, Arc<ToolDescriptor>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates that the factory exposes a non-empty name before
    /// accepting it.
    pub fn register(&mut self, factory: Arc<dyn ToolFactory>) {
        if factory.name().is_empty() {
            tracing::warn!("refusing to register a tool factory with an empty name");
            return;
        }
        self.factories.push(factory);
    }

    /// Iterates factories in insertion order; for each whose required
    /// services are all present, calls `create`, absorbing the result into
    /// the tool map. Nulls and unnamed entries are skipped silently;
    /// factory-level panics are caught, logged, and otherwise ignored.
    pub fn create_all(&self, services: &ServiceBag) {
        for factory in &self.factories {
            if !factory.requires().iter().all(|req| services.has(req)) {
                continue;
            }
            let factory_name = factory.name().to_string();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| factory.create(services)));
            let output = match outcome {
                Ok(output) => output,
                Err(panic) => {
                    tracing::error!(factory = %factory_name, ?panic, "tool factory panicked");
                    continue;
                }
            };
            let Some(output) = output else { continue };
            let domain = factory.domain().map(str::to_string);
            let descriptors = match output {
                ToolOutput::One(descriptor) => vec![descriptor],
                ToolOutput::Many(descriptors) => descriptors,
            };
            let mut tools = self.tools.write().expect("tool registry lock poisoned");
            for mut descriptor in descriptors {
                if descriptor.name.is_empty() {
                    continue;
                }
                if descriptor.domain.is_none() {
                    descriptor.domain = domain.clone();
                }
                tools.insert(descriptor.name.clone(), Arc::new(descriptor));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.read().expect("tool registry lock poisoned").get(name).cloned()
    }

    /// A pure function of the registry's current contents, for `tools/list`.
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        self.tools.read().expect("tool registry lock poisoned").values().cloned().collect()
    }

    pub fn create_by_domain(&self, domain: &str) -> Vec<Arc<ToolDescriptor>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .values()
            .filter(|descriptor| descriptor.domain.as_deref() == Some(domain))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoFactory;
    impl ToolFactory for EchoFactory {
        fn name(&self) -> &str {
            "echo"
        }
        fn domain(&self) -> Option<&str> {
            Some("utility")
        }
        fn create(&self, _services: &ServiceBag) -> Option<ToolOutput> {
            Some(ToolOutput::One(ToolDescriptor::new(
                "echo",
                "echoes input",
                serde_json::json!({}),
                Arc::new(|args: Value| async move { Ok(args) }),
            )))
        }
    }

    struct NeedsDbFactory;
    impl ToolFactory for NeedsDbFactory {
        fn name(&self) -> &str {
            "needs-db"
        }
        fn requires(&self) -> Vec<&str> {
            vec!["db"]
        }
        fn create(&self, _services: &ServiceBag) -> Option<ToolOutput> {
            Some(ToolOutput::One(ToolDescriptor::new(
                "dbtool",
                "uses db",
                serde_json::json!({}),
                Arc::new(|args: Value| async move { Ok(args) }),
            )))
        }
    }

    struct PanickingFactory;
    impl ToolFactory for PanickingFactory {
        fn name(&self) -> &str {
            "boom"
        }
        fn create(&self, _services: &ServiceBag) -> Option<ToolOutput> {
            panic!("factory exploded")
        }
    }

    #[test]
    fn registry_materializes_a_tool_whose_requirements_are_met() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoFactory));
        registry.create_all(&ServiceBag::new());
        assert!(registry.get("echo").is_some());
        assert_eq!(registry.create_by_domain("utility").len(), 1);
    }

    #[test]
    fn factory_with_unmet_requirements_is_skipped() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NeedsDbFactory));
        registry.create_all(&ServiceBag::new());
        assert!(registry.get("dbtool").is_none());
    }

    #[test]
    fn factory_with_met_requirements_runs() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NeedsDbFactory));
        let mut services = ServiceBag::new();
        services.insert("db", Arc::new(()));
        registry.create_all(&services);
        assert!(registry.get("dbtool").is_some());
    }

    #[test]
    fn a_panicking_factory_does_not_abort_createall() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanickingFactory));
        registry.register(Arc::new(EchoFactory));
        registry.create_all(&ServiceBag::new());
        assert!(registry.get("echo").is_some());
    }

    #[tokio::test]
    async fn list_reflects_current_contents() {
        let mut registry = ToolRegistry::new();
        assert!(registry.list().is_empty());
        registry.register(Arc::new(EchoFactory));
        registry.create_all(&ServiceBag::new());
        assert_eq!(registry.list().len(), 1);
    }
}
