//! The Service Initializer: a runtime, name-keyed topological container.
//!
//! Grounded on the teacher's `r2e-core::beans::BeanRegistry` — the same
//! Kahn's-algorithm resolver and the same "move the partial container through
//! each factory, hand it back" trick so async factories don't fight the
//! borrow checker — but keyed by subsystem name (`&str`) instead of
//! `TypeId`, since subsystems here are named in the design rather than typed
//! at compile time, and every factory is async (there is no sync variant).

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use toolhost_core::services::ServiceBag;

type BuildFuture = Pin<Box<dyn Future<Output = Arc<dyn Any + Send + Sync>> + Send>>;
type BuildFn = Box<dyn FnOnce(ServiceBag) -> BuildFuture + Send>;

struct Registration {
    name: &'static str,
    dependencies: Vec<&'static str>,
    build: BuildFn,
}

#[derive(Debug)]
pub enum InitError {
    CyclicDependency { cycle: Vec<String> },
    MissingDependency { subsystem: String, dependency: String },
    DuplicateSubsystem { name: String },
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::CyclicDependency { cycle } => {
                write!(f, "circular subsystem dependency: {}", cycle.join(" -> "))
            }
            InitError::MissingDependency { subsystem, dependency } => {
                write!(f, "subsystem '{subsystem}' depends on unregistered subsystem '{dependency}'")
            }
            InitError::DuplicateSubsystem { name } => write!(f, "subsystem '{name}' registered twice"),
        }
    }
}

impl std::error::Error for InitError {}

/// Builds the full service graph: factories declare named dependencies,
/// the initializer orders them leaves-first and runs each in turn, inserting
/// its result into the bag under its own name before the next factory runs.
#[derive(Default)]
pub struct ServiceInitializer {
    registrations: Vec<Registration>,
    provided: ServiceBag,
}

impl ServiceInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-supply a subsystem the caller already built (e.g. a collective
    /// implementation chosen at startup). Pre-supplied entries are never
    /// recreated even if a factory with the same name is also registered.
    pub fn provide<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) -> &mut Self {
        self.provided.insert(name, value);
        self
    }

    /// Register a named factory. `dependencies` names other subsystems
    /// (registered or provided) whose construction must precede this one;
    /// the factory receives the bag-so-far to pull them out of.
    pub fn register<F, Fut, T>(&mut self, name: &'static str, dependencies: Vec<&'static str>, factory: F) -> &mut Self
    where
        F: FnOnce(ServiceBag) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.registrations.push(Registration {
            name,
            dependencies,
            build: Box::new(move |bag| Box::pin(async move { Arc::new(factory(bag).await) as Arc<dyn Any + Send + Sync> })),
        });
        self
    }

    /// Resolve the graph: validate, topologically sort, construct in order.
    pub async fn resolve(self) -> Result<ServiceBag, InitError> {
        Self::check_duplicates(&self.registrations, &self.provided)?;

        let name_to_idx: HashMap<&'static str, usize> =
            self.registrations.iter().enumerate().map(|(i, r)| (r.name, i)).collect();

        Self::check_missing(&self.registrations, &self.provided, &name_to_idx)?;

        let order = Self::topological_sort(&self.registrations, &name_to_idx)?;

        let mut bag = self.provided;
        let mut pending: Vec<Option<Registration>> = self.registrations.into_iter().map(Some).collect();
        for idx in order {
            let registration = pending[idx].take().expect("each index visited once");
            let value = (registration.build)(bag.clone()).await;
            bag.insert_any(registration.name, value);
        }
        Ok(bag)
    }

    fn check_duplicates(registrations: &[Registration], provided: &ServiceBag) -> Result<(), InitError> {
        let mut seen = std::collections::HashSet::new();
        for reg in registrations {
            if provided.has(reg.name) || !seen.insert(reg.name) {
                return Err(InitError::DuplicateSubsystem { name: reg.name.to_string() });
            }
        }
        Ok(())
    }

    fn check_missing(
        registrations: &[Registration],
        provided: &ServiceBag,
        name_to_idx: &HashMap<&'static str, usize>,
    ) -> Result<(), InitError> {
        for reg in registrations {
            for dep in &reg.dependencies {
                if !provided.has(dep) && !name_to_idx.contains_key(dep) {
                    return Err(InitError::MissingDependency {
                        subsystem: reg.name.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn topological_sort(
        registrations: &[Registration],
        name_to_idx: &HashMap<&'static str, usize>,
    ) -> Result<Vec<usize>, InitError> {
        let count = registrations.len();
        let mut in_degree: Vec<usize> = registrations
            .iter()
            .map(|reg| reg.dependencies.iter().filter(|d| name_to_idx.contains_key(*d)).count())
            .collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (i, reg) in registrations.iter().enumerate() {
            for dep in &reg.dependencies {
                if let Some(&dep_idx) = name_to_idx.get(dep) {
                    dependents[dep_idx].push(i);
                }
            }
        }

        // Seed with in-degree-0 nodes in registration order for determinism.
        let mut queue: std::collections::VecDeque<usize> =
            (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for &dep_idx in &dependents[idx] {
                in_degree[dep_idx] -= 1;
                if in_degree[dep_idx] == 0 {
                    queue.push_back(dep_idx);
                }
            }
        }

        if order.len() != count {
            let cycle = (0..count).filter(|i| in_degree[*i] > 0).map(|i| registrations[i].name.to_string()).collect();
            return Err(InitError::CyclicDependency { cycle });
        }
        Ok(order)
    }
}
