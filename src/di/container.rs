use crate::di::GraphError;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Instance = Arc<dyn Any + Send + Sync>;

type ConstructorFn = Arc<dyn Fn(&Container) -> anyhow::Result<Instance> + Send + Sync>;

thread_local! {
    /// Types under construction on this thread, tagged with their container
    static RESOLVING: RefCell<Vec<(usize, TypeId, &'static str)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as under construction on this thread until dropped
struct Resolving {
    container: usize,
}

impl Resolving {
    fn enter(container: usize, type_id: TypeId, type_name: &'static str) -> Result<Self, GraphError> {
        RESOLVING.with_borrow_mut(|stack| {
            let path = stack.iter().filter(|(owner, _, _)| *owner == container);
            if let Some(pos) = path.clone().position(|(_, id, _)| *id == type_id) {
                let mut names: Vec<&str> = path.skip(pos).map(|(_, _, name)| *name).collect();
                names.push(type_name);
                return Err(GraphError::Cycle {
                    path: names.join(" -> "),
                });
            }
            stack.push((container, type_id, type_name));
            Ok(Self { container })
        })
    }

    /// Whether this thread is already inside a constructor of `container`
    fn active(container: usize) -> bool {
        RESOLVING.with_borrow(|stack| stack.iter().any(|(owner, _, _)| *owner == container))
    }

    /// The type whose constructor is running innermost on this thread
    fn current(container: usize) -> Option<&'static str> {
        RESOLVING.with_borrow(|stack| {
            stack
                .iter()
                .rev()
                .find(|(owner, _, _)| *owner == container)
                .map(|(_, _, name)| *name)
        })
    }
}

impl Drop for Resolving {
    fn drop(&mut self) {
        RESOLVING.with_borrow_mut(|stack| {
            if let Some(pos) = stack.iter().rposition(|(owner, _, _)| *owner == self.container) {
                stack.remove(pos);
            }
        });
    }
}

#[derive(Clone)]
struct ProviderEntry {
    type_name: &'static str,
    constructor_name: String,
    constructor: Option<ConstructorFn>,
}

/// Thread-safe dependency injection container.
///
/// Providers are lazy singleton constructors keyed by the type they produce.
/// A value is built the first time it is resolved, may resolve its own
/// dependencies from the container, and is cached afterwards.
///
/// Construction is serialised per container: a thread resolving a type that
/// another thread is still building waits for that value instead of building
/// its own. Constructors must therefore not block on other threads that
/// resolve from the same container.
///
/// # Example
/// ```
/// use conductor::di::Container;
///
/// struct Config { port: u16 }
/// struct Server { port: u16 }
///
/// let container = Container::new();
/// container.supply(Config { port: 8080 }, "config").unwrap();
/// container
///     .provide("new_server", |c: &Container| {
///         let config = c.resolve::<Config>()?;
///         Ok(Server { port: config.port })
///     })
///     .unwrap();
///
/// assert_eq!(container.resolve::<Server>().unwrap().port, 8080);
/// ```
#[derive(Default)]
pub struct Container {
    providers: DashMap<TypeId, ProviderEntry>,
    instances: DashMap<TypeId, Instance>,
    order: Mutex<Vec<TypeId>>,
    construction: Mutex<()>,
    edges: Mutex<Vec<(&'static str, &'static str)>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lazy constructor for `T`
    pub fn provide<T, F>(&self, name: impl Into<String>, constructor: F) -> Result<(), GraphError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let constructor: ConstructorFn =
            Arc::new(move |container| Ok(Arc::new(constructor(container)?) as Instance));
        self.insert::<T>(name.into(), Some(constructor))?;
        Ok(())
    }

    /// Register an already constructed value
    pub fn supply<T>(&self, value: T, name: impl Into<String>) -> Result<(), GraphError>
    where
        T: Send + Sync + 'static,
    {
        self.insert::<T>(name.into(), None)?;
        self.instances.insert(TypeId::of::<T>(), Arc::new(value));
        Ok(())
    }

    fn insert<T: 'static>(
        &self,
        constructor_name: String,
        constructor: Option<ConstructorFn>,
    ) -> Result<(), GraphError> {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        match self.providers.entry(type_id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Err(GraphError::AlreadyProvided {
                type_name: type_name.to_string(),
                constructor: constructor_name,
                existing: existing.get().constructor_name.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ProviderEntry {
                    type_name,
                    constructor_name,
                    constructor,
                });
                self.order
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(type_id);
                Ok(())
            }
        }
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, GraphError> {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        self.record_edge(type_name);

        let cached = self.instances.get(&type_id).map(|entry| entry.value().clone());
        let instance = match cached {
            Some(instance) => instance,
            None => self.construct(type_id, type_name)?,
        };
        instance
            .downcast::<T>()
            .map_err(|_| GraphError::DowncastFailed {
                type_name: type_name.to_string(),
            })
    }

    fn construct(&self, type_id: TypeId, type_name: &'static str) -> Result<Instance, GraphError> {
        // Clone the constructor out so no map guard is held while it runs;
        // constructors resolve their own dependencies from this container.
        let constructor = self
            .providers
            .get(&type_id)
            .and_then(|entry| entry.constructor.clone())
            .ok_or_else(|| GraphError::Missing {
                type_name: type_name.to_string(),
            })?;

        let id = self.id();
        // Only the outermost constructor on a thread takes the lock; nested
        // resolves already hold it.
        let _construction: Option<MutexGuard<'_, ()>> = if Resolving::active(id) {
            None
        } else {
            Some(self.construction.lock().unwrap_or_else(PoisonError::into_inner))
        };
        if let Some(instance) = self.instances.get(&type_id).map(|entry| entry.value().clone()) {
            return Ok(instance);
        }

        let built = {
            let _resolving = Resolving::enter(id, type_id, type_name)?;
            tracing::debug!("Constructing: {}", type_name);
            constructor(self)
        };

        let instance = built.map_err(|source| GraphError::Constructor {
            type_name: type_name.to_string(),
            source,
        })?;
        Ok(self.instances.entry(type_id).or_insert(instance).value().clone())
    }

    fn id(&self) -> usize {
        self as *const Container as usize
    }

    fn record_edge(&self, dependency: &'static str) {
        if let Some(dependent) = Resolving::current(self.id()) {
            let mut edges = self.edges.lock().unwrap_or_else(PoisonError::into_inner);
            if !edges.contains(&(dependent, dependency)) {
                edges.push((dependent, dependency));
            }
        }
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.providers.contains_key(&TypeId::of::<T>())
    }

    /// Whether `T` has been constructed (or supplied) already
    pub fn is_resolved<T: 'static>(&self) -> bool {
        self.instances.contains_key(&TypeId::of::<T>())
    }

    /// Provided type names, in registration order
    pub fn provided_types(&self) -> Vec<&'static str> {
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|id| self.providers.get(id).map(|entry| entry.type_name))
            .collect()
    }

    /// Render the providers and the dependency edges observed so far as Graphviz
    pub fn dot(&self) -> String {
        let mut out = String::from("digraph {\n\trankdir=RL;\n");
        for type_name in self.provided_types() {
            let _ = writeln!(out, "\t\"{}\";", type_name);
        }
        for (dependent, dependency) in self
            .edges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            let _ = writeln!(out, "\t\"{}\" -> \"{}\";", dependent, dependency);
        }
        out.push('}');
        out
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct TestService {
        value: i32,
    }

    struct Dependent {
        doubled: i32,
    }

    #[test]
    fn test_supply_and_resolve() {
        let container = Container::new();
        container.supply(TestService { value: 42 }, "supply").unwrap();
        let service = container.resolve::<TestService>().unwrap();
        assert_eq!(service.value, 42);
        assert!(container.is_resolved::<TestService>());
    }

    #[test]
    fn test_constructors_run_once_and_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let container = Container::new();
        let counter = Arc::clone(&calls);
        container
            .provide("new_test_service", move |_: &Container| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(TestService { value: 21 })
            })
            .unwrap();
        container
            .provide("new_dependent", |c: &Container| {
                let service = c.resolve::<TestService>()?;
                Ok(Dependent {
                    doubled: service.value * 2,
                })
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(container.resolve::<Dependent>().unwrap().doubled, 42);
        container.resolve::<TestService>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let dot = container.dot();
        assert!(dot.contains("Dependent\" -> \""));
        assert!(dot.contains("TestService\";"));
    }

    #[test]
    fn test_duplicate_provider_is_rejected() {
        let container = Container::new();
        container.supply(TestService { value: 1 }, "first").unwrap();
        let err = container
            .provide("second", |_: &Container| Ok(TestService { value: 2 }))
            .unwrap_err();
        match err {
            GraphError::AlreadyProvided { existing, .. } => assert_eq!(existing, "first"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_dependency_is_reported_through_constructor() {
        let container = Container::new();
        container
            .provide("new_dependent", |c: &Container| {
                let service = c.resolve::<TestService>()?;
                Ok(Dependent {
                    doubled: service.value * 2,
                })
            })
            .unwrap();

        let err = container.resolve::<Dependent>().err().unwrap();
        assert!(matches!(err, GraphError::Constructor { .. }));
        assert!(err.to_string().contains("missing type"));
    }

    #[test]
    fn test_cycle_is_detected() {
        struct A;
        struct B;

        let container = Container::new();
        container
            .provide("new_a", |c: &Container| {
                c.resolve::<B>()?;
                Ok(A)
            })
            .unwrap();
        container
            .provide("new_b", |c: &Container| {
                c.resolve::<A>()?;
                Ok(B)
            })
            .unwrap();

        let err = container.resolve::<A>().err().unwrap();
        assert!(err.to_string().contains("cycle detected"));
        assert!(!container.is_resolved::<A>());
        // The failed attempt leaves nothing behind on this thread.
        assert!(!Resolving::active(container.id()));
    }

    #[test]
    fn test_concurrent_resolve_waits_for_the_first_construction() {
        struct Slow {
            built_by: std::thread::ThreadId,
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let container = Arc::new(Container::new());
        let counter = Arc::clone(&calls);
        container
            .provide("new_slow", move |_: &Container| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                Ok(Slow {
                    built_by: std::thread::current().id(),
                })
            })
            .unwrap();

        let spawn_resolver = |delay: Duration| {
            let container = Arc::clone(&container);
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                container.resolve::<Slow>().map(|slow| slow.built_by)
            })
        };
        let first = spawn_resolver(Duration::ZERO);
        let second = spawn_resolver(Duration::from_millis(50));

        let first = first.join().unwrap().unwrap();
        let second = second.join().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_containers_do_not_share_a_resolution_path() {
        struct Outer;
        struct Inner;

        let container = Container::new();
        container
            .provide("new_outer", |_: &Container| {
                let inner = Container::new();
                inner.provide("new_inner", |_: &Container| Ok(Inner))?;
                inner.provide("new_outer", |c: &Container| {
                    c.resolve::<Inner>()?;
                    Ok(Outer)
                })?;
                inner.resolve::<Outer>()?;
                Ok(Outer)
            })
            .unwrap();

        assert!(container.resolve::<Outer>().is_ok());
        assert!(!container.dot().contains("->"));
    }
}
