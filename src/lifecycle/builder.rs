//! Application Builder
//!
//! Collects providers, invoke targets and options, then assembles an
//! [`Application`] in a fixed order: built-in values, user providers, the
//! event logger, and finally the invoke targets.

use super::application::{AppState, Application, ExitFn};
use super::registry::Lifecycle;
use super::shutdown::SignalReceivers;
use super::signals::{OsSignals, SignalNotifier};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::context::Context;
use crate::di::{Container, DotGraph, GraphError, Injectable};
use crate::error::Result;
use crate::event::{BufferedLogger, EventLogger, LifecycleEvent};
use crate::lifecycle::Shutdowner;
use std::any::type_name;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUILTIN: &str = "conductor::Application";

type Registration = Box<dyn FnOnce(&Container) -> std::result::Result<(), GraphError> + Send>;
type Invocation = Box<dyn FnOnce(&Container) -> anyhow::Result<()> + Send>;
type LoggerConstructor = Box<dyn FnOnce(&Container) -> anyhow::Result<Arc<dyn EventLogger>> + Send>;

fn process_exit(code: i32) {
    std::process::exit(code)
}

struct Provision {
    constructor: String,
    output_type: &'static str,
    register: Registration,
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    provisions: Vec<Provision>,
    invocations: Vec<(String, Invocation)>,
    logger: Option<(String, LoggerConstructor)>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn SignalNotifier>,
    exit: ExitFn,
    settings: Settings,
    validate: bool,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self {
            provisions: Vec::new(),
            invocations: Vec::new(),
            logger: None,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(OsSignals::new()),
            exit: Arc::new(process_exit),
            settings: Settings::default(),
            validate: false,
        }
    }

    /// Register a lazy constructor for `T`, named after the closure's type
    pub fn provide<T, F>(self, constructor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.provide_named(type_name::<F>(), constructor)
    }

    /// Register a lazy constructor for `T` under an explicit name
    pub fn provide_named<T, F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        let register_name = name.clone();
        self.provisions.push(Provision {
            constructor: name,
            output_type: type_name::<T>(),
            register: Box::new(move |c: &Container| c.provide(register_name, constructor)),
        });
        self
    }

    /// Register `T` using its [`Injectable`] implementation
    pub fn provide_injectable<T: Injectable>(self) -> Self {
        self.provide_named(format!("{}::inject", type_name::<T>()), T::inject)
    }

    /// Register an already constructed value
    pub fn supply<T>(mut self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        let name = format!("supply({})", type_name::<T>());
        let register_name = name.clone();
        self.provisions.push(Provision {
            constructor: name,
            output_type: type_name::<T>(),
            register: Box::new(move |c: &Container| c.supply(value, register_name)),
        });
        self
    }

    /// Run `function` against the container once every provider is registered
    ///
    /// Invoke targets run in registration order, and are what force lazy
    /// providers to be constructed.
    pub fn invoke<F>(self, function: F) -> Self
    where
        F: FnOnce(&Container) -> anyhow::Result<()> + Send + 'static,
    {
        self.invoke_named(type_name::<F>(), function)
    }

    pub fn invoke_named<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: FnOnce(&Container) -> anyhow::Result<()> + Send + 'static,
    {
        self.invocations.push((name.into(), Box::new(function)));
        self
    }

    /// Construct the event logger from the container
    ///
    /// Events emitted before the logger exists are buffered and replayed to
    /// it. If construction fails, the configured default logger is used and
    /// building fails.
    pub fn logger<L, F>(mut self, constructor: F) -> Self
    where
        L: EventLogger + 'static,
        F: FnOnce(&Container) -> anyhow::Result<L> + Send + 'static,
    {
        let name = type_name::<F>().to_string();
        self.logger = Some((
            name,
            Box::new(move |c: &Container| Ok(Arc::new(constructor(c)?) as Arc<dyn EventLogger>)),
        ));
        self
    }

    /// Time source for hook deadlines
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace OS signal subscription
    pub fn signal_notifier(mut self, notifier: Arc<dyn SignalNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Called by `run` with a non-zero exit status; defaults to `std::process::exit`
    pub fn exit<F>(mut self, exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit = Arc::new(exit);
        self
    }

    /// Replace timeouts and default logger wholesale
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Deadline for the start phase of `run`; `None` waits indefinitely
    pub fn start_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.settings.start_timeout = timeout.into();
        self
    }

    /// Deadline for the stop phase of `run`; `None` waits indefinitely
    pub fn stop_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.settings.stop_timeout = timeout.into();
        self
    }

    /// Only check that the application can be assembled
    ///
    /// Providers are registered and the logger is constructed as usual, but
    /// invoke targets are skipped, so no lazy constructor runs and no hook
    /// gets registered. The resulting application never starts: `start` and
    /// `run` return straight away.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Assemble the application
    ///
    /// # Errors
    /// Returns every provider registration error at once, a logger
    /// construction error, or the first failing invoke target.
    pub fn build(self) -> Result<Application> {
        let buffer = Arc::new(BufferedLogger::new());
        let logger: Arc<dyn EventLogger> = buffer.clone();
        let container = Arc::new(Container::new());
        let lifecycle = Lifecycle::new(Arc::clone(&logger), Arc::clone(&self.clock));
        let receivers = SignalReceivers::new(self.notifier);
        let mut errors = Vec::new();

        let provided = |constructor: &str,
                        output_type: &str,
                        result: std::result::Result<(), GraphError>,
                        errors: &mut Vec<GraphError>| {
            logger.log_event(&LifecycleEvent::Provided {
                constructor: constructor.to_string(),
                output_types: vec![output_type.to_string()],
                error: result.as_ref().err().map(ToString::to_string),
            });
            if let Err(err) = result {
                errors.push(err);
            }
        };

        provided(
            BUILTIN,
            type_name::<Lifecycle>(),
            container.supply(lifecycle.clone(), BUILTIN),
            &mut errors,
        );
        provided(
            BUILTIN,
            type_name::<Shutdowner>(),
            container.supply(receivers.shutdowner(), BUILTIN),
            &mut errors,
        );
        provided(
            BUILTIN,
            type_name::<DotGraph>(),
            container.provide(BUILTIN, |c: &Container| Ok(DotGraph(c.dot()))),
            &mut errors,
        );
        for provision in self.provisions {
            let result = (provision.register)(&container);
            provided(
                &provision.constructor,
                provision.output_type,
                result,
                &mut errors,
            );
        }

        match self.logger {
            Some((name, constructor)) => match constructor(&container) {
                Ok(custom) => {
                    buffer.connect(custom);
                    logger.log_event(&LifecycleEvent::LoggerInitialized {
                        constructor: Some(name),
                        error: None,
                    });
                }
                Err(source) => {
                    buffer.connect(self.settings.logger.build());
                    logger.log_event(&LifecycleEvent::LoggerInitialized {
                        constructor: Some(name.clone()),
                        error: Some(source.to_string()),
                    });
                    errors.push(GraphError::Logger {
                        constructor: name,
                        source,
                    });
                }
            },
            None => {
                buffer.connect(self.settings.logger.build());
                logger.log_event(&LifecycleEvent::LoggerInitialized {
                    constructor: None,
                    error: None,
                });
            }
        }

        if let Some(err) = GraphError::combine(errors) {
            tracing::error!("Failed to build application: {}", err);
            return Err(err.into());
        }

        let invocations = if self.validate {
            tracing::info!(
                "Application validated ({} providers, {} invoke targets skipped)",
                container.len(),
                self.invocations.len()
            );
            Vec::new()
        } else {
            self.invocations
        };
        for (function, invocation) in invocations {
            let result = invocation(&container);
            logger.log_event(&LifecycleEvent::Invoked {
                function: function.clone(),
                error: result.as_ref().err().map(ToString::to_string),
            });
            if let Err(source) = result {
                let err = GraphError::Invoke { function, source };
                tracing::error!("Failed to build application: {}", err);
                return Err(err.into());
            }
        }

        tracing::debug!(
            "Application built ({} providers, {} hooks)",
            container.len(),
            lifecycle.len()
        );
        Ok(Application {
            container,
            lifecycle,
            receivers,
            clock: self.clock,
            logger,
            exit: self.exit,
            start_timeout: self.settings.start_timeout,
            stop_timeout: self.settings.stop_timeout,
            validate: self.validate,
            state: Mutex::new(AppState::Idle),
        })
    }

    /// Build and run the application, returning its exit status
    ///
    /// A build failure is logged and reported through the exit function like
    /// any other failed run.
    pub async fn run(self, ctx: &Context) -> i32 {
        let exit = Arc::clone(&self.exit);
        match self.build() {
            Ok(app) => app.run(ctx).await,
            Err(err) => {
                tracing::error!("Application failed to build: {}", err);
                let code = err.exit_code();
                exit(code);
                code
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::event::{NopLogger, Spy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Database {
        url: String,
    }

    struct Repository {
        db: Arc<Database>,
    }

    impl Injectable for Repository {
        fn inject(container: &Container) -> anyhow::Result<Self> {
            Ok(Self {
                db: container.resolve::<Database>()?,
            })
        }
    }

    fn quiet() -> ApplicationBuilder {
        ApplicationBuilder::new().logger(|_| Ok(NopLogger))
    }

    #[test]
    fn test_builtins_are_resolvable() {
        let app = quiet().build().unwrap();
        let container = app.container();
        assert!(container.resolve::<Lifecycle>().is_ok());
        assert!(container.resolve::<Shutdowner>().is_ok());
        let graph = container.resolve::<DotGraph>().unwrap();
        assert!(graph.to_string().starts_with("digraph"));
    }

    #[test]
    fn test_invokes_force_lazy_construction() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let app = quiet()
            .supply(Database {
                url: "postgres://localhost".to_string(),
            })
            .provide_injectable::<Repository>()
            .provide(move |_: &Container| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42u32)
            })
            .invoke(|c| {
                assert_eq!(c.resolve::<Repository>()?.db.url, "postgres://localhost");
                Ok(())
            })
            .build()
            .unwrap();

        assert!(app.container().is_resolved::<Repository>());
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_providers_are_all_reported() {
        let err = quiet()
            .supply(1u8)
            .supply(2u8)
            .supply(Lifecycle::new(Arc::new(NopLogger), Arc::new(SystemClock)))
            .build()
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::Graph);
        assert!(matches!(err, Error::Graph(GraphError::Multiple(ref errors)) if errors.len() == 2));
    }

    #[test]
    fn test_failing_invoke_stops_later_invokes() {
        let spy = Arc::new(Spy::new());
        let logger = Arc::clone(&spy);
        let err = ApplicationBuilder::new()
            .logger(move |_| Ok(logger))
            .invoke_named("first", |c| {
                c.resolve::<Database>()?;
                Ok(())
            })
            .invoke_named("second", |_| panic!("must not run"))
            .build()
            .err()
            .unwrap();

        assert!(err.matches::<GraphError>());
        assert!(err.to_string().contains("invoke first failed"));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            spy.event_types(),
            vec!["Provided", "Provided", "Provided", "LoggerInitialized", "Invoked"]
        );
    }

    #[test]
    fn test_logger_failure_falls_back_and_fails_build() {
        let err = ApplicationBuilder::new()
            .settings(Settings {
                logger: crate::config::LoggerKind::Nop,
                ..Settings::default()
            })
            .logger(|c| {
                c.resolve::<Database>()?;
                Ok(NopLogger)
            })
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Graph(GraphError::Logger { .. })));
    }

    #[test]
    fn test_events_before_logger_are_replayed() {
        let spy = Arc::new(Spy::new());
        let logger = Arc::clone(&spy);
        quiet_with(logger).supply(Database { url: String::new() }).build().unwrap();

        let events = spy.events();
        assert_eq!(events.len(), 5);
        match &events[3] {
            LifecycleEvent::Provided { output_types, .. } => {
                assert_eq!(output_types, &vec![type_name::<Database>().to_string()])
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(events[4].name(), "LoggerInitialized");
    }

    fn quiet_with(spy: Arc<Spy>) -> ApplicationBuilder {
        ApplicationBuilder::new().logger(move |_| Ok(spy))
    }

    #[tokio::test]
    async fn test_validate_registers_providers_without_running_anything() {
        let spy = Arc::new(Spy::new());
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructed);
        let app = quiet_with(Arc::clone(&spy))
            .supply(Database { url: String::new() })
            .provide(move |_: &Container| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .invoke_named("register_hooks", |_| panic!("must not run while validating"))
            .validate(true)
            .exit(|code| panic!("unexpected exit {}", code))
            .build()
            .unwrap();

        assert!(app.container().contains::<u32>());
        assert_eq!(constructed.load(Ordering::SeqCst), 0);
        assert_eq!(app.lifecycle().len(), 0);
        assert_eq!(
            spy.event_types(),
            vec!["Provided", "Provided", "Provided", "Provided", "Provided", "LoggerInitialized"]
        );

        assert_eq!(app.run(&Context::background()).await, 0);
        assert_eq!(app.state(), AppState::Idle);
        assert!(!app.receivers.is_armed());
        assert_eq!(spy.len(), 6);
    }

    #[test]
    fn test_validate_still_reports_graph_errors() {
        let err = quiet()
            .supply(1u8)
            .supply(2u8)
            .invoke(|_| panic!("must not run"))
            .validate(true)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Graph);
    }

    #[tokio::test]
    async fn test_run_reports_build_failure_through_exit() {
        let code = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&code);
        let status = quiet()
            .invoke(|_| Err(anyhow::anyhow!("bad wiring")))
            .exit(move |c| seen.store(c as usize, Ordering::SeqCst))
            .run(&Context::background())
            .await;
        assert_eq!(status, 2);
        assert_eq!(code.load(Ordering::SeqCst), 2);
    }
}
