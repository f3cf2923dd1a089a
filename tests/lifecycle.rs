use conductor::event::{LifecycleEvent, Spy, StopCause};
use conductor::lifecycle::{Origin, SignalNotifier, SignalSink};
use conductor::prelude::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type Journal = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Default)]
struct ManualSignals {
    sink: Mutex<Option<SignalSink>>,
    notified: AtomicUsize,
}

impl ManualSignals {
    fn raise(&self, signal: Signal) -> bool {
        match &*self.sink.lock().unwrap() {
            Some(sink) => sink.send(signal),
            None => false,
        }
    }
}

impl SignalNotifier for ManualSignals {
    fn notify(&self, sink: SignalSink, _signals: &[Signal]) {
        self.notified.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn stop_notify(&self, _sink: &SignalSink) {
        self.sink.lock().unwrap().take();
    }
}

struct Database {
    journal: Journal,
}

struct Cache {
    journal: Journal,
    _db: Arc<Database>,
}

struct HttpServer {
    journal: Journal,
    _cache: Arc<Cache>,
}

macro_rules! journaled_service {
    ($ty:ty, $name:literal) => {
        #[async_trait]
        impl OnStart for $ty {
            async fn on_start(&self, _ctx: Context) -> anyhow::Result<()> {
                self.journal.lock().unwrap().push(format!("start {}", $name));
                Ok(())
            }
        }

        #[async_trait]
        impl OnStop for $ty {
            async fn on_stop(&self, _ctx: Context) -> anyhow::Result<()> {
                self.journal.lock().unwrap().push(format!("stop {}", $name));
                Ok(())
            }
        }
    };
}

journaled_service!(Database, "db");
journaled_service!(Cache, "cache");
journaled_service!(HttpServer, "http");

impl Injectable for Database {
    fn inject(container: &Container) -> anyhow::Result<Self> {
        Ok(Self {
            journal: container.resolve::<Journal>()?.as_ref().clone(),
        })
    }
}

fn register<T: OnStart + OnStop + 'static>(c: &Container, service: Arc<T>) -> anyhow::Result<()> {
    c.resolve::<Lifecycle>()?.append(Hook::service(service));
    Ok(())
}

fn wired_app(journal: &Journal, spy: &Arc<Spy>, signals: &Arc<ManualSignals>) -> Application {
    let spy = Arc::clone(spy);
    Application::builder()
        .supply(Arc::clone(journal))
        .provide_injectable::<Database>()
        .provide(|c: &Container| {
            Ok(Cache {
                journal: c.resolve::<Journal>()?.as_ref().clone(),
                _db: c.resolve::<Database>()?,
            })
        })
        .provide(|c: &Container| {
            Ok(HttpServer {
                journal: c.resolve::<Journal>()?.as_ref().clone(),
                _cache: c.resolve::<Cache>()?,
            })
        })
        // Dependencies first, so teardown reaches dependents first.
        .invoke(|c| {
            let server = c.resolve::<HttpServer>()?;
            register(c, c.resolve::<Database>()?)?;
            register(c, c.resolve::<Cache>()?)?;
            register(c, server)
        })
        .logger(move |_| Ok(spy))
        .signal_notifier(signals.clone())
        .exit(|code| panic!("unexpected exit {}", code))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_services_stop_in_reverse_dependency_order() {
    init_tracing();
    let journal: Journal = Arc::default();
    let spy = Arc::new(Spy::new());
    let signals = Arc::new(ManualSignals::default());
    let app = wired_app(&journal, &spy, &signals);

    app.start(&Context::background()).await.unwrap();
    assert_eq!(app.lifecycle().num_started(), 3);
    assert_eq!(signals.notified.load(Ordering::SeqCst), 0);

    let done = app.done();
    assert!(signals.raise(Signal::Terminate));
    assert!(!signals.raise(Signal::Interrupt));
    assert_eq!(done.await, Signal::Terminate);

    app.stop(&Context::background()).await.unwrap();
    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "start db",
            "start cache",
            "start http",
            "stop http",
            "stop cache",
            "stop db"
        ]
    );
    assert_eq!(app.state(), AppState::Stopped);

    let graph = app.container().resolve::<DotGraph>().unwrap();
    assert!(graph.to_string().contains("HttpServer\" -> \""));
}

#[tokio::test]
async fn test_run_can_be_repeated_after_stop() {
    init_tracing();
    let journal: Journal = Arc::default();
    let spy = Arc::new(Spy::new());
    let signals = Arc::new(ManualSignals::default());
    let app = Arc::new(wired_app(&journal, &spy, &signals));

    for round in 1..=2 {
        let run = {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.run(&Context::background()).await })
        };
        while signals.notified.load(Ordering::SeqCst) < round {
            tokio::task::yield_now().await;
        }
        assert!(app.shutdowner().shutdown([ShutdownOption::Signal(Signal::Interrupt)]));
        assert_eq!(run.await.unwrap(), 0);
        assert_eq!(app.state(), AppState::Stopped);
    }

    let causes: Vec<_> = spy
        .events()
        .into_iter()
        .filter_map(|event| match event {
            LifecycleEvent::Stopping {
                cause: StopCause::Shutdown(signal),
            } => Some(signal),
            _ => None,
        })
        .collect();
    assert_eq!(causes.len(), 2);
    assert!(causes.iter().all(|cause| cause.origin == Origin::Shutdowner
        && cause.signal == Signal::Interrupt));
    assert_eq!(journal.lock().unwrap().len(), 12);
}

#[tokio::test]
async fn test_missing_dependency_fails_build_before_any_hook() {
    init_tracing();
    let spy = Arc::new(Spy::new());
    let logger = Arc::clone(&spy);
    let err = Application::builder()
        .provide_injectable::<Database>()
        .invoke(|c| {
            c.resolve::<Database>()?;
            Ok(())
        })
        .logger(move |_| Ok(logger))
        .build()
        .err()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::Graph);
    assert!(err.matches::<GraphError>());
    assert!(err.to_string().contains("missing type"));
    assert!(
        !spy.event_types()
            .iter()
            .any(|name| name.starts_with("OnStart"))
    );
}

#[test]
fn test_settings_from_config_drive_the_builder() {
    let config = conductor::config::ConfigService::new();
    config.set(conductor::config::START_TIMEOUT_KEY, "250ms");
    config.set(conductor::config::LOGGER_KEY, "nop");
    let settings = Settings::from_config(&config).unwrap();

    let app = Application::builder().settings(settings).build().unwrap();
    assert_eq!(
        app.start_timeout(),
        Some(std::time::Duration::from_millis(250))
    );
    assert_eq!(app.stop_timeout(), Some(conductor::config::DEFAULT_TIMEOUT));
}
