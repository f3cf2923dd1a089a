//! Lifecycle Orchestration
//!
//! Constructors register start/stop hooks with the [`Lifecycle`] they resolve
//! from the container; the [`Application`] drives those hooks and waits for a
//! shutdown request in between.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Provide (built-ins, then user constructors and values)
//!    ↓
//! 2. Event logger construction
//!    ↓
//! 3. Invoke targets (constructors run, hooks get appended)
//!    ↓
//! 4. OnStart (registration order)          ← start timeout
//!    ↓
//! [Running...]
//!    ↓
//! 5. Shutdown (SIGINT/SIGTERM, Shutdowner, or cancelled context)
//!    ↓
//! 6. OnStop (reverse order, started hooks only)   ← stop timeout
//! ```
//!
//! A failure in step 4 stops the hooks that did start before the error is
//! returned.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::lifecycle::{Hook, Lifecycle, OnStart, OnStop};
//! use conductor::Context;
//! use async_trait::async_trait;
//!
//! pub struct DatabaseService;
//!
//! #[async_trait]
//! impl OnStart for DatabaseService {
//!     async fn on_start(&self, _ctx: Context) -> anyhow::Result<()> {
//!         tracing::info!("Opening database connections");
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl OnStop for DatabaseService {
//!     async fn on_stop(&self, _ctx: Context) -> anyhow::Result<()> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//!
//! let db = Arc::new(DatabaseService);
//! lifecycle.append(Hook::service(db));
//! ```

mod application;
mod builder;
mod hook;
mod registry;
mod shutdown;
mod signals;

pub use application::{exit_code, AppState, Application};
pub use builder::ApplicationBuilder;
pub use hook::{Hook, OnStart, OnStop};
pub use registry::Lifecycle;
pub use shutdown::{Origin, ShutdownOption, ShutdownSignal, ShutdownWait, Shutdowner};
pub use signals::{OsSignals, Signal, SignalNotifier, SignalSink};
