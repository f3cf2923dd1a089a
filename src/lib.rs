//! # Conductor
//!
//! An in-process application lifecycle orchestrator.
//!
//! Conductor builds an object graph from constructors, collects the start/stop
//! hooks those constructors register, and runs the hooks in a deterministic
//! order around a wait for shutdown.
//!
//! ## Features
//!
//! - **Ordered lifecycle**: OnStart in registration order, OnStop in strict reverse
//!   for the hooks that actually started
//! - **Shutdown arbitration**: OS signals, programmatic requests and context
//!   cancellation race for a single winning cause
//! - **Lazy signal handling**: SIGINT/SIGTERM are only subscribed to once the
//!   application is waited on, so embedding it never hijacks the host's handlers
//! - **Observable**: every step is reported as a structured [`LifecycleEvent`](event::LifecycleEvent)
//! - **Deterministic tests**: clock, signal source and process exit are injectable
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor::prelude::*;
//!
//! struct Server {
//!     port: u16,
//! }
//!
//! #[async_trait]
//! impl OnStart for Server {
//!     async fn on_start(&self, _ctx: Context) -> anyhow::Result<()> {
//!         tracing::info!("listening on {}", self.port);
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl OnStop for Server {
//!     async fn on_stop(&self, _ctx: Context) -> anyhow::Result<()> {
//!         tracing::info!("closing listener");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     Application::builder()
//!         .supply(8080u16)
//!         .provide(|c: &Container| {
//!             let server = Arc::new(Server {
//!                 port: *c.resolve::<u16>()?,
//!             });
//!             c.resolve::<Lifecycle>()?.append(Hook::service(Arc::clone(&server)));
//!             Ok(server)
//!         })
//!         .invoke(|c| {
//!             c.resolve::<Arc<Server>>()?;
//!             Ok(())
//!         })
//!         .run(&Context::background())
//!         .await;
//! }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod event;
pub mod lifecycle;

// Re-export core types
pub use context::Context;
pub use di::{Container, Injectable};
pub use error::{Error, ErrorKind, Result};
pub use lifecycle::{
    AppState, Application, ApplicationBuilder, Hook, Lifecycle, ShutdownOption, Shutdowner, Signal,
};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use conductor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{Clock, MockClock, SystemClock};
    pub use crate::config::Settings;
    pub use crate::context::Context;
    pub use crate::di::{Container, DotGraph, GraphError, Injectable};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::event::{EventLogger, LifecycleEvent};
    pub use crate::lifecycle::{
        AppState, Application, ApplicationBuilder, Hook, Lifecycle, OnStart, OnStop,
        ShutdownOption, Shutdowner, Signal,
    };
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
