//! Lifecycle hooks
//!
//! A [`Hook`] pairs an optional OnStart callback with an optional OnStop
//! callback. Services can also implement [`OnStart`] / [`OnStop`] and be
//! attached with [`Hook::service`].

use crate::context::Context;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub(crate) type HookFn = Arc<dyn Fn(Context) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Called when the application starts
///
/// Use this hook to:
/// - Open connection pools
/// - Bind listeners
/// - Spawn background workers
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::OnStart;
/// use conductor::Context;
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl OnStart for DatabaseService {
///     async fn on_start(&self, ctx: Context) -> anyhow::Result<()> {
///         self.pool.connect().await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait OnStart: Send + Sync {
    /// Should return promptly once `ctx` is cancelled
    async fn on_start(&self, ctx: Context) -> anyhow::Result<()>;
}

/// Called when the application stops
///
/// Services are stopped in **reverse order** of their successful start.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::OnStop;
/// use conductor::Context;
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl OnStop for DatabaseService {
///     async fn on_stop(&self, _ctx: Context) -> anyhow::Result<()> {
///         self.pool.close().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait OnStop: Send + Sync {
    async fn on_stop(&self, ctx: Context) -> anyhow::Result<()>;
}

/// A start/stop callback pair
///
/// ```
/// use conductor::lifecycle::Hook;
///
/// let hook = Hook::named("http server")
///     .on_start(|_ctx| async { Ok(()) })
///     .on_stop(|_ctx| async { Ok(()) });
/// assert_eq!(hook.name(), Some("http server"));
/// ```
#[derive(Clone, Default)]
pub struct Hook {
    pub(crate) on_start: Option<HookFn>,
    pub(crate) on_stop: Option<HookFn>,
    name: Option<String>,
}

impl Hook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_start = Some(Arc::new(move |ctx| f(ctx).boxed()));
        self
    }

    pub fn on_stop<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_stop = Some(Arc::new(move |ctx| f(ctx).boxed()));
        self
    }

    /// Use a service's [`OnStart`] implementation as the start callback
    pub fn start_with<S: OnStart + 'static>(self, service: Arc<S>) -> Self {
        self.on_start(move |ctx| {
            let service = Arc::clone(&service);
            async move { service.on_start(ctx).await }
        })
    }

    /// Use a service's [`OnStop`] implementation as the stop callback
    pub fn stop_with<S: OnStop + 'static>(self, service: Arc<S>) -> Self {
        self.on_stop(move |ctx| {
            let service = Arc::clone(&service);
            async move { service.on_stop(ctx).await }
        })
    }

    /// A hook driven entirely by a service, named after its type
    pub fn service<S: OnStart + OnStop + 'static>(service: Arc<S>) -> Self {
        Self::named(std::any::type_name::<S>())
            .start_with(Arc::clone(&service))
            .stop_with(service)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name used in events: the given name, or the registration index
    pub(crate) fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("hook-{}", index),
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}
