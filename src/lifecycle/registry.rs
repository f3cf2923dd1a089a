//! Lifecycle Registry
//!
//! Ordered collection of hooks with the two bulk operations that drive them.

use super::hook::{Hook, HookFn};
use crate::clock::Clock;
use crate::context::{Context, Deadline};
use crate::error::{Error, Phase, Result};
use crate::event::{EventLogger, LifecycleEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Registry {
    hooks: Vec<Hook>,
    /// High-water mark: hooks `0..num_started` completed OnStart
    num_started: usize,
}

struct Inner {
    registry: Mutex<Registry>,
    logger: Arc<dyn EventLogger>,
    clock: Arc<dyn Clock>,
}

/// Ordered set of start/stop hooks
///
/// Every application provides a `Lifecycle` to its constructors, which append
/// the hooks for the resources they create.
///
/// # Example
///
/// ```rust,ignore
/// builder.provide_named("new_server", |c: &Container| {
///     let lifecycle = c.resolve::<Lifecycle>()?;
///     let server = Arc::new(Server::new());
///     lifecycle.append(Hook::service(Arc::clone(&server)));
///     Ok(server)
/// })
/// ```
///
/// Hooks start in registration order. Only hooks whose OnStart completed are
/// stopped, in the reverse of that order.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    pub(crate) fn new(logger: Arc<dyn EventLogger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                logger,
                clock,
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a hook; duplicates are allowed
    pub fn append(&self, hook: Hook) {
        self.registry().hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.registry().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of hooks whose OnStart has completed and not yet been stopped
    pub fn num_started(&self) -> usize {
        self.registry().num_started
    }

    fn log(&self, event: LifecycleEvent) {
        self.inner.logger.log_event(&event);
    }

    /// Run OnStart for every hook not yet started, in registration order
    ///
    /// Stops at the first failure; the failing hook is not counted as started.
    /// Hooks appended by a running OnStart are started in the same pass.
    pub(crate) async fn run_starts(&self, ctx: &Context, deadline: &mut Deadline) -> Result<()> {
        tracing::debug!("Calling OnStart hooks...");
        let mut executed = 0;

        loop {
            let next = {
                let registry = self.registry();
                registry
                    .hooks
                    .get(registry.num_started)
                    .cloned()
                    .map(|hook| (registry.num_started, hook))
            };
            let Some((index, hook)) = next else {
                break;
            };

            if let Some(on_start) = hook.on_start.clone() {
                let name = hook.label(index);
                self.log(LifecycleEvent::OnStartExecuting {
                    index,
                    hook: name.clone(),
                });
                let begin = self.inner.clock.now();

                let failure = match deadline.race(ctx, invoke(on_start, ctx.clone())).await {
                    Ok(Ok(())) => None,
                    Ok(Err(source)) => Some(Error::hook(Phase::Start, index, name.clone(), source)),
                    Err(err) => Some(err),
                };
                if let Some(err) = failure {
                    self.log(LifecycleEvent::StartFailed {
                        index,
                        hook: name,
                        error: err.to_string(),
                    });
                    return Err(err);
                }

                self.log(LifecycleEvent::OnStartExecuted {
                    index,
                    hook: name,
                    runtime: self.inner.clock.now().saturating_duration_since(begin),
                });
                executed += 1;
            }

            self.registry().num_started += 1;
        }

        tracing::debug!("OnStart complete ({} hooks executed)", executed);
        Ok(())
    }

    /// Run OnStop for every started hook, in reverse order
    ///
    /// Individual failures are collected and do not prevent the remaining
    /// hooks from stopping. An expired deadline or cancelled context ends the
    /// phase early.
    pub(crate) async fn run_stops(&self, ctx: &Context, deadline: &mut Deadline) -> Result<()> {
        tracing::debug!("Calling OnStop hooks...");
        let mut errors = Vec::new();

        loop {
            let next = {
                let mut registry = self.registry();
                if registry.num_started == 0 {
                    None
                } else {
                    registry.num_started -= 1;
                    let index = registry.num_started;
                    Some((index, registry.hooks[index].clone()))
                }
            };
            let Some((index, hook)) = next else {
                break;
            };
            let Some(on_stop) = hook.on_stop.clone() else {
                continue;
            };

            let name = hook.label(index);
            self.log(LifecycleEvent::OnStopExecuting {
                index,
                hook: name.clone(),
            });
            let begin = self.inner.clock.now();

            match deadline.race(ctx, invoke(on_stop, ctx.clone())).await {
                Ok(Ok(())) => self.log(LifecycleEvent::OnStopExecuted {
                    index,
                    hook: name,
                    runtime: self.inner.clock.now().saturating_duration_since(begin),
                }),
                Ok(Err(source)) => {
                    let err = Error::hook(Phase::Stop, index, name.clone(), source);
                    self.log(LifecycleEvent::StopFailed {
                        index,
                        hook: name,
                        error: err.to_string(),
                    });
                    errors.push(err);
                }
                Err(err) => {
                    self.log(LifecycleEvent::StopFailed {
                        index,
                        hook: name,
                        error: err.to_string(),
                    });
                    errors.push(err);
                    break;
                }
            }
        }

        tracing::debug!("OnStop complete ({} failures)", errors.len());
        Error::aggregate(errors)
    }
}

/// Run one callback on its own task
///
/// If the phase deadline passes, the handle is dropped and the task is left
/// to finish on its own rather than aborted.
async fn invoke(callback: HookFn, ctx: Context) -> anyhow::Result<()> {
    match tokio::spawn(callback(ctx)).await {
        Ok(result) => result,
        Err(join) if join.is_panic() => Err(anyhow::anyhow!("hook panicked")),
        Err(join) => Err(anyhow::anyhow!("hook task cancelled: {}", join)),
    }
}
