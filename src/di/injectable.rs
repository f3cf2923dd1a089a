use crate::di::Container;

/// Trait for types that can build themselves from the container
///
/// Implementors are registered with
/// [`ApplicationBuilder::provide_injectable`](crate::lifecycle::ApplicationBuilder::provide_injectable).
///
/// # Example
/// ```
/// use conductor::di::{Container, Injectable};
/// use std::sync::Arc;
///
/// struct Database;
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Injectable for UserService {
///     fn inject(container: &Container) -> anyhow::Result<Self> {
///         Ok(Self {
///             db: container.resolve::<Database>()?,
///         })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Create an instance by resolving dependencies from the container
    ///
    /// # Errors
    /// Returns an error if any required dependency cannot be resolved.
    fn inject(container: &Container) -> anyhow::Result<Self>;
}
