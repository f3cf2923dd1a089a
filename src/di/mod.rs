//! Object graph construction
//!
//! The container is the boundary to dependency resolution: the application
//! registers providers with it and runs invoke targets against it.

mod container;
mod dot;
mod error;
mod injectable;

pub use container::Container;
pub use dot::DotGraph;
pub use error::GraphError;
pub use injectable::Injectable;
