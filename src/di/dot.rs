use std::fmt;

/// Graphviz rendering of the application's dependency graph
///
/// Provided to every application; resolve it to inspect which types were
/// registered and which dependencies were followed while building them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotGraph(pub String);

impl fmt::Display for DotGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
