//! Compositor error types.

use thiserror::Error;

/// Errors that can occur while building or running a compositor graph.
///
/// Configuration errors (`InvalidParams`, `DuplicateItem`, `InvalidState`,
/// `IllegalTransition`) represent author mistakes in the graph description
/// and are raised at build or first-use time; they are not recoverable at
/// runtime. `ItemNotFound` is raised when a named texture, buffer or node
/// is missing at execution time; most lookups also offer a non-throwing
/// variant returning `Option` for optional resources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositorError {
    /// An invalid parameter was provided (malformed graph, bad channel
    /// index, improper `global_` prefix usage, ...).
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// A named item (texture, buffer, node, RTV, compute job) was not found.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// An item with the same name already exists in the same scope.
    #[error("duplicate item: {0}")]
    DuplicateItem(String),

    /// An operation was attempted in an invalid state (e.g. connecting
    /// nodes in the wrong order).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The barrier solver was asked for a transition that can never be
    /// correct (e.g. reading a discardable resource that was never written).
    #[error("illegal resource transition: {0}")]
    IllegalTransition(String),

    /// The graphics backend failed to create a resource. The compositor
    /// cannot run with missing render targets, so this is fatal.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Pass type recognized but not implemented by this build.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompositorError::ItemNotFound("texture 'rt0' in node 'main'".to_string());
        assert_eq!(err.to_string(), "item not found: texture 'rt0' in node 'main'");

        let err = CompositorError::IllegalTransition("first use is a read".to_string());
        assert_eq!(
            err.to_string(),
            "illegal resource transition: first use is a read"
        );
    }
}
