use certchain_types::EventKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no mirror entry for {0}")]
    NotFound(String),

    /// `insert` on an id the mirror already holds.
    #[error("certificate {0} is already mirrored")]
    Duplicate(String),

    #[error("mirror backend failure: {0}")]
    Backend(String),

    #[error("mirror record encoding: {0}")]
    Serialization(String),

    /// An event routed to a handler for a different kind.
    #[error("expected a {expected} event, got {actual}")]
    MismatchedEvent { expected: &'static str, actual: EventKind },
}
