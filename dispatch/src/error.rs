use thiserror::Error;

use dt_model::{FamilyId, QName, Tag};

/// Boxed failure raised by a handler. Handler failures are propagated to the caller unchanged.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("variant {tag:?} is not part of {family}")]
    UnknownVariant { tag: Tag, family: FamilyId },
    #[error("no variant named {0}")]
    UnknownName(QName),
    #[error("a handler is already registered for {0}")]
    DuplicateHandler(QName),
    #[error("{start} is not an ancestor of {variant}")]
    NotAnAncestor { start: QName, variant: QName },
    #[error("handler for {variant} failed")]
    HandlerFailure {
        variant: QName,
        #[source]
        source: HandlerError,
    },
}
