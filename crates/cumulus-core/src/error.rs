use thiserror::Error;

/// Every failure a core operation can surface. None of them are fatal to the
/// hosting process; callers report the message and decide what to do next.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The graph (or a persisted document) would stop being self-consistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("element id '{0}' is already in use")]
    DuplicateId(String),

    #[error("'{child}' references parent group '{parent}', which does not exist")]
    UnknownParent { child: String, parent: String },

    #[error("group '{child}' is stored before its parent '{parent}'; groups must be persisted parent-before-child")]
    ParentNotYetLoaded { child: String, parent: String },

    #[error("link '{link}' references missing endpoint '{endpoint}'")]
    DanglingEndpoint { link: String, endpoint: String },

    #[error("element '{0}' does not exist")]
    UnknownElement(String),
}

/// A resource element could not produce its parameters or resource fragments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot export '{element}': {reason}")]
pub struct ExtractionError {
    pub element: String,
    pub reason: String,
}

impl ExtractionError {
    pub fn new(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by collaborators outside the process (design store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    #[error("failed to {operation} the design. Error code: {code}")]
    Status { operation: &'static str, code: u16 },

    #[error("design store unreachable: {0}")]
    Transport(String),

    #[error("design payload is unreadable: {0}")]
    Payload(String),

    #[error("design name must not be empty")]
    EmptyName,
}
