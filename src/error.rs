use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementErrorKind {
    InvalidRequest,
    UnknownReference,
    AllocationExhausted,
    LedgerConflict,
    Arithmetic,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EntitlementError {
    pub kind: EntitlementErrorKind,
    pub message: String,
}

impl EntitlementError {
    pub fn new(kind: EntitlementErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Only storage failures are meant to reach the member; everything else is
    /// resolved locally or reported as a claim rejection.
    pub fn is_transport(&self) -> bool {
        self.kind == EntitlementErrorKind::Storage
    }
}

/// Failures reported by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage rejected write: {0}")]
    Rejected(String),
    #[error("storage snapshot error: {0}")]
    Snapshot(String),
}

/// A rejected write (duplicate record) is a claim rejection, not a transport
/// failure.
impl From<StoreError> for EntitlementError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(_) => ledger_conflict(value.to_string()),
            StoreError::Unavailable(_) | StoreError::Snapshot(_) => {
                storage_error(value.to_string())
            }
        }
    }
}

pub fn invalid_request(message: impl Into<String>) -> EntitlementError {
    EntitlementError::new(EntitlementErrorKind::InvalidRequest, message)
}

pub fn unknown_reference(message: impl Into<String>) -> EntitlementError {
    EntitlementError::new(EntitlementErrorKind::UnknownReference, message)
}

pub fn allocation_exhausted(message: impl Into<String>) -> EntitlementError {
    EntitlementError::new(EntitlementErrorKind::AllocationExhausted, message)
}

pub fn ledger_conflict(message: impl Into<String>) -> EntitlementError {
    EntitlementError::new(EntitlementErrorKind::LedgerConflict, message)
}

pub fn arithmetic_error(message: impl Into<String>) -> EntitlementError {
    EntitlementError::new(EntitlementErrorKind::Arithmetic, message)
}

pub fn storage_error(message: impl Into<String>) -> EntitlementError {
    EntitlementError::new(EntitlementErrorKind::Storage, message)
}
