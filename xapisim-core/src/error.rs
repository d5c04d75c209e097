//! Error types for the simulator.
//!
//! Every failure a client can observe is an [`ApiError`]: an [`ErrorKind`]
//! plus an ordered list of context strings. Together they form the XenAPI
//! `ErrorDescription` array, `[CODE, context...]`.

use std::fmt;

use thiserror::Error;

/// XenAPI error codes modeled by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unresolvable class or operation name.
    MessageMethodUnknown,
    /// Arity mismatch between call and resolved operation.
    MessageParameterCountMismatch,
    /// A parameter's runtime type does not match the declared type.
    FieldTypeError,
    /// A required field is absent from a `create` argument struct.
    FieldMissing,
    /// Object reference does not identify an existing record.
    HandleInvalid,
    /// No record in the class has the given uuid.
    UuidInvalid,
    /// Insertion of an already-present map key.
    MapDuplicateKey,
    /// Two records of one class would share a unique field value.
    DbUniquenessConstraintViolation,
    /// Supplied session reference does not identify a live session.
    SessionInvalid,
    /// Credential mismatch at login.
    SessionAuthenticationFailed,
    /// Empty replacement credential.
    ChangePasswordRejected,
    /// Known XenAPI method the simulator does not model.
    NotImplemented,
    /// Operation not allowed on the object in its current state.
    OperationNotAllowed,
    /// VM is in the wrong power state for the requested operation.
    VmBadPowerState,
    /// Eject/insert on a VBD that is not a CD drive.
    VbdNotRemovableMedia,
    /// Eject on a VBD with no media.
    VbdIsEmpty,
    /// Insert on a VBD that already has media.
    VbdNotEmpty,
    /// SR is not plugged into enough hosts.
    SrHasNoPbds,
    /// SR type does not support the operation.
    SrOperationNotSupported,
    /// Simulator-side defect (e.g. poisoned lock).
    InternalError,
}

impl ErrorKind {
    /// Wire code, the first element of `ErrorDescription`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::MessageMethodUnknown => "MESSAGE_METHOD_UNKNOWN",
            ErrorKind::MessageParameterCountMismatch => "MESSAGE_PARAMETER_COUNT_MISMATCH",
            ErrorKind::FieldTypeError => "FIELD_TYPE_ERROR",
            ErrorKind::FieldMissing => "FIELD_MISSING",
            ErrorKind::HandleInvalid => "HANDLE_INVALID",
            ErrorKind::UuidInvalid => "UUID_INVALID",
            ErrorKind::MapDuplicateKey => "MAP_DUPLICATE_KEY",
            ErrorKind::DbUniquenessConstraintViolation => "DB_UNIQUENESS_CONSTRAINT_VIOLATION",
            ErrorKind::SessionInvalid => "SESSION_INVALID",
            ErrorKind::SessionAuthenticationFailed => "SESSION_AUTHENTICATION_FAILED",
            ErrorKind::ChangePasswordRejected => "CHANGE_PASSWORD_REJECTED",
            ErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ErrorKind::OperationNotAllowed => "OPERATION_NOT_ALLOWED",
            ErrorKind::VmBadPowerState => "VM_BAD_POWER_STATE",
            ErrorKind::VbdNotRemovableMedia => "VBD_NOT_REMOVABLE_MEDIA",
            ErrorKind::VbdIsEmpty => "VBD_IS_EMPTY",
            ErrorKind::VbdNotEmpty => "VBD_NOT_EMPTY",
            ErrorKind::SrHasNoPbds => "SR_HAS_NO_PBDS",
            ErrorKind::SrOperationNotSupported => "SR_OPERATION_NOT_SUPPORTED",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A modeled XenAPI fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} {details:?}")]
pub struct ApiError {
    /// Error kind, rendered as the wire code
    pub kind: ErrorKind,
    /// Context strings following the code
    pub details: Vec<String>,
}

impl ApiError {
    /// Create a fault from a kind and its context strings.
    pub fn new<I, S>(kind: ErrorKind, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            details: details.into_iter().map(Into::into).collect(),
        }
    }

    /// The XenAPI `ErrorDescription` array: code first, then context.
    pub fn error_description(&self) -> Vec<String> {
        let mut description = Vec::with_capacity(self.details.len() + 1);
        description.push(self.kind.code().to_string());
        description.extend(self.details.iter().cloned());
        description
    }

    // Convenience constructors

    pub fn method_unknown(method: impl Into<String>) -> Self {
        Self::new(ErrorKind::MessageMethodUnknown, [method.into()])
    }

    pub fn parameter_count_mismatch(method: &str, expected: usize, supplied: isize) -> Self {
        Self::new(
            ErrorKind::MessageParameterCountMismatch,
            [method.to_string(), expected.to_string(), supplied.to_string()],
        )
    }

    pub fn field_type(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::FieldTypeError, [name.into()])
    }

    pub fn field_missing(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::FieldMissing, [name.into()])
    }

    pub fn handle_invalid(class: &str, obj_ref: &str) -> Self {
        Self::new(ErrorKind::HandleInvalid, [class, obj_ref])
    }

    pub fn uuid_invalid(class: &str, uuid: &str) -> Self {
        Self::new(ErrorKind::UuidInvalid, [class, uuid])
    }

    pub fn map_duplicate_key(class: &str, field: &str, obj_ref: &str, key: &str) -> Self {
        Self::new(ErrorKind::MapDuplicateKey, [class, field, obj_ref, key])
    }

    pub fn session_invalid(session_ref: &str) -> Self {
        Self::new(ErrorKind::SessionInvalid, [session_ref])
    }

    pub fn authentication_failed() -> Self {
        Self::new(ErrorKind::SessionAuthenticationFailed, Vec::<String>::new())
    }

    pub fn not_implemented(method: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, [method.into()])
    }

    pub fn operation_not_allowed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationNotAllowed, [reason.into()])
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, [message.into()])
    }
}

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, ApiError>;
