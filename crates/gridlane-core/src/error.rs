//! Error types for gridlane-core operations

use std::collections::TryReserveError;
use std::fmt;

use gridlane_backends::DriverError;

/// Result type for gridlane-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Public operation that failed. Rendered as the first part of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SetUpFunction,
    RunFunction,
    CreateBuffer,
    ReleaseResource,
    OpenDevice,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operation::SetUpFunction => "unable to set up function",
            Operation::RunFunction => "unable to run function",
            Operation::CreateBuffer => "unable to create buffer",
            Operation::ReleaseResource => "unable to release resource",
            Operation::OpenDevice => "unable to open device",
        };
        f.write_str(text)
    }
}

/// Coarse classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller supplied an argument that can never succeed
    Validation,
    /// A handle does not reference a live resource of the expected kind
    NotFound,
    /// A size or the handle space exceeded its limit
    Overflow,
    /// Kernel source, entry point, pipeline or queue could not be built
    Compile,
    /// The device reported a failure while running a dispatch
    Execution,
    /// Memory could not be obtained
    Allocation,
    /// The requested backend has no usable device
    Device,
}

/// Handle cache lookup and insertion failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("invalid handle {0}")]
    InvalidHandle(i32),

    #[error("handle {0} has been released")]
    Vacant(i32),

    #[error("handle {handle} does not reference a {expected}")]
    WrongKind { handle: i32, expected: &'static str },

    #[error("handle space exhausted")]
    Exhausted,

    #[error("failed to grow handle cache: {0}")]
    Allocation(#[source] TryReserveError),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::InvalidHandle(_) | CacheError::Vacant(_) | CacheError::WrongKind { .. } => ErrorKind::NotFound,
            CacheError::Exhausted => ErrorKind::Overflow,
            CacheError::Allocation(_) => ErrorKind::Allocation,
        }
    }
}

/// Why an operation failed.
#[derive(Debug, thiserror::Error)]
pub enum Reason {
    #[error("missing code")]
    MissingCode,

    #[error("missing function name")]
    MissingFunctionName,

    #[error("failed to create library: {0}")]
    CreateLibrary(#[source] DriverError),

    #[error("failed to find function '{0}'")]
    FunctionNotFound(String),

    #[error("failed to create pipeline: {0}")]
    CreatePipeline(#[source] DriverError),

    #[error("failed to create command queue: {0}")]
    CreateQueue(#[source] DriverError),

    #[error("failed to retrieve function")]
    RetrieveFunction(#[source] CacheError),

    /// `position` is 1-based
    #[error("failed to retrieve buffer {position}/{count} using id {id}")]
    RetrieveBuffer {
        position: usize,
        count: usize,
        id: i32,
        #[source]
        source: CacheError,
    },

    #[error("failed to execute function: {0}")]
    Execution(#[source] DriverError),

    #[error("missing dimension(s)")]
    MissingDimensions,

    #[error("invalid dimension {value} at position {index}")]
    InvalidDimension { index: usize, value: i64 },

    #[error("exceeded maximum bytes ({limit})")]
    ExceededMaximumBytes { limit: i64 },

    #[error("failed to allocate shared memory: {0}")]
    Allocate(#[source] DriverError),

    #[error("host kernels are not supported by the {backend} backend")]
    HostKernelsUnsupported { backend: &'static str },

    #[error("failed to open device: {0}")]
    Device(#[source] DriverError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl Reason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Reason::MissingCode
            | Reason::MissingFunctionName
            | Reason::MissingDimensions
            | Reason::InvalidDimension { .. }
            | Reason::HostKernelsUnsupported { .. } => ErrorKind::Validation,
            Reason::CreateLibrary(_)
            | Reason::FunctionNotFound(_)
            | Reason::CreatePipeline(_)
            | Reason::CreateQueue(_) => ErrorKind::Compile,
            Reason::RetrieveFunction(_) | Reason::RetrieveBuffer { .. } => ErrorKind::NotFound,
            Reason::Execution(_) => ErrorKind::Execution,
            Reason::ExceededMaximumBytes { .. } => ErrorKind::Overflow,
            Reason::Allocate(_) => ErrorKind::Allocation,
            Reason::Device(_) => ErrorKind::Device,
            Reason::Cache(err) => err.kind(),
        }
    }
}

/// Error returned by every public [`crate::Context`] operation.
///
/// Displays as `<operation>: <reason>`, e.g.
/// `unable to run function: failed to retrieve buffer 1/1 using id 10000`.
/// The driver or cache diagnostic stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
#[error("{operation}: {reason}")]
pub struct Error {
    operation: Operation,
    #[source]
    reason: Reason,
}

impl Error {
    pub fn new(operation: Operation, reason: impl Into<Reason>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn kind(&self) -> ErrorKind {
        self.reason.kind()
    }

    pub fn reason(&self) -> &Reason {
        &self.reason
    }

    /// Build the error and log it at warn level.
    pub(crate) fn logged(operation: Operation, reason: impl Into<Reason>) -> Self {
        let err = Self::new(operation, reason);
        tracing::warn!(error = %err, kind = ?err.kind(), "operation_failed");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_carry_operation_prefix() {
        let err = Error::new(Operation::SetUpFunction, Reason::MissingCode);
        assert_eq!(err.to_string(), "unable to set up function: missing code");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = Error::new(
            Operation::RunFunction,
            Reason::RetrieveBuffer {
                position: 1,
                count: 1,
                id: 10000,
                source: CacheError::InvalidHandle(10000),
            },
        );
        assert_eq!(err.to_string(), "unable to run function: failed to retrieve buffer 1/1 using id 10000");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn driver_diagnostic_is_reachable_through_source() {
        let err = Error::new(
            Operation::SetUpFunction,
            Reason::CreateLibrary(DriverError::Compilation("expected ';'".to_string())),
        );
        assert_eq!(err.to_string(), "unable to set up function: failed to create library: expected ';'");
        assert_eq!(err.kind(), ErrorKind::Compile);

        let reason = err.source().unwrap();
        let driver = reason.source().unwrap();
        assert_eq!(driver.to_string(), "expected ';'");
    }

    #[test]
    fn cache_errors_keep_their_kind() {
        let err = Error::new(Operation::ReleaseResource, CacheError::Vacant(3));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "unable to release resource: handle 3 has been released");

        let err = Error::new(Operation::CreateBuffer, CacheError::Exhausted);
        assert_eq!(err.kind(), ErrorKind::Overflow);
    }
}
