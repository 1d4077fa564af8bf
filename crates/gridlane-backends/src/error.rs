//! Error types for driver operations

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Diagnostics reported by a driver.
///
/// The core layer wraps these with the operation that failed; the variants
/// here carry only what the backend itself knows.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No usable device for the requested backend
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The kernel source could not be turned into a module
    #[error("{0}")]
    Compilation(String),

    /// An entry point resolved but no execution pipeline could be built from it
    #[error("{0}")]
    Pipeline(String),

    /// The submission queue could not be created
    #[error("{0}")]
    Queue(String),

    /// Shared memory allocation failed
    #[error("failed to allocate {requested} bytes: {reason}")]
    Allocation { requested: usize, reason: String },

    /// A bound argument cannot be used by this backend
    #[error("argument {slot} is not a {backend} buffer")]
    ForeignBuffer { slot: usize, backend: &'static str },

    /// The device reported a failure while running a dispatch
    #[error("{0}")]
    Execution(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl DriverError {
    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }
}
