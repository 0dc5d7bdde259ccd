//! Error handling for the covenant engine
//!
//! Only registry management and configuration loading surface errors to the
//! caller. Everything that happens after a script is admitted to `run` is
//! reported as a verdict plus an audit record instead.

use thiserror::Error;

/// Main error type for the covenant engine
#[derive(Error, Debug)]
pub enum CovenantError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate MoScript id: {id}")]
    DuplicateId { id: String },

    #[error("Unknown MoScript id: {id}")]
    UnknownId { id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Mutex lock failed: {resource}")]
    MutexPoisoned { resource: String },
}

/// Type alias for Result with CovenantError
pub type CovenantResult<T> = Result<T, CovenantError>;

impl CovenantError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate id error
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Create an unknown id error
    pub fn unknown_id(id: impl Into<String>) -> Self {
        Self::UnknownId { id: id.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create a poisoned-lock error for the named resource
    pub fn poisoned(resource: impl Into<String>) -> Self {
        Self::MutexPoisoned {
            resource: resource.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Helper trait for safe mutex operations
///
/// Returns a `CovenantError` on poison instead of panicking.
pub trait SafeLock<T: ?Sized> {
    fn safe_lock(&self, resource: &str) -> CovenantResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self, resource: &str) -> CovenantResult<std::sync::MutexGuard<'_, T>> {
        self.lock().map_err(|_| CovenantError::poisoned(resource))
    }
}

/// Helper trait for safe RwLock read operations
pub trait SafeReadLock<T: ?Sized> {
    fn safe_read(&self, resource: &str) -> CovenantResult<std::sync::RwLockReadGuard<'_, T>>;
}

impl<T: ?Sized> SafeReadLock<T> for std::sync::RwLock<T> {
    fn safe_read(&self, resource: &str) -> CovenantResult<std::sync::RwLockReadGuard<'_, T>> {
        self.read().map_err(|_| CovenantError::poisoned(resource))
    }
}

/// Helper trait for safe RwLock write operations
pub trait SafeWriteLock<T: ?Sized> {
    fn safe_write(&self, resource: &str) -> CovenantResult<std::sync::RwLockWriteGuard<'_, T>>;
}

impl<T: ?Sized> SafeWriteLock<T> for std::sync::RwLock<T> {
    fn safe_write(&self, resource: &str) -> CovenantResult<std::sync::RwLockWriteGuard<'_, T>> {
        self.write().map_err(|_| CovenantError::poisoned(resource))
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for CovenantError {
    fn from(err: serde_json::Error) -> Self {
        CovenantError::serialization("json_operation", err)
    }
}

/// Convert from figment errors
impl From<figment::Error> for CovenantError {
    fn from(err: figment::Error) -> Self {
        CovenantError::config(err.to_string())
    }
}
