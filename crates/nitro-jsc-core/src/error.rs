//! Errors raised by the safe layer
//!
//! Thrown JavaScript values are kept alive inside [`JsException`] so callers
//! can inspect or rethrow them; the extracted name, message and location are
//! there for display.

use std::fmt;

use nitro_jsc_sys::LoadError;
use thiserror::Error;

use crate::value::JscValue;

/// Result of an engine operation
pub type JscResult<T> = Result<T, JscError>;

/// Everything that can go wrong between Rust and the engine
#[derive(Debug, Error)]
pub enum JscError {
    /// The native library could not be located or loaded
    #[error(transparent)]
    Library(#[from] LoadError),

    /// A handle was used after its context reached a zero reference count
    #[error("{what} has been released")]
    Released { what: &'static str },

    /// `JSGlobalContextCreate` failed
    #[error("could not create a JavaScriptCore context: {message}")]
    ContextCreation { message: String },

    /// A JavaScript value was thrown
    #[error("{0}")]
    Exception(Box<JsException>),

    /// Host-side type mismatch, raised before any engine call
    #[error("expected {expected}, found {actual}")]
    TypeError { expected: String, actual: String },

    /// An engine call produced no handle
    #[error("{operation} produced a null handle")]
    NullPointer { operation: String },

    /// JSON could not be produced or parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Host-side failure with no better category
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A thrown JavaScript value with the details extracted from it
pub struct JsException {
    pub(crate) value: JscValue,
    /// `name` of the thrown error, `"Error"` for thrown primitives
    pub name: String,
    /// `message` of the thrown error, or the string form of a primitive
    pub message: String,
    pub source_url: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub stack: Option<String>,
}

impl JsException {
    /// The thrown value itself
    pub fn value(&self) -> &JscValue {
        &self.value
    }

    /// Take ownership of the thrown value
    pub fn into_value(self) -> JscValue {
        self.value
    }
}

impl fmt::Debug for JsException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsException")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("source_url", &self.source_url)
            .field("line", &self.line)
            .field("column", &self.column)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for JsException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        f.write_str(&format_location(self.source_url.as_deref(), self.line, self.column))
    }
}

/// Format location for error display
fn format_location(file: Option<&str>, line: Option<u32>, column: Option<u32>) -> String {
    match (file, line, column) {
        (Some(f), Some(l), Some(c)) => format!(" at {}:{}:{}", f, l, c),
        (Some(f), Some(l), None) => format!(" at {}:{}", f, l),
        (None, Some(l), Some(c)) => format!(" at line {}:{}", l, c),
        (None, Some(l), None) => format!(" at line {}", l),
        _ => String::new(),
    }
}

impl From<JsException> for JscError {
    fn from(exception: JsException) -> Self {
        Self::Exception(Box::new(exception))
    }
}

impl JscError {
    /// Error for an operation on a released context
    pub fn released() -> Self {
        Self::Released { what: "JSContext" }
    }

    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a null pointer error
    pub fn null_pointer(operation: impl Into<String>) -> Self {
        Self::NullPointer {
            operation: operation.into(),
        }
    }

    /// The thrown exception, if this error is one
    pub fn exception(&self) -> Option<&JsException> {
        match self {
            Self::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// Check if this is a thrown JavaScript value
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    /// Check if this is a lifecycle error
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released { .. })
    }

    /// Get the stack trace if available
    pub fn stack_trace(&self) -> Option<&str> {
        self.exception().and_then(|e| e.stack.as_deref())
    }

    /// Get source location if available
    pub fn location(&self) -> Option<(Option<&str>, Option<u32>, Option<u32>)> {
        self.exception()
            .map(|e| (e.source_url.as_deref(), e.line, e.column))
    }

    /// Get the error type name (e.g., "TypeError", "SyntaxError")
    pub fn error_type(&self) -> &str {
        match self {
            Self::Exception(exception) => &exception.name,
            Self::Library(_) => "LibraryError",
            Self::Released { .. } => "ReleasedError",
            Self::ContextCreation { .. } => "ContextError",
            Self::TypeError { .. } => "TypeError",
            Self::NullPointer { .. } => "InternalError",
            Self::Json(_) => "JsonError",
            Self::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_format() {
        assert_eq!(format_location(Some("a.js"), Some(3), Some(7)), " at a.js:3:7");
        assert_eq!(format_location(Some("a.js"), Some(3), None), " at a.js:3");
        assert_eq!(format_location(None, Some(3), None), " at line 3");
        assert_eq!(format_location(Some("a.js"), None, None), "");
    }

    #[test]
    fn test_released() {
        let err = JscError::released();
        assert_eq!(err.to_string(), "JSContext has been released");
        assert!(err.is_released());
        assert!(!err.is_exception());
    }

    #[test]
    fn test_type_error() {
        let err = JscError::type_error("function", "object");
        assert!(err.to_string().contains("expected function"));
        assert!(err.to_string().contains("found object"));
        assert_eq!(err.error_type(), "TypeError");
    }

    #[test]
    fn test_null_pointer() {
        let err = JscError::null_pointer("JSObjectMake");
        assert!(err.to_string().contains("JSObjectMake"));
        assert!(err.to_string().contains("produced a null handle"));
    }

    #[test]
    fn test_library_error_is_transparent() {
        let err = JscError::from(LoadError::NotFound {
            name: "JavaScriptCore".into(),
            searched: Vec::new(),
        });
        assert!(err.to_string().contains("`JavaScriptCore` not found"));
        assert_eq!(err.error_type(), "LibraryError");
    }

    #[test]
    fn test_location_none() {
        let err = JscError::Internal("test".into());
        assert!(err.location().is_none());
        assert!(err.stack_trace().is_none());
        assert!(err.exception().is_none());
    }
}
