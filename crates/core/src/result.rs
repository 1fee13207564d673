//! Result type definition and logging combinators.
//!
//! Collaborator failures that must not propagate (listener callbacks, timer
//! tasks, best-effort polls) are reported through these combinators so the
//! error always reaches the log instead of being dropped.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for shardwell core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Logging combinators for any `Result` whose error is displayable.
pub trait ResultExt<T, E> {
    /// Convert to an `Option`, logging the error at `error` level.
    fn ok_or_log(self, operation: &str) -> Option<T>;

    /// Log the error at `warn` level and hand the result back untouched.
    fn warn_on_err(self, operation: &str) -> Self;
}

impl<T, E: Display> ResultExt<T, E> for std::result::Result<T, E> {
    fn ok_or_log(self, operation: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(operation, error = %e, "Operation failed");
                None
            }
        }
    }

    fn warn_on_err(self, operation: &str) -> Self {
        if let Err(ref e) = self {
            tracing::warn!(operation, error = %e, "Operation failed");
        }
        self
    }
}

/// Extension trait for Option types.
pub trait OptionExt<T> {
    /// Tap into None without consuming the Option.
    fn tap_none<F: FnOnce()>(self, f: F) -> Self;
}

impl<T> OptionExt<T> for Option<T> {
    fn tap_none<F: FnOnce()>(self, f: F) -> Self {
        if self.is_none() {
            f();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_or_log_ok() {
        let result: Result<i32> = Ok(42);
        assert_eq!(result.ok_or_log("test"), Some(42));
    }

    #[test]
    fn test_ok_or_log_err() {
        let result: Result<i32> = Err(Error::Unknown("test".into()));
        assert_eq!(result.ok_or_log("test"), None);
    }

    #[test]
    fn test_warn_on_err_passes_through() {
        let result: std::result::Result<i32, &str> = Err("boom");
        assert_eq!(result.warn_on_err("test"), Err("boom"));
    }

    #[test]
    fn test_tap_none() {
        let mut called = false;
        let opt: Option<i32> = None;
        let _ = opt.tap_none(|| called = true);
        assert!(called);
    }

    #[test]
    fn test_tap_none_skips_some() {
        let mut called = false;
        let _ = Some(1).tap_none(|| called = true);
        assert!(!called);
    }
}
