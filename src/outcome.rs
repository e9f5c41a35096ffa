//! Result type for work that is allowed to fail without aborting the caller.

use std::fmt;

/// Outcome of a best-effort operation.
///
/// `Skipped` is the benign path (a locked file, a missing history file, an
/// unsupported URL) and is kept apart from `Failed` so callers and tests can
/// tell "nothing to do" from "something broke".
#[derive(Debug)]
pub enum BestEffort<T> {
    Done(T),
    Skipped(String),
    Failed(anyhow::Error),
}

impl<T> BestEffort<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, BestEffort::Done(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, BestEffort::Skipped(_))
    }

    /// Returns the value, or `fallback` for both non-success variants.
    pub fn unwrap_or(self, fallback: T) -> T {
        match self {
            BestEffort::Done(value) => value,
            BestEffort::Skipped(_) | BestEffort::Failed(_) => fallback,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            BestEffort::Done(value) => Some(value),
            BestEffort::Skipped(_) | BestEffort::Failed(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> BestEffort<U> {
        match self {
            BestEffort::Done(value) => BestEffort::Done(f(value)),
            BestEffort::Skipped(reason) => BestEffort::Skipped(reason),
            BestEffort::Failed(err) => BestEffort::Failed(err),
        }
    }
}

impl<T> fmt::Display for BestEffort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BestEffort::Done(_) => write!(f, "done"),
            BestEffort::Skipped(reason) => write!(f, "skipped: {reason}"),
            BestEffort::Failed(err) => write!(f, "failed: {err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_or_falls_back_for_skip_and_failure() {
        assert_eq!(BestEffort::Done(3).unwrap_or(0), 3);
        assert_eq!(BestEffort::<i32>::Skipped("missing".into()).unwrap_or(0), 0);
        assert_eq!(
            BestEffort::<i32>::Failed(anyhow::anyhow!("boom")).unwrap_or(0),
            0
        );
    }

    #[test]
    fn display_names_the_variant() {
        let skipped = BestEffort::<()>::Skipped("file in use".into());
        assert_eq!(skipped.to_string(), "skipped: file in use");
        let failed = BestEffort::<()>::Failed(anyhow::anyhow!("boom"));
        assert_eq!(failed.to_string(), "failed: boom");
    }
}
