//! Fetch lifecycle states for data-loading operations.
//!
//! Every repository fetch produces a Loading state followed by a terminal
//! Success or Error. Consumers fold these into their own view state.

/// State of an in-flight or completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    /// The fetch has started; no data yet.
    Loading,
    /// The fetch completed with data.
    Success(T),
    /// The fetch failed with a human-readable message.
    Error(String),
}

impl<T> FetchState<T> {
    /// True if this is the Loading state.
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    /// True if this is the Success state.
    pub fn is_success(&self) -> bool {
        matches!(self, FetchState::Success(_))
    }

    /// True if this is the Error state.
    pub fn is_error(&self) -> bool {
        matches!(self, FetchState::Error(_))
    }

    /// Returns the data if this is a Success, or None otherwise.
    pub fn success(self) -> Option<T> {
        match self {
            FetchState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error message if this is an Error, or None otherwise.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            FetchState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Maps the data if this is a Success using the given function.
    pub fn map<R>(self, f: impl FnOnce(T) -> R) -> FetchState<R> {
        match self {
            FetchState::Success(data) => FetchState::Success(f(data)),
            FetchState::Loading => FetchState::Loading,
            FetchState::Error(msg) => FetchState::Error(msg),
        }
    }
}
