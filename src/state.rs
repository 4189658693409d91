use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe state identifier.
///
/// Names a point in the workflow's control graph. States are only ever
/// referenced, never mutated.
///
/// # Examples
///
/// ```
/// use tsunagi::State;
///
/// let state = State::new("awaiting_login");
/// assert_eq!(state.as_str(), "awaiting_login");
///
/// // From trait for ergonomic conversion
/// let state: State = "search_submitted".into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(String);

impl State {
    /// Creates a new State
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the state name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque label a step emits describing what happened.
///
/// Besides the tokens steps produce themselves, the engine synthesizes
/// two families of outcomes:
///
/// - `"<state>_crashed"` when a step returns an error or panics
/// - `"<state>_timeout"` when a step exceeds its configured timeout
///
/// ```
/// use tsunagi::{Outcome, State};
///
/// let state = State::new("wait_for_load");
/// assert_eq!(Outcome::crashed(&state).as_str(), "wait_for_load_crashed");
/// assert_eq!(Outcome::timed_out(&state).as_str(), "wait_for_load_timeout");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outcome(String);

impl Outcome {
    /// Catch-all outcome key in a transition table.
    pub const WILDCARD: &'static str = "*";

    /// Creates a new Outcome
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Outcome synthesized when the step bound to `state` fails.
    pub fn crashed(state: &State) -> Self {
        Self(format!("{}_crashed", state))
    }

    /// Outcome synthesized when the step bound to `state` times out.
    pub fn timed_out(state: &State) -> Self {
        Self(format!("{}_timeout", state))
    }

    /// Returns the outcome token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }
}

macro_rules! string_newtype_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&$ty> for $ty {
            fn from(s: &$ty) -> Self {
                s.clone()
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $ty {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $ty {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_newtype_impls!(State);
string_newtype_impls!(Outcome);
