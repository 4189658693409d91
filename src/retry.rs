//! Bounds on repeated visits to a state.

use crate::state::State;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Visit bound applied to states without an explicit one.
pub const DEFAULT_MAX_VISITS: u32 = 10;

/// Delay inserted before re-entering a state that has already run.
///
/// # Examples
///
/// ```
/// use tsunagi::Backoff;
/// use std::time::Duration;
///
/// // No delay (default)
/// let backoff = Backoff::None;
///
/// // Fixed delay of 2 seconds before every re-visit
/// let backoff = Backoff::fixed(Duration::from_secs(2));
///
/// // Doubling delay starting at 500ms
/// let backoff = Backoff::exponential(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Re-enter immediately.
    #[default]
    None,
    /// Fixed delay before each re-visit.
    Fixed {
        /// Delay before each re-visit
        #[serde(with = "millis")]
        delay: Duration,
    },
    /// Exponential backoff with configurable parameters.
    Exponential {
        /// Delay before the first re-visit
        #[serde(with = "millis")]
        initial_delay: Duration,
        /// Maximum delay cap
        #[serde(with = "millis")]
        max_delay: Duration,
        /// Multiplier for each re-visit (e.g., 2 doubles the delay)
        multiplier: u32,
    },
}

/// Error returned when a [`Backoff`] configuration is invalid.
///
/// ```
/// use tsunagi::{Backoff, RetryPolicyError};
/// use std::time::Duration;
///
/// // Invalid: multiplier is 0
/// let result = Backoff::exponential_with(
///     Duration::from_millis(100),
///     Duration::from_secs(10),
///     0,
/// );
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicyError(pub &'static str);

impl std::fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryPolicyError {}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed { delay }
    }

    /// Doubling backoff capped at 60 seconds.
    ///
    /// ```
    /// use tsunagi::Backoff;
    /// use std::time::Duration;
    ///
    /// let backoff = Backoff::exponential(Duration::from_millis(100));
    ///
    /// // Delays: 100ms, 200ms, 400ms, ...
    /// assert_eq!(backoff.delay_for_attempt(0), Some(Duration::from_millis(100)));
    /// assert_eq!(backoff.delay_for_attempt(1), Some(Duration::from_millis(200)));
    /// assert_eq!(backoff.delay_for_attempt(2), Some(Duration::from_millis(400)));
    /// ```
    pub fn exponential(initial_delay: Duration) -> Self {
        Backoff::Exponential {
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Exponential backoff with custom settings.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if:
    /// - `multiplier` is 0 (would result in no backoff)
    /// - `multiplier` is greater than 10 (risk of overflow)
    /// - `max_delay` is less than `initial_delay`
    pub fn exponential_with(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        let backoff = Backoff::Exponential {
            initial_delay,
            max_delay,
            multiplier,
        };
        backoff.validate()?;
        Ok(backoff)
    }

    /// Checks the parameters of an exponential backoff.
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if let Backoff::Exponential {
            initial_delay,
            max_delay,
            multiplier,
        } = self
        {
            if *multiplier == 0 {
                return Err(RetryPolicyError("multiplier must be greater than 0"));
            }
            if *multiplier > 10 {
                return Err(RetryPolicyError(
                    "multiplier must be 10 or less to avoid overflow",
                ));
            }
            if max_delay < initial_delay {
                return Err(RetryPolicyError("max_delay must be >= initial_delay"));
            }
        }
        Ok(())
    }

    /// Calculates the delay before the given re-visit.
    ///
    /// Attempt numbers are 0-indexed (the first re-visit is attempt 0).
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Fixed { delay } => Some(*delay),
            Backoff::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let factor = multiplier.saturating_pow(attempt);
                Some(initial_delay.saturating_mul(factor).min(*max_delay))
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Per-state bound on visits before a run is declared exhausted.
///
/// Bounds differ per state: waiting for a manual login may legitimately
/// need dozens of polls, parsing page text should not be retried more
/// than a couple of times.
///
/// # Examples
///
/// ```
/// use tsunagi::{RetryPolicy, State};
///
/// let policy = RetryPolicy::default()
///     .with_max_visits("await_manual_login", 120)
///     .with_max_visits("parse_job_details", 2);
///
/// let parse = State::new("parse_job_details");
/// assert!(policy.should_continue(&parse, 2));
/// assert!(!policy.should_continue(&parse, 3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    default_max_visits: Option<u32>,
    max_visits: HashMap<State, u32>,
    backoff: HashMap<State, Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_max_visits: Some(DEFAULT_MAX_VISITS),
            max_visits: HashMap::new(),
            backoff: HashMap::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy with no default bound. Only states given an explicit bound
    /// are limited.
    pub fn unbounded() -> Self {
        Self {
            default_max_visits: None,
            ..Self::default()
        }
    }

    pub fn with_default_max_visits(mut self, max_visits: u32) -> Self {
        self.default_max_visits = Some(max_visits);
        self
    }

    pub fn with_max_visits(mut self, state: impl Into<State>, max_visits: u32) -> Self {
        self.set_max_visits(state, max_visits);
        self
    }

    pub fn with_backoff(mut self, state: impl Into<State>, backoff: Backoff) -> Self {
        self.set_backoff(state, backoff);
        self
    }

    pub fn set_max_visits(&mut self, state: impl Into<State>, max_visits: u32) {
        self.max_visits.insert(state.into(), max_visits);
    }

    pub fn set_backoff(&mut self, state: impl Into<State>, backoff: Backoff) {
        self.backoff.insert(state.into(), backoff);
    }

    /// Checks every configured backoff.
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        self.backoff.values().try_for_each(Backoff::validate)
    }

    /// The visit bound for `state`, or `None` when unbounded.
    pub fn max_visits(&self, state: &State) -> Option<u32> {
        self.max_visits
            .get(state)
            .copied()
            .or(self.default_max_visits)
    }

    /// Whether the `visit_count`-th visit (1-based) to `state` is permitted.
    pub fn should_continue(&self, state: &State, visit_count: u32) -> bool {
        match self.max_visits(state) {
            Some(max) => visit_count <= max,
            None => true,
        }
    }

    /// Delay before the `visit_count`-th visit (1-based) to `state`.
    ///
    /// First visits are never delayed.
    pub fn delay_before_visit(&self, state: &State, visit_count: u32) -> Option<Duration> {
        if visit_count < 2 {
            return None;
        }
        self.backoff
            .get(state)
            .and_then(|b| b.delay_for_attempt(visit_count - 2))
            .filter(|d| !d.is_zero())
    }
}

/// Visit counters for one run.
///
/// Created fresh when a run starts and never shared between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitCounts(BTreeMap<State, u32>);

impl VisitCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter for `state` and returns the new count.
    pub fn record(&mut self, state: &State) -> u32 {
        let count = self.0.entry(state.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, state: &State) -> u32 {
        self.0.get(state).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&State, u32)> {
        self.0.iter().map(|(s, c)| (s, *c))
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}
