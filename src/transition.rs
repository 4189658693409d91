use crate::state::{Outcome, State};
use std::collections::HashMap;
use std::fmt;

/// Mapping from `(state, outcome)` to the next state.
///
/// Explicit entries always win. A state may additionally define a catch-all
/// entry under the outcome `"*"`, which receives every outcome that has no
/// explicit entry, crashes and timeouts included.
///
/// # Examples
///
/// ```
/// use tsunagi::{TransitionTable, State, Outcome};
///
/// let table = TransitionTable::new()
///     .on("wait_for_load", "page_loaded", "detect_page_state")
///     .on("wait_for_load", "page_load_retry", "refresh_page")
///     .otherwise("wait_for_load", "refresh_page");
///
/// let state = State::new("wait_for_load");
/// assert_eq!(
///     table.next(&state, &Outcome::new("page_loaded")),
///     Some(&State::new("detect_page_state"))
/// );
/// assert_eq!(
///     table.next(&state, &Outcome::new("wait_for_load_crashed")),
///     Some(&State::new("refresh_page"))
/// );
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    entries: HashMap<State, HashMap<Outcome, State>>,
}

impl fmt::Debug for TransitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (state, outcomes) in &self.entries {
            map.entry(&state.as_str(), &outcomes.len());
        }
        map.finish()
    }
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `(from, outcome) -> to`, replacing any existing entry.
    pub fn on(
        mut self,
        from: impl Into<State>,
        outcome: impl Into<Outcome>,
        to: impl Into<State>,
    ) -> Self {
        self.insert(from, outcome, to);
        self
    }

    /// Adds a catch-all entry for `from`.
    pub fn otherwise(self, from: impl Into<State>, to: impl Into<State>) -> Self {
        self.on(from, Outcome::WILDCARD, to)
    }

    pub fn insert(
        &mut self,
        from: impl Into<State>,
        outcome: impl Into<Outcome>,
        to: impl Into<State>,
    ) -> Option<State> {
        self.entries
            .entry(from.into())
            .or_default()
            .insert(outcome.into(), to.into())
    }

    /// Looks up the next state.
    ///
    /// Returns `None` when neither an explicit entry nor a catch-all exists.
    pub fn next(&self, state: &State, outcome: &Outcome) -> Option<&State> {
        let outcomes = self.entries.get(state)?;
        outcomes
            .get(outcome)
            .or_else(|| outcomes.get(Outcome::WILDCARD))
    }

    /// Returns `true` if `state` has at least one outgoing entry.
    pub fn has_state(&self, state: &State) -> bool {
        self.entries.contains_key(state)
    }

    /// All source states with outgoing entries.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.entries.keys()
    }

    /// All `(from, outcome, to)` entries, catch-alls included.
    pub fn entries(&self) -> impl Iterator<Item = (&State, &Outcome, &State)> {
        self.entries.iter().flat_map(|(from, outcomes)| {
            outcomes.iter().map(move |(outcome, to)| (from, outcome, to))
        })
    }

    /// Every state some entry leads to.
    pub fn targets(&self) -> impl Iterator<Item = &State> {
        self.entries().map(|(_, _, to)| to)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TransitionTable {
        TransitionTable::new()
            .on("S0", "ok", "S1")
            .on("S0", "retry", "S0")
            .otherwise("S0", "RECOVERY")
            .on("S1", "ok", "TERMINAL")
    }

    #[test]
    fn test_explicit_entry() {
        let t = table();
        assert_eq!(
            t.next(&State::new("S0"), &Outcome::new("ok")),
            Some(&State::new("S1"))
        );
        assert_eq!(
            t.next(&State::new("S0"), &Outcome::new("retry")),
            Some(&State::new("S0"))
        );
    }

    #[test]
    fn test_next_is_deterministic() {
        let t = table();
        for (from, outcome, _) in t.entries() {
            assert_eq!(t.next(from, outcome), t.next(from, outcome));
        }
    }

    #[test]
    fn test_wildcard_fallback() {
        let t = table();
        assert_eq!(
            t.next(&State::new("S0"), &Outcome::new("weird")),
            Some(&State::new("RECOVERY"))
        );
        // explicit entries beat the catch-all
        assert_eq!(
            t.next(&State::new("S0"), &Outcome::new("ok")),
            Some(&State::new("S1"))
        );
    }

    #[test]
    fn test_unmapped() {
        let t = table();
        assert_eq!(t.next(&State::new("S1"), &Outcome::new("weird")), None);
        assert_eq!(t.next(&State::new("nowhere"), &Outcome::new("ok")), None);
    }

    #[test]
    fn test_insert_replaces() {
        let mut t = TransitionTable::new();
        assert_eq!(t.insert("a", "x", "b"), None);
        assert_eq!(t.insert("a", "x", "c"), Some(State::new("b")));
        assert_eq!(t.len(), 1);
        assert!(t.has_state(&State::new("a")));
        assert_eq!(t.targets().collect::<Vec<_>>(), vec![&State::new("c")]);
    }
}
