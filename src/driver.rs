//! Browser capability surface consumed by steps.
//!
//! The engine never talks to a concrete automation library. Steps reach the
//! browser through [`BrowserDriver`], and the selectors they need through a
//! [`SelectorCatalog`] injected into the [`Context`](crate::Context).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::error::DefinitionError;

/// Errors reported by a [`BrowserDriver`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DriverError {
    /// Navigation to a URL failed.
    #[error("Navigation to '{url}' failed: {details}")]
    Navigation { url: String, details: String },

    /// An element handle is no longer attached to the page.
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// The browser session is gone.
    #[error("Browser session closed")]
    SessionClosed,

    /// Any other driver-specific failure.
    #[error("Driver error: {0}")]
    Other(String),
}

/// Opaque handle to an element found on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element {
    id: String,
    selector: String,
}

impl Element {
    pub fn new(id: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selector: selector.into(),
        }
    }

    /// Driver-assigned identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The selector that matched this element.
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

/// Ordered list of alternative CSS selectors for one logical element.
///
/// Sites change their markup, so a step usually knows several ways of
/// locating the same button. Drivers try them in order and return the
/// first match.
///
/// ```
/// use tsunagi::SelectorSet;
///
/// let search = SelectorSet::new([
///     r#"button[data-automation="searchSubmit"]"#,
///     r#"button[type="submit"]"#,
/// ]);
/// assert_eq!(search.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "SelectorSetRepr", into = "Vec<String>")]
pub struct SelectorSet(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorSetRepr {
    One(String),
    Many(Vec<String>),
}

impl From<SelectorSetRepr> for SelectorSet {
    fn from(repr: SelectorSetRepr) -> Self {
        match repr {
            SelectorSetRepr::One(s) => Self(vec![s]),
            SelectorSetRepr::Many(v) => Self(v),
        }
    }
}

impl From<SelectorSet> for Vec<String> {
    fn from(set: SelectorSet) -> Self {
        set.0
    }
}

impl SelectorSet {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(selectors.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SelectorSet {
    fn from(s: &str) -> Self {
        Self(vec![s.to_string()])
    }
}

/// Read-only catalog of named selector sets for one site.
///
/// Loaded from JSON where each value is either a single selector string or
/// an array of alternatives:
///
/// ```
/// use tsunagi::SelectorCatalog;
///
/// let catalog = SelectorCatalog::from_json_str(r#"{
///     "job_card": "article[data-automation='normalJob']",
///     "sign_in": ["a[data-automation='sign in']", "a[href*='login']"]
/// }"#).unwrap();
///
/// assert_eq!(catalog.get("sign_in").map(|s| s.len()), Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorCatalog {
    entries: HashMap<String, SelectorSet>,
}

impl SelectorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn with(mut self, name: impl Into<String>, selectors: impl Into<SelectorSet>) -> Self {
        self.entries.insert(name.into(), selectors.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&SelectorSet> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Capability a step uses to drive the browser.
///
/// Implementations wrap a concrete automation library (WebDriver, CDP, ...).
/// Every method may suspend; the engine races the whole step against
/// cancellation, so implementations don't need to watch for it themselves.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Loads `url` in the current tab.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Reloads the current page.
    async fn refresh(&self) -> Result<(), DriverError>;

    /// Returns the first element matching any selector in the set, if present.
    async fn find(&self, selectors: &SelectorSet) -> Result<Option<Element>, DriverError>;

    async fn click(&self, element: &Element) -> Result<(), DriverError>;

    async fn fill(&self, element: &Element, text: &str) -> Result<(), DriverError>;

    /// Waits up to `timeout` for any selector in the set to match.
    ///
    /// Returns `Ok(None)` when nothing appeared in time.
    async fn wait_for(
        &self,
        selectors: &SelectorSet,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn title(&self) -> Result<String, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_catalog_accepts_string_or_list() {
        let catalog = SelectorCatalog::from_json_str(
            r#"{"apply": "button.apply", "next": ["button.next", "a.next"]}"#,
        )
        .unwrap();

        let apply = catalog.get("apply").unwrap();
        assert_eq!(apply.iter().collect::<Vec<_>>(), vec!["button.apply"]);

        let next = catalog.get("next").unwrap();
        assert_eq!(next.iter().collect::<Vec<_>>(), vec!["button.next", "a.next"]);
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_selector_catalog_rejects_bad_json() {
        let result = SelectorCatalog::from_json_str(r#"{"apply": 42}"#);
        assert!(matches!(result, Err(DefinitionError::Json(_))));
    }

    #[test]
    fn test_selector_catalog_builder() {
        let catalog = SelectorCatalog::new()
            .with("search", SelectorSet::new(["#search", "input[name=q]"]))
            .with("submit", "button[type=submit]");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("search").map(SelectorSet::len), Some(2));
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Navigation {
            url: "https://www.seek.com.au".to_string(),
            details: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Navigation to 'https://www.seek.com.au' failed: net::ERR_NAME_NOT_RESOLVED"
        );
        assert_eq!(DriverError::SessionClosed.to_string(), "Browser session closed");
    }
}
