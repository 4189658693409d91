//! Per-run workflow context.

use crate::driver::{BrowserDriver, SelectorCatalog, SelectorSet};
use crate::error::StepError;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Type-safe context key wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a new ContextKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ContextKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Mutable data bag owned by exactly one run.
///
/// Holds the collaborators injected at run construction (browser driver,
/// selector catalog, site settings), all read-only for the run's lifetime,
/// plus heterogeneous scratch values written by earlier steps and read by
/// later ones.
///
/// # Examples
///
/// ```
/// use tsunagi::Context;
///
/// let mut ctx = Context::new();
///
/// ctx.insert("search_url", "https://www.seek.com.au/rust-jobs".to_string());
/// ctx.insert("card_index", 0usize);
///
/// assert_eq!(ctx.get::<usize>("card_index"), Some(&0));
/// // Wrong type returns None
/// assert_eq!(ctx.get::<String>("card_index"), None);
/// ```
pub struct Context {
    data: HashMap<ContextKey, Box<dyn Any + Send + Sync>>,
    driver: Option<Arc<dyn BrowserDriver>>,
    selectors: Arc<SelectorCatalog>,
    settings: Arc<serde_json::Value>,
    started_at: Instant,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .field("has_driver", &self.driver.is_some())
            .field("selectors", &self.selectors.len())
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates an empty context with no collaborators attached.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Inserts a scratch value, replacing any previous value under `key`.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<ContextKey>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Like [`get`](Self::get), but reports absence as a [`StepError`] so
    /// steps can propagate it with `?`.
    pub fn require<T: Any>(&self, key: &str) -> Result<&T, StepError> {
        self.get(key)
            .ok_or_else(|| StepError::MissingValue(key.to_string()))
    }

    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        self.data
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ContextKey> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The attached browser driver.
    ///
    /// # Errors
    ///
    /// [`StepError::NoDriver`] when the run was started without one.
    pub fn driver(&self) -> Result<&dyn BrowserDriver, StepError> {
        self.driver.as_deref().ok_or(StepError::NoDriver)
    }

    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    pub fn selectors(&self) -> &SelectorCatalog {
        &self.selectors
    }

    /// Looks up a named selector set in the catalog.
    pub fn selector(&self, name: &str) -> Result<&SelectorSet, StepError> {
        self.selectors
            .get(name)
            .ok_or_else(|| StepError::MissingSelector(name.to_string()))
    }

    /// Raw site settings.
    pub fn settings(&self) -> &serde_json::Value {
        &self.settings
    }

    /// Deserializes the top-level setting `key` into `T`.
    pub fn setting<T: DeserializeOwned>(&self, key: &str) -> Result<T, StepError> {
        let value = self.settings.get(key).ok_or_else(|| StepError::Setting {
            key: key.to_string(),
            details: "not present".to_string(),
        })?;
        T::deserialize(value).map_err(|e| StepError::Setting {
            key: key.to_string(),
            details: e.to_string(),
        })
    }

    /// Returns the time elapsed since the context was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Builder injecting run-scoped collaborators into a [`Context`].
///
/// ```
/// use tsunagi::{Context, SelectorCatalog};
/// use serde_json::json;
///
/// let ctx = Context::builder()
///     .selectors(SelectorCatalog::new().with("search", "#keywords-input"))
///     .settings(json!({ "keywords": "rust developer", "max_applications": 5 }))
///     .build();
///
/// assert_eq!(ctx.setting::<u32>("max_applications").unwrap(), 5);
/// assert!(ctx.selector("search").is_ok());
/// assert!(ctx.driver().is_err());
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    driver: Option<Arc<dyn BrowserDriver>>,
    selectors: SelectorCatalog,
    settings: Option<serde_json::Value>,
}

impl ContextBuilder {
    pub fn driver(mut self, driver: Arc<dyn BrowserDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn selectors(mut self, selectors: SelectorCatalog) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> Context {
        Context {
            data: HashMap::new(),
            driver: self.driver,
            selectors: Arc::new(self.selectors),
            settings: Arc::new(self.settings.unwrap_or(serde_json::Value::Null)),
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heterogeneous_storage() {
        let mut ctx = Context::new();

        ctx.insert("index", 3usize);
        ctx.insert("title", "Senior Rust Engineer".to_string());
        ctx.insert("quick_apply", true);

        assert_eq!(ctx.get::<usize>("index"), Some(&3));
        assert_eq!(
            ctx.get::<String>("title"),
            Some(&"Senior Rust Engineer".to_string())
        );
        assert_eq!(ctx.get::<bool>("quick_apply"), Some(&true));
        assert_eq!(ctx.get::<String>("index"), None);
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_get_mut_advances_index() {
        let mut ctx = Context::new();
        ctx.insert("card_index", 0usize);

        if let Some(index) = ctx.get_mut::<usize>("card_index") {
            *index += 1;
        }

        assert_eq!(ctx.get::<usize>("card_index"), Some(&1));
    }

    #[test]
    fn test_remove_and_require() {
        let mut ctx = Context::new();
        ctx.insert("url", "https://example.com".to_string());

        assert!(ctx.require::<String>("url").is_ok());
        let removed = ctx.remove::<String>("url");
        assert_eq!(removed, Some("https://example.com".to_string()));
        assert!(!ctx.contains_key("url"));
        assert!(matches!(
            ctx.require::<String>("url"),
            Err(StepError::MissingValue(key)) if key == "url"
        ));
    }

    #[test]
    fn test_missing_collaborators_are_step_errors() {
        let ctx = Context::new();
        assert!(matches!(ctx.driver(), Err(StepError::NoDriver)));
        assert!(matches!(
            ctx.selector("apply_button"),
            Err(StepError::MissingSelector(name)) if name == "apply_button"
        ));
        assert!(matches!(
            ctx.setting::<String>("keywords"),
            Err(StepError::Setting { .. })
        ));
    }

    #[test]
    fn test_settings_deserialize() {
        let ctx = Context::builder()
            .settings(json!({ "keywords": "rust", "locations": ["Sydney", "Remote"] }))
            .build();

        assert_eq!(ctx.setting::<String>("keywords").unwrap(), "rust");
        assert_eq!(
            ctx.setting::<Vec<String>>("locations").unwrap(),
            vec!["Sydney".to_string(), "Remote".to_string()]
        );
        assert!(ctx.setting::<u32>("keywords").is_err());
    }
}
