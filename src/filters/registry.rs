use crate::{
    errors::FilterError,
    filters::{
        filter::{Filter, FilterSpec},
        head::Head,
        request_log::RequestLog,
    },
};
use std::{collections::HashMap, fmt, sync::Arc};

/// Builds a filter from its optional configuration.
pub type FilterFactory =
    Arc<dyn Fn(Option<&toml::Value>) -> Result<Arc<dyn Filter>, FilterError> + Send + Sync>;

/// Filters that can be referred to by name, from code or from a config file.
///
/// # Examples
/// ```
/// use maker_conn::{filters::Head, FilterRegistry, FilterSpec};
/// use std::sync::Arc;
///
/// let mut registry = FilterRegistry::with_defaults();
/// registry.register("my_head", |_| Ok(Arc::new(Head)));
///
/// assert!(registry.resolve(&FilterSpec::named("my_head")).is_ok());
/// assert!(registry.resolve(&FilterSpec::named("missing")).is_err());
/// ```
#[derive(Clone, Default)]
pub struct FilterRegistry {
    factories: HashMap<String, FilterFactory>,
}

impl FilterRegistry {
    /// An empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in filters: `head` and `request_log`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("head", |_| Ok(Arc::new(Head)));
        registry.register("request_log", |config| {
            Ok(Arc::new(RequestLog::from_config(config)?))
        });
        registry
    }

    /// Registers `factory` under `name`, replacing a previous registration.
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(Option<&toml::Value>) -> Result<Arc<dyn Filter>, FilterError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_owned(), Arc::new(factory));
        self
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Turns a spec into a filter instance.
    ///
    /// # Errors
    /// [`FilterError::NotFound`] for names nobody registered, and whatever
    /// the factory reports for invalid configuration.
    pub fn resolve(&self, spec: &FilterSpec) -> Result<Arc<dyn Filter>, FilterError> {
        match spec {
            FilterSpec::Instance { filter, .. } => Ok(Arc::clone(filter)),
            FilterSpec::Named { name, config } => {
                let factory = self
                    .factories
                    .get(name)
                    .ok_or_else(|| FilterError::NotFound(name.clone()))?;
                factory(config.as_ref())
            }
        }
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}
