use crate::{errors::ConnResult, Conn};
use std::{fmt, ops::BitOr, sync::Arc};

/// The rest of a compiled chain, as seen by a service filter.
pub type Next<'a> = dyn Fn(Conn) -> ConnResult + 'a;

/// A step of an application's filter chain.
///
/// A filter takes part in the chain in one of three ways, advertised by
/// [`capabilities`](Filter::capabilities):
///
/// - `PREPARE`: transforms the connection before the rest of the chain runs;
/// - `SERVICE`: wraps the rest of the chain and decides whether to call it;
/// - `FINALIZE`: transforms the connection after the rest of the chain ran.
///
/// When a filter advertises several, the chain uses the first of service,
/// prepare, finalize. A filter advertising none fails the application build.
///
/// # Examples
/// ```
/// use maker_conn::{Capabilities, Conn, ConnResult, Filter, Next};
///
/// struct RequireJson;
///
/// impl Filter for RequireJson {
///     fn capabilities(&self) -> Capabilities {
///         Capabilities::SERVICE
///     }
///
///     fn service(&self, conn: Conn, next: &Next<'_>) -> ConnResult {
///         match conn.query_string().contains("format=json") {
///             true => next(conn),
///             false => conn.send(406_u16, "json only"),
///         }
///     }
/// }
/// ```
pub trait Filter: Send + Sync + 'static {
    fn capabilities(&self) -> Capabilities;

    #[inline]
    fn prepare(&self, conn: Conn) -> ConnResult {
        Ok(conn)
    }

    #[inline]
    fn service(&self, conn: Conn, next: &Next<'_>) -> ConnResult {
        next(conn)
    }

    #[inline]
    fn finalize(&self, conn: Conn) -> ConnResult {
        Ok(conn)
    }
}

/// Set of ways a [`Filter`] takes part in a chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const PREPARE: Self = Self(1 << 0);
    pub const SERVICE: Self = Self(1 << 1);
    pub const FINALIZE: Self = Self(1 << 2);

    #[inline(always)]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::PREPARE, "PREPARE"),
            (Self::SERVICE, "SERVICE"),
            (Self::FINALIZE, "FINALIZE"),
        ];
        f.debug_set()
            .entries(names.iter().filter(|(c, _)| self.contains(*c)).map(|(_, n)| n))
            .finish()
    }
}

/// One entry of an application's filter list.
#[derive(Clone)]
pub enum FilterSpec {
    /// A filter looked up by name in a [`FilterRegistry`](crate::FilterRegistry),
    /// built with optional configuration.
    Named {
        name: String,
        config: Option<toml::Value>,
    },
    /// A ready filter instance.
    Instance { name: String, filter: Arc<dyn Filter> },
}

impl FilterSpec {
    #[inline]
    pub fn named(name: &str) -> Self {
        Self::Named {
            name: name.to_owned(),
            config: None,
        }
    }

    #[inline]
    pub fn with_config(name: &str, config: toml::Value) -> Self {
        Self::Named {
            name: name.to_owned(),
            config: Some(config),
        }
    }

    #[inline]
    pub fn instance(name: &str, filter: impl Filter) -> Self {
        Self::Instance {
            name: name.to_owned(),
            filter: Arc::new(filter),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        match self {
            Self::Named { name, .. } | Self::Instance { name, .. } => name,
        }
    }
}

impl From<&str> for FilterSpec {
    #[inline]
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

// Instances compare by identity.
impl PartialEq for FilterSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Named { name, config },
                Self::Named {
                    name: other_name,
                    config: other_config,
                },
            ) => name == other_name && config == other_config,
            (
                Self::Instance { name, filter },
                Self::Instance {
                    name: other_name,
                    filter: other_filter,
                },
            ) => name == other_name && Arc::ptr_eq(filter, other_filter),
            _ => false,
        }
    }
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name, config } => f
                .debug_struct("Named")
                .field("name", name)
                .field("config", config)
                .finish(),
            Self::Instance { name, filter } => f
                .debug_struct("Instance")
                .field("name", name)
                .field("capabilities", &filter.capabilities())
                .finish(),
        }
    }
}

/// Selects filters to remove with [`AppBuilder::delete_filter`](crate::AppBuilder::delete_filter).
#[derive(Debug, Clone, PartialEq)]
pub enum FilterMatch {
    /// Every spec with this name.
    Name(String),
    /// Specs equal to this one.
    Exact(FilterSpec),
}

impl FilterMatch {
    #[inline]
    pub(crate) fn matches(&self, spec: &FilterSpec) -> bool {
        match self {
            Self::Name(name) => spec.name() == name,
            Self::Exact(exact) => spec == exact,
        }
    }
}

impl From<&str> for FilterMatch {
    #[inline]
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<FilterSpec> for FilterMatch {
    #[inline]
    fn from(spec: FilterSpec) -> Self {
        Self::Exact(spec)
    }
}

#[cfg(test)]
mod filter_tests {
    use super::*;

    struct Noop;
    impl Filter for Noop {
        fn capabilities(&self) -> Capabilities {
            Capabilities::PREPARE
        }
    }

    #[test]
    fn capabilities() {
        let both = Capabilities::PREPARE | Capabilities::FINALIZE;

        assert!(both.contains(Capabilities::PREPARE));
        assert!(both.contains(Capabilities::FINALIZE));
        assert!(!both.contains(Capabilities::SERVICE));
        assert!(!both.contains(Capabilities::NONE));
        assert!(Capabilities::NONE.is_empty());
        assert_eq!(format!("{both:?}"), r#"{"PREPARE", "FINALIZE"}"#);
    }

    #[test]
    fn spec_equality() {
        let config: toml::Value = toml::from_str("level = 'debug'").unwrap();
        let instance = FilterSpec::instance("noop", Noop);

        let cases = [
            (FilterSpec::named("a"), FilterSpec::from("a"), true),
            (FilterSpec::named("a"), FilterSpec::named("b"), false),
            (FilterSpec::named("a"), FilterSpec::with_config("a", config.clone()), false),
            (FilterSpec::with_config("a", config.clone()), FilterSpec::with_config("a", config), true),
            (instance.clone(), instance.clone(), true),
            (instance.clone(), FilterSpec::instance("noop", Noop), false),
            (instance, FilterSpec::named("noop"), false),
        ];

        for (left, right, equal) in cases {
            assert_eq!(left == right, equal, "{left:?} == {right:?}");
        }
    }

    #[test]
    fn matching() {
        let spec = FilterSpec::instance("noop", Noop);

        assert!(FilterMatch::from("noop").matches(&spec));
        assert!(FilterMatch::from("noop").matches(&FilterSpec::named("noop")));
        assert!(FilterMatch::from(spec.clone()).matches(&spec));
        assert!(!FilterMatch::from(FilterSpec::named("noop")).matches(&spec));
    }
}
