//! # Route Configuration Module
//!
//! Raw per-route configuration as the host's configuration layer hands it
//! over: every field optional, inherited from the enclosing scope with
//! override, frozen into a resolved binding at load time.
//!
//! Validation happens when a route is bound to the server context (see
//! [`ContextBuilder::route`](crate::context::ContextBuilder::route)):
//! exactly one handler source must be set, script sources need a registered
//! engine, and enabling sessions forces cookie parsing on since the token
//! arrives as a cookie.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::registry::LoadError;

/// Default bound for a route's response cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;
/// Default response cache TTL in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
/// Default session record TTL in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// Raw configuration for one route scope.
///
/// Unset fields inherit from the parent scope via [`inherit`](Self::inherit)
/// and fall back to crate defaults when resolved: caching on with capacity
/// [`DEFAULT_CACHE_CAPACITY`] and TTL [`DEFAULT_CACHE_TTL_SECS`], header
/// capture, cookies, and sessions off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteConfig {
    /// Native handler module path; relative paths resolve beneath the
    /// context's module prefix.
    pub module_path: Option<PathBuf>,
    /// Name of the registered scripting engine for script sources.
    pub script_engine: Option<String>,
    /// Script tree root; the request path selects the script beneath it.
    pub script_root: Option<PathBuf>,
    /// Inline script body.
    pub script_inline: Option<String>,
    /// Whether generated responses are cached.
    pub cache_enabled: Option<bool>,
    /// Entry bound of the route's response cache.
    pub cache_capacity: Option<usize>,
    /// Seconds before a cached response goes stale.
    pub cache_ttl: Option<u64>,
    /// Whether request headers are exposed to the handler.
    pub capture_headers: Option<bool>,
    /// Whether cookie headers are parsed into a map.
    pub cookies_enabled: Option<bool>,
    /// Whether session state is resolved and persisted.
    pub session_enabled: Option<bool>,
    /// Seconds before a created session record expires.
    pub session_ttl: Option<u64>,
    /// Session store host.
    pub store_host: Option<String>,
    /// Session store port.
    pub store_port: Option<u16>,
}

impl RouteConfig {
    /// Inherit unset fields from `parent`; fields set here win.
    #[must_use]
    pub fn inherit(mut self, parent: &RouteConfig) -> RouteConfig {
        fn fill<T: Clone>(child: &mut Option<T>, parent: &Option<T>) {
            if child.is_none() {
                *child = parent.clone();
            }
        }
        fill(&mut self.module_path, &parent.module_path);
        fill(&mut self.script_engine, &parent.script_engine);
        fill(&mut self.script_root, &parent.script_root);
        fill(&mut self.script_inline, &parent.script_inline);
        fill(&mut self.cache_enabled, &parent.cache_enabled);
        fill(&mut self.cache_capacity, &parent.cache_capacity);
        fill(&mut self.cache_ttl, &parent.cache_ttl);
        fill(&mut self.capture_headers, &parent.capture_headers);
        fill(&mut self.cookies_enabled, &parent.cookies_enabled);
        fill(&mut self.session_enabled, &parent.session_enabled);
        fill(&mut self.session_ttl, &parent.session_ttl);
        fill(&mut self.store_host, &parent.store_host);
        fill(&mut self.store_port, &parent.store_port);
        self
    }
}

/// A route binding is invalid. Detected at load time; startup for that unit
/// aborts rather than serving a half-configured route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The route names no handler module and no script source.
    NoHandler,
    /// More than one of module path, script root, and inline script is set.
    AmbiguousHandler,
    /// A script source is set but no engine name is.
    MissingEngine,
    /// The named engine is not registered with the server context.
    UnknownEngine(String),
    /// The route's handler module failed to load at registration time.
    Module(LoadError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoHandler => write!(
                f,
                "route configuration error: no handler module or script source is set"
            ),
            ConfigError::AmbiguousHandler => write!(
                f,
                "route configuration error: module path, script root, and inline script \
                 are mutually exclusive; set exactly one"
            ),
            ConfigError::MissingEngine => write!(
                f,
                "route configuration error: a script source requires a script engine name"
            ),
            ConfigError::UnknownEngine(name) => write!(
                f,
                "route configuration error: script engine '{}' is not registered",
                name
            ),
            ConfigError::Module(err) => write!(f, "route configuration error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}
