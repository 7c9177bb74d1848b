//! # Server Context Module
//!
//! Process-scoped state, constructed once at startup and passed by handle
//! into the dispatcher: the handler module registry, the per-capacity
//! response cache pool, the registered scripting engines, and the single
//! session store client. There are no ambient globals; everything a request
//! touches hangs off one [`ServerContext`].
//!
//! [`ContextBuilder`] is the single-threaded configuration-load phase:
//! engines and loaders are registered, then each route's [`RouteConfig`] is
//! resolved into an immutable [`RouteBinding`] (registering handler modules
//! and deduplicating caches as it goes). `build` freezes the result for
//! concurrent use.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::config::{
    ConfigError, RouteConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_SESSION_TTL_SECS,
};
use crate::registry::{FactoryTable, HandlerRegistry, ModuleLoader};
use crate::scripting::{ScriptEngine, ScriptSource};
use crate::session::{RedisSessionStore, SessionStore};

/// The backend a resolved route dispatches to. Exactly one per route.
#[derive(Clone)]
pub enum HandlerBinding {
    /// A registered native handler module, by registry index.
    Native { module: usize },
    /// A scripting engine driven in tree or inline mode.
    Script {
        engine: Arc<dyn ScriptEngine>,
        source: ScriptSource,
    },
}

/// Resolved, immutable per-route policy: one handler backend plus the
/// cache, cookie, and session behavior the dispatcher applies.
#[derive(Clone)]
pub struct RouteBinding {
    pub handler: HandlerBinding,
    /// Cache instance shared with every route of the same capacity, when
    /// caching is enabled.
    pub cache: Option<Arc<ResponseCache>>,
    /// Seconds before a cached response (or the caller's prior response)
    /// counts as stale.
    pub cache_ttl: u64,
    /// Expose request headers to the handler.
    pub capture_headers: bool,
    /// Parse cookie headers into a map.
    pub cookies_enabled: bool,
    /// Resolve and persist session state.
    pub session_enabled: bool,
    /// TTL for newly created session records, in seconds.
    pub session_ttl: u64,
}

/// Process-scoped server state. Built once by [`ContextBuilder`], then
/// shared read-only across all request workers.
pub struct ServerContext {
    registry: HandlerRegistry,
    sessions: Arc<dyn SessionStore>,
    caches: Vec<Arc<ResponseCache>>,
    routes: Vec<(String, RouteBinding)>,
}

impl ServerContext {
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// The frozen handler module registry.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The session store client.
    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// All bound routes in registration order.
    #[must_use]
    pub fn routes(&self) -> &[(String, RouteBinding)] {
        &self.routes
    }

    /// Longest-prefix route selection for a request path.
    ///
    /// Routing proper (virtual hosts, pattern matching) belongs to the
    /// host; this is the minimal lookup the transport adapter needs.
    #[must_use]
    pub fn binding(&self, path: &str) -> Option<&RouteBinding> {
        self.routes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, binding)| binding)
    }

    /// Number of distinct cache instances owned by this context.
    #[must_use]
    pub fn cache_instances(&self) -> usize {
        self.caches.len()
    }
}

/// Single-threaded configuration-load phase for a [`ServerContext`].
pub struct ContextBuilder {
    module_prefix: PathBuf,
    loader: Option<Arc<dyn ModuleLoader>>,
    engines: HashMap<String, Arc<dyn ScriptEngine>>,
    session_store: Option<Arc<dyn SessionStore>>,
    store_addr: Option<(String, u16)>,
    registry: Option<HandlerRegistry>,
    caches: HashMap<usize, Arc<ResponseCache>>,
    routes: Vec<(String, RouteBinding)>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            module_prefix: PathBuf::from("/"),
            loader: None,
            engines: HashMap::new(),
            session_store: None,
            store_addr: None,
            registry: None,
            caches: HashMap::new(),
            routes: Vec::new(),
        }
    }

    /// Root under which relative handler module paths are canonicalized.
    /// Set before binding routes.
    #[must_use]
    pub fn module_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.module_prefix = prefix.into();
        self
    }

    /// Module loader consulted when routes reference native handlers.
    /// Defaults to an empty [`FactoryTable`]. Set before binding routes.
    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Register a scripting engine under the name routes refer to it by.
    #[must_use]
    pub fn engine(mut self, name: impl Into<String>, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engines.insert(name.into(), engine);
        self
    }

    /// Replace the session store client. Without this, a store is built
    /// from the first route-supplied host/port pair, or left unconfigured.
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Resolve `config` and bind it to `prefix`.
    ///
    /// Invalid bindings abort here, at load time, with a [`ConfigError`].
    pub fn route(
        mut self,
        prefix: impl Into<String>,
        config: RouteConfig,
    ) -> Result<Self, ConfigError> {
        let binding = self.resolve(&config)?;
        self.routes.push((prefix.into(), binding));
        Ok(self)
    }

    /// Freeze the configuration into a shareable context.
    #[must_use]
    pub fn build(mut self) -> Arc<ServerContext> {
        let registry = self.take_registry();
        let sessions = self.session_store.unwrap_or_else(|| {
            Arc::new(match self.store_addr {
                Some((host, port)) => RedisSessionStore::new(host, port),
                None => RedisSessionStore::disabled(),
            })
        });
        let caches: Vec<Arc<ResponseCache>> = self.caches.into_values().collect();
        info!(
            routes = self.routes.len(),
            modules = registry.len(),
            caches = caches.len(),
            "server context built"
        );
        Arc::new(ServerContext {
            registry,
            sessions,
            caches,
            routes: self.routes,
        })
    }

    fn take_registry(&mut self) -> HandlerRegistry {
        match self.registry.take() {
            Some(registry) => registry,
            None => self.fresh_registry(),
        }
    }

    fn fresh_registry(&self) -> HandlerRegistry {
        let loader = self
            .loader
            .clone()
            .unwrap_or_else(|| Arc::new(FactoryTable::new()) as Arc<dyn ModuleLoader>);
        HandlerRegistry::new(loader, self.module_prefix.clone())
    }

    fn registry_mut(&mut self) -> &mut HandlerRegistry {
        if self.registry.is_none() {
            self.registry = Some(self.fresh_registry());
        }
        self.registry
            .as_mut()
            .expect("registry initialized just above")
    }

    fn engine_for(&self, name: Option<&str>) -> Result<Arc<dyn ScriptEngine>, ConfigError> {
        let name = name.ok_or(ConfigError::MissingEngine)?;
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownEngine(name.to_string()))
    }

    fn resolve(&mut self, config: &RouteConfig) -> Result<RouteBinding, ConfigError> {
        let handler = match (
            &config.module_path,
            &config.script_root,
            &config.script_inline,
        ) {
            (Some(path), None, None) => {
                let path = path.to_string_lossy().into_owned();
                let module = self
                    .registry_mut()
                    .resolve_or_register(&path)
                    .map_err(ConfigError::Module)?;
                HandlerBinding::Native { module }
            }
            (None, Some(root), None) => HandlerBinding::Script {
                engine: self.engine_for(config.script_engine.as_deref())?,
                source: ScriptSource::Tree(root.clone()),
            },
            (None, None, Some(body)) => HandlerBinding::Script {
                engine: self.engine_for(config.script_engine.as_deref())?,
                source: ScriptSource::Inline(body.clone()),
            },
            (None, None, None) => return Err(ConfigError::NoHandler),
            _ => return Err(ConfigError::AmbiguousHandler),
        };

        let session_enabled = config.session_enabled.unwrap_or(false);
        // The session token travels in a cookie, so sessions force cookie
        // parsing on.
        let cookies_enabled = config.cookies_enabled.unwrap_or(false) || session_enabled;

        if let (Some(host), Some(port)) = (&config.store_host, config.store_port) {
            match &self.store_addr {
                None => self.store_addr = Some((host.clone(), port)),
                Some((known_host, known_port)) if known_host == host && *known_port == port => {}
                Some((known_host, known_port)) => warn!(
                    host = %known_host,
                    port = *known_port,
                    ignored_host = %host,
                    ignored_port = port,
                    "conflicting session store endpoint ignored"
                ),
            }
        }

        let cache = if config.cache_enabled.unwrap_or(true) {
            let capacity = config.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY);
            let cache = self
                .caches
                .entry(capacity)
                .or_insert_with(|| Arc::new(ResponseCache::new(capacity)));
            Some(Arc::clone(cache))
        } else {
            None
        };

        Ok(RouteBinding {
            handler,
            cache,
            cache_ttl: config.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL_SECS),
            capture_headers: config.capture_headers.unwrap_or(false),
            cookies_enabled,
            session_enabled,
            session_ttl: config.session_ttl.unwrap_or(DEFAULT_SESSION_TTL_SECS),
        })
    }
}
