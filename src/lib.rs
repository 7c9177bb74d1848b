//! # backplane
//!
//! **backplane** is the request-handling core of an embedding HTTP server:
//! it routes each inbound request to one of several pluggable handler
//! backends (a registered native handler module, or an embedded scripting
//! engine), optionally caches generated responses, and optionally
//! materializes server-side session state from an external key-value store.
//!
//! The transport (connection I/O, protocol framing) is a collaborator, not
//! a concern of this crate: requests are handled on whatever worker
//! coroutines the host supplies. A thin adapter for the `may_minihttp`
//! coroutine server ships in [`server`].
//!
//! ## Architecture
//!
//! - **[`config`]** - per-route configuration, inherited with override and
//!   validated at load time
//! - **[`registry`]** - deduplicated handler module registry producing
//!   per-request handler instances
//! - **[`cache`]** - bounded LRU response caches keyed by identity digests
//! - **[`session`]** - lazily connected client for the external session
//!   store, degrading to stateless operation when unreachable
//! - **[`scripting`]** - the narrow invocation seam for embedded script
//!   engines
//! - **[`context`]** - process-scoped state owned by one server context,
//!   built once at startup
//! - **[`dispatcher`]** - the per-request lifecycle state machine
//! - **[`server`]** - `may_minihttp` transport adapter
//!
//! ## Request lifecycle
//!
//! ```text
//! Transport -> Dispatcher -> cache read -> route binding
//!           -> {handler module | script engine} -> response
//!           -> {cache write, session persist} -> Transport
//! ```
//!
//! A request declaring a non-form body is declined back to the host. A
//! fresh `If-Modified-Since` short-circuits to "not modified" with no side
//! effects. Cache hits skip the backend entirely; misses run the backend,
//! repopulate the cache, and persist any session fields the handler set.
//!
//! ## Quick start
//!
//! ```no_run
//! use backplane::server::{AppService, HttpServer};
//! use backplane::{FactoryTable, HandlerRequest, HandlerResponse, RouteConfig, ServerContext};
//! use std::sync::Arc;
//!
//! let modules = Arc::new(FactoryTable::new());
//! modules.register_fn("/srv/handlers/hello.so", || {
//!     Box::new(|_req: &HandlerRequest, res: &mut HandlerResponse| {
//!         res.set_text("hi");
//!     })
//! });
//!
//! let ctx = ServerContext::builder()
//!     .module_prefix("/srv/handlers")
//!     .loader(modules)
//!     .route(
//!         "/hello",
//!         RouteConfig {
//!             module_path: Some("hello.so".into()),
//!             ..RouteConfig::default()
//!         },
//!     )
//!     .expect("valid route")
//!     .build();
//!
//! let server = HttpServer(AppService::new(ctx))
//!     .start("127.0.0.1:8080")
//!     .expect("bind");
//! server.join().expect("server exited");
//! ```
//!
//! ## Runtime considerations
//!
//! backplane uses the `may` coroutine runtime, not tokio: handlers run on
//! the transport's worker coroutines, and the only blocking calls are
//! session store round-trips, which carry their own bounded timeouts. An
//! unreachable store adds latency to session-enabled routes rather than
//! failing them.

pub mod cache;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod registry;
pub mod scripting;
pub mod server;
pub mod session;

pub use cache::{digest_key, CacheEntry, ResponseCache};
pub use config::{ConfigError, RouteConfig};
pub use context::{ContextBuilder, HandlerBinding, RouteBinding, ServerContext};
pub use dispatcher::{
    BodySource, DispatchError, DispatchOutcome, Dispatcher, HandlerRequest, HandlerResponse,
    InboundRequest,
};
pub use registry::{
    FactoryTable, HandlerFactory, HandlerRegistry, InstantiationError, LoadError, ModuleLoader,
    RequestHandler,
};
pub use scripting::{EngineError, ScriptEngine, ScriptSource};
pub use session::{RedisSessionStore, SessionError, SessionStore, SESSION_COOKIE};
