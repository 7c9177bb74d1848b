//! # Handler Registry Module
//!
//! Deduplicated table of loadable native handler modules, keyed by canonical
//! path, producing per-request handler instances.
//!
//! Registration happens only during single-threaded configuration load;
//! after that the registry is read-only and instantiation is safe from any
//! number of request coroutines. How a canonical path becomes a factory is
//! the host's business: the registry asks a [`ModuleLoader`], and
//! [`FactoryTable`], an in-memory loader populated at startup, is the stock
//! implementation. Dynamic-library loading stays outside this crate.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::dispatcher::{HandlerRequest, HandlerResponse};

/// A per-request handler instance.
///
/// Created by a [`HandlerFactory`] for exactly one dispatch, invoked once
/// with the normalized request and an empty response to populate, then
/// discarded. Nothing survives into the next request.
pub trait RequestHandler {
    fn handle(&mut self, req: &HandlerRequest, res: &mut HandlerResponse);
}

impl<F> RequestHandler for F
where
    F: FnMut(&HandlerRequest, &mut HandlerResponse),
{
    fn handle(&mut self, req: &HandlerRequest, res: &mut HandlerResponse) {
        self(req, res)
    }
}

/// Constructor capability of a registered handler module.
pub trait HandlerFactory: Send + Sync {
    /// Produce a fresh handler instance, or `None` when construction fails.
    fn instantiate(&self) -> Option<Box<dyn RequestHandler>>;
}

/// Resolves a canonical module path to its constructor capability.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, canonical_path: &str) -> Result<Arc<dyn HandlerFactory>, LoadError>;
}

/// A module could not be turned into a factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No factory is known under the canonical path.
    NotFound(String),
    /// The module exists but could not be loaded or lacks the handler
    /// entry point.
    Unloadable { path: String, reason: String },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound(path) => {
                write!(f, "no handler module registered under '{}'", path)
            }
            LoadError::Unloadable { path, reason } => {
                write!(f, "handler module '{}' could not be loaded: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// A registered factory failed to produce an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationError {
    /// Canonical path of the failing module.
    pub path: String,
}

impl fmt::Display for InstantiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handler module '{}' failed to construct an instance",
            self.path
        )
    }
}

impl std::error::Error for InstantiationError {}

/// In-memory [`ModuleLoader`]: a table of canonical paths to factories,
/// populated during startup and consulted when routes resolve their modules.
#[derive(Default)]
pub struct FactoryTable {
    factories: RwLock<HashMap<String, Arc<dyn HandlerFactory>>>,
}

struct FnFactory<F>(F);

impl<F> HandlerFactory for FnFactory<F>
where
    F: Fn() -> Box<dyn RequestHandler> + Send + Sync,
{
    fn instantiate(&self) -> Option<Box<dyn RequestHandler>> {
        Some((self.0)())
    }
}

impl FactoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its canonical path. A second registration
    /// under the same path replaces the first.
    pub fn register(&self, path: impl Into<String>, factory: Arc<dyn HandlerFactory>) {
        let path = path.into();
        debug!(path = %path, "handler factory registered");
        self.factories
            .write()
            .expect("factory table lock poisoned")
            .insert(path, factory);
    }

    /// Register a closure that builds a fresh handler per request.
    pub fn register_fn<F>(&self, path: impl Into<String>, make: F)
    where
        F: Fn() -> Box<dyn RequestHandler> + Send + Sync + 'static,
    {
        self.register(path, Arc::new(FnFactory(make)));
    }
}

impl ModuleLoader for FactoryTable {
    fn load(&self, canonical_path: &str) -> Result<Arc<dyn HandlerFactory>, LoadError> {
        self.factories
            .read()
            .expect("factory table lock poisoned")
            .get(canonical_path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(canonical_path.to_string()))
    }
}

struct ModuleEntry {
    canonical_path: String,
    factory: Arc<dyn HandlerFactory>,
}

/// Registry of handler modules, unique by canonical path.
///
/// Indices are plain 0-based positions assigned in registration order;
/// resolving an already-registered path returns the existing index, so
/// routes sharing a module share one entry. Entries are never removed
/// before process teardown.
pub struct HandlerRegistry {
    loader: Arc<dyn ModuleLoader>,
    prefix: PathBuf,
    modules: Vec<ModuleEntry>,
    by_path: HashMap<String, usize>,
}

impl HandlerRegistry {
    /// Create a registry that resolves modules through `loader`. Relative
    /// module paths are canonicalized beneath `prefix`.
    #[must_use]
    pub fn new(loader: Arc<dyn ModuleLoader>, prefix: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            prefix: prefix.into(),
            modules: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    /// Absolute, normalized identity for a configured module path.
    #[must_use]
    pub fn canonicalize(&self, path: &str) -> String {
        if Path::new(path).is_absolute() {
            path.to_string()
        } else {
            self.prefix.join(path).to_string_lossy().into_owned()
        }
    }

    /// Return the index of an already-registered canonical path, or load
    /// and register the module and return its new index.
    ///
    /// Only called during single-threaded configuration load.
    pub fn resolve_or_register(&mut self, path: &str) -> Result<usize, LoadError> {
        let canonical = self.canonicalize(path);
        if let Some(&index) = self.by_path.get(&canonical) {
            debug!(path = %canonical, index, "handler module already registered");
            return Ok(index);
        }
        let factory = self.loader.load(&canonical)?;
        let index = self.modules.len();
        self.modules.push(ModuleEntry {
            canonical_path: canonical.clone(),
            factory,
        });
        self.by_path.insert(canonical.clone(), index);
        info!(path = %canonical, index, total_modules = self.modules.len(), "handler module registered");
        Ok(index)
    }

    /// Produce a fresh handler instance for one dispatch.
    ///
    /// Never returns a partial instance: a factory yielding `None` is an
    /// [`InstantiationError`]. Safe to call concurrently; the registry is
    /// not mutated.
    pub fn instantiate(
        &self,
        index: usize,
    ) -> Result<Box<dyn RequestHandler>, InstantiationError> {
        let entry = self.modules.get(index).ok_or_else(|| InstantiationError {
            path: format!("#{}", index),
        })?;
        entry.factory.instantiate().ok_or_else(|| InstantiationError {
            path: entry.canonical_path.clone(),
        })
    }

    /// Canonical path registered under `index`.
    #[must_use]
    pub fn module_path(&self, index: usize) -> Option<&str> {
        self.modules.get(index).map(|m| m.canonical_path.as_str())
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
