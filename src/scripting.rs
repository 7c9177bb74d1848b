//! Embedded scripting engine seam.
//!
//! Interpreters themselves live in the host (e.g. an embedded Lua or Python
//! runtime); this crate only defines the narrow invocation interface a route
//! can bind to. An engine is driven in one of two modes: a script resolved
//! beneath a configured tree root by the request path, or an inline script
//! body configured on the route itself.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::dispatcher::{HandlerRequest, HandlerResponse};

/// A script evaluation failed. The dispatcher absorbs these and responds
/// with an empty default response instead of aborting the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The script file could not be located or read.
    ScriptNotFound(PathBuf),
    /// The engine failed while evaluating the script.
    Eval(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ScriptNotFound(path) => {
                write!(f, "script '{}' not found", path.display())
            }
            EngineError::Eval(reason) => write!(f, "script evaluation failed: {}", reason),
        }
    }
}

impl std::error::Error for EngineError {}

/// Where a script-bound route takes its source from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Root of a script tree; the request path is resolved beneath it.
    Tree(PathBuf),
    /// Inline source configured on the route.
    Inline(String),
}

/// An embedded scripting engine a route can dispatch to.
///
/// Engines are registered once with the server context and shared across
/// requests, so implementations must be safe for concurrent invocation.
pub trait ScriptEngine: Send + Sync {
    /// Engine identity as used in route configuration and logs.
    fn name(&self) -> &str;

    /// Evaluate the script file at `script` against the request.
    fn run_file(
        &self,
        script: &Path,
        req: &HandlerRequest,
        res: &mut HandlerResponse,
    ) -> Result<(), EngineError>;

    /// Evaluate an inline script body against the request.
    fn run_inline(
        &self,
        source: &str,
        req: &HandlerRequest,
        res: &mut HandlerResponse,
    ) -> Result<(), EngineError>;
}
