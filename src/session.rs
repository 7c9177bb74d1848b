//! # Session Store Module
//!
//! Server-side session state backed by an external key-value store.
//!
//! A session is a field map addressed by a bearer token that must arrive as
//! a cookie value. Tokens are never generated here; a request without the
//! cookie simply gets no session. Record lifetime is governed by the store's
//! own TTL, set once at creation.
//!
//! The shipped client connects lazily on first use. When no endpoint is
//! configured, or the store is unreachable, every operation reports an error
//! that callers absorb: the system degrades to stateless operation instead
//! of failing the request.

use redis::Commands;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "SESSIONID";

/// Read/write timeout applied to store connections so an unhealthy store
/// adds bounded latency rather than hanging a worker.
const STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// A session operation could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No store endpoint is configured; session support is off.
    Disabled,
    /// The store rejected the operation or the connection dropped.
    Backend(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Disabled => write!(f, "session store is not configured"),
            SessionError::Backend(reason) => write!(f, "session store error: {}", reason),
        }
    }
}

impl std::error::Error for SessionError {}

/// Client interface to the external session store.
///
/// Implementations must tolerate concurrent use from many request
/// coroutines.
pub trait SessionStore: Send + Sync {
    /// Whether a record exists under `token`.
    fn exists(&self, token: &str) -> Result<bool, SessionError>;

    /// Create a record under `token`, seeded with the token value under
    /// [`SESSION_COOKIE`], and set its expiration to `ttl`.
    fn create(&self, token: &str, ttl: Duration) -> Result<(), SessionError>;

    /// Load every field of the record under `token`.
    fn read_all(&self, token: &str) -> Result<HashMap<String, String>, SessionError>;

    /// Bulk-upsert `fields` into the record under `token`. Does not reset
    /// the record's TTL.
    fn write_fields(
        &self,
        token: &str,
        fields: &HashMap<String, String>,
    ) -> Result<(), SessionError>;
}

/// Redis-backed [`SessionStore`] with one lazily created connection.
///
/// The connection is established on first use under a lock, so concurrent
/// reconnects cannot race; a failed command drops the cached connection and
/// the next operation retries from scratch.
pub struct RedisSessionStore {
    addr: Option<(String, u16)>,
    conn: Mutex<Option<redis::Connection>>,
}

impl RedisSessionStore {
    /// Client for the store at `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: Some((host.into(), port)),
            conn: Mutex::new(None),
        }
    }

    /// Client with no endpoint: every operation reports
    /// [`SessionError::Disabled`].
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            addr: None,
            conn: Mutex::new(None),
        }
    }

    /// Whether an endpoint was configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.addr.is_some()
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, SessionError> {
        let (host, port) = self.addr.as_ref().ok_or(SessionError::Disabled)?;
        let mut guard = self.conn.lock().expect("session connection lock poisoned");
        if guard.is_none() {
            let client = redis::Client::open(format!("redis://{}:{}/", host, port))
                .map_err(|e| SessionError::Backend(e.to_string()))?;
            let conn = client
                .get_connection()
                .map_err(|e| SessionError::Backend(e.to_string()))?;
            let _ = conn.set_read_timeout(Some(STORE_TIMEOUT));
            let _ = conn.set_write_timeout(Some(STORE_TIMEOUT));
            debug!(host = %host, port, "session store connected");
            *guard = Some(conn);
        }
        match guard.as_mut() {
            Some(conn) => match op(conn) {
                Ok(value) => Ok(value),
                Err(e) => {
                    // drop the broken connection so the next use reconnects
                    *guard = None;
                    warn!(error = %e, "session store command failed");
                    Err(SessionError::Backend(e.to_string()))
                }
            },
            None => Err(SessionError::Disabled),
        }
    }
}

impl SessionStore for RedisSessionStore {
    fn exists(&self, token: &str) -> Result<bool, SessionError> {
        self.with_conn(|conn| conn.exists(token))
    }

    fn create(&self, token: &str, ttl: Duration) -> Result<(), SessionError> {
        self.with_conn(|conn| {
            let _: i64 = conn.hset(token, SESSION_COOKIE, token)?;
            let _: i64 = conn.expire(token, ttl.as_secs() as i64)?;
            Ok(())
        })
    }

    fn read_all(&self, token: &str) -> Result<HashMap<String, String>, SessionError> {
        self.with_conn(|conn| conn.hgetall(token))
    }

    fn write_fields(
        &self,
        token: &str,
        fields: &HashMap<String, String>,
    ) -> Result<(), SessionError> {
        if fields.is_empty() {
            return Ok(());
        }
        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.with_conn(|conn| conn.hset_multiple(token, &pairs))
    }
}
