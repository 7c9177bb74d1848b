#![allow(dead_code)]

pub mod runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}

pub mod trace {
    use std::sync::Once;

    static TRACE_INIT: Once = Once::new();

    /// Install a per-test subscriber so `RUST_LOG` controls test output.
    pub fn init() {
        TRACE_INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

pub mod fixtures {
    use backplane::{
        BodySource, EngineError, HandlerFactory, HandlerRequest, HandlerResponse, InboundRequest,
        RequestHandler, ScriptEngine, SessionError, SessionStore, SESSION_COOKIE,
    };
    use http::Method;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Handler factory that counts invocations and writes a fixed text body.
    pub struct CountingFactory {
        calls: Arc<AtomicUsize>,
        body: String,
    }

    impl CountingFactory {
        pub fn new(body: &str) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    calls: Arc::clone(&calls),
                    body: body.to_string(),
                }),
                calls,
            )
        }
    }

    impl HandlerFactory for CountingFactory {
        fn instantiate(&self) -> Option<Box<dyn RequestHandler>> {
            let calls = Arc::clone(&self.calls);
            let body = self.body.clone();
            Some(Box::new(
                move |_req: &HandlerRequest, res: &mut HandlerResponse| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    res.set_text(body.clone());
                },
            ))
        }
    }

    /// Factory whose construction always fails.
    pub struct BrokenFactory;

    impl HandlerFactory for BrokenFactory {
        fn instantiate(&self) -> Option<Box<dyn RequestHandler>> {
            None
        }
    }

    /// In-memory session store with operation accounting.
    #[derive(Default)]
    pub struct MemorySessionStore {
        records: Mutex<HashMap<String, HashMap<String, String>>>,
        ops: AtomicUsize,
        creates: AtomicUsize,
    }

    impl MemorySessionStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fields(&self, token: &str) -> Option<HashMap<String, String>> {
            self.records.lock().unwrap().get(token).cloned()
        }

        pub fn seed(&self, token: &str, fields: &[(&str, &str)]) {
            let map = fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.records.lock().unwrap().insert(token.to_string(), map);
        }

        pub fn op_count(&self) -> usize {
            self.ops.load(Ordering::SeqCst)
        }

        pub fn create_count(&self) -> usize {
            self.creates.load(Ordering::SeqCst)
        }
    }

    impl SessionStore for MemorySessionStore {
        fn exists(&self, token: &str) -> Result<bool, SessionError> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().unwrap().contains_key(token))
        }

        fn create(&self, token: &str, _ttl: Duration) -> Result<(), SessionError> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            self.creates.fetch_add(1, Ordering::SeqCst);
            let mut seeded = HashMap::new();
            seeded.insert(SESSION_COOKIE.to_string(), token.to_string());
            self.records.lock().unwrap().insert(token.to_string(), seeded);
            Ok(())
        }

        fn read_all(&self, token: &str) -> Result<HashMap<String, String>, SessionError> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            Ok(self.fields(token).unwrap_or_default())
        }

        fn write_fields(
            &self,
            token: &str,
            fields: &HashMap<String, String>,
        ) -> Result<(), SessionError> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            let record = records.entry(token.to_string()).or_default();
            for (k, v) in fields {
                record.insert(k.clone(), v.clone());
            }
            Ok(())
        }
    }

    /// Store that fails every operation, as an unreachable backend would.
    pub struct UnreachableStore;

    impl SessionStore for UnreachableStore {
        fn exists(&self, _token: &str) -> Result<bool, SessionError> {
            Err(SessionError::Backend("connection refused".to_string()))
        }

        fn create(&self, _token: &str, _ttl: Duration) -> Result<(), SessionError> {
            Err(SessionError::Backend("connection refused".to_string()))
        }

        fn read_all(&self, _token: &str) -> Result<HashMap<String, String>, SessionError> {
            Err(SessionError::Backend("connection refused".to_string()))
        }

        fn write_fields(
            &self,
            _token: &str,
            _fields: &HashMap<String, String>,
        ) -> Result<(), SessionError> {
            Err(SessionError::Backend("connection refused".to_string()))
        }
    }

    /// Script engine that records invocations; optionally failing after
    /// writing a partial body.
    pub struct RecordingEngine {
        name: String,
        pub calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingEngine {
        pub fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        pub fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        pub fn call_log(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ScriptEngine for RecordingEngine {
        fn name(&self) -> &str {
            &self.name
        }

        fn run_file(
            &self,
            script: &Path,
            _req: &HandlerRequest,
            res: &mut HandlerResponse,
        ) -> Result<(), EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("file:{}", script.display()));
            if self.fail {
                res.set_text("partial output");
                return Err(EngineError::ScriptNotFound(script.to_path_buf()));
            }
            res.set_header("Content-Type", "text/html");
            res.set_text(format!("script:{}", script.display()));
            Ok(())
        }

        fn run_inline(
            &self,
            source: &str,
            _req: &HandlerRequest,
            res: &mut HandlerResponse,
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(format!("inline:{}", source));
            if self.fail {
                res.set_text("partial output");
                return Err(EngineError::Eval("deliberate failure".to_string()));
            }
            res.set_text(format!("inline:{}", source));
            Ok(())
        }
    }

    /// Bare inbound request for dispatch tests.
    pub fn inbound(method: Method, path: &str, query: Option<&str>) -> InboundRequest {
        let mut req = InboundRequest::new(method, path);
        req.query = query.map(str::to_string);
        req
    }

    pub fn with_header(mut req: InboundRequest, name: &str, value: &str) -> InboundRequest {
        req.headers.insert(name.to_string(), value.to_string());
        req
    }

    pub fn with_cookie(req: InboundRequest, cookie: &str) -> InboundRequest {
        with_header(req, "cookie", cookie)
    }

    /// Attach a buffered form body with matching headers.
    pub fn with_form_body(mut req: InboundRequest, body: &str) -> InboundRequest {
        req.headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        req.headers
            .insert("content-length".to_string(), body.len().to_string());
        req.body = BodySource::Ready(body.as_bytes().to_vec());
        req
    }
}
