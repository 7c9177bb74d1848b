use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use tracing::{debug, error};

use super::request::parse_request;
use super::response::{write_dispatch_response, write_json_error, write_not_modified};
use crate::context::ServerContext;
use crate::dispatcher::{DispatchOutcome, Dispatcher};

/// `may_minihttp` service that runs every request through the dispatch
/// core.
///
/// One instance is cloned per worker coroutine; all of them share the same
/// context and dispatcher.
#[derive(Clone)]
pub struct AppService {
    ctx: Arc<ServerContext>,
    dispatcher: Arc<Dispatcher>,
}

impl AppService {
    #[must_use]
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&ctx))),
            ctx,
        }
    }

    /// The context this service serves from.
    #[must_use]
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let inbound = parse_request(req);
        let method = inbound.method.clone();
        let path = inbound.path.clone();

        let Some(binding) = self.ctx.binding(&path) else {
            write_json_error(
                res,
                404,
                json!({"error": "Not Found", "method": method.as_str(), "path": path}),
            );
            return Ok(());
        };

        match self.dispatcher.dispatch(binding, inbound) {
            Ok(DispatchOutcome::Completed(out)) => write_dispatch_response(res, out),
            Ok(DispatchOutcome::NotModified) => write_not_modified(res),
            Ok(DispatchOutcome::Declined) => {
                // No backend takes this shape; fall through to the
                // adapter's default handling.
                debug!(method = %method, path = %path, "request declined");
                write_json_error(
                    res,
                    404,
                    json!({"error": "Not Found", "method": method.as_str(), "path": path}),
                );
            }
            Err(e) => {
                error!(method = %method, path = %path, error = %e, "request failed");
                write_json_error(res, 500, json!({"error": "Internal Server Error"}));
            }
        }
        Ok(())
    }
}
