//! Transport adapter: wires the dispatch core onto `may_minihttp`.
//!
//! Connection I/O, protocol framing, and buffering belong to the transport;
//! this module only parses its requests into [`InboundRequest`](crate::dispatcher::InboundRequest)
//! form, selects a route binding, and emits dispatch outcomes.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_request, split_target};
pub use service::AppService;
