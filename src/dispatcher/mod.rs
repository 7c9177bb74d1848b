//! Per-request lifecycle: normalized request/response types and the
//! dispatcher that drives a route binding through decline, body
//! acquisition, freshness, cache, session, and handler invocation.

mod core;
mod types;

pub use core::{Dispatcher, FORM_URLENCODED};
pub use types::{
    BodySource, DispatchError, DispatchOutcome, HandlerRequest, HandlerResponse, HeaderVec,
    InboundRequest, MAX_INLINE_HEADERS,
};
