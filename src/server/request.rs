use http::Method;
use may_minihttp::Request;
use std::collections::HashMap;
use std::io::Read;
use std::time::UNIX_EPOCH;
use tracing::debug;

use crate::dispatcher::{BodySource, InboundRequest};

/// Split a request target into path and optional query string.
#[must_use]
pub fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) if !query.is_empty() => (path.to_string(), Some(query.to_string())),
        Some((path, _)) => (path.to_string(), None),
        None => (target.to_string(), None),
    }
}

/// Collect a header into the lowercase-named map. Repeated cookie headers
/// all contribute pairs (joined so the `;` splitter sees every one); other
/// repeated names keep the last value.
fn fold_header(headers: &mut HashMap<String, String>, name: String, value: String) {
    if name == "cookie" {
        headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&value);
            })
            .or_insert(value);
    } else {
        headers.insert(name, value);
    }
}

/// Extract an [`InboundRequest`] from a raw `may_minihttp` request.
///
/// Header names are lowercased. The transport buffers the body before
/// `call`, so the body source is always immediate here; deferred sources
/// come from hosts that suspend on body arrival.
pub fn parse_request(req: Request) -> InboundRequest {
    let method = Method::from_bytes(req.method().as_bytes()).unwrap_or(Method::GET);
    let target = req.path().to_string();
    let (path, query) = split_target(&target);

    let mut headers: HashMap<String, String> = HashMap::new();
    for h in req.headers() {
        fold_header(
            &mut headers,
            h.name.to_ascii_lowercase(),
            String::from_utf8_lossy(h.value).to_string(),
        );
    }

    let if_modified_since = headers
        .get("if-modified-since")
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    // may_minihttp does not expose the peer address; honor the proxy header
    // when present.
    let client_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_default();

    let mut buf = Vec::new();
    let body = match req.body().read_to_end(&mut buf) {
        Ok(n) if n > 0 => BodySource::Ready(buf),
        Ok(_) => BodySource::None,
        Err(e) => {
            debug!(error = %e, "request body read failed");
            BodySource::None
        }
    };

    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        "request parsed"
    );

    InboundRequest {
        method,
        path,
        query,
        client_addr,
        headers,
        if_modified_since,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/p"), ("/p".to_string(), None));
        assert_eq!(
            split_target("/p?x=1&y=2"),
            ("/p".to_string(), Some("x=1&y=2".to_string()))
        );
        assert_eq!(split_target("/p?"), ("/p".to_string(), None));
    }

    #[test]
    fn test_fold_header_joins_repeated_cookies() {
        let mut headers = HashMap::new();
        fold_header(&mut headers, "cookie".to_string(), "a=1".to_string());
        fold_header(&mut headers, "cookie".to_string(), "b=2".to_string());
        assert_eq!(headers.get("cookie").map(String::as_str), Some("a=1; b=2"));
    }

    #[test]
    fn test_fold_header_last_value_wins_otherwise() {
        let mut headers = HashMap::new();
        fold_header(&mut headers, "x-trace".to_string(), "t-1".to_string());
        fold_header(&mut headers, "x-trace".to_string(), "t-2".to_string());
        assert_eq!(headers.get("x-trace").map(String::as_str), Some("t-2"));
    }
}
