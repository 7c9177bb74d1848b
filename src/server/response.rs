use may_minihttp::Response;
use serde_json::Value;

use crate::dispatcher::HandlerResponse;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

/// Emit a completed dispatch: status, merged and deduplicated headers
/// (last value wins per name), and the body bytes.
pub fn write_dispatch_response(res: &mut Response, out: HandlerResponse) {
    res.status_code(out.status as usize, status_reason(out.status));
    let mut merged: Vec<(String, String)> = Vec::new();
    for (name, value) in out.headers {
        if let Some(existing) = merged.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            existing.1 = value;
        } else {
            merged.push((name, value));
        }
    }
    for (name, value) in merged {
        let line = format!("{}: {}", name, value).into_boxed_str();
        res.header(Box::leak(line));
    }
    res.body_vec(out.body);
}

pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}

pub fn write_not_modified(res: &mut Response) {
    res.status_code(304, "Not Modified");
}
