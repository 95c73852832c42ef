use super::util::{has_header, host_header_value, parse_target_url};
use super::{HttpRequest, Result};

/// Estimate bytes sent for an HTTP request.
///
/// Best-effort HTTP/1.1 framing: request line + headers + CRLF + body. Host and
/// Content-Length are counted when the client would add them implicitly.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    estimate_http_request_bytes_parts(&req.method, &req.url, &req.headers, req.body.len() as u64)
}

pub(super) fn estimate_http_request_bytes_parts(
    method: &http::Method,
    url: &str,
    headers: &[(String, String)],
    body_len: u64,
) -> Result<u64> {
    let (parsed, uri) = parse_target_url(url)?;

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    // "METHOD SP path SP HTTP/1.1 CRLF"
    let mut bytes = (method.as_str().len() + 1 + path.len() + 1 + "HTTP/1.1".len() + 2) as u64;

    for (k, v) in headers {
        bytes = bytes.saturating_add(header_line_bytes(k.as_bytes(), v.as_bytes()));
    }

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        bytes = bytes.saturating_add(header_line_bytes(b"host", host.as_bytes()));
    }

    if body_len != 0 && !has_header(headers, "content-length") {
        let v = body_len.to_string();
        bytes = bytes.saturating_add(header_line_bytes(b"content-length", v.as_bytes()));
    }

    Ok(bytes.saturating_add(2).saturating_add(body_len))
}

pub(super) fn estimate_response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len = match version {
        http::Version::HTTP_2 | http::Version::HTTP_3 => "HTTP/2".len(),
        _ => "HTTP/1.1".len(),
    } as u64;

    // "HTTP/1.1 SP 200 CRLF"; the reason phrase is not counted.
    let mut bytes = version_len + 1 + status.as_str().len() as u64 + 2;
    for (name, value) in headers.iter() {
        bytes = bytes.saturating_add(header_line_bytes(
            name.as_str().as_bytes(),
            value.as_bytes(),
        ));
    }
    bytes.saturating_add(2)
}

fn header_line_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() + 2 + value.len() + 2) as u64
}
