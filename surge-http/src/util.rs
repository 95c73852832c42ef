pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// `Host` header value; default ports are omitted.
pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

pub(super) fn parse_target_url(raw: &str) -> super::Result<(url::Url, hyper::Uri)> {
    let parsed = url::Url::parse(raw).map_err(|_| super::Error::InvalidUrl(raw.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(super::Error::UnsupportedScheme(raw.to_string()));
    }
    let uri: hyper::Uri = raw
        .parse()
        .map_err(|_| super::Error::InvalidUrl(raw.to_string()))?;
    Ok((parsed, uri))
}
