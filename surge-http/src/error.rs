use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse transport failure classes, used as the `error_kind` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    RequestBuild,
    HeaderName,
    HeaderValue,
    Connect,
    Request,
    Timeout,
    BodyRead,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme (expected http or https): {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::InvalidUrl(_) => TransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => TransportErrorKind::UnsupportedScheme,
            Self::RequestBuild(_) => TransportErrorKind::RequestBuild,
            Self::HeaderName(_) => TransportErrorKind::HeaderName,
            Self::HeaderValue(_) => TransportErrorKind::HeaderValue,
            Self::Request(e) if e.is_connect() => TransportErrorKind::Connect,
            Self::Request(_) => TransportErrorKind::Request,
            Self::Timeout(_) => TransportErrorKind::Timeout,
            Self::BodyRead(_) => TransportErrorKind::BodyRead,
        }
    }

    /// Request-construction errors, as opposed to failures talking to the target.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self.kind(),
            TransportErrorKind::InvalidUrl
                | TransportErrorKind::UnsupportedScheme
                | TransportErrorKind::RequestBuild
                | TransportErrorKind::HeaderName
                | TransportErrorKind::HeaderValue
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_renders_as_snake_case_tag() {
        let err = Error::Timeout(Duration::from_secs(30));
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
        assert_eq!(err.kind().to_string(), "timeout");
        assert!(!err.is_invalid_request());

        let err = Error::UnsupportedScheme("ftp://x".to_string());
        assert_eq!(err.kind().to_string(), "unsupported_scheme");
        assert!(err.is_invalid_request());
    }
}
