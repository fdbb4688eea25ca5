//! The uniform response contract.
//!
//! Every endpoint produces an [`ApiResponse`]; the content type is
//! derived from the status code through a fixed registry rather than
//! chosen ad hoc per handler, so identical statuses always carry
//! identical content types.

use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// Server identity reported in the `Server` header.
const SERVER_NAME: &str = "cloudbind";

/// Snapshot of an incoming request as seen by an [`super::Endpoint`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Map a status code to the content type its responses carry.
///
/// Redirect statuses serve the human-readable HTML interstitial; every
/// other status defaults to JSON.
pub fn content_type_for(status: StatusCode) -> &'static str {
    if status.is_redirection() {
        "text/html; charset=utf-8"
    } else {
        "application/json"
    }
}

/// A structured endpoint response.
///
/// Carries either a JSON body, a raw byte body, or nothing; extra
/// headers ride alongside and are emitted verbatim.
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    raw: Option<Bytes>,
}

impl ApiResponse {
    /// An empty response with the given status.
    pub fn status_only(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
            raw: None,
        }
    }

    /// A JSON response.
    pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Some(body),
            raw: None,
        }
    }

    /// A raw-bytes response; the content type still follows the
    /// status-code registry.
    pub fn raw(status: StatusCode, raw: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
            raw: Some(raw.into()),
        }
    }

    /// Attach one extra header.
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// The rendered body bytes.
    pub fn body_bytes(&self) -> Bytes {
        if let Some(ref raw) = self.raw {
            return raw.clone();
        }
        match self.body {
            Some(ref value) => Bytes::from(value.to_string()),
            None => Bytes::new(),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let content_type = content_type_for(self.status);
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());
        let body = self.body_bytes();

        let mut builder = Response::builder()
            .status(self.status)
            .header("content-type", content_type)
            .header("server", SERVER_NAME)
            .header("date", date);
        for (name, value) in &self.headers {
            builder = builder.header(*name, value);
        }

        match builder.body(axum::body::Body::from(body)) {
            Ok(response) => response,
            Err(err) => {
                // A header failed validation; serve a plain 500 rather
                // than panic inside the response path.
                tracing::error!("failed to build response: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_registry() {
        assert_eq!(
            content_type_for(StatusCode::MOVED_PERMANENTLY),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            content_type_for(StatusCode::TEMPORARY_REDIRECT),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_for(StatusCode::OK), "application/json");
        assert_eq!(
            content_type_for(StatusCode::INTERNAL_SERVER_ERROR),
            "application/json"
        );
    }

    #[test]
    fn test_json_body_rendering() {
        let resp = ApiResponse::json(StatusCode::OK, serde_json::json!({"ok": true}));
        assert_eq!(resp.body_bytes(), Bytes::from(r#"{"ok":true}"#));
    }

    #[test]
    fn test_into_response_sets_contract_headers() {
        let resp = ApiResponse::json(StatusCode::OK, serde_json::json!({}))
            .with_header("x-extra", "1")
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("server").unwrap(), "cloudbind");
        assert!(headers.contains_key("date"));
        assert_eq!(headers.get("x-extra").unwrap(), "1");
    }
}
