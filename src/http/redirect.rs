//! Permanent-redirect endpoint.
//!
//! Points clients at the canonical location for this deployment.  The
//! target is fixed at construction from configuration; the endpoint
//! answers every method and path identically with `301 Moved
//! Permanently`, a `Location` header, and an HTML body naming the
//! target for clients that do not follow redirects.

use axum::http::StatusCode;

use super::response::{ApiResponse, RequestContext};
use super::Endpoint;

/// Endpoint that permanently redirects to `server_name + target_path`.
pub struct PermanentRedirect {
    location: String,
}

impl PermanentRedirect {
    /// `server_name` is the scheme + authority (no trailing slash);
    /// `target_path` starts with `/`.
    pub fn new(server_name: &str, target_path: &str) -> Self {
        Self {
            location: format!("{server_name}{target_path}"),
        }
    }

    /// The absolute URL this endpoint points at.
    pub fn location(&self) -> &str {
        &self.location
    }

    fn html_body(&self) -> String {
        format!(
            "<html><head><title>301 Moved Permanently</title></head>\
             <body><h1>301 Moved Permanently</h1>\
             <p>This resource has moved to <a href=\"{0}\">{0}</a>.</p>\
             </body></html>",
            self.location
        )
    }
}

impl Endpoint for PermanentRedirect {
    fn handle(&self, _req: &RequestContext) -> ApiResponse {
        ApiResponse::raw(StatusCode::MOVED_PERMANENTLY, self.html_body())
            .with_header("location", self.location.clone())
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn endpoint() -> PermanentRedirect {
        PermanentRedirect::new("https://api.example.com", "/docs")
    }

    #[test]
    fn test_redirect_is_permanent_with_location_header() {
        let resp = endpoint().handle(&RequestContext::new(Method::GET, "/old"));
        assert_eq!(resp.status, StatusCode::MOVED_PERMANENTLY);
        assert!(resp
            .headers
            .iter()
            .any(|(name, value)| *name == "location" && value == "https://api.example.com/docs"));
    }

    #[test]
    fn test_body_names_the_target_url() {
        let resp = endpoint().handle(&RequestContext::new(Method::GET, "/anything"));
        let body = String::from_utf8(resp.body_bytes().to_vec()).expect("utf-8 body");
        assert!(body.contains("https://api.example.com/docs"));
        assert!(body.contains("301 Moved Permanently"));
    }

    #[test]
    fn test_response_is_method_independent() {
        let ep = endpoint();
        let get = ep.handle(&RequestContext::new(Method::GET, "/x"));
        let post = ep.handle(&RequestContext::new(Method::POST, "/y"));
        let delete = ep.handle(&RequestContext::new(Method::DELETE, "/z"));
        assert_eq!(get.status, post.status);
        assert_eq!(post.status, delete.status);
        assert_eq!(get.body_bytes(), post.body_bytes());
        assert_eq!(get.headers, delete.headers);
    }
}
