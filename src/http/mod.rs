//! HTTP surface: the response contract and the endpoints built on it.

pub mod redirect;
pub mod response;

pub use redirect::PermanentRedirect;
pub use response::{ApiResponse, RequestContext};

/// A self-describing HTTP endpoint.
///
/// Endpoints are pure with respect to the request: the same
/// [`RequestContext`] always produces the same [`ApiResponse`], which
/// keeps them trivially testable without a running server.
pub trait Endpoint: Send + Sync + 'static {
    fn handle(&self, req: &RequestContext) -> ApiResponse;
}
