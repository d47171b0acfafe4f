//! Request identification.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every request
//! - Echo it back in the `x-request-id` response header
//! - Decode the request path the way it is matched and logged
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A client-supplied `x-request-id` is kept as-is

use std::borrow::Cow;

use axum::http::{HeaderValue, Request, Uri};
use percent_encoding::percent_decode;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::x_request_id(UuidRequestId)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Request ID of a request that went through [`set_request_id_layer`].
pub fn request_id<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
}

/// The request path with percent-escapes decoded to raw bytes.
///
/// Malformed escapes are kept as written. The result is not necessarily UTF-8.
pub fn decoded_path(uri: &Uri) -> Cow<'_, [u8]> {
    percent_decode(uri.path().as_bytes()).into()
}
