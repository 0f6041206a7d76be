use crate::tracing::{scope_request_id, RequestId};
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tag the request with an id (the caller's, if usable) and echo it on the
/// response. Handlers can take it as `Extension<RequestId>`.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers()).unwrap_or_default();
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    let value = HeaderValue::from_str(request_id.as_str()).ok();

    match &value {
        Some(value) => {
            request.headers_mut().insert(header.clone(), value.clone());
        }
        None => {
            request.headers_mut().remove(&header);
        }
    }
    request.extensions_mut().insert(request_id.clone());

    let mut response = scope_request_id(request_id, next.run(request)).await;

    if let Some(value) = value {
        response.headers_mut().insert(header, value);
    }
    response
}
