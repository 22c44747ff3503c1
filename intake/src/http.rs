use crate::errors::{IntakeError, RequestError};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HeaderMap, HeaderValue,
};
use hyper::{Response, StatusCode};
use serde_json::Value;

pub type HandlerBody = BoxBody<Bytes, IntakeError>;

/// Adds the permissive CORS headers carried by every response.
pub fn add_cors_headers(headers: &mut HeaderMap) -> &mut HeaderMap {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );

    headers
}

pub fn json_response(status: StatusCode, value: &Value) -> Response<HandlerBody> {
    let body = Full::new(Bytes::from(value.to_string()))
        .map_err(|e| match e {})
        .boxed();

    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    add_cors_headers(response.headers_mut());
    response
}

pub fn empty_response(status: StatusCode) -> Response<HandlerBody> {
    let mut response = Response::new(Empty::<Bytes>::new().map_err(|e| match e {}).boxed());
    *response.status_mut() = status;
    add_cors_headers(response.headers_mut());
    response
}

pub fn error_response(error: &RequestError) -> Response<HandlerBody> {
    json_response(error.status(), &error.body())
}
