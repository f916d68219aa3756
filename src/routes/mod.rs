//! HTTP routes for Heirloom
//!
//! Handlers receive the already-collected request (headers + body) and
//! return `Result<Response>`; [`respond`] turns errors into `{error, code}`
//! bodies with the status from the error taxonomy.

pub mod cron;
pub mod executor;
pub mod health;
pub mod owner;
pub mod viewer;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE};
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::types::{HeirloomError, Result};

pub type FullBody = Full<Bytes>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

pub fn ok_json<T: Serialize>(body: &T) -> Result<Response<FullBody>> {
    Ok(json_response(StatusCode::OK, body))
}

pub fn error_response(err: &HeirloomError) -> Response<FullBody> {
    if err.is_server_fault() {
        error!("Request failed: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }
    json_response(
        err.status_code(),
        &ErrorResponse {
            error: err.public_message(),
            code: err.code(),
        },
    )
}

pub fn respond(result: Result<Response<FullBody>>) -> Response<FullBody> {
    result.unwrap_or_else(|e| error_response(&e))
}

/// Parse a JSON request body
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    if body.is_empty() {
        return Err(HeirloomError::BadRequest("Request body is required".into()));
    }
    serde_json::from_slice(body).map_err(|e| HeirloomError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Parse the query string into `T`
pub fn parse_query<T: DeserializeOwned + Default>(query: Option<&str>) -> Result<T> {
    match query {
        Some(q) if !q.is_empty() => serde_urlencoded::from_str(q)
            .map_err(|e| HeirloomError::BadRequest(format!("Invalid query: {}", e))),
        _ => Ok(T::default()),
    }
}

/// Append `Set-Cookie` headers
pub fn with_cookies(
    mut response: Response<FullBody>,
    cookies: impl IntoIterator<Item = String>,
) -> Result<Response<FullBody>> {
    for cookie in cookies {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| HeirloomError::Internal(format!("Invalid cookie header: {}", e)))?;
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::body_json;
    use serde::Deserialize;

    #[tokio::test]
    async fn test_error_body_carries_stable_code() {
        let response = error_response(&HeirloomError::NotYetReleased);
        assert_eq!(response.status(), StatusCode::LOCKED);
        let body = body_json(response).await;
        assert_eq!(body["code"], "NOT_YET_RELEASED");
    }

    #[tokio::test]
    async fn test_internal_detail_not_leaked() {
        let response = error_response(&HeirloomError::Database("mongo at 10.1.2.3 down".into()));
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[derive(Debug, Default, Deserialize)]
    struct Query {
        category: Option<String>,
    }

    #[test]
    fn test_parse_helpers() {
        let q: Query = parse_query(Some("category=letters")).unwrap();
        assert_eq!(q.category.as_deref(), Some("letters"));
        let empty: Query = parse_query(None).unwrap();
        assert!(empty.category.is_none());

        assert!(parse_json::<serde_json::Value>(&Bytes::new()).is_err());
        assert!(parse_json::<serde_json::Value>(&Bytes::from_static(b"{oops")).is_err());
    }
}
