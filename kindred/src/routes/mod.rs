//! HTTP routes for Kindred

pub mod health;
pub mod me;
pub mod people;
pub mod relations;

pub use health::health_check;
pub use me::handle_me;
pub use people::{
    handle_create_person, handle_delete_person, handle_get_person, handle_list_people,
    handle_update_person, handle_upload_profile_pic,
};
pub use relations::handle_relations;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::HeaderMap;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::auth::extract_token_from_header;
use crate::server::AppState;
use crate::types::{FieldErrors, KindredError};

pub type FullBody = Full<Bytes>;

/// Largest request body accepted, in bytes
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: String,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

pub fn error_response(err: &KindredError) -> Response<FullBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), "{}", err);
    }
    let (message, fields) = match err {
        KindredError::Validation(fields) => ("Validation failed".to_string(), Some(fields)),
        KindredError::NotFound(_) => ("Person not found".to_string(), None),
        other => (other.to_string(), None),
    };
    json_response(
        status,
        &ErrorResponse {
            error: message,
            code: err.code(),
            fields,
        },
    )
}

/// Render a handler result
pub fn respond<T: Serialize>(
    status: StatusCode,
    result: Result<T, KindredError>,
) -> Response<FullBody> {
    match result {
        Ok(body) => json_response(status, &body),
        Err(e) => error_response(&e),
    }
}

/// Collect a request body, refusing anything over [`MAX_BODY_BYTES`]
pub async fn read_body(req: Request<Incoming>) -> Result<(HeaderMap, Bytes), KindredError> {
    let (parts, body) = req.into_parts();
    let bytes = collect_limited(body, MAX_BODY_BYTES).await?;
    Ok((parts.headers, bytes))
}

/// Collect at most `limit` bytes; reading stops at the first frame past it
pub async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, KindredError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(KindredError::BadRequest("Request body too large".to_string()))
        }
        Err(_) => Err(KindredError::BadRequest("Invalid body".to_string())),
    }
}

pub fn parse_json(bytes: &[u8]) -> Result<Value, KindredError> {
    serde_json::from_slice(bytes).map_err(|_| KindredError::BadRequest("Invalid JSON".to_string()))
}

/// Verify the bearer token and return the person id it names.
///
/// The person must still exist.
pub async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<String, KindredError> {
    let header = headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_token_from_header(header)
        .ok_or_else(|| KindredError::Unauthorized("No token provided".to_string()))?;

    let result = state.jwt.verify_token(token);
    let claims = match (result.valid, result.claims) {
        (true, Some(claims)) => claims,
        _ => {
            return Err(KindredError::Auth(
                result.error.unwrap_or_else(|| "Invalid token".to_string()),
            ))
        }
    };

    if !state.people.exists(&claims.id).await? {
        return Err(KindredError::Unauthorized("Unknown person".to_string()));
    }
    Ok(claims.id)
}

/// Authentication gate for directory routes; open in dev mode
pub async fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), KindredError> {
    if state.args.dev_mode {
        return Ok(());
    }
    authenticate(headers, state).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EdgeFieldErrors;

    #[tokio::test]
    async fn test_validation_errors_carry_fields() {
        let mut fields = FieldErrors::default();
        fields.insert(
            "relationship_1_0",
            EdgeFieldErrors {
                relation_type: Some("Please select a relation from the list.".into()),
                ..Default::default()
            },
        );
        let response = error_response(&KindredError::Validation(fields));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "VALIDATION_FAILED");
        assert_eq!(
            json["fields"]["relationship_1_0"]["relationType"],
            "Please select a relation from the list."
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused_without_reading_on() {
        use futures::stream::{self, StreamExt};
        use http_body_util::StreamBody;
        use hyper::body::Frame;

        let first = Bytes::from(vec![b'x'; 64]);
        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(Frame::data(first))])
            .chain(stream::pending());
        let err = collect_limited(StreamBody::new(chunks), 32).await.unwrap_err();
        assert!(matches!(err, KindredError::BadRequest(ref m) if m == "Request body too large"));
    }

    #[tokio::test]
    async fn test_body_within_limit_is_collected() {
        let bytes = collect_limited(Full::new(Bytes::from_static(b"{}")), 32)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"{}");
    }

    #[test]
    fn test_not_found_message() {
        let response = error_response(&KindredError::NotFound("Person x not found".into()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
