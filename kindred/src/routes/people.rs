//! People directory endpoints
//!
//! - GET    /people                              list (optional `?search=`)
//! - POST   /people                              create
//! - GET    /people/{id}                         fetch one
//! - PUT    /people/{id}                         partial update, `null` removes a key
//! - DELETE /people/{id}                         delete and detach reciprocal edges
//! - POST   /people/{id}/upload-profile-pic      multipart, file field `ProfilePic`

use bytes::Bytes;
use futures::stream;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{authorize, error_response, parse_json, read_body, respond, FullBody};
use crate::images::ImageUpload;
use crate::people::person::{PersonPatch, PersonRecord, PROFILE_PIC_KEY};
use crate::people::{Person, PropagationReport};
use crate::server::AppState;
use crate::types::KindredError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    message: &'static str,
    propagation: PropagationReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    profile_pic_url: String,
    person: Person,
}

/// Value of `search` in a query string
pub fn search_param(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != "search" {
            return None;
        }
        let value = value.replace('+', " ");
        urlencoding::decode(&value).ok().map(|v| v.into_owned())
    })
}

pub async fn handle_list_people(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<FullBody> {
    if let Err(e) = authorize(req.headers(), &state).await {
        return error_response(&e);
    }
    let search = search_param(req.uri().query());
    respond(StatusCode::OK, state.people.list(search.as_deref()).await)
}

pub async fn handle_get_person(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<FullBody> {
    if let Err(e) = authorize(req.headers(), &state).await {
        return error_response(&e);
    }
    respond(StatusCode::OK, state.people.get(id).await)
}

pub async fn handle_create_person(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<FullBody> {
    let result = async {
        authorize(req.headers(), &state).await?;
        let (_, body) = read_body(req).await?;
        let record = PersonRecord::from_json(parse_json(&body)?)?;
        state.people.create(record).await
    }
    .await;
    respond(StatusCode::CREATED, result)
}

pub async fn handle_update_person(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<FullBody> {
    let result = async {
        authorize(req.headers(), &state).await?;
        let (_, body) = read_body(req).await?;
        let patch = PersonPatch::from_json(parse_json(&body)?)?;
        state.people.update(id, patch).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn handle_delete_person(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<FullBody> {
    let result = async {
        authorize(req.headers(), &state).await?;
        let propagation = state.people.delete(id).await?;
        Ok::<_, KindredError>(DeleteResponse {
            message: "Person deleted",
            propagation,
        })
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn handle_upload_profile_pic(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<FullBody> {
    let result = async {
        authorize(req.headers(), &state).await?;
        let (headers, body) = read_body(req).await?;

        let content_type = headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| KindredError::BadRequest("Missing content type".to_string()))?;
        let image = read_image_field(content_type, body).await?;

        let (profile_pic_url, person) = state.people.upload_profile_pic(id, image).await?;
        Ok::<_, KindredError>(UploadResponse {
            profile_pic_url,
            person,
        })
    }
    .await;
    respond(StatusCode::OK, result)
}

/// Pull the `ProfilePic` file out of a multipart body
pub async fn read_image_field(
    content_type: &str,
    body: Bytes,
) -> Result<ImageUpload, KindredError> {
    let boundary = multer::parse_boundary(content_type)?;
    let mut multipart = multer::Multipart::new(
        stream::once(async move { Ok::<Bytes, std::io::Error>(body) }),
        boundary,
    );

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(PROFILE_PIC_KEY) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(|m| m.to_string());
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(KindredError::BadRequest("Uploaded file is empty".to_string()));
        }
        return Ok(ImageUpload {
            file_name,
            content_type,
            bytes,
        });
    }

    Err(KindredError::BadRequest(format!(
        "No file uploaded in field '{}'",
        PROFILE_PIC_KEY
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_param() {
        assert_eq!(search_param(Some("search=ann")), Some("ann".to_string()));
        assert_eq!(
            search_param(Some("page=2&search=Mei%20Ling")),
            Some("Mei Ling".to_string())
        );
        assert_eq!(search_param(Some("search=a+b")), Some("a b".to_string()));
        assert_eq!(search_param(Some("page=2")), None);
        assert_eq!(search_param(None), None);
    }

    #[tokio::test]
    async fn test_read_image_field() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"other\"\r\n\r\n\
            ignored\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"ProfilePic\"; filename=\"me.png\"\r\n\
            Content-Type: image/png\r\n\r\n\
            PNGDATA\r\n\
            --XYZ--\r\n";
        let image = read_image_field("multipart/form-data; boundary=XYZ", Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(image.file_name, "me.png");
        assert_eq!(image.content_type.as_deref(), Some("image/png"));
        assert_eq!(&image.bytes[..], b"PNGDATA");
    }

    #[tokio::test]
    async fn test_missing_field_rejected() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\r\n\
            PNGDATA\r\n\
            --XYZ--\r\n";
        let err = read_image_field("multipart/form-data; boundary=XYZ", Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
