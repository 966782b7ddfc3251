//! HTTP client for the people API and a cached directory on top of it
//!
//! [`Directory`] keeps the full people list in a [`LocalStore`] under a single
//! key. Reads populate the key only when it is absent; every mutation clears
//! it and refetches.

pub mod local_store;

pub use local_store::{LocalStore, PEOPLE_KEY};

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::people::{Person, PropagationReport, Saved};
use crate::types::{FieldErrors, KindredError, Result};

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    fields: Option<FieldErrors>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    profile_pic_url: String,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    propagation: PropagationReport,
}

#[derive(Clone)]
pub struct PeopleClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PeopleClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn person_url(&self, id: &str, suffix: &str) -> String {
        self.url(&format!("/people/{}{}", urlencoding::encode(id), suffix))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body: ApiError = response.json().await.unwrap_or(ApiError {
            error: status.to_string(),
            fields: None,
        });
        debug!(status = %status, error = %body.error, "Request failed");
        Err(match status {
            StatusCode::NOT_FOUND => KindredError::NotFound(body.error),
            StatusCode::UNAUTHORIZED => KindredError::Unauthorized(body.error),
            StatusCode::BAD_REQUEST => KindredError::BadRequest(body.error),
            StatusCode::UNPROCESSABLE_ENTITY => {
                KindredError::Validation(body.fields.unwrap_or_default())
            }
            StatusCode::SERVICE_UNAVAILABLE => KindredError::Unavailable(body.error),
            _ => KindredError::Upstream(format!("{}: {}", status, body.error)),
        })
    }

    pub async fn health(&self) -> Result<Value> {
        self.send(self.http.get(self.url("/health"))).await
    }

    pub async fn list(&self) -> Result<Vec<Person>> {
        self.send(self.http.get(self.url("/people"))).await
    }

    pub async fn get(&self, id: &str) -> Result<Person> {
        self.send(self.http.get(self.person_url(id, ""))).await
    }

    pub async fn me(&self) -> Result<Person> {
        self.send(self.http.get(self.url("/me"))).await
    }

    pub async fn create(&self, person: &Value) -> Result<Saved> {
        self.send(self.http.post(self.url("/people")).json(person)).await
    }

    /// Partial update; keys mapped to `null` are removed
    pub async fn update(&self, id: &str, patch: &Value) -> Result<Saved> {
        self.send(self.http.put(self.person_url(id, "")).json(patch)).await
    }

    pub async fn delete(&self, id: &str) -> Result<PropagationReport> {
        let response: DeleteResponse = self.send(self.http.delete(self.person_url(id, ""))).await?;
        Ok(response.propagation)
    }

    pub async fn upload_profile_pic(
        &self,
        id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let mut part = Part::bytes(bytes).file_name(file_name.to_string());
        if let Some(ct) = content_type {
            part = part
                .mime_str(ct)
                .map_err(|e| KindredError::BadRequest(format!("Invalid content type: {}", e)))?;
        }
        let form = Form::new().part("ProfilePic", part);
        let response: UploadResponse = self
            .send(
                self.http
                    .post(self.person_url(id, "/upload-profile-pic"))
                    .multipart(form),
            )
            .await?;
        Ok(response.profile_pic_url)
    }
}

/// People API client with a locally persisted snapshot
pub struct Directory {
    client: PeopleClient,
    store: LocalStore,
}

impl Directory {
    pub fn new(client: PeopleClient, store: LocalStore) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &PeopleClient {
        &self.client
    }

    /// Cached people; fetched and stored only when the key is absent
    pub async fn fetch_people(&self) -> Result<Vec<Person>> {
        if let Some(cached) = self.store.get(PEOPLE_KEY).await? {
            if let Ok(people) = serde_json::from_value::<Vec<Person>>(cached) {
                return Ok(people);
            }
        }
        let people = self.client.list().await?;
        self.store
            .set(PEOPLE_KEY, serde_json::to_value(&people)?)
            .await?;
        Ok(people)
    }

    /// Drop the snapshot and fetch it again
    pub async fn refresh(&self) -> Result<Vec<Person>> {
        self.store.remove(PEOPLE_KEY).await?;
        self.fetch_people().await
    }

    pub async fn find(&self, id: &str) -> Result<Option<Person>> {
        Ok(self.fetch_people().await?.into_iter().find(|p| p.id == id))
    }

    pub async fn create(&self, person: &Value) -> Result<Saved> {
        let saved = self.client.create(person).await?;
        self.refresh().await?;
        Ok(saved)
    }

    pub async fn update(&self, id: &str, patch: &Value) -> Result<Saved> {
        let saved = self.client.update(id, patch).await?;
        self.refresh().await?;
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<PropagationReport> {
        let report = self.client.delete(id).await?;
        self.refresh().await?;
        Ok(report)
    }

    pub async fn upload_profile_pic(
        &self,
        id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let url = self
            .client
            .upload_profile_pic(id, file_name, bytes, content_type)
            .await?;
        self.refresh().await?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = PeopleClient::new("http://localhost:8080/");
        assert_eq!(client.url("/people"), "http://localhost:8080/people");
        assert_eq!(
            client.person_url("a b", "/upload-profile-pic"),
            "http://localhost:8080/people/a%20b/upload-profile-pic"
        );
    }

    #[test]
    fn test_empty_token_ignored() {
        let client = PeopleClient::new("http://x").with_token(Some(String::new()));
        assert!(client.token.is_none());
    }
}
