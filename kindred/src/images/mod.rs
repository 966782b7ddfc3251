//! Hosted image storage for profile pictures
//!
//! Uploads go straight to the hosting provider with no timeout and no retry;
//! a failed upload surfaces as an upstream error and leaves the person
//! untouched.

use bytes::Bytes;
use clap::Parser;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::types::{KindredError, Result};

/// A file received from a client
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[async_trait::async_trait]
pub trait ImageHost: Send + Sync {
    /// Store the image and return its public HTTPS URL
    async fn upload(&self, image: ImageUpload) -> Result<String>;
}

/// Cloudinary account settings
#[derive(Parser, Debug, Clone, Default)]
pub struct ImageHostArgs {
    /// Cloudinary cloud name
    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    pub cloudinary_cloud_name: Option<String>,

    /// Cloudinary API key
    #[arg(long, env = "CLOUDINARY_API_KEY")]
    pub cloudinary_api_key: Option<String>,

    /// Cloudinary API secret
    #[arg(long, env = "CLOUDINARY_API_SECRET")]
    pub cloudinary_api_secret: Option<String>,

    /// Folder uploads are stored under
    #[arg(long, env = "CLOUDINARY_FOLDER", default_value = "kindred")]
    pub cloudinary_folder: String,
}

impl ImageHostArgs {
    /// Build the configured host, if all three credentials are present
    pub fn build(&self) -> Option<CloudinaryHost> {
        match (
            &self.cloudinary_cloud_name,
            &self.cloudinary_api_key,
            &self.cloudinary_api_secret,
        ) {
            (Some(cloud), Some(key), Some(secret)) => Some(CloudinaryHost::new(
                cloud.clone(),
                key.clone(),
                secret.clone(),
                self.cloudinary_folder.clone(),
            )),
            _ => None,
        }
    }
}

pub struct CloudinaryHost {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadError>,
}

#[derive(Debug, Deserialize)]
struct UploadError {
    message: String,
}

impl CloudinaryHost {
    pub fn new(cloud_name: String, api_key: String, api_secret: String, folder: String) -> Self {
        info!(cloud = %cloud_name, folder = %folder, "Cloudinary image host configured");
        Self {
            http: reqwest::Client::new(),
            cloud_name,
            api_key,
            api_secret,
            folder,
            base_url: "https://api.cloudinary.com/v1_1".to_string(),
        }
    }

    /// Point at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn upload_url(&self) -> String {
        format!("{}/{}/image/upload", self.base_url, self.cloud_name)
    }

    /// Signature over the alphabetically sorted signed params
    fn sign(&self, timestamp: i64) -> String {
        sign_params(
            &[("folder", &self.folder), ("timestamp", &timestamp.to_string())],
            &self.api_secret,
        )
    }
}

/// `sha256("k1=v1&k2=v2" + secret)`, hex encoded; params must be sorted
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait::async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: ImageUpload) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.sign(timestamp);

        let mut part = Part::bytes(image.bytes.to_vec()).file_name(image.file_name.clone());
        if let Some(ct) = &image.content_type {
            part = part
                .mime_str(ct)
                .map_err(|e| KindredError::BadRequest(format!("Invalid content type: {}", e)))?;
        }

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("folder", self.folder.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        debug!(file = %image.file_name, size = image.bytes.len(), "Uploading image");
        let response = self.http.post(self.upload_url()).multipart(form).send().await?;
        let status = response.status();
        let body: UploadResponse = response.json().await?;

        match (body.secure_url, body.error) {
            (Some(url), _) if status.is_success() => Ok(url),
            (_, Some(err)) => Err(KindredError::Upstream(format!(
                "Image host rejected upload: {}",
                err.message
            ))),
            _ => Err(KindredError::Upstream(format!(
                "Image host returned {} without a URL",
                status
            ))),
        }
    }
}
