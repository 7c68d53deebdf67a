//! Typed client for the VOD backend endpoints.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Client for the backend API, acting on behalf of one account.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct GenerateUploadUrlRequest<'a> {
    email: &'a str,
    filename: &'a str,
}

/// Identifiers issued for a new upload.
#[derive(Debug, Deserialize)]
pub struct GenerateUploadUrlResponse {
    pub video_id: String,
    pub upload_id: String,
    pub upload_url: String,
}

#[derive(Debug, Serialize)]
struct UploadCompleteRequest<'a> {
    email: &'a str,
    video_id: &'a str,
    filename: &'a str,
    upload_id: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchCompleteRequest<'a> {
    email: &'a str,
    video_ids: &'a [String],
}

/// Backend's view of whether this account has a resumable upload.
#[derive(Debug, Deserialize)]
pub struct ResumeCheckResponse {
    pub upload_resume: bool,
    #[serde(default)]
    pub upload_id: Option<String>,
}

impl ApiClient {
    /// Build a client for `base_url`, identifying as `email`.
    pub fn new(base_url: &str, email: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Request upload identifiers and a pre-signed blob URL for `filename`.
    pub async fn generate_upload_url(
        &self,
        filename: &str,
    ) -> Result<GenerateUploadUrlResponse, UploadError> {
        let url = format!("{}/api/generate-upload-url", self.base_url);
        let request = self.http.post(&url).json(&GenerateUploadUrlRequest {
            email: &self.email,
            filename,
        });
        send_json("generate_upload_url", request).await
    }

    /// Report a finished upload for `video_id`.
    pub async fn notify_upload_complete(
        &self,
        video_id: &str,
        filename: &str,
        upload_id: &str,
    ) -> Result<(), UploadError> {
        let url = format!("{}/api/upload-complete", self.base_url);
        let request = self.http.post(&url).json(&UploadCompleteRequest {
            email: &self.email,
            video_id,
            filename,
            upload_id,
        });
        send_empty("upload_complete", request).await
    }

    /// Report a finished batch covering every uploaded video.
    pub async fn notify_batch_complete(&self, video_ids: &[String]) -> Result<(), UploadError> {
        let url = format!("{}/api/batch-upload-complete", self.base_url);
        let request = self.http.post(&url).json(&BatchCompleteRequest {
            email: &self.email,
            video_ids,
        });
        send_empty("batch_upload_complete", request).await
    }

    /// Ask the backend whether a resumable upload exists for this account.
    pub async fn check_resumable(&self) -> Result<ResumeCheckResponse, UploadError> {
        let url = format!(
            "{}/api/upload-resume-check/{}",
            self.base_url,
            urlencoding::encode(&self.email)
        );
        send_json("upload_resume_check", self.http.get(&url)).await
    }

    /// Clear the backend's resumable-upload records for this account.
    pub async fn clear_remote_sessions(&self) -> Result<(), UploadError> {
        let url = format!(
            "{}/api/uploads-clear/{}",
            self.base_url,
            urlencoding::encode(&self.email)
        );
        send_empty("uploads_clear", self.http.delete(&url)).await
    }
}

async fn send_json<T: DeserializeOwned>(
    op: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, UploadError> {
    let response = request
        .send()
        .await
        .map_err(|source| UploadError::Network { op, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::Http { op, status, body });
    }

    response
        .json::<T>()
        .await
        .map_err(|source| UploadError::Network { op, source })
}

async fn send_empty(
    op: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<(), UploadError> {
    let response = request
        .send()
        .await
        .map_err(|source| UploadError::Network { op, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::Http { op, status, body });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("https://api.example.com/", "seller@example.com");
        assert_eq!(client.base_url, "https://api.example.com");
        assert_eq!(client.email(), "seller@example.com");
    }
}
