//! Block staging and commit against a pre-signed blob upload URL.

use crate::error::UploadError;

/// Client for the block operations behind a pre-signed upload URL.
///
/// The URL already carries authorization, so the client only appends the
/// block-operation query parameters.
#[derive(Clone)]
pub struct BlockBlobClient {
    http: reqwest::Client,
}

/// Metadata recorded on the blob when the block list is committed.
#[derive(Debug, Clone)]
pub struct CommitMetadata {
    pub content_type: String,
    pub cache_control: Option<String>,
}

impl BlockBlobClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Stage one block under its id. Ids are deterministic, so re-staging
    /// after a failed attempt overwrites the same remote slot.
    pub async fn stage_block(
        &self,
        upload_url: &str,
        block_id: &str,
        body: Vec<u8>,
    ) -> Result<(), UploadError> {
        let url = append_query(
            upload_url,
            &format!("comp=block&blockid={}", urlencoding::encode(block_id)),
        );

        let response = self
            .http
            .put(&url)
            .body(body)
            .send()
            .await
            .map_err(|source| UploadError::Network {
                op: "stage_block",
                source,
            })?;

        check_status("stage_block", response).await
    }

    /// Commit the full ordered block list together with content metadata.
    /// The blob only becomes readable once this succeeds.
    pub async fn commit_block_list(
        &self,
        upload_url: &str,
        block_ids: &[String],
        metadata: &CommitMetadata,
    ) -> Result<(), UploadError> {
        let url = append_query(upload_url, "comp=blocklist");

        let mut request = self
            .http
            .put(&url)
            .header("Content-Type", "application/xml")
            .header("x-ms-blob-content-type", &metadata.content_type);
        if let Some(cache_control) = &metadata.cache_control {
            request = request.header("x-ms-blob-cache-control", cache_control);
        }

        let response = request
            .body(block_list_xml(block_ids))
            .send()
            .await
            .map_err(|source| UploadError::Network {
                op: "commit_block_list",
                source,
            })?;

        check_status("commit_block_list", response).await
    }
}

impl Default for BlockBlobClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `query` to a pre-signed URL that may already carry parameters.
fn append_query(upload_url: &str, query: &str) -> String {
    if upload_url.contains('?') {
        format!("{}&{}", upload_url, query)
    } else {
        format!("{}?{}", upload_url, query)
    }
}

fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for block_id in block_ids {
        xml.push_str(&format!("<Latest>{}</Latest>", block_id));
    }
    xml.push_str("</BlockList>");
    xml
}

async fn check_status(op: &'static str, response: reqwest::Response) -> Result<(), UploadError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::Http { op, status, body });
    }
    Ok(())
}
