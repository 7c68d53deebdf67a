//! Resumable block-upload orchestration.

pub mod batch;
pub mod blocks;
pub mod types;
mod worker;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::api::ApiClient;
use crate::blob::{BlockBlobClient, CommitMetadata};
use crate::db::{SessionStore, UploadSession};
use crate::error::UploadError;
use crate::retry::retry_with_backoff;

use blocks::{block_count, block_id, ordered_block_ids, plan_blocks, BlockPlan};
use types::{ProgressCallback, UploadOptions};
use worker::{stage_pending_blocks, ProgressTracker};

/// Outcome of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub video_id: String,
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
}

/// Resumable upload client. Plans fixed-size blocks, stages them through a
/// bounded worker pool, persists per-block completion locally, commits the
/// block list, and reports completion to the backend.
pub struct Uploader {
    pub(crate) api: ApiClient,
    pub(crate) blob: BlockBlobClient,
    pub(crate) store: Arc<SessionStore>,
}

impl Uploader {
    pub fn new(api: ApiClient, store: Arc<SessionStore>) -> Self {
        Self {
            api,
            blob: BlockBlobClient::new(),
            store,
        }
    }

    /// Upload a new file end to end. The persisted session survives any
    /// failure past URL generation, so an interrupted upload can resume.
    pub async fn upload_file(
        &self,
        file_path: &Path,
        options: &UploadOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let session = self.create_new_session(file_path, options, None).await?;

        self.stage_and_commit(&session, file_path, HashSet::new(), progress)
            .await?;

        self.finish(session).await
    }

    /// Upload an auxiliary file whose completion notification references an
    /// already-uploaded video instead of the file's own generated id.
    pub async fn upload_associated_file(
        &self,
        file_path: &Path,
        video_id: &str,
        options: &UploadOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let session = self
            .create_new_session(file_path, options, Some(video_id))
            .await?;

        self.stage_and_commit(&session, file_path, HashSet::new(), progress)
            .await?;

        self.finish(session).await
    }

    /// Resume an interrupted upload. The selected file must match the
    /// persisted session identity exactly; blocks below `start_from` are
    /// treated as already uploaded even when the store has no record of
    /// them.
    pub async fn resume_upload(
        &self,
        upload_id: &str,
        file_path: &Path,
        start_from: u32,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let session = self
            .store
            .get_session(upload_id)
            .await?
            .ok_or_else(|| UploadError::SessionMissing {
                upload_id: upload_id.to_string(),
            })?;

        // Identity check runs before any network call.
        let (file_name, file_size) = file_identity(file_path).await?;
        if file_name != session.file_name || file_size != session.file_size {
            // A mismatched session can never be resumed; drop it so the
            // next attempt starts clean.
            self.store.delete_session(upload_id).await?;
            return Err(UploadError::SessionMismatch {
                expected_name: session.file_name,
                expected_size: session.file_size,
                actual_name: file_name,
                actual_size: file_size,
            });
        }

        let mut uploaded: HashSet<u32> = self
            .store
            .get_uploaded_blocks(upload_id)
            .await?
            .into_iter()
            .map(|block| block.block_index)
            .collect();

        // The force-skipped prefix is merged into the store before any
        // staging work begins.
        for index in 0..start_from.min(session.total_blocks) {
            if uploaded.insert(index) {
                self.store
                    .record_uploaded_block(upload_id, index, &block_id(index))
                    .await?;
            }
        }

        log::info!(
            "upload_resume: {} upload_id={} {}/{} blocks already staged",
            session.file_name,
            upload_id,
            uploaded.len(),
            session.total_blocks
        );

        self.stage_and_commit(&session, file_path, uploaded, progress)
            .await?;

        self.finish(session).await
    }

    async fn create_new_session(
        &self,
        file_path: &Path,
        options: &UploadOptions,
        video_id: Option<&str>,
    ) -> Result<UploadSession, UploadError> {
        let (file_name, file_size) = file_identity(file_path).await?;

        let issued = retry_with_backoff("generate_upload_url", || {
            self.api.generate_upload_url(&file_name)
        })
        .await?;

        let video_id = match video_id {
            Some(id) => id.to_string(),
            None => issued.video_id,
        };

        log::info!(
            "upload_start: {} ({} bytes) upload_id={} video_id={}",
            file_name,
            file_size,
            issued.upload_id,
            video_id
        );

        let now = Utc::now().timestamp();
        let session = UploadSession {
            upload_id: issued.upload_id,
            upload_url: issued.upload_url,
            file_name,
            file_size,
            total_blocks: block_count(file_size),
            content_type: options.content_type.clone(),
            cache_control: options.cache_control.clone(),
            video_id: Some(video_id),
            created_at: now,
            updated_at: now,
        };
        self.store.create_session(&session).await?;
        Ok(session)
    }

    /// Stage whatever is pending, then commit the full ordered block list.
    /// Session rows are deleted only after the commit succeeds.
    async fn stage_and_commit(
        &self,
        session: &UploadSession,
        file_path: &Path,
        uploaded: HashSet<u32>,
        progress: Option<ProgressCallback>,
    ) -> Result<(), UploadError> {
        let plans = plan_blocks(session.file_size);
        let (skipped, pending): (Vec<BlockPlan>, Vec<BlockPlan>) = plans
            .into_iter()
            .partition(|plan| uploaded.contains(&plan.index));

        let progress = Arc::new(ProgressTracker::new(
            &session.upload_id,
            session.total_blocks,
            session.file_size,
            progress,
        ));

        // Skipped blocks advance progress through the same tracker the
        // workers use, before staging begins.
        for plan in &skipped {
            progress.block_done(plan.size()).await;
        }

        stage_pending_blocks(
            &self.blob,
            &self.store,
            &session.upload_id,
            &session.upload_url,
            file_path,
            pending,
            &progress,
        )
        .await?;

        let block_ids = ordered_block_ids(session.total_blocks);
        let metadata = CommitMetadata {
            content_type: session.content_type.clone(),
            cache_control: session.cache_control.clone(),
        };
        retry_with_backoff("commit_block_list", || {
            self.blob
                .commit_block_list(&session.upload_url, &block_ids, &metadata)
        })
        .await?;

        self.store.delete_session(&session.upload_id).await?;
        Ok(())
    }

    async fn finish(&self, session: UploadSession) -> Result<UploadOutcome, UploadError> {
        let video_id = session
            .video_id
            .clone()
            .ok_or_else(|| UploadError::MissingVideoId {
                upload_id: session.upload_id.clone(),
            })?;

        retry_with_backoff("upload_complete", || {
            self.api
                .notify_upload_complete(&video_id, &session.file_name, &session.upload_id)
        })
        .await?;

        log::info!(
            "upload_finish: {} upload_id={} video_id={}",
            session.file_name,
            session.upload_id,
            video_id
        );

        Ok(UploadOutcome {
            video_id,
            upload_id: session.upload_id,
            file_name: session.file_name,
            file_size: session.file_size,
        })
    }
}

async fn file_identity(file_path: &Path) -> Result<(String, u64), UploadError> {
    let file_name = file_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| UploadError::InvalidPath(file_path.to_path_buf()))?
        .to_string();
    let file_size = tokio::fs::metadata(file_path).await?.len();
    Ok((file_name, file_size))
}
