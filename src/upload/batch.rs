//! Batch driver: several videos uploaded in order, plus shared auxiliary
//! files attributed to the first video.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::UploadError;
use crate::retry::retry_with_backoff;
use crate::upload::types::{BatchProgressCallback, ProgressCallback, UploadOptions, UploadProgress};
use crate::upload::Uploader;

// Weighted progress: videos share 80%, each auxiliary upload adds 10%
pub const VIDEOS_PROGRESS_SHARE: u32 = 80;
pub const AUX_PROGRESS_SHARE: u32 = 10;

// The auxiliary files are JSON exports
const AUX_CONTENT_TYPE: &str = "application/json";

/// Files uploaded together for one recorded session.
#[derive(Debug, Clone)]
pub struct BatchFiles {
    pub videos: Vec<PathBuf>,
    pub metrics: PathBuf,
    pub chat_log: PathBuf,
}

/// Outcome of a completed batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub video_ids: Vec<String>,
}

impl Uploader {
    /// Upload every video in order, then the metrics and chat-log files,
    /// finishing with one batch-completion notification that covers all
    /// video ids.
    ///
    /// Any failure aborts the batch immediately. Per-file sessions persist
    /// for individual resume; there is no batch-level resume state.
    pub async fn upload_batch(
        &self,
        files: &BatchFiles,
        video_options: &UploadOptions,
        progress: Option<BatchProgressCallback>,
    ) -> Result<BatchOutcome, UploadError> {
        let progress: Option<Arc<dyn Fn(u32) + Send + Sync>> = progress.map(Arc::from);
        let video_count = files.videos.len() as u32;

        let mut video_ids: Vec<String> = Vec::new();
        for (position, path) in files.videos.iter().enumerate() {
            let position = position as u32;
            let per_video = progress.clone().map(|callback| -> ProgressCallback {
                Box::new(move |update: UploadProgress| {
                    callback(batch_percent(position, update.percent, video_count));
                })
            });

            let outcome = self.upload_file(path, video_options, per_video).await?;
            log::info!(
                "batch_video_done: {}/{} video_id={}",
                position + 1,
                video_count,
                outcome.video_id
            );
            video_ids.push(outcome.video_id);
        }

        let first_video_id = match video_ids.first() {
            Some(id) => id.clone(),
            None => return Err(UploadError::EmptyBatch),
        };

        let aux_options = UploadOptions {
            content_type: AUX_CONTENT_TYPE.to_string(),
            cache_control: None,
        };

        let mut percent = VIDEOS_PROGRESS_SHARE;
        for (label, path) in [("metrics", &files.metrics), ("chat_log", &files.chat_log)] {
            self.upload_associated_file(path, &first_video_id, &aux_options, None)
                .await?;
            percent += AUX_PROGRESS_SHARE;
            log::info!("batch_aux_done: {} at {}%", label, percent);
            if let Some(callback) = &progress {
                callback(percent.min(100));
            }
        }

        retry_with_backoff("batch_upload_complete", || {
            self.api.notify_batch_complete(&video_ids)
        })
        .await?;

        log::info!("batch_finish: {} videos", video_ids.len());

        Ok(BatchOutcome { video_ids })
    }
}

/// Blend a video's own percentage into the batch scale. The videos split
/// [`VIDEOS_PROGRESS_SHARE`] evenly, in order.
fn batch_percent(position: u32, video_percent: u32, video_count: u32) -> u32 {
    if video_count == 0 {
        return 0;
    }
    (position * 100 + video_percent) * VIDEOS_PROGRESS_SHARE / (100 * video_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_percent_blends_video_progress_into_shared_portion() {
        assert_eq!(batch_percent(0, 0, 2), 0);
        assert_eq!(batch_percent(0, 50, 2), 20);
        assert_eq!(batch_percent(0, 100, 2), 40);
        assert_eq!(batch_percent(1, 50, 2), 60);
        assert_eq!(batch_percent(1, 100, 2), 80);
        assert_eq!(batch_percent(0, 100, 1), 80);
    }
}
