//! Bounded-concurrency block staging.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::Mutex;

use crate::blob::BlockBlobClient;
use crate::db::SessionStore;
use crate::error::UploadError;
use crate::retry::retry_with_backoff;
use crate::upload::blocks::BlockPlan;
use crate::upload::types::{ProgressCallback, UploadProgress, MAX_CONCURRENT_UPLOADS};

/// Progress shared by the staging workers and the resume pre-seed path.
/// Counting a finished block and delivering the snapshot happen under one
/// lock, so snapshots reach the callback in counting order and the
/// completed count an observer sees never moves backwards.
pub(crate) struct ProgressTracker {
    upload_id: String,
    total_blocks: u32,
    total_bytes: u64,
    callback: Option<ProgressCallback>,
    state: Mutex<ProgressState>,
}

struct ProgressState {
    completed_blocks: u32,
    uploaded_bytes: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        upload_id: &str,
        total_blocks: u32,
        total_bytes: u64,
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            upload_id: upload_id.to_string(),
            total_blocks,
            total_bytes,
            callback,
            state: Mutex::new(ProgressState {
                completed_blocks: 0,
                uploaded_bytes: 0,
            }),
        }
    }

    /// Count one finished block and deliver the snapshot before releasing
    /// the lock. Returns the new completed count. The callback is sync, so
    /// nothing awaits while the lock is held.
    pub(crate) async fn block_done(&self, bytes: u64) -> u32 {
        let mut state = self.state.lock().await;
        state.completed_blocks += 1;
        state.uploaded_bytes += bytes;
        if let Some(callback) = &self.callback {
            callback(UploadProgress::new(
                &self.upload_id,
                state.completed_blocks,
                self.total_blocks,
                state.uploaded_bytes,
                self.total_bytes,
            ));
        }
        state.completed_blocks
    }
}

/// Stage every block in `pending` with at most [`MAX_CONCURRENT_UPLOADS`]
/// requests in flight. Workers claim work by advancing a shared cursor, so
/// each block is staged exactly once per run; the claim happens before any
/// network activity for that block.
pub(crate) async fn stage_pending_blocks(
    blob: &BlockBlobClient,
    store: &Arc<SessionStore>,
    upload_id: &str,
    upload_url: &str,
    file_path: &Path,
    pending: Vec<BlockPlan>,
    progress: &Arc<ProgressTracker>,
) -> Result<(), UploadError> {
    if pending.is_empty() {
        return Ok(());
    }

    let pending = Arc::new(pending);
    let cursor = Arc::new(AtomicUsize::new(0));
    let worker_count = MAX_CONCURRENT_UPLOADS.min(pending.len());

    let mut handles = Vec::new();
    for _ in 0..worker_count {
        let blob = blob.clone();
        let store = store.clone();
        let upload_id = upload_id.to_string();
        let upload_url = upload_url.to_string();
        let file_path = file_path.to_path_buf();
        let pending = pending.clone();
        let cursor = cursor.clone();
        let progress = progress.clone();

        let handle = tokio::spawn(async move {
            loop {
                let slot = cursor.fetch_add(1, Ordering::SeqCst);
                if slot >= pending.len() {
                    break;
                }
                let block = &pending[slot];

                let body = read_block(&file_path, block).await?;
                retry_with_backoff("stage_block", || {
                    blob.stage_block(&upload_url, &block.id, body.clone())
                })
                .await?;

                store
                    .record_uploaded_block(&upload_id, block.index, &block.id)
                    .await?;

                let done = progress.block_done(block.size()).await;
                log::debug!(
                    "stage_block: {} block {} staged ({}/{})",
                    upload_id,
                    block.index,
                    done,
                    progress.total_blocks
                );
            }
            Ok::<(), UploadError>(())
        });

        handles.push(handle);
    }

    // A failed worker stops claiming; the rest drain the list. The first
    // error wins.
    let mut first_error: Option<UploadError> = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(UploadError::Task(err));
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn read_block(file_path: &Path, block: &BlockPlan) -> Result<Vec<u8>, UploadError> {
    let mut file = File::open(file_path).await?;
    file.seek(SeekFrom::Start(block.start)).await?;

    let mut buffer = vec![0u8; block.size() as usize];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}
