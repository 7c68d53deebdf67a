//! Command-line VOD upload client.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vodpush::db::DEFAULT_SESSION_MAX_AGE_DAYS;
use vodpush::{
    ApiClient, BatchFiles, ProgressCallback, SessionStore, UploadOptions, Uploader,
};

#[derive(Parser)]
#[command(name = "vodpush")]
#[command(about = "Resumable block uploads for livestream VODs")]
#[command(version)]
struct Cli {
    /// Backend API base URL
    #[arg(long, env = "VODPUSH_API_URL")]
    api_url: Option<String>,

    /// Account email used as the upload identity
    #[arg(long, env = "VODPUSH_EMAIL")]
    email: Option<String>,

    /// Local session database path
    #[arg(long, env = "VODPUSH_DB", default_value = "vodpush.db")]
    db_path: PathBuf,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file, resumable if interrupted
    Upload {
        /// File to upload
        file: PathBuf,
        /// Content type recorded on the committed blob (guessed when omitted)
        #[arg(long)]
        content_type: Option<String>,
        /// Cache-control recorded on the committed blob
        #[arg(long)]
        cache_control: Option<String>,
    },
    /// Resume an interrupted upload
    Resume {
        /// Upload id of the persisted session
        upload_id: String,
        /// The same file the session was created for
        file: PathBuf,
        /// Treat blocks below this index as already uploaded
        #[arg(long, default_value_t = 0)]
        start_from: u32,
    },
    /// Upload videos plus the session metrics and chat-log exports
    Batch {
        /// Video files, uploaded in order
        #[arg(value_name = "VIDEO", num_args = 1..)]
        videos: Vec<PathBuf>,
        /// Metrics export uploaded once for the whole batch
        #[arg(long)]
        metrics: PathBuf,
        /// Chat-log export uploaded once for the whole batch
        #[arg(long)]
        chat_log: PathBuf,
    },
    /// List resumable sessions in the local store
    Sessions {
        /// Print sessions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop a local session without uploading anything
    Forget {
        /// Upload id of the session to drop
        upload_id: String,
    },
    /// Prune local sessions idle longer than the cutoff
    Clean {
        /// Idle cutoff in days
        #[arg(long, default_value_t = DEFAULT_SESSION_MAX_AGE_DAYS)]
        days: i64,
    },
    /// Ask the backend whether a resumable upload exists for this account
    Check,
    /// Clear the backend's resumable-upload records for this account
    ClearRemote,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Upload {
            ref file,
            ref content_type,
            ref cache_control,
        } => {
            let api = build_api_client(&cli)?;
            let store = open_store(&cli.db_path).await?;
            handle_upload(api, store, file, content_type.clone(), cache_control.clone()).await
        }
        Commands::Resume {
            ref upload_id,
            ref file,
            start_from,
        } => {
            let api = build_api_client(&cli)?;
            let store = open_store(&cli.db_path).await?;
            handle_resume(api, store, upload_id, file, start_from).await
        }
        Commands::Batch {
            ref videos,
            ref metrics,
            ref chat_log,
        } => {
            let api = build_api_client(&cli)?;
            let store = open_store(&cli.db_path).await?;
            handle_batch(api, store, videos.clone(), metrics.clone(), chat_log.clone()).await
        }
        Commands::Sessions { json } => {
            let store = open_store(&cli.db_path).await?;
            handle_sessions(store, json).await
        }
        Commands::Forget { ref upload_id } => {
            let store = open_store(&cli.db_path).await?;
            handle_forget(store, upload_id).await
        }
        Commands::Clean { days } => {
            let store = open_store(&cli.db_path).await?;
            handle_clean(store, days).await
        }
        Commands::Check => {
            let api = build_api_client(&cli)?;
            let store = open_store(&cli.db_path).await?;
            handle_check(api, store).await
        }
        Commands::ClearRemote => {
            let api = build_api_client(&cli)?;
            handle_clear_remote(api).await
        }
    }
}

fn build_api_client(cli: &Cli) -> Result<ApiClient> {
    let api_url = cli
        .api_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--api-url (or VODPUSH_API_URL) is required"))?;
    let email = cli
        .email
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--email (or VODPUSH_EMAIL) is required"))?;

    if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
        anyhow::bail!("API URL must start with http:// or https://");
    }

    Ok(ApiClient::new(api_url, email))
}

async fn open_store(db_path: &Path) -> Result<Arc<SessionStore>> {
    let store = SessionStore::open(db_path).await.map_err(|e| {
        anyhow::anyhow!("failed to open session store at {}: {e}", db_path.display())
    })?;
    Ok(Arc::new(store))
}

async fn handle_upload(
    api: ApiClient,
    store: Arc<SessionStore>,
    file: &Path,
    content_type: Option<String>,
    cache_control: Option<String>,
) -> Result<()> {
    let options = UploadOptions {
        content_type: content_type.unwrap_or_else(|| guess_content_type(file).to_string()),
        cache_control,
    };

    let uploader = Uploader::new(api, store);
    let outcome = uploader
        .upload_file(file, &options, Some(progress_line()))
        .await?;
    eprintln!();

    println!("Uploaded {} ({} bytes)", outcome.file_name, outcome.file_size);
    println!("  Video ID:  {}", outcome.video_id);
    println!("  Upload ID: {}", outcome.upload_id);
    Ok(())
}

async fn handle_resume(
    api: ApiClient,
    store: Arc<SessionStore>,
    upload_id: &str,
    file: &Path,
    start_from: u32,
) -> Result<()> {
    let uploader = Uploader::new(api, store);
    let outcome = uploader
        .resume_upload(upload_id, file, start_from, Some(progress_line()))
        .await?;
    eprintln!();

    println!("Resumed and finished {} ({} bytes)", outcome.file_name, outcome.file_size);
    println!("  Video ID:  {}", outcome.video_id);
    println!("  Upload ID: {}", outcome.upload_id);
    Ok(())
}

async fn handle_batch(
    api: ApiClient,
    store: Arc<SessionStore>,
    videos: Vec<PathBuf>,
    metrics: PathBuf,
    chat_log: PathBuf,
) -> Result<()> {
    let video_options = UploadOptions {
        content_type: videos
            .first()
            .map(|path| guess_content_type(path).to_string())
            .unwrap_or_else(|| "video/mp4".to_string()),
        cache_control: None,
    };

    let files = BatchFiles {
        videos,
        metrics,
        chat_log,
    };

    let uploader = Uploader::new(api, store);
    let outcome = uploader
        .upload_batch(
            &files,
            &video_options,
            Some(Box::new(|percent| {
                eprint!("\r  batch {}%", percent);
                let _ = std::io::stderr().flush();
            })),
        )
        .await?;
    eprintln!();

    println!("Batch complete: {} video(s)", outcome.video_ids.len());
    for video_id in &outcome.video_ids {
        println!("  {}", video_id);
    }
    Ok(())
}

async fn handle_sessions(store: Arc<SessionStore>, json: bool) -> Result<()> {
    let sessions = store
        .get_pending_sessions()
        .await
        .map_err(|e| anyhow::anyhow!("failed to list sessions: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No resumable sessions.");
        return Ok(());
    }

    for session in sessions {
        let blocks = store
            .get_uploaded_blocks(&session.upload_id)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read blocks: {e}"))?;
        println!(
            "{}  {} ({} bytes)  {}/{} blocks  video={}",
            session.upload_id,
            session.file_name,
            session.file_size,
            blocks.len(),
            session.total_blocks,
            session.video_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn handle_forget(store: Arc<SessionStore>, upload_id: &str) -> Result<()> {
    store
        .delete_session(upload_id)
        .await
        .map_err(|e| anyhow::anyhow!("failed to delete session: {e}"))?;
    println!("Session {} removed from the local store.", upload_id);
    Ok(())
}

async fn handle_clean(store: Arc<SessionStore>, days: i64) -> Result<()> {
    let removed = store
        .cleanup_old_sessions(days)
        .await
        .map_err(|e| anyhow::anyhow!("failed to clean sessions: {e}"))?;
    println!("Removed {} stale session(s).", removed);
    Ok(())
}

async fn handle_check(api: ApiClient, store: Arc<SessionStore>) -> Result<()> {
    let check = api.check_resumable().await?;
    if !check.upload_resume {
        println!("No resumable upload on the backend.");
        return Ok(());
    }

    match check.upload_id {
        Some(upload_id) => {
            println!("Backend reports a resumable upload: {}", upload_id);
            let session = store
                .get_session(&upload_id)
                .await
                .map_err(|e| anyhow::anyhow!("failed to read session: {e}"))?;
            match session {
                Some(session) => println!(
                    "  Local session: {} ({} bytes), {} blocks total",
                    session.file_name, session.file_size, session.total_blocks
                ),
                None => println!("  No matching local session; start a new upload."),
            }
        }
        None => println!("Backend reports a resumable upload but returned no upload id."),
    }
    Ok(())
}

async fn handle_clear_remote(api: ApiClient) -> Result<()> {
    api.clear_remote_sessions().await?;
    println!("Cleared backend resumable-upload records.");
    Ok(())
}

fn progress_line() -> ProgressCallback {
    Box::new(|update| {
        eprint!(
            "\r  {}% ({}/{} blocks, {}/{} bytes)",
            update.percent,
            update.completed_blocks,
            update.total_blocks,
            update.uploaded_bytes,
            update.total_bytes
        );
        let _ = std::io::stderr().flush();
    })
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
