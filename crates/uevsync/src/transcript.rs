//! Console and transcript logging.
//!
//! Every run writes a full transcript next to the console output. The
//! transcript file name is derived from the process start time so runs never
//! overwrite each other.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use miette::Result;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{Layer, filter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "uevsync=debug,uevsync_blob=debug,uevsync_scheduler=debug";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Events with this target reach the transcript file but not the console.
///
/// Used for output that is already printed to stdout.
pub const TRANSCRIPT_ONLY: &str = "uevsync::transcript";

fn transcript_file_name(started: DateTime<Local>) -> String {
    format!("uevsync-{}.log", started.format("%Y%m%d-%H%M%S"))
}

/// `<dir>/uevsync-YYYYMMDD-HHMMSS.log` for a run started at `started`.
pub fn transcript_path(dir: &Path, started: DateTime<Local>) -> PathBuf {
    dir.join(transcript_file_name(started))
}

/// Open the transcript file for a run started at `started`.
///
/// Returns `None` after reporting on stderr when the directory or the file
/// cannot be created.
fn open_transcript(
    dir: &Path,
    started: DateTime<Local>,
) -> Option<(PathBuf, NonBlocking, WorkerGuard)> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "failed to create transcript directory {}, logging to console only: {e}",
            dir.display()
        );
        return None;
    }

    let path = transcript_path(dir, started);
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(transcript_file_name(started))
        .build(dir);

    match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            Some((path, writer, guard))
        }
        Err(e) => {
            eprintln!(
                "failed to create transcript {}, logging to console only: {e}",
                path.display()
            );
            None
        }
    }
}

/// Install the global subscriber.
///
/// Returns the transcript path and the guard that flushes it on drop. When
/// the transcript cannot be created, logging continues on the console only.
pub fn init(log_dir: Option<&Path>, started: DateTime<Local>) -> Result<Option<(PathBuf, WorkerGuard)>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));

    let console = fmt::layer()
        .with_timer(fmt::time::ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false)
        .with_filter(filter::filter_fn(|meta| meta.target() != TRANSCRIPT_ONLY));

    let dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);

    let transcript = open_transcript(&dir, started);

    let registry = tracing_subscriber::registry().with(filter).with(console);

    match transcript {
        Some((path, writer, guard)) => {
            let file_layer = fmt::layer()
                .with_timer(fmt::time::ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_ansi(false)
                .with_writer(writer);
            registry
                .with(file_layer)
                .try_init()
                .map_err(|e| miette::miette!("failed to initialize logging: {}", e))?;
            Ok(Some((path, guard)))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| miette::miette!("failed to initialize logging: {}", e))?;
            Ok(None)
        }
    }
}
