use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use hlsgrab_engine::{
    DownloadController, DownloadTaskSummary, DownloaderConfig, FfmpegRemuxer, FileSink, HlsConfig,
    StartOptions, TaskEvent, TaskId, TaskStatus,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging. Logs go to stderr so `--json` output stays clean on stdout.
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let writer = match &args.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            BoxMakeWriter::new(std::io::stderr.and(Arc::new(log_file)))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(writer)
        .with_ansi(args.log_file.is_none())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("hlsgrab {} - HLS playlist downloader", env!("CARGO_PKG_VERSION"));

    if args.concurrency == 0 {
        return Err(AppError::InvalidInput(
            "--concurrency must be at least 1".to_string(),
        ));
    }

    info!(
        "HTTP timeout configuration: overall={}s, connect={}s, segment={}s",
        args.timeout, args.connect_timeout, args.segment_timeout
    );

    // Create common download configuration
    let download_config = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_headers(utils::parse_headers(&args.headers))
        .build();

    let hls_config = HlsConfig::builder()
        .with_base_config(download_config)
        .max_concurrent(args.concurrency)
        .segment_retry_count(args.retries)
        .segment_timeout(Duration::from_secs(args.segment_timeout))
        .build();

    let mut builder =
        DownloadController::builder(Arc::new(FileSink::new(&args.output_dir))).config(hls_config);
    if args.mp4 {
        builder = builder.converter(Arc::new(FfmpegRemuxer::new(&args.ffmpeg)));
    }
    let controller = builder.build()?;

    let progress = if args.show_progress && !args.json {
        ProgressManager::new()
    } else {
        ProgressManager::new_disabled()
    };

    let title = args
        .title
        .clone()
        .unwrap_or_else(|| utils::title_from_url(&args.url));

    let mut events = controller.subscribe();
    let task_id = controller.start_download(
        &args.url,
        &title,
        StartOptions {
            convert_to_container: args.mp4,
        },
    )?;
    info!(task_id = %task_id, title = %title, "Download started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut outcome: Option<TaskStatus> = None;
    loop {
        tokio::select! {
            received = events.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event stream lagged");
                        // The terminal status may have been among the skipped events.
                        outcome = status_after_lag(controller.get_task(task_id).as_ref());
                        if outcome.is_some() {
                            break;
                        }
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if event.task_id() != task_id {
                    continue;
                }
                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                }
                progress.handle_event(&event);
                if let TaskEvent::Status { status, .. } = &event {
                    if status.is_terminal() {
                        outcome = Some(*status);
                    }
                }
                if let Some(status) = outcome {
                    if is_done(&event, status, args.mp4) {
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                warn!("Interrupted, cancelling download");
                controller.cancel(task_id)?;
                return Err(AppError::Download("Cancelled by user".to_string()));
            }
        }
    }

    report(&controller, task_id, outcome, &progress)
}

/// The run is over once the task is terminal and, when a conversion was requested
/// for a completed task, once that conversion has reported its result.
fn is_done(event: &TaskEvent, status: TaskStatus, mp4: bool) -> bool {
    if status != TaskStatus::Completed || !mp4 {
        return true;
    }
    matches!(
        event,
        TaskEvent::Conversion {
            status: TaskStatus::Completed | TaskStatus::Error,
            ..
        }
    )
}

/// Terminal status of a task whose events may have been missed.
///
/// A task that is no longer registered was cancelled.
fn status_after_lag(summary: Option<&DownloadTaskSummary>) -> Option<TaskStatus> {
    match summary {
        None => Some(TaskStatus::Cancelled),
        Some(summary) if summary.status.is_terminal() => Some(summary.status),
        Some(_) => None,
    }
}

fn report(
    controller: &DownloadController,
    task_id: TaskId,
    outcome: Option<TaskStatus>,
    progress: &ProgressManager,
) -> Result<(), AppError> {
    let summary = controller.get_task(task_id);
    debug!(summary = ?summary, "Final task state");

    match outcome {
        Some(TaskStatus::Completed) => {
            if let Some(output) = summary.and_then(|s| s.output) {
                progress.println(&format!("Saved {}", output.persist_id));
                info!(path = %output.persist_id, "Download completed");
            }
            Ok(())
        }
        Some(status) => {
            let message = summary
                .and_then(|s| s.message)
                .unwrap_or_else(|| status.to_string());
            Err(AppError::Download(message))
        }
        None => Err(AppError::Download(
            "Event stream closed before the task finished".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversion(status: TaskStatus) -> TaskEvent {
        TaskEvent::Conversion {
            task_id: TaskId::new(),
            status,
            message: None,
        }
    }

    #[test]
    fn test_waits_for_conversion_result() {
        let converting = conversion(TaskStatus::Converting);
        assert!(!is_done(&converting, TaskStatus::Completed, true));
        assert!(is_done(&conversion(TaskStatus::Error), TaskStatus::Completed, true));
        assert!(is_done(&converting, TaskStatus::Completed, false));
        assert!(is_done(&converting, TaskStatus::Error, true));
    }

    fn summary(status: TaskStatus) -> DownloadTaskSummary {
        DownloadTaskSummary {
            id: TaskId::new(),
            title: "clip".to_string(),
            source_url: "https://cdn.example/v/index.m3u8".to_string(),
            status,
            message: None,
            downloaded_count: 0,
            total_segments: 3,
            progress: 0,
            total_duration: 0.0,
            output: None,
        }
    }

    #[test]
    fn test_status_after_lag() {
        assert_eq!(
            status_after_lag(Some(&summary(TaskStatus::Downloading))),
            None
        );
        assert_eq!(
            status_after_lag(Some(&summary(TaskStatus::Completed))),
            Some(TaskStatus::Completed)
        );
        assert_eq!(
            status_after_lag(Some(&summary(TaskStatus::Error))),
            Some(TaskStatus::Error)
        );
        assert_eq!(status_after_lag(None), Some(TaskStatus::Cancelled));
    }
}
