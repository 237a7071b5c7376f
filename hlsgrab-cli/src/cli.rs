use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "HLS playlist downloader",
    long_about = "Downloads every segment of a VOD-style HLS playlist, decrypts AES-128\n\
                  encrypted segments and saves the result as a single .ts file.\n\
                  \n\
                  Segments are fetched with bounded concurrency and merged in playlist\n\
                  order. Optionally the merged stream is remuxed to .mp4 with ffmpeg."
)]
pub struct CliArgs {
    /// Playlist URL
    #[arg(required = true, help = "URL of the .m3u8 media playlist to download")]
    pub url: String,

    /// Output title
    #[arg(
        short,
        long,
        help = "Title used for the output file name (default: derived from the playlist URL)"
    )]
    pub title: Option<String>,

    /// Output directory
    #[arg(
        short,
        long,
        default_value = ".",
        help = "Directory where the output file will be saved"
    )]
    pub output_dir: PathBuf,

    /// Number of concurrent segment workers
    #[arg(
        short = 'c',
        long,
        default_value = "3",
        help = "Number of segment workers fetching in parallel"
    )]
    pub concurrency: usize,

    /// Segment retry attempts
    #[arg(
        long,
        default_value = "3",
        help = "Retry attempts for segment requests failing with a network error or 5xx response"
    )]
    pub retries: u32,

    /// Segment timeout in seconds
    #[arg(
        long,
        default_value = "20",
        help = "Timeout for an individual segment request in seconds"
    )]
    pub segment_timeout: u64,

    /// Overall request timeout in seconds
    #[arg(
        long,
        default_value = "0",
        help = "Overall timeout in seconds for HTTP requests (0 disables it)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Remux to mp4 after download
    #[arg(long, help = "Also save an .mp4 copy remuxed with ffmpeg")]
    pub mp4: bool,

    /// ffmpeg executable
    #[arg(
        long,
        default_value = "ffmpeg",
        help = "Path to the ffmpeg executable used by --mp4"
    )]
    pub ffmpeg: PathBuf,

    /// Show progress bar
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "false",
        help = "Show a progress bar while segments download"
    )]
    pub show_progress: bool,

    /// Print events as JSON lines
    #[arg(long, help = "Print task events to stdout as JSON lines")]
    pub json: bool,

    /// Log file
    #[arg(long, help = "Also write logs to this file")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}
