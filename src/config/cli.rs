//! CLI argument parsing and configuration

use clap::Parser;
use std::path::PathBuf;

/// stemsplit - Serverless music stem separation worker
///
/// Separates a mixture into stems (vocals, drums, bass, piano, other),
/// packages them into a zip archive and returns it inline or as a signed
/// object-storage link. Runs as a Lambda-style function by default; pass
/// --event to process a single request file locally.
#[derive(Parser, Debug)]
#[command(name = "stemsplit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Process a single request JSON file and print the response
    #[arg(short, long, value_name = "PATH")]
    pub event: Option<PathBuf>,

    /// Default delivery mode when a request does not name one
    #[arg(long, env = "STEMSPLIT_DELIVERY", default_value = "inline")]
    #[arg(value_parser = ["inline", "s3"])]
    pub delivery: String,

    /// Root directory for per-request scratch space (defaults to the system temp dir)
    #[arg(long, env = "STEMSPLIT_SCRATCH_DIR", value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Directory containing spleeter-{2,4,5}stems.onnx
    #[arg(long, env = "STEMSPLIT_MODEL_DIR", value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Base URL to download missing models from
    #[arg(long, env = "STEMSPLIT_MODEL_URL", value_name = "URL")]
    pub model_url: Option<String>,

    /// Object storage bucket for remote delivery
    #[arg(long, env = "STEMSPLIT_S3_BUCKET", value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// Key prefix for uploaded archives
    #[arg(long, env = "STEMSPLIT_S3_PREFIX", default_value = "stems")]
    pub key_prefix: String,

    /// Largest archive returned inline, in MiB
    #[arg(long, env = "STEMSPLIT_MAX_INLINE_MB", default_value = "10")]
    pub max_inline_mb: u64,

    /// Segment length fed to the model, in seconds
    #[arg(long, env = "STEMSPLIT_SEGMENT_SECS", default_value = "10.0")]
    pub segment_secs: f32,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

impl Cli {
    /// Get the log level based on verbosity flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
