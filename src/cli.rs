//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INPUT_NOT_FOUND: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const ALL_FAILED: i32 = 4;
}

#[derive(Parser, Debug)]
#[command(
    name = "uilayout",
    version,
    about = "Extract typed UI components from website screenshots",
    after_help = "EXAMPLES:\n  \
                  # Rule-based segmentation, summary to stdout\n  \
                  uilayout analyze page.png\n\n  \
                  # Use candidates exported by a mask generator\n  \
                  uilayout analyze page.png --candidates page.json --components\n\n  \
                  # Many screenshots, 4 workers, 30s per image\n  \
                  uilayout batch shots/*.png --output-dir out --jobs 4 --timeout 30"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a single screenshot
    Analyze(AnalyzeArgs),

    /// Analyze many screenshots in parallel
    Batch(BatchArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Screenshot to analyze
    pub image: PathBuf,

    /// JSON file with precomputed candidate regions
    #[arg(long)]
    pub candidates: Option<PathBuf>,

    /// Group regions into header / footer / card sections
    #[arg(long)]
    pub cluster: bool,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit the full component list instead of the summary
    #[arg(long)]
    pub components: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Screenshots to analyze
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory holding `<image stem>.json` candidate files
    #[arg(long)]
    pub candidates_dir: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "uilayout_out")]
    pub output_dir: PathBuf,

    /// Worker threads (default: CPU count)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-image timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Group regions into header / footer / card sections
    #[arg(long)]
    pub cluster: bool,
}
