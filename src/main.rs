//! uilayout CLI

use anyhow::{Context as _, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use uilayout::cli::{exit_codes, AnalyzeArgs, BatchArgs, Cli, Commands};
use uilayout::{
    load_config, metadata_to_json, BatchInput, BatchProgress, CancelToken, ComponentPipeline,
    PipelineConfig, PipelineError, PrecomputedSegmenter, RuleBasedSegmenter, Segmenter,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {e:#}");
        return ExitCode::from(exit_codes::GENERAL_ERROR as u8);
    }

    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_codes::GENERAL_ERROR as u8)
        }
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        })
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn run(cli: Cli) -> Result<i32> {
    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    match cli.command {
        Commands::Analyze(args) => analyze(config, &args),
        Commands::Batch(args) => batch(config, &args),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(exit_codes::SUCCESS)
        }
    }
}

// ============================================================
// analyze
// ============================================================

fn analyze(mut config: PipelineConfig, args: &AnalyzeArgs) -> Result<i32> {
    if args.cluster {
        config.enable_clustering = true;
    }

    let segmenter: Box<dyn Segmenter> = match &args.candidates {
        Some(path) => Box::new(
            PrecomputedSegmenter::from_json_file(path)
                .with_context(|| format!("Failed to read candidates {}", path.display()))?,
        ),
        None => Box::new(RuleBasedSegmenter::default()),
    };

    let pipeline = ComponentPipeline::new(config, segmenter.as_ref());
    let output = match pipeline.run_path(&args.image) {
        Ok(o) => o,
        Err(PipelineError::InputNotFound(p)) => {
            eprintln!("Error: input not found: {}", p.display());
            return Ok(exit_codes::INPUT_NOT_FOUND);
        }
        Err(e) => {
            eprintln!("Error: {}: {e}", args.image.display());
            return Ok(exit_codes::GENERAL_ERROR);
        }
    };

    let json = if args.components {
        serde_json::to_string_pretty(&output.components)?
    } else {
        serde_json::to_string_pretty(&output.metadata)?
    };

    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => println!("{json}"),
    }
    Ok(exit_codes::SUCCESS)
}

// ============================================================
// batch
// ============================================================

/// Per-image entry of `batch_report.json`
#[derive(Debug, Serialize)]
struct ImageReport {
    input: PathBuf,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchReport {
    started_at: String,
    finished_at: String,
    total: usize,
    succeeded: usize,
    failed: usize,
    images: Vec<ImageReport>,
}

struct BarProgress(ProgressBar);

impl BatchProgress for BarProgress {
    fn on_image_done(&self, path: &Path, _ok: bool) {
        self.0.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        self.0.inc(1);
    }
}

fn batch(mut config: PipelineConfig, args: &BatchArgs) -> Result<i32> {
    let started_at = chrono::Utc::now().to_rfc3339();

    if args.cluster {
        config.enable_clustering = true;
    }
    if let Some(jobs) = args.jobs {
        config.jobs = Some(jobs.max(1));
    }
    if let Some(secs) = args.timeout {
        config.image_timeout_secs = Some(secs);
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let names = output_names(&args.inputs);
    let inputs = args
        .inputs
        .iter()
        .zip(&names)
        .map(|(path, name)| batch_input(path, name, args.candidates_dir.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let bar = ProgressBar::new(inputs.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    let progress = BarProgress(bar);

    let segmenter = RuleBasedSegmenter::default();
    let pipeline = ComponentPipeline::new(config, &segmenter);
    let items = pipeline.run_batch(inputs, &CancelToken::new(), &progress)?;
    progress.0.finish_and_clear();

    let mut images = Vec::with_capacity(items.len());
    for (item, name) in items.into_iter().zip(&names) {
        let report = match item.result {
            Ok(output) => {
                let out_path = args.output_dir.join(format!("{name}.json"));
                fs::write(&out_path, metadata_to_json(&output.metadata)?)
                    .with_context(|| format!("Failed to write {}", out_path.display()))?;
                ImageReport {
                    input: item.path,
                    status: "ok",
                    image_id: output.image_id,
                    components: Some(output.components.len()),
                    output: Some(out_path),
                    error: None,
                }
            }
            Err(e) => ImageReport {
                input: item.path,
                status: match e {
                    PipelineError::Cancelled => "cancelled",
                    PipelineError::TimedOut(_) => "timed_out",
                    _ => "failed",
                },
                image_id: None,
                components: None,
                output: None,
                error: Some(e.to_string()),
            },
        };
        images.push(report);
    }

    let succeeded = images.iter().filter(|r| r.status == "ok").count();
    let report = BatchReport {
        started_at,
        finished_at: chrono::Utc::now().to_rfc3339(),
        total: images.len(),
        succeeded,
        failed: images.len() - succeeded,
        images,
    };

    let report_path = args.output_dir.join("batch_report.json");
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    eprintln!(
        "{} of {} images processed, report: {}",
        report.succeeded,
        report.total,
        report_path.display()
    );

    if report.total > 0 && report.succeeded == 0 {
        return Ok(exit_codes::ALL_FAILED);
    }
    Ok(exit_codes::SUCCESS)
}

/// One output name per input: the file stem, suffixed `-1`, `-2`, ... in
/// input order when several inputs share a stem
fn output_names(paths: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = paths.iter().map(|p| file_stem(p)).collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    let mut names = Vec::with_capacity(stems.len());
    for stem in &stems {
        let repeated = stems.iter().filter(|s| *s == stem).count() > 1;
        let mut name = stem.clone();
        if repeated || taken.contains(&name) {
            loop {
                let n = seen.entry(stem.as_str()).or_insert(0);
                *n += 1;
                name = format!("{stem}-{n}");
                if !taken.contains(&name) && !stems.contains(&name) {
                    break;
                }
            }
        }
        taken.insert(name.clone());
        names.push(name);
    }
    names
}

fn batch_input(path: &Path, name: &str, candidates_dir: Option<&Path>) -> Result<BatchInput> {
    let input = BatchInput::new(path);
    let Some(dir) = candidates_dir else {
        return Ok(input);
    };

    let candidates_path = dir.join(format!("{name}.json"));
    if !candidates_path.exists() {
        debug!(path = %candidates_path.display(), "no candidate file, using rule-based segmentation");
        return Ok(input);
    }
    let segmenter = PrecomputedSegmenter::from_json_file(&candidates_path)
        .with_context(|| format!("Failed to read candidates {}", candidates_path.display()))?;
    Ok(input.with_candidates(segmenter.into_candidates()))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
