use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use opencv::core::Mat;
use tracing_subscriber::EnvFilter;

mod api;
mod capture;
mod classifier;
mod config;
mod preview;
mod session;
mod storage;

use api::{AppState, SharedClassifier};
use capture::{CaptureTarget, FrameSource, ImageSource, SourceError, VideoSource};
use classifier::OnnxClassifier;
use config::Config;
use preview::PreviewWindow;
use session::{
    run_session, CategorySet, Session, SessionError, SessionSummary, TerminationPolicy,
};
use storage::{DominantTally, Evaluation, GroundTruth, SummaryLog, SummarySink};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(
    name = "facetally",
    version,
    about = "Turn per-frame face classification into one session verdict"
)]
struct Cli {
    /// Config file (defaults to ./config.toml when present)
    #[arg(long, short, env = "FACETALLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a single still image
    Photo { path: PathBuf },
    /// Analyze a live capture device for a fixed duration
    Live {
        /// Seconds to run; overrides session.duration_secs
        #[arg(long)]
        duration: Option<u64>,
        /// Capture device index; overrides capture.device
        #[arg(long)]
        device: Option<i32>,
        #[arg(long)]
        no_preview: bool,
    },
    /// Analyze a stored video until it ends
    Video {
        path: PathBuf,
        #[arg(long)]
        no_preview: bool,
    },
    /// Classify every labelled image in a folder and record the known labels
    Batch {
        dir: PathBuf,
        /// CSV with a `Filename` column and an `Actual ...` column
        #[arg(long)]
        labels: PathBuf,
    },
    /// Serve single-image analysis over HTTP (POST /api/analyze takes the raw
    /// image bytes or a multipart form with a `file` field)
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show how often each category was the session verdict
    History,
    /// Score recorded verdicts against their known labels
    Accuracy,
}

enum SourcePlan {
    Capture(CaptureTarget),
    Image(PathBuf),
}

impl SourcePlan {
    fn describe(&self) -> String {
        match self {
            SourcePlan::Capture(target) => target.to_string(),
            SourcePlan::Image(path) => path.display().to_string(),
        }
    }
}

struct SessionPlan {
    source: SourcePlan,
    policy: TerminationPolicy,
    preview: Option<&'static str>,
    hold_preview: bool,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("facetally=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let categories = config.categories()?;
    tracing::info!(categories = ?categories.labels(), "configuration loaded");

    let plan = match cli.command {
        Command::Photo { path } => SessionPlan {
            source: SourcePlan::Image(path),
            policy: TerminationPolicy::ExhaustionOnly,
            preview: config.preview.enabled.then_some("Photo"),
            hold_preview: true,
        },
        Command::Live {
            duration,
            device,
            no_preview,
        } => {
            let secs = duration.unwrap_or(config.session.duration_secs);
            SessionPlan {
                source: SourcePlan::Capture(CaptureTarget::Device(
                    device.unwrap_or(config.capture.device),
                )),
                policy: TerminationPolicy::timed(Duration::from_secs(secs)),
                preview: (config.preview.enabled && !no_preview).then_some("Webcam"),
                hold_preview: false,
            }
        }
        Command::Video { path, no_preview } => SessionPlan {
            source: SourcePlan::Capture(CaptureTarget::File(path)),
            policy: TerminationPolicy::ExhaustionOnly,
            preview: (config.preview.enabled && !no_preview).then_some("Video"),
            hold_preview: false,
        },
        Command::Serve { port } => return serve(config, categories, port).await,
        Command::Batch { dir, labels } => return batch(&config, categories, dir, labels).await,
        Command::History => return history(&config, &categories),
        Command::Accuracy => return accuracy(&config, &categories),
    };

    let source = plan.source.describe();
    let summary = run_analysis(&config, categories.clone(), plan).await?;
    print_report(&source, &summary, &categories);

    if config.results.enabled {
        let log = SummaryLog::new(config.results.path.clone());
        record_summary(&log, &source, None, &summary);
    }

    Ok(())
}

async fn run_analysis(
    config: &Config,
    categories: CategorySet,
    plan: SessionPlan,
) -> Result<SessionSummary, BoxError> {
    let cancel = Arc::new(AtomicBool::new(false));

    let signal_flag = Arc::clone(&cancel);
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let classifier_config = config.classifier.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<SessionSummary, BoxError> {
        let mut classifier = OnnxClassifier::new(&classifier_config)?;
        let summary = match plan.source {
            SourcePlan::Capture(ref target) => {
                let target = target.clone();
                run_blocking(
                    || VideoSource::open(target),
                    &mut classifier,
                    &categories,
                    &plan,
                    &cancel,
                )?
            }
            SourcePlan::Image(ref path) => {
                let path = path.clone();
                run_blocking(
                    || ImageSource::open(path),
                    &mut classifier,
                    &categories,
                    &plan,
                    &cancel,
                )?
            }
        };
        Ok(summary)
    })
    .await;

    signal_handle.abort();
    result?
}

fn run_blocking<S>(
    open: impl FnOnce() -> Result<S, SourceError>,
    classifier: &mut OnnxClassifier,
    categories: &CategorySet,
    plan: &SessionPlan,
    cancel: &Arc<AtomicBool>,
) -> Result<SessionSummary, SessionError>
where
    S: FrameSource<Frame = Mat>,
{
    match plan.preview {
        Some(title) => {
            let mut window = PreviewWindow::new(title, Arc::clone(cancel));
            if plan.hold_preview {
                window = window.hold_last_frame();
            }
            Session::new(categories, plan.policy)
                .with_cancellation(&**cancel)
                .with_observer(&mut window)
                .run(open, classifier)
        }
        None => run_session(
            open,
            classifier,
            categories,
            plan.policy,
            Some(&**cancel),
        ),
    }
}

fn record_summary(
    sink: &dyn SummarySink,
    source: &str,
    actual: Option<&str>,
    summary: &SessionSummary,
) {
    if let Err(e) = sink.record(source, actual, summary) {
        tracing::warn!(error = %e, "failed to record session");
    }
}

fn print_report(source: &str, summary: &SessionSummary, categories: &CategorySet) {
    println!("Analysis of {source}:");
    match &summary.final_dominant {
        Some(dominant) => {
            for label in categories.labels() {
                let average = summary.averages.get(label).copied().unwrap_or(0.0);
                println!("  Average {label}: {average:.2}%");
            }
            println!("  Final dominant: {dominant}");
        }
        None => println!("  No subject detected during the analysis."),
    }
    println!(
        "  Frames: {} seen, {} scored, {} without subject, {} failed",
        summary.frames_seen,
        summary.scored_frame_count,
        summary.no_subject_count,
        summary.error_count
    );
    println!(
        "  Stopped: {} after {:.1}s",
        summary.stop_reason, summary.elapsed_secs
    );
}

async fn serve(config: Config, categories: CategorySet, port: Option<u16>) -> Result<(), BoxError> {
    let classifier_config = config.classifier.clone();
    let classifier =
        tokio::task::spawn_blocking(move || OnnxClassifier::new(&classifier_config)).await??;
    let classifier: SharedClassifier = Arc::new(Mutex::new(classifier));

    let summary_log = config
        .results
        .enabled
        .then(|| SummaryLog::new(config.results.path.clone()));
    let state = AppState::new(classifier, categories, summary_log);
    let port = port.unwrap_or(config.http.port);

    tokio::select! {
        result = api::start_server(state, port, config.http.max_body_bytes) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn history(config: &Config, categories: &CategorySet) -> Result<(), BoxError> {
    let log = SummaryLog::new(config.results.path.clone());
    let records = log.load()?;
    if records.is_empty() {
        println!("No sessions recorded in {}", log.path().display());
        return Ok(());
    }

    let tally = DominantTally::from_records(&records, categories);
    println!("Dominant category over {} session(s):", tally.total());
    for (label, count) in &tally.counts {
        println!("  {label:<12} {count:>5}  {}", "#".repeat(*count as usize));
    }
    println!("  {:<12} {:>5}", "(none)", tally.no_verdict);
    Ok(())
}

async fn batch(
    config: &Config,
    categories: CategorySet,
    dir: PathBuf,
    labels: PathBuf,
) -> Result<(), BoxError> {
    let truth = GroundTruth::load(&labels)?;
    tracing::info!(labels = %labels.display(), count = truth.len(), "ground truth loaded");

    let mut images: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    images.sort();
    if images.is_empty() {
        println!("No images found in {}", dir.display());
        return Ok(());
    }

    let log = config
        .results
        .enabled
        .then(|| SummaryLog::new(config.results.path.clone()));
    let classifier_config = config.classifier.clone();

    tokio::task::spawn_blocking(move || -> Result<(), BoxError> {
        let mut classifier = OnnxClassifier::new(&classifier_config)?;
        for path in &images {
            let actual = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| truth.get(name));
            let Some(actual) = actual else {
                println!("No label for {}, skipping", path.display());
                continue;
            };

            let source = path.display().to_string();
            let summary = match run_session(
                || ImageSource::open(path),
                &mut classifier,
                &categories,
                TerminationPolicy::ExhaustionOnly,
                None,
            ) {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "skipping image");
                    continue;
                }
            };

            print_report(&source, &summary, &categories);
            println!("  Actual: {actual}");
            if let Some(log) = &log {
                record_summary(log, &source, Some(actual), &summary);
            }
        }
        Ok(())
    })
    .await?
}

fn accuracy(config: &Config, categories: &CategorySet) -> Result<(), BoxError> {
    let log = SummaryLog::new(config.results.path.clone());
    let evaluation = Evaluation::from_records(&log.load()?, categories);
    let Some(accuracy) = evaluation.accuracy() else {
        println!("No labelled sessions in {}", log.path().display());
        return Ok(());
    };

    println!(
        "Accuracy: {:.2}% over {} labelled session(s)",
        accuracy * 100.0,
        evaluation.evaluated
    );

    println!("Confusion matrix (rows actual, columns predicted):");
    let mut header = format!("  {:<12}", "");
    for label in &evaluation.labels {
        header.push_str(&format!(" {label:>8}"));
    }
    println!("{header} {:>8}", "(none)");
    for (label, row) in evaluation.labels.iter().zip(&evaluation.confusion) {
        let cells: String = row.iter().map(|n| format!(" {n:>8}")).collect();
        println!("  {label:<12}{cells}");
    }

    let percent = |value: Option<f64>| match value {
        Some(v) => format!("{:.2}", v * 100.0),
        None => "-".to_string(),
    };
    println!(
        "  {:<12} {:>9} {:>9} {:>9} {:>8}",
        "", "precision", "recall", "f1", "support"
    );
    for report in evaluation.class_reports() {
        println!(
            "  {:<12} {:>9} {:>9} {:>9} {:>8}",
            report.label,
            percent(report.precision),
            percent(report.recall),
            percent(report.f1()),
            report.support
        );
    }
    Ok(())
}
