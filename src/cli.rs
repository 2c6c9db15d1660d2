use crate::engine::{self, EngineClient};
use crate::model::{ExportFormat, InfoEvent, PipelineEvent, RunConfig};
use crate::session::SessionStore;
use crate::viewmodel::{ResultsView, RunSummary};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;

/// Routing for the blocking output writer: summary on stdout, progress on
/// stderr.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Console writes happen on a blocking task so pipeline tasks never stall on
/// a slow terminal.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{msg}");
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{msg}");
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse()
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "datasweep",
    version,
    about = "Drive a remote data-cleaning engine from the terminal"
)]
pub struct Cli {
    /// Dataset to upload (CSV, XLSX, or XLS). Required in --text/--json
    /// modes; in the TUI it is uploaded on launch when given.
    #[arg(value_name = "FILE")]
    pub file: Option<std::path::PathBuf>,

    /// Base URL of the cleaning engine API
    #[arg(
        long,
        env = "DATASWEEP_BASE_URL",
        default_value = "http://localhost:8000/api"
    )]
    pub base_url: String,

    /// Run the full pipeline and print a JSON summary (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Run the full pipeline and print a text summary (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Export format for the cleaned dataset
    #[arg(long, default_value = "csv", value_parser = parse_format)]
    pub format: ExportFormat,

    /// Skip downloading the cleaned dataset in headless modes
    #[arg(long)]
    pub no_download: bool,

    /// Directory for downloaded artifacts (defaults to the platform
    /// download directory)
    #[arg(long)]
    pub output_dir: Option<std::path::PathBuf>,

    /// Per-request timeout for engine calls
    #[arg(long, default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// Row limit when refreshing the cleaned-data preview
    #[arg(long, default_value_t = 100)]
    pub preview_limit: u32,

    /// List every detected issue instead of the compact top five
    #[arg(long)]
    pub all_issues: bool,
}

/// Headless output modes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Text,
    Json,
    Silent,
}

pub async fn run(args: Cli) -> Result<()> {
    // --silent implies machine consumption, so it requires --json.
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent requires --json; pass them together"
        ));
    }

    if args.silent {
        return run_headless(args, OutputMode::Silent).await;
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, OutputMode::Text).await;
        }
    }

    if args.json {
        return run_headless(args, OutputMode::Json).await;
    }

    run_headless(args, OutputMode::Text).await
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        base_url: args.base_url.clone(),
        request_timeout: Duration::from(args.request_timeout),
        user_agent: format!("datasweep-cli/{}", env!("CARGO_PKG_VERSION")),
        export_format: args.format,
        output_dir: args.output_dir.clone(),
        download: !args.no_download,
        preview_limit: args.preview_limit,
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

/// Progress lines for one pipeline event in text mode.
fn progress_lines(ev: &PipelineEvent) -> Vec<String> {
    match ev {
        PipelineEvent::StepStarted { step } => vec![format!("== {} ==", step.label())],
        PipelineEvent::Uploaded { analysis } => vec![format!(
            "Analyzed: {} rows x {} columns, quality {:.1}, {} issue(s)",
            analysis.dataset_info.rows,
            analysis.dataset_info.columns,
            analysis.dataset_info.quality_score.overall,
            analysis.issues.len()
        )],
        PipelineEvent::Configured { operations_count } => {
            vec![format!("Configured {operations_count} automatic operation(s)")]
        }
        PipelineEvent::Cleaned { result } => vec![format!(
            "Cleaned: {} issue(s) resolved in {:.0} ms",
            result.issues_resolved, result.processing_time_ms
        )],
        PipelineEvent::Reported { report } => {
            vec![format!("Report: {} operation(s)", report.operations.len())]
        }
        PipelineEvent::Downloaded { path, bytes } => {
            vec![format!("Saved: {} ({bytes} bytes)", path.display())]
        }
        PipelineEvent::PreviewLoaded { rows, total_rows } => {
            vec![format!("Preview: {} of {} row(s)", rows.len(), total_rows)]
        }
        PipelineEvent::StageChanged { stage } => vec![format!("Stage: {stage}")],
        PipelineEvent::StepFailed { step, message } => {
            vec![format!("{} failed: {message}", step.label())]
        }
        PipelineEvent::Info(info) => vec![info.to_message()],
    }
}

/// Assemble the machine-readable summary of a completed run.
fn build_run_summary(cfg: &RunConfig, run: &engine::PipelineRun) -> RunSummary {
    let results = ResultsView::assemble(
        &run.analysis.dataset_info,
        &run.pass.result,
        &run.pass.report,
    );
    RunSummary {
        timestamp_utc: now_rfc3339(),
        base_url: cfg.base_url.clone(),
        session_id: run.analysis.session_id.clone(),
        dataset: run.analysis.dataset_info.clone(),
        issues_detected: run.analysis.issues.len(),
        issues: run.analysis.issues.clone(),
        results,
        artifact_path: run.artifact.as_ref().map(|a| a.path.clone()),
    }
}

/// Close the output writer and wait for it to flush.
async fn finish_writer(
    tx: Option<mpsc::UnboundedSender<OutputLine>>,
    handle: Option<tokio::task::JoinHandle<()>>,
) {
    drop(tx);
    if let Some(h) = handle {
        let _ = h.await;
    }
}

/// Run the full pipeline once without the TUI.
async fn run_headless(args: Cli, mode: OutputMode) -> Result<()> {
    let file = args
        .file
        .clone()
        .context("a dataset file is required in --text/--json modes")?;
    let cfg = build_config(&args);
    let backend = EngineClient::new(&cfg)?;

    let (out_tx, out_handle) = if mode == OutputMode::Silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let printer = {
        let out = out_tx.clone();
        let text = mode == OutputMode::Text;
        tokio::spawn(async move {
            while let Some(ev) = event_rx.recv().await {
                if text {
                    if let Some(tx) = out.as_ref() {
                        for line in progress_lines(&ev) {
                            let _ = tx.send(OutputLine::Stderr(line));
                        }
                    }
                }
            }
        })
    };

    if mode == OutputMode::Text {
        let _ = event_tx.send(PipelineEvent::Info(InfoEvent::UsingEngine {
            base_url: cfg.base_url.clone(),
        }));
    }

    let mut store = SessionStore::new();
    let outcome = engine::run_full_pipeline(&backend, &mut store, &file, &cfg, &event_tx).await;
    drop(event_tx);
    let _ = printer.await;

    let run = match outcome {
        Ok(run) => run,
        Err(err) => {
            finish_writer(out_tx, out_handle).await;
            return Err(anyhow::Error::new(err).context("cleaning pipeline failed"));
        }
    };

    match mode {
        OutputMode::Json => {
            let summary = build_run_summary(&cfg, &run);
            let out = serde_json::to_string_pretty(&summary)?;
            if let Some(tx) = out_tx.as_ref() {
                let _ = tx.send(OutputLine::Stdout(out));
            }
        }
        OutputMode::Text => {
            let summary = crate::text_summary::build_text_summary(&run, args.all_issues);
            if let Some(tx) = out_tx.as_ref() {
                for line in summary.lines {
                    let _ = tx.send(OutputLine::Stdout(line));
                }
            }
        }
        OutputMode::Silent => {}
    }

    finish_writer(out_tx, out_handle).await;
    Ok(())
}
