//! CLI binary for cv-reformatter.
//!
//! A thin shim over the library crate: loads the files into a session,
//! reports their previews, submits, and writes the reformatted CV.

use anyhow::{Context, Result};
use clap::Parser;
use cv_reformatter::{
    export, PreviewArtifact, PreviewError, PreviewState, ReformatSession, ReformatterConfig,
    SessionEvents, SlotName, SlotsSnapshot, SubmitError, WizardStep,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI event sink using indicatif ───────────────────────────────────────────

/// Prints one line per finished preview above a spinner.
struct CliEvents {
    bar: ProgressBar,
}

impl CliEvents {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Previews");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SessionEvents for CliEvents {
    fn on_preview_start(&self, slot: SlotName, _generation: u64, file_name: &str) {
        self.bar.set_message(format!("{slot}: {file_name}"));
    }

    fn on_preview_ready(&self, slot: SlotName, _generation: u64, artifact: &PreviewArtifact) {
        self.bar.println(format!(
            "  {} {:<9} {}",
            green("✓"),
            slot.as_str(),
            dim(&artifact.summary())
        ));
    }

    fn on_preview_failed(&self, slot: SlotName, _generation: u64, error: &PreviewError) {
        self.bar
            .println(format!("  {} {:<9} {}", red("✗"), slot.as_str(), red(&error.to_string())));
    }

    fn on_submission_start(&self) {
        self.bar.set_prefix("Reformatting");
        self.bar.set_message("waiting for the service…");
    }

    fn on_submission_complete(&self, text_len: usize) {
        self.bar.finish_and_clear();
        eprintln!("{} reformatted CV received ({} bytes)", green("✔"), bold(&text_len.to_string()));
    }

    fn on_submission_failed(&self, error: &SubmitError) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(&error.to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Reformat a CV against a template (result on stdout)
  cvreformat --cv jane_doe.pdf --template company.docx

  # With a worked example, saved to a file
  cvreformat --cv jane_doe.pdf --template company.docx --example sample.pptx -o jane.md

  # Only render previews into a directory
  cvreformat --cv jane_doe.pdf --template company.docx --preview-only --preview-dir previews/

  # JSON report (slots, previews, step, result)
  cvreformat --cv jane_doe.pdf --template company.docx --json > report.json

SUPPORTED FILES:
  PDF (.pdf)                first page rendered to PNG (needs libpdfium)
  Word document (.docx)     first ~500 characters as HTML
  Presentation (.pptx)      first slide rendered to PNG

ENVIRONMENT VARIABLES:
  CVREFORMAT_ENDPOINT       Reformat service URL
  CVREFORMAT_PDFIUM_LIB     Directory or file of an existing libpdfium
  RUST_LOG                  Overrides the log filter
"#;

/// Reformat a CV into the shape of a template via the reformat service.
#[derive(Parser, Debug)]
#[command(
    name = "cvreformat",
    version,
    about = "Reformat a CV to match a template, with document previews",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// The CV to reformat (PDF, DOCX or PPTX).
    #[arg(long)]
    cv: Option<PathBuf>,

    /// The template whose structure the result should follow.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Optional worked example of a reformatted CV.
    #[arg(long)]
    example: Option<PathBuf>,

    /// Write the result to this file (or directory) instead of stdout.
    #[arg(short, long, env = "CVREFORMAT_OUTPUT")]
    output: Option<PathBuf>,

    /// Reformat service URL.
    #[arg(long, env = "CVREFORMAT_ENDPOINT", default_value = cv_reformatter::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Request timeout in seconds.
    #[arg(long, env = "CVREFORMAT_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Preview width in pixels (32–2000).
    #[arg(long, env = "CVREFORMAT_PREVIEW_WIDTH", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(32..=2000))]
    preview_width: u32,

    /// Character budget of Word-document excerpts.
    #[arg(long, env = "CVREFORMAT_EXCERPT_CHARS", default_value_t = 500)]
    excerpt_chars: usize,

    /// Directory or file of the pdfium library.
    #[arg(long, env = "CVREFORMAT_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Write each slot's preview (PNG or HTML) into this directory.
    #[arg(long, env = "CVREFORMAT_PREVIEW_DIR")]
    preview_dir: Option<PathBuf>,

    /// Stop after the previews; do not submit.
    #[arg(long)]
    preview_only: bool,

    /// Print a JSON report instead of the bare result.
    #[arg(long, env = "CVREFORMAT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CVREFORMAT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CVREFORMAT_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct SlotReport {
    slot: SlotName,
    file: Option<String>,
    media_type: Option<String>,
    preview: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<PreviewError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report {
    step: WizardStep,
    step_label: &'static str,
    slots: Vec<SlotReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reformatted_cv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; library INFO logs
    // would only interleave with it.
    let show_progress = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let events = show_progress.then(CliEvents::new);
    let config = build_config(&cli, events.clone())?;
    let session = ReformatSession::new(&config).context("Failed to start session")?;

    // ── Load files ───────────────────────────────────────────────────────
    for (slot, path) in [
        (SlotName::Cv, &cli.cv),
        (SlotName::Template, &cli.template),
        (SlotName::Example, &cli.example),
    ] {
        if let Some(path) = path {
            session
                .add_path(slot, path)
                .await
                .with_context(|| format!("Failed to load {slot} file {}", path.display()))?;
        }
    }

    // ── Previews ─────────────────────────────────────────────────────────
    let slots = session.previews_settled().await;
    let mut reports = slot_reports(&slots);
    if let Some(ref dir) = cli.preview_dir {
        write_previews(dir, &slots, &mut reports)?;
    }

    if cli.preview_only {
        if let Some(ref ev) = events {
            ev.bar.finish_and_clear();
        }
        if cli.json {
            print_report(&session, reports, None, None)?;
        } else if !cli.quiet {
            eprintln!("{} step: {}", bold("◆"), session.step());
        }
        return Ok(());
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let outcome = session.submit().await;
    if let Some(ref ev) = events {
        ev.bar.finish_and_clear();
    }

    let document = match outcome {
        Ok(doc) => doc,
        Err(e) => {
            if cli.json {
                print_report(&session, reports, None, Some(e.to_string()))?;
            }
            if let SubmitError::IncompleteInput { .. } = e {
                anyhow::bail!("{e}\nUse --cv and --template to select the required files.");
            }
            return Err(e).context(format!("Reformatting failed at step '{}'", session.step()));
        }
    };

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref target) = cli.output {
        let path = export::export_path(target);
        document
            .save_to(&path)
            .with_context(|| format!("Failed to save result to {}", path.display()))?;
        if !cli.quiet && !cli.json {
            eprintln!("{} saved → {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if cli.json {
        print_report(&session, reports, Some(document.as_str().to_string()), None)?;
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(document.as_str().as_bytes())
            .context("Failed to write to stdout")?;
        if !document.as_str().ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

/// Map CLI args to `ReformatterConfig`.
fn build_config(cli: &Cli, events: Option<Arc<CliEvents>>) -> Result<ReformatterConfig> {
    let mut builder = ReformatterConfig::builder()
        .endpoint(cli.endpoint.clone())
        .request_timeout_secs(cli.timeout)
        .preview_width(cli.preview_width)
        .excerpt_chars(cli.excerpt_chars);

    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(ev) = events {
        builder = builder.events(ev as Arc<dyn SessionEvents>);
    }

    builder.build().context("Invalid configuration")
}

fn slot_reports(slots: &SlotsSnapshot) -> Vec<SlotReport> {
    slots
        .iter()
        .map(|(slot, view)| {
            let (summary, error) = match &view.preview {
                PreviewState::Ready(a) => (Some(a.summary()), None),
                PreviewState::Failed(e) => (None, Some(e.clone())),
                PreviewState::Absent | PreviewState::Loading => (None, None),
            };
            SlotReport {
                slot,
                file: view.payload.as_ref().map(|p| p.name.clone()),
                media_type: view.payload.as_ref().map(|p| p.media_type.clone()),
                preview: view.preview.label(),
                summary,
                error,
                preview_file: None,
            }
        })
        .collect()
}

/// Write ready previews as `<slot>.png` / `<slot>.html`.
fn write_previews(dir: &Path, slots: &SlotsSnapshot, reports: &mut [SlotReport]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create preview directory {}", dir.display()))?;

    for ((slot, view), report) in slots.iter().zip(reports.iter_mut()) {
        if let PreviewState::Ready(ref artifact) = view.preview {
            let path = dir.join(format!("{}.{}", slot.as_str(), artifact.file_extension()));
            std::fs::write(&path, artifact.as_bytes())
                .with_context(|| format!("Failed to write preview {}", path.display()))?;
            report.preview_file = Some(path);
        }
    }
    Ok(())
}

fn print_report(
    session: &ReformatSession,
    slots: Vec<SlotReport>,
    reformatted_cv: Option<String>,
    error: Option<String>,
) -> Result<()> {
    let step = session.step();
    let report = Report {
        step,
        step_label: step.label(),
        slots,
        reformatted_cv,
        error,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialise report")?
    );
    Ok(())
}
