//! CLI binary for edgequake-docbatch.
//!
//! A thin shim over the library crate: resolves the inputs, submits them as
//! one batch, starts it and follows the task until it finishes.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docbatch::input::{expand_inputs, resolve_upload};
use edgequake_docbatch::{BatchConfig, TaskId, TaskSnapshot, TaskStatus, TaskSupervisor};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Correct and translate two letters (Latin → Dutch)
  docbatch letter_01.docx letter_02.docx

  # A whole directory, into English
  docbatch --target-language English transcriptions/

  # No API key: placeholder output, useful to check the pipeline
  docbatch --offline notes.txt

  # Input from a URL, machine-readable result
  docbatch --json https://example.org/letters/ep_12.txt > status.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID

OUTPUT:
  One processed_<name>_<id>.md per input in --output-dir, each a table of
  the corrected source next to its translation. With two or more successful
  inputs, compiled_<id>.md collects all tables behind a table of contents.
"#;

/// Correct and translate batches of historical documents with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docbatch",
    version,
    about = "Correct and translate batches of historical documents with an LLM",
    long_about = "Correct transcription errors in historical documents (.docx, .txt, .md) and \
translate them, writing one side-by-side Markdown document per input plus a compiled document. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local files, directories or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// LLM model ID (e.g. gpt-4o, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Language of the input documents.
    #[arg(long, env = "DOCBATCH_SOURCE_LANGUAGE", default_value = "Latin")]
    source_language: String,

    /// Language to translate into.
    #[arg(long, env = "DOCBATCH_TARGET_LANGUAGE", default_value = "Dutch")]
    target_language: String,

    /// Where uploaded inputs are stored.
    #[arg(long, env = "DOCBATCH_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Where rendered and compiled documents are written.
    #[arg(short, long, env = "DOCBATCH_OUTPUT_DIR", default_value = "processed")]
    output_dir: PathBuf,

    /// Attempts per model call, including the first.
    #[arg(long, env = "DOCBATCH_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "DOCBATCH_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCBATCH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Use placeholder output instead of calling a model.
    #[arg(long, env = "DOCBATCH_OFFLINE")]
    offline: bool,

    /// Print the final task snapshot as JSON.
    #[arg(long, env = "DOCBATCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCBATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCBATCH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the task message; library INFO logs would
    // only interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build supervisor ─────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let supervisor = TaskSupervisor::from_config(config).context("Failed to set up pipeline")?;

    // ── Submit ───────────────────────────────────────────────────────────
    let inputs = expand_inputs(&cli.inputs).context("Failed to list inputs")?;
    let mut uploads = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let upload = resolve_upload(input, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to read input '{input}'"))?;
        uploads.push(upload);
    }

    let id = supervisor
        .submit_batch(uploads)
        .await
        .context("Batch rejected")?;
    supervisor
        .start_processing(&id)
        .context("Failed to start processing")?;

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Task {id}: {} file(s) submitted", inputs.len()))
        );
    }

    // ── Follow ───────────────────────────────────────────────────────────
    let snapshot = if show_progress {
        follow_with_bar(&supervisor, &id).await?
    } else {
        supervisor
            .wait_for_terminal(&id, Duration::from_millis(250))
            .await
            .context("Lost track of task")?
    };

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("Failed to serialise snapshot")?
        );
    } else if !cli.quiet {
        print_summary(&snapshot);
    }

    if snapshot.status == TaskStatus::Error {
        anyhow::bail!("{}", snapshot.message);
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .source_language(&cli.source_language)
        .target_language(&cli.target_language)
        .upload_dir(&cli.upload_dir)
        .output_dir(&cli.output_dir)
        .max_attempts(cli.max_attempts)
        .api_timeout_secs(cli.api_timeout)
        .offline(cli.offline);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }

    builder.build().context("Invalid configuration")
}

/// Poll the task and mirror `progress` / `message` on a progress bar.
async fn follow_with_bar(supervisor: &TaskSupervisor, id: &TaskId) -> Result<TaskSnapshot> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Processing");
    bar.enable_steady_tick(Duration::from_millis(80));

    loop {
        let snap = supervisor.get_status(id).context("Lost track of task")?;
        bar.set_position(u64::from(snap.progress));
        bar.set_message(snap.message.clone());
        if snap.is_terminal() {
            bar.finish_and_clear();
            return Ok(snap);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn print_summary(snapshot: &TaskSnapshot) {
    for result in &snapshot.results {
        match (result.artifact(), result.error_detail()) {
            (Some(artifact), _) => eprintln!(
                "  {} {:<32} {}",
                green("✓"),
                result.original_name,
                dim(&artifact.path.display().to_string())
            ),
            (None, Some(detail)) => eprintln!(
                "  {} {:<32} {}",
                red("✗"),
                result.original_name,
                red(detail)
            ),
            (None, None) => {}
        }
    }

    let produced = snapshot.succeeded_items();
    match snapshot.status {
        TaskStatus::Completed => eprintln!(
            "{} {}/{} documents processed",
            if produced == snapshot.item_count {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&produced.to_string()),
            snapshot.item_count
        ),
        _ => eprintln!("{} {}", red("✘"), snapshot.message),
    }
    if let Some(ref compiled) = snapshot.compiled {
        eprintln!(
            "   compiled  →  {}",
            bold(&compiled.path.display().to_string())
        );
    }
}
