//! CLI binary for dwani-client.
//!
//! A thin shim over the library crate that maps CLI flags onto a
//! `ClientConfig`, drives one flow or query, and prints the result.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dwani_client::{
    display_rows, parse_tool_claims, BackoffPolicy, CaptureLibrary, CaptureRecord, CaptureView, ClientConfig,
    DocumentOrchestrator, FetchObserver, FlowSpec, HttpTransport, Language, PdfiumRenderer, Phase,
    PreviewRenderer, ProcessingOutcome, QueryDispatcher, QueryOutcome, SharedObserver, Transport, UploadTarget,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io;
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

// ── Spinner observer ─────────────────────────────────────────────────────────

/// Shows one spinner per fetch and prints a line for every failed attempt.
struct CliFetchObserver {
    bar: ProgressBar,
}

impl CliFetchObserver {
    fn new(label: &str) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix(label.to_string());
        bar.set_message("Connecting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl FetchObserver for CliFetchObserver {
    fn on_attempt_start(&self, _endpoint: &str, attempt: u32, max_attempts: u32) {
        if max_attempts > 1 {
            self.bar.set_message(format!("attempt {attempt}/{max_attempts}"));
        } else {
            self.bar.set_message("waiting for the service…");
        }
    }

    fn on_attempt_failed(&self, _endpoint: &str, attempt: u32, status: Option<u16>, error: &str) {
        let status = status.map(|s| format!("HTTP {s}")).unwrap_or_else(|| "network".into());
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} attempt {}  {}  {}", red("✗"), attempt, status, dim(&msg)));
    }

    fn on_retry_scheduled(&self, _endpoint: &str, next_attempt: u32, delay: Duration) {
        self.bar.set_message(format!(
            "retrying in {:.1}s (attempt {next_attempt})",
            delay.as_secs_f64()
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a PDF
  dwani summarize report.pdf

  # Summarise and translate into Hindi
  dwani summarize-translate report.pdf --target hin_Deva

  # Ask about page 2, answer translated into Kannada
  dwani prompt report.pdf --page 2 --prompt "list the key points"

  # Get a translated Kannada PDF back
  dwani kannada-pdf report.pdf --out-dir ./out

  # List captures, or search them
  dwani captures
  dwani captures --query "which captures need a chainsaw?"

  # Parse tool claims from an AI response
  dwani tools '{"required_tools": [{"tool_name": "Saw"}]}'

  # Page count and page-1 preview (no API key needed)
  dwani inspect report.pdf --preview page1.png

LANGUAGES:
  eng_Latn  English     kan_Knda  Kannada     hin_Deva  Hindi
  tam_Taml  Tamil       tel_Telu  Telugu

ENVIRONMENT VARIABLES:
  DWANI_API_BASE_URL   Service root (default http://localhost:8000)
  DWANI_API_KEY        API key sent as X-API-KEY
  DWANI_MAX_ATTEMPTS   Attempts per document request
  DWANI_BACKOFF_MS     Wait between attempts
  PDFIUM_LIB_PATH      Path to libpdfium (file or directory)
"#;

/// Send PDFs to the dwani document-AI service and search field captures.
#[derive(Parser, Debug)]
#[command(
    name = "dwani",
    version,
    about = "Summarise, query and translate PDFs with the dwani document-AI service",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Service root URL.
    #[arg(long, global = true, env = "DWANI_API_BASE_URL")]
    base_url: Option<String>,

    /// API key.
    #[arg(long, global = true, env = "DWANI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Attempts per document request (1 = no retry).
    #[arg(long, global = true, env = "DWANI_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Milliseconds between attempts.
    #[arg(long, global = true, env = "DWANI_BACKOFF_MS")]
    backoff_ms: Option<u64>,

    /// Double the wait after each failed attempt.
    #[arg(long, global = true)]
    exponential_backoff: bool,

    /// Request timeout in seconds.
    #[arg(long, global = true, env = "DWANI_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Disable the spinner.
    #[arg(long, global = true, env = "DWANI_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DWANI_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarise a PDF.
    Summarize {
        file: PathBuf,
    },

    /// Summarise a PDF and translate the summary.
    SummarizeTranslate {
        file: PathBuf,
        /// Language of the translated summary.
        #[arg(long, default_value = "kan_Knda")]
        target: Language,
    },

    /// Answer a prompt about one page.
    Prompt {
        file: PathBuf,
        #[arg(long, default_value = "list the key points")]
        prompt: String,
        /// 1-indexed page.
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value = "eng_Latn")]
        source: Language,
        #[arg(long, default_value = "kan_Knda")]
        target: Language,
    },

    /// Answer a prompt about one page and save the Kannada PDF returned.
    KannadaPdf {
        file: PathBuf,
        #[arg(long, default_value = "list the points")]
        prompt: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Language of the prompt.
        #[arg(long, default_value = "eng_Latn")]
        source: Language,
        /// Directory for the output PDF.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// List captures, or search them in natural language.
    Captures {
        /// Natural-language question.
        #[arg(long)]
        query: Option<String>,
        /// Table to search.
        #[arg(long)]
        table: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Parse tool claims from an AI response (JSON text).
    Tools {
        response: String,
    },

    /// Show page count and optionally save a page preview as PNG.
    Inspect {
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        preview: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports progress, so library INFO logs stay quiet
    // unless asked for.
    let show_progress = !g.quiet && !g.no_progress && !g.json;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Tools { response } => return print_tools(response, g.json),
        Command::Inspect { file, page, preview } => return inspect(file, *page, preview.as_ref()).await,
        _ => {}
    }

    let config = Arc::new(build_config(g)?);
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(Arc::clone(&config)).context("Failed to build HTTP client")?);

    match cli.command {
        Command::Summarize { file } => {
            let flow = orchestrator(FlowSpec::summarize(), &config, &transport);
            run_flow(flow, file, g).await
        }
        Command::SummarizeTranslate { file, target } => {
            let flow = orchestrator(FlowSpec::summarize_translate(), &config, &transport);
            flow.set_target_language(target);
            run_flow(flow, file, g).await
        }
        Command::Prompt {
            file,
            prompt,
            page,
            source,
            target,
        } => {
            let flow = orchestrator(FlowSpec::custom_prompt(), &config, &transport);
            flow.set_prompt(prompt);
            flow.set_page_number(page);
            flow.set_source_language(source);
            flow.set_target_language(target);
            run_flow(flow, file, g).await
        }
        Command::KannadaPdf {
            file,
            prompt,
            page,
            source,
            out_dir,
        } => {
            let flow = orchestrator(FlowSpec::kannada_pdf(), &config, &transport);
            flow.set_prompt(prompt);
            flow.set_page_number(page);
            flow.set_source_language(source);
            let outcome = run_flow_outcome(flow, file, g).await?;
            let binary = outcome
                .as_binary()
                .context("Service did not return a document")?;
            let path = binary
                .save_output(&out_dir)
                .await
                .context("Failed to save output PDF")?;
            if !g.quiet {
                eprintln!("{}", binary.input_info());
                eprintln!("{}", binary.output_info());
                eprintln!("{} saved {}", green("✔"), bold(&path.display().to_string()));
            }
            Ok(())
        }
        Command::Captures {
            query,
            table,
            skip,
            limit,
        } => captures(&config, &transport, query, table, skip, limit, g).await,
        Command::Tools { .. } | Command::Inspect { .. } => Ok(()),
    }
}

/// Map CLI args onto `ClientConfig`, starting from the environment.
fn build_config(g: &GlobalArgs) -> Result<ClientConfig> {
    let env = ClientConfig::from_env().context("Invalid DWANI_* environment")?;
    let mut builder = ClientConfig::builder()
        .retry(env.retry)
        .request_timeout_secs(g.timeout)
        .base_url(g.base_url.clone().unwrap_or(env.base_url));

    if let Some(key) = g.api_key.clone().or(env.api_key) {
        builder = builder.api_key(key);
    }
    if let Some(n) = g.max_attempts {
        builder = builder.max_attempts(n);
    }
    if let Some(ms) = g.backoff_ms {
        builder = builder.backoff_ms(ms);
    }
    if g.exponential_backoff {
        builder = builder.backoff(BackoffPolicy::Exponential);
    }
    builder.build().context("Invalid configuration")
}

fn orchestrator(flow: FlowSpec, config: &Arc<ClientConfig>, transport: &Arc<dyn Transport>) -> DocumentOrchestrator {
    DocumentOrchestrator::new(
        flow,
        Arc::clone(config),
        Arc::clone(transport),
        Arc::new(PdfiumRenderer::from_config(config)),
    )
}

fn spinner(label: &str, g: &GlobalArgs) -> Option<Arc<CliFetchObserver>> {
    (!g.quiet && !g.no_progress && !g.json).then(|| CliFetchObserver::new(label))
}

async fn run_flow(flow: DocumentOrchestrator, file: PathBuf, g: &GlobalArgs) -> Result<()> {
    let outcome = run_flow_outcome(flow, file, g).await?;
    let text = outcome.text();

    if g.json {
        println!(
            "{}",
            serde_json::to_string_pretty(text).context("Failed to serialise result")?
        );
        return Ok(());
    }

    if let Some(ref original) = text.original_text {
        println!("{}\n{}\n", bold("Original text"), original.trim_end());
    }
    if let Some(ref answer) = text.primary_answer {
        println!("{}\n{}\n", bold("Answer"), answer.trim_end());
    }
    if let Some(ref translated) = text.translated_answer {
        println!("{}\n{}\n", bold("Translated"), translated.trim_end());
    }
    if let Some(page) = text.processed_page {
        println!("{}", dim(&format!("processed page {page}")));
    }
    Ok(())
}

async fn run_flow_outcome(
    flow: DocumentOrchestrator,
    file: PathBuf,
    g: &GlobalArgs,
) -> Result<Arc<ProcessingOutcome>> {
    let target = UploadTarget::from_path(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let observer = spinner(&flow.flow().kind.to_string(), g);
    let flow = match observer.clone() {
        Some(o) => flow.with_observer(o as SharedObserver),
        None => flow,
    };

    flow.select_file(target)?;
    if !g.quiet && !g.json {
        if let Some(preview) = flow.load_input_preview().await {
            eprintln!("{}", dim(&format!("input page 1: {}x{} px", preview.width, preview.height)));
        }
    }
    flow.submit()?.wait().await;
    if let Some(o) = observer {
        o.finish();
    }

    let state = flow.snapshot();
    match (state.phase, state.outcome, state.error) {
        (Phase::Succeeded, Some(outcome), _) => {
            if !g.quiet && !g.json {
                eprintln!("{} {}", green("✔"), bold(state.file_name.as_deref().unwrap_or("done")));
            }
            Ok(outcome)
        }
        (_, _, Some(error)) => bail!(error),
        (phase, _, None) => bail!("request ended in unexpected state {phase:?}"),
    }
}

async fn captures(
    config: &Arc<ClientConfig>,
    transport: &Arc<dyn Transport>,
    query: Option<String>,
    table: Option<String>,
    skip: u32,
    limit: u32,
    g: &GlobalArgs,
) -> Result<()> {
    let outcome = if let Some(text) = query {
        let observer = spinner("Query", g);
        let mut dispatcher = QueryDispatcher::new(Arc::clone(config), Arc::clone(transport));
        if let Some(ref o) = observer {
            dispatcher = dispatcher.with_observer(o.clone() as SharedObserver);
        }
        let table = table.unwrap_or_else(|| config.captures_table.clone());
        let result = dispatcher.run_query(&text, &table).await;
        if let Some(ref o) = observer {
            o.finish();
        }
        result.context("Error executing query")?
    } else {
        QueryOutcome::default()
    };

    let all: Vec<CaptureRecord> = if outcome.rows.captures().is_empty() && outcome.rows.scalars().is_empty() {
        let observer = spinner("Captures", g);
        let mut library = CaptureLibrary::new(Arc::clone(config), Arc::clone(transport));
        if let Some(ref o) = observer {
            library = library.with_observer(o.clone() as SharedObserver);
        }
        let result = library.load_page(skip, limit).await;
        if let Some(ref o) = observer {
            o.finish();
        }
        result.context("Failed to load captures")?;
        library.captures().as_ref().clone()
    } else {
        Vec::new()
    };

    if g.json {
        let view = match display_rows(&all, &outcome) {
            CaptureView::Grid(rows) => serde_json::to_value(rows)?,
            CaptureView::List(rows) => serde_json::to_value(rows)?,
            CaptureView::Empty => Value::Array(Vec::new()),
        };
        let body = serde_json::json!({ "summary": outcome.summary, "rows": view });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if let Some(ref summary) = outcome.summary {
        println!("{}\n{}\n", bold("Answer"), summary);
    }
    match display_rows(&all, &outcome) {
        CaptureView::Grid(rows) => {
            for record in rows {
                let location = record
                    .coordinates()
                    .map(|(lat, lon)| format!("{lat:.4}, {lon:.4}"))
                    .unwrap_or_else(|| "—".into());
                println!(
                    "#{:<5} {:<40}  {}  {}",
                    record.id,
                    record.query_text.as_deref().unwrap_or("—"),
                    dim(&location),
                    record.tool_claims().summary_label(),
                );
            }
        }
        CaptureView::List(rows) => {
            for row in rows {
                match row.query_text {
                    Some(ref text) => println!("• {text}"),
                    None => println!("• {}", Value::Object(row.fields.clone())),
                }
            }
        }
        CaptureView::Empty => println!("{}", dim("No captures found.")),
    }
    Ok(())
}

fn print_tools(response: &str, json: bool) -> Result<()> {
    let claims = parse_tool_claims(&Value::String(response.to_string()));
    if json {
        println!("{}", serde_json::to_string_pretty(&claims)?);
        return Ok(());
    }
    println!("{}", bold(&claims.summary_label()));
    for claim in &claims.claims {
        println!("  • {}  {}  [{}]", claim.name, dim(&claim.purpose), claim.priority);
    }
    Ok(())
}

async fn inspect(file: &Path, page: usize, preview: Option<&PathBuf>) -> Result<()> {
    let target = UploadTarget::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    target.validate()?;

    let renderer = PdfiumRenderer::default();
    let pages = renderer
        .page_count(target.shared_bytes())
        .await
        .context("Failed to inspect PDF")?;
    println!("File:   {}", file.display());
    println!("Pages:  {pages}");

    if let Some(out) = preview {
        let image = renderer
            .render_page(target.shared_bytes(), page)
            .await
            .with_context(|| format!("Failed to render page {page}"))?;
        tokio::fs::write(out, &image.png)
            .await
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!("Preview: {} ({}x{} px)", out.display(), image.width, image.height);
    }
    if pages == 0 {
        bail!("{} has no pages", file.display());
    }
    Ok(())
}
