//! CLI binary for docchat.
//!
//! An interactive terminal chat: type a message to send it, `/upload` a PDF or
//! image to attach its text to the next message. With `-m` it sends a single
//! message and exits.

use anyhow::{Context, Result};
use clap::Parser;
use docchat::view::{self, Style, TYPING_INDICATOR};
use docchat::{
    ChatConfig, ChatObserver, Message, Orchestrator, PendingFile, RequestState, Role, SendOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner while a file is processed or a reply is
/// awaited, assistant replies on stdout, the error line in red on stderr.
struct CliObserver {
    spinner: Mutex<Option<ProgressBar>>,
    show_progress: bool,
}

impl CliObserver {
    fn new(show_progress: bool) -> Arc<Self> {
        Arc::new(Self {
            spinner: Mutex::new(None),
            show_progress,
        })
    }

    fn start_spinner(&self, message: &str) {
        let mut slot = self.spinner.lock().unwrap();
        if let Some(bar) = slot.as_ref() {
            bar.set_message(message.to_string());
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        *slot = Some(bar);
    }

    fn stop_spinner(&self) {
        if let Some(bar) = self.spinner.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

impl ChatObserver for CliObserver {
    fn on_message_appended(&self, _index: usize, message: &Message) {
        match message.role {
            Role::Assistant => {
                self.stop_spinner();
                println!("{}\n", view::render_message(message, Style::Ansi));
            }
            // The user typed the content; only echo what they cannot see.
            _ => {
                if let Some(attachment) = &message.attachment {
                    for line in view::attachment_lines(attachment) {
                        eprintln!("{}", dim(&line));
                    }
                }
            }
        }
    }

    fn on_request_state_changed(&self, state: RequestState) {
        if !self.show_progress {
            return;
        }
        if state.is_sending_message {
            self.start_spinner(TYPING_INDICATOR);
        } else if state.is_ingesting_file {
            self.start_spinner("Processing file…");
        } else {
            self.stop_spinner();
        }
    }

    fn on_file_staged(&self, file: &PendingFile) {
        self.stop_spinner();
        eprintln!("{} {}", green("✓"), view::render_pending_file(file));
    }

    fn on_error_changed(&self, error: Option<&str>) {
        if let Some(e) = error {
            self.stop_spinner();
            eprintln!("{} {}", red("✗"), red(e));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Interactive chat
  docchat

  # Ask about a document and exit
  docchat --file contract.pdf -m "Summarise the termination clause"

  # OCR a scanned page, then chat about it
  docchat --file scan.png

  # Use any edgequake-llm provider instead of Groq
  docchat --provider openai --model gpt-4.1-mini

  # Dump the transcript as JSON
  docchat -m "Hello" --json

CHAT COMMANDS:
  /upload <path|url>   Extract text from a PDF or image and attach it
  /clear               Drop the attached file
  /history             Print the conversation so far
  /help                Show the command list
  /quit                Leave

ENVIRONMENT VARIABLES:
  GROQ_API_KEY            Groq API key (required for the default backend)
  DOCCHAT_MODEL           Chat model ID (default llama-3.3-70b-versatile)
  DOCCHAT_BASE_URL        OpenAI-compatible base URL (default Groq)
  OPENAI_API_KEY          Used for image OCR when no OCR provider is named
  EDGEQUAKE_LLM_PROVIDER  OCR provider override
  EDGEQUAKE_MODEL         OCR model override
  PDFIUM_LIB_PATH         Path to libpdfium for PDF uploads
"#;

const CHAT_HELP: &str = "/upload <path|url>  attach a PDF or image\n\
/clear              drop the attached file\n\
/history            print the conversation\n\
/help               this list\n\
/quit               leave";

/// Chat about your documents with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docchat",
    version,
    about = "Chat about PDFs and images with an LLM",
    long_about = "Interactive chat with an OpenAI-compatible completion API (Groq by default). \
Uploaded PDFs are read from their text layer and images are OCR'd by a vision model; the \
extracted text is attached to your next message.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Chat model ID.
    #[arg(long, env = "DOCCHAT_MODEL")]
    model: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, …) instead of the Groq HTTP API.
    #[arg(long, env = "DOCCHAT_PROVIDER")]
    provider: Option<String>,

    /// API key for the HTTP backend.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL for the HTTP backend.
    #[arg(long, env = "DOCCHAT_BASE_URL")]
    base_url: Option<String>,

    /// Vision provider used for image OCR.
    #[arg(long, env = "DOCCHAT_OCR_PROVIDER")]
    ocr_provider: Option<String>,

    /// Vision model used for image OCR.
    #[arg(long, env = "DOCCHAT_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Attach this file (path or URL) before the first message.
    #[arg(short, long)]
    file: Option<String>,

    /// Send this message, print the reply, and exit.
    #[arg(short, long)]
    message: Option<String>,

    /// Print the transcript as JSON on exit instead of chatting on the terminal.
    #[arg(long)]
    json: bool,

    /// Disable spinners.
    #[arg(long, env = "DOCCHAT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCCHAT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCCHAT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds for URL uploads.
    #[arg(long, env = "DOCCHAT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Completion call timeout in seconds.
    #[arg(long, env = "DOCCHAT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out of
    // its way unless asked for.
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

    let observer = (!cli.json).then(|| CliObserver::new(show_progress));
    let config = build_config(&cli, observer.clone())?;
    let mut chat = Orchestrator::new(config).context("Failed to start chat")?;

    if let Some(ref input) = cli.file {
        let upload = chat
            .load_upload(input)
            .await
            .with_context(|| format!("Failed to load '{input}'"))?;
        chat.ingest_file(upload)
            .await
            .with_context(|| format!("Failed to process '{input}'"))?;
    }

    if let Some(ref text) = cli.message {
        let outcome = chat.send_message(text.as_str()).await?;
        if cli.json {
            print_json(&chat)?;
        }
        if let SendOutcome::Failed { error, .. } = outcome {
            anyhow::bail!("Completion request failed: {error}");
        }
        return Ok(());
    }

    if cli.json {
        anyhow::bail!("--json needs a message (-m) to send");
    }

    repl(&mut chat, cli.quiet).await
}

/// Read lines from stdin until EOF or `/quit`.
async fn repl(chat: &mut Orchestrator, quiet: bool) -> Result<()> {
    if !quiet {
        eprintln!(
            "{} {}  {}",
            cyan("◆"),
            chat.model(),
            dim("type a message, /help for commands")
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", cyan(">"));
        io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim_end();

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => eprintln!("{CHAT_HELP}"),
            ("/clear", _) => {
                chat.clear_file();
                eprintln!("{}", dim("Attachment cleared."));
            }
            ("/history", _) => {
                println!("{}\n", view::render_transcript(chat.transcript(), Style::Ansi));
            }
            ("/upload", "") => eprintln!("{}", red("Usage: /upload <path|url>")),
            ("/upload", target) => match chat.load_upload(target).await {
                // Ingestion failures are shown through the observer's error line.
                Ok(upload) => {
                    let _ = chat.ingest_file(upload).await;
                }
                Err(e) => eprintln!("{} {}", red("✗"), red(&e.to_string())),
            },
            _ => {
                chat.send_message(line).await?;
            }
        }
    }
    Ok(())
}

fn print_json(chat: &Orchestrator) -> Result<()> {
    let out = json!({
        "model": chat.model(),
        "transcript": chat.transcript(),
        "request_state": chat.request_state(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&out).context("Failed to serialise transcript")?
    );
    Ok(())
}

/// Map CLI args to `ChatConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<ChatConfig> {
    let mut builder = ChatConfig::builder()
        .from_env()
        .request_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.as_str());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref provider) = cli.ocr_provider {
        builder = builder.ocr_provider_name(provider.as_str());
    }
    if let Some(ref model) = cli.ocr_model {
        builder = builder.ocr_model(model.as_str());
    }
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }

    builder.build().context("Invalid configuration")
}
