//! CLI binary for ghiblify.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TransformConfig` / `StyleParams`, runs one transformation and writes
//! the result to disk.

use anyhow::{Context, Result};
use clap::Parser;
use ghiblify::output::mime_extension;
use ghiblify::{
    load_image, transform_with_cancel, CancellationToken, PollStatus, Provider, ProgressCallback,
    Stage, StyleParams, TransformConfig, TransformOutput, TransformProgressCallback,
    TransformationRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a single spinner whose prefix follows the
/// transformation stage and whose message shows the latest poll status.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl TransformProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage) {
        let (prefix, msg) = match stage {
            Stage::Preprocessing => ("Preparing", "resizing to 1024×1024…"),
            Stage::Submitting => ("Submitting", "sending to provider…"),
            Stage::Polling => ("Generating", "waiting for the job…"),
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
    }

    fn on_poll(&self, attempt: u32, status: &PollStatus) {
        let label = match status {
            PollStatus::Pending { status } => status.to_lowercase(),
            PollStatus::Complete(_) => "complete".to_string(),
            PollStatus::Failed { status, .. } => status.to_lowercase(),
        };
        self.bar.set_message(format!("check #{attempt}: {label}"));
    }

    fn on_complete(&self, _success: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stability AI (result returned immediately)
  ghiblify --provider stability portrait.jpg

  # Leonardo AI (queued job, polled every 2s for up to 30s)
  ghiblify --provider leonardo portrait.jpg -o spirited.jpg

  # Transform an image from a URL, keep the composition closer to the photo
  ghiblify --strength 0.25 https://example.com/me.png

  # Pin the seed and a style preset for repeatable results
  ghiblify --seed 42 --style-preset anime portrait.jpg

  # JSON summary instead of progress output
  ghiblify --json portrait.jpg > result.json

PROVIDERS:
  Provider     Flow                     Result          Key format
  ─────────    ───────────────────────  ──────────────  ──────────
  stability    multipart, synchronous   PNG bytes       sk-…
  leonardo     JSON job + polling       hosted image    any

ENVIRONMENT VARIABLES:
  STABILITY_API_KEY       Stability AI key (used when --api-key is absent)
  LEONARDO_API_KEY        Leonardo AI key (used when --api-key is absent)
  RUST_LOG                Override log filter (e.g. ghiblify=debug)

Input must be a JPEG, PNG or WebP image of at most 10 MB.
"#;

/// Turn a photo into a Studio Ghibli style illustration.
#[derive(Parser, Debug)]
#[command(
    name = "ghiblify",
    version,
    about = "Turn a photo into a Studio Ghibli style illustration",
    long_about = "Turn a photograph (local file, URL or data URL) into a Studio Ghibli style \
illustration using Stability AI's image-to-image endpoint or Leonardo AI's generation queue.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image path, HTTP/HTTPS URL, or data URL.
    input: String,

    /// Generation service.
    #[arg(long, env = "GHIBLIFY_PROVIDER", value_enum, default_value = "stability")]
    provider: ProviderArg,

    /// API key. Falls back to STABILITY_API_KEY / LEONARDO_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// Write the image here instead of `<input>-ghibli.<ext>`.
    #[arg(short, long, env = "GHIBLIFY_OUTPUT")]
    output: Option<PathBuf>,

    /// Use the built-in negative prompt, or this text instead.
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    negative_prompt: Option<String>,

    /// Stability style preset (e.g. anime, fantasy-art).
    #[arg(long)]
    style_preset: Option<String>,

    /// Fixed seed for repeatable output.
    #[arg(long)]
    seed: Option<u32>,

    /// How much of the source image survives (0.0–1.0).
    #[arg(long, default_value_t = 0.35)]
    strength: f32,

    /// Leonardo "alchemy" high-quality pipeline.
    #[arg(long)]
    alchemy: bool,

    /// Print the result summary as JSON on stdout.
    #[arg(long, env = "GHIBLIFY_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "GHIBLIFY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GHIBLIFY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GHIBLIFY_QUIET")]
    quiet: bool,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "GHIBLIFY_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Give up on a queued job after this many seconds.
    #[arg(long, default_value_t = 30)]
    poll_budget: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProviderArg {
    Stability,
    Leonardo,
}

impl From<ProviderArg> for Provider {
    fn from(v: ProviderArg) -> Self {
        match v {
            ProviderArg::Stability => Provider::Stability,
            ProviderArg::Leonardo => Provider::Leonardo,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep library INFO
    // logs out of its way unless asked for.
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

    let provider: Provider = cli.provider.into();
    let api_key = match cli.api_key.clone() {
        Some(key) => key,
        None => std::env::var(provider.env_var()).with_context(|| {
            format!(
                "No API key: pass --api-key or set {}",
                provider.env_var()
            )
        })?,
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn TransformProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    // First Ctrl-C cancels cleanly; a second one exits immediately.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let loaded = until_cancelled(&cancel, async {
        load_image(&cli.input, &config)
            .await
            .context("Failed to load input image")
    })
    .await?;
    let request = TransformationRequest::new(loaded.bytes, provider, api_key)
        .with_style(build_style(&cli, provider));

    // ── Run transformation ───────────────────────────────────────────────
    let result = transform_with_cancel(request, &config, &cancel).await;
    let output = match result.into_result() {
        Ok(output) => output,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), bold(e.kind().user_message()));
            }
            return Err(e).context(format!("{provider} transformation failed"));
        }
    };

    let (bytes, mime) = until_cancelled(&cancel, async {
        output
            .image
            .fetch(&config)
            .await
            .context("Failed to retrieve generated image")
    })
    .await?;
    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input, mime_extension(&mime)));
    write_atomic(&path, &bytes).await?;

    if cli.json {
        print_json(&output, &path)?;
    } else if !cli.quiet {
        print_summary(&output, &path, bytes.len());
    }

    Ok(())
}

/// Run `work` unless Ctrl-C fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => anyhow::bail!("Cancelled"),
        r = work => r,
    }
}

/// Map CLI args to `TransformConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TransformConfig> {
    let mut builder = TransformConfig::builder()
        .api_timeout_secs(cli.api_timeout)
        .poll_budget_secs(cli.poll_budget);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args onto the provider's default `StyleParams`.
fn build_style(cli: &Cli, provider: Provider) -> StyleParams {
    let mut style = StyleParams::for_provider(provider).image_strength(cli.strength);

    match cli.negative_prompt.as_deref() {
        Some("") => style = style.with_default_negative(),
        Some(text) => style = style.negative_prompt(text, -1.0),
        None => {}
    }
    if let Some(ref preset) = cli.style_preset {
        style = style.style_preset(preset.clone());
    }
    if let Some(seed) = cli.seed {
        style = style.seed(seed);
    }
    if cli.alchemy {
        style = style.alchemy(true);
    }
    style
}

/// `<stem>-ghibli.<ext>` in the current directory.
fn default_output_path(input: &str, ext: &str) -> PathBuf {
    let stem = if input.starts_with("data:") {
        None
    } else {
        Path::new(input.split('?').next().unwrap_or(input))
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
    };
    PathBuf::from(format!("{}-ghibli.{ext}", stem.unwrap_or("image")))
}

/// Write via a temp file in the same directory, then rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to move result to {}", path.display()));
    }
    Ok(())
}

fn print_json(output: &TransformOutput, path: &Path) -> Result<()> {
    let mut value = serde_json::to_value(output).context("Failed to serialise output")?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "output_path".into(),
            serde_json::Value::String(path.display().to_string()),
        );
    }
    let json = serde_json::to_string_pretty(&value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_summary(output: &TransformOutput, path: &Path, size: usize) {
    let stats = &output.stats;
    eprintln!(
        "{}  {}  {}ms  →  {}",
        green("✔"),
        cyan(&output.provider.to_string()),
        stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    let polls = if stats.polls > 0 {
        format!("  /  {} status checks", stats.polls)
    } else {
        String::new()
    };
    eprintln!(
        "   {} → {} bytes upload  /  {} bytes result{}",
        dim(&stats.input_bytes.to_string()),
        dim(&stats.prepared_bytes.to_string()),
        dim(&size.to_string()),
        polls,
    );
}
