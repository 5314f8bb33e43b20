//! clipsync: encrypted clipboard and file exchange with a companion desktop
//!
//! Local commands:
//!   encrypt [TEXT]            - encrypt text to a base64 envelope
//!   decrypt [ENCODED]         - decrypt a base64 envelope back to text
//!   seal <in> <out>           - stream-encrypt a file
//!   open <in> <out>           - stream-decrypt a file
//!   config show               - display current configuration
//!
//! Companion server commands:
//!   push [TEXT]               - send encrypted clipboard text
//!   pull                      - fetch and decrypt the server's clipboard
//!   upload <file>             - stream an encrypted file to the server
//!   download <name>           - fetch and decrypt a file from the server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clipsync_client::CompanionClient;
use clipsync_core::config::expand_tilde;
use clipsync_core::ClipsyncConfig;
use clipsync_crypto::{
    decrypt_stream, decrypt_text, encrypt_stream, encrypt_text, Base64DecodeReader,
    Base64EncodeWriter, CryptoError, ProgressFn, ProgressReader,
};

/// What users see for any padding, alignment or UTF-8 failure
const DECRYPT_FAILED_MSG: &str = "wrong password or corrupted data";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "clipsync",
    version,
    about = "Encrypted clipboard sync client",
    long_about = "clipsync: encrypt clipboard text and files with a shared password and \
                  exchange them with a companion desktop server"
)]
struct Cli {
    /// Path to clipsync.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CLIPSYNC_CONFIG",
        default_value = "~/.config/clipsync/clipsync.toml"
    )]
    config: PathBuf,

    /// Shared password (prompted for when not given)
    #[arg(long, env = "CLIPSYNC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level or filter directive (overrides [logging] level; RUST_LOG wins over both)
    #[arg(long)]
    log: Option<String>,

    /// Log format: text or json (overrides [logging] format)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt text into a base64 envelope (reads stdin when TEXT is omitted)
    Encrypt { text: Option<String> },

    /// Decrypt a base64 envelope (reads stdin when ENCODED is omitted)
    Decrypt { encoded: Option<String> },

    /// Stream-encrypt a local file
    Seal {
        input: PathBuf,
        output: PathBuf,
        /// Write the envelope base64-encoded instead of raw
        #[arg(long)]
        base64: bool,
    },

    /// Stream-decrypt a local file
    Open {
        input: PathBuf,
        output: PathBuf,
        /// Input envelope is base64-encoded
        #[arg(long)]
        base64: bool,
    },

    // ── Companion server ───────────────────────────────────────────────────────

    /// Send clipboard text to the companion server (reads stdin when TEXT is omitted)
    Push { text: Option<String> },

    /// Fetch and decrypt the companion server's clipboard
    Pull,

    /// Stream an encrypted file to the companion server
    Upload {
        file: PathBuf,
        /// Remote name (default: the file's name)
        #[arg(long, short = 'n')]
        name: Option<String>,
    },

    /// Download and decrypt a file from the companion server
    Download {
        name: String,
        /// Local destination (default: [transfer] download_dir + NAME)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    init_logging(level, format);

    let password = cli.password;
    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
        Commands::Encrypt { text } => cmd_encrypt(text, &read_password(password)?),
        Commands::Decrypt { encoded } => cmd_decrypt(encoded, &read_password(password)?),
        Commands::Seal { input, output, base64 } => {
            let password = read_password(password)?;
            let buffer_size = config.crypto.buffer_size;
            tokio::task::spawn_blocking(move || {
                cmd_seal(&input, &output, base64, &password, buffer_size)
            })
            .await?
        }
        Commands::Open { input, output, base64 } => {
            let password = read_password(password)?;
            let buffer_size = config.crypto.buffer_size;
            tokio::task::spawn_blocking(move || {
                cmd_open(&input, &output, base64, &password, buffer_size)
            })
            .await?
        }
        Commands::Push { text } => cmd_push(&config, text, read_password(password)?).await,
        Commands::Pull => cmd_pull(&config, read_password(password)?).await,
        Commands::Upload { file, name } => {
            cmd_upload(&config, &file, name.as_deref(), read_password(password)?).await
        }
        Commands::Download { name, output } => {
            cmd_download(&config, &name, output.as_deref(), read_password(password)?).await
        }
    }
}

// ── Config + logging ──────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ClipsyncConfig> {
    ClipsyncConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Input helpers ─────────────────────────────────────────────────────────────

/// `--password` / CLIPSYNC_PASSWORD, else an interactive prompt
fn read_password(given: Option<String>) -> Result<SecretString> {
    match given {
        Some(p) => Ok(SecretString::from(p)),
        None => {
            let p = rpassword::prompt_password("clipsync password: ")
                .context("reading password from terminal")?;
            Ok(SecretString::from(p))
        }
    }
}

/// The argument if given, else all of stdin minus one trailing newline
fn arg_or_stdin(arg: Option<String>) -> Result<String> {
    if let Some(s) = arg {
        return Ok(s);
    }
    let mut s = std::io::read_to_string(std::io::stdin()).context("reading stdin")?;
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    Ok(s)
}

/// Replace padding/alignment failures with the user-facing message.
fn user_facing(e: CryptoError) -> anyhow::Error {
    if e.is_decryption_failure() {
        anyhow::anyhow!(DECRYPT_FAILED_MSG)
    } else {
        anyhow::Error::new(e)
    }
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(1000);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Feed cipher progress fractions into a bar
fn progress_callback(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |fraction| pb.set_position((fraction * 1000.0) as u64))
}

// ── Output helpers ────────────────────────────────────────────────────────────

/// Run `write` against `<output>.part`, renaming into place only on success.
fn write_via_part<F>(output: &Path, write: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<u64>,
{
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let result = File::create(&part)
        .with_context(|| format!("creating {}", part.display()))
        .and_then(|file| {
            let mut sink = BufWriter::new(file);
            let n = write(&mut sink)?;
            sink.flush().context("flushing output")?;
            Ok(n)
        })
        .and_then(|n| {
            std::fs::rename(&part, output)
                .with_context(|| format!("renaming into {}", output.display()))?;
            Ok(n)
        });

    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ── `clipsync encrypt` / `clipsync decrypt` ───────────────────────────────────

fn cmd_encrypt(text: Option<String>, password: &SecretString) -> Result<()> {
    let text = arg_or_stdin(text)?;
    println!("{}", encrypt_text(&text, password));
    Ok(())
}

fn cmd_decrypt(encoded: Option<String>, password: &SecretString) -> Result<()> {
    let encoded = arg_or_stdin(encoded)?;
    let text = decrypt_text(&encoded, password).map_err(user_facing)?;
    println!("{text}");
    Ok(())
}

// ── `clipsync seal` / `clipsync open` ─────────────────────────────────────────

fn cmd_seal(
    input: &Path,
    output: &Path,
    base64: bool,
    password: &SecretString,
    buffer_size: usize,
) -> Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let total = file.metadata().map(|m| m.len()).ok();

    let pb = make_progress_bar("seal");
    let mut source = ProgressReader::new(BufReader::new(file), total, Some(progress_callback(&pb)));

    let written = write_via_part(output, |sink| {
        let written = if base64 {
            let mut encoder = Base64EncodeWriter::new(sink);
            let n = encrypt_stream(&mut source, &mut encoder, password, buffer_size)?;
            encoder.finish().context("finishing base64 output")?;
            n
        } else {
            encrypt_stream(&mut source, sink, password, buffer_size)?
        };
        Ok(written)
    })
    .with_context(|| format!("sealing {}", input.display()))?;

    pb.finish_with_message("done".to_string());
    println!("Sealed:");
    println!("  input:    {} ({})", input.display(), fmt_bytes(source.bytes_read()));
    println!("  output:   {}", output.display());
    println!("  envelope: {}", fmt_bytes(written));
    Ok(())
}

fn cmd_open(
    input: &Path,
    output: &Path,
    base64: bool,
    password: &SecretString,
    buffer_size: usize,
) -> Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let total = file.metadata().map(|m| m.len()).ok();

    let pb = make_progress_bar("open");
    let source = ProgressReader::new(BufReader::new(file), total, Some(progress_callback(&pb)));
    let source: Box<dyn Read> = if base64 {
        Box::new(Base64DecodeReader::new(source))
    } else {
        Box::new(source)
    };

    let written = write_via_part(output, |sink| {
        decrypt_stream(source, sink, password, buffer_size).map_err(user_facing)
    })
    .with_context(|| format!("opening {}", input.display()))?;

    pb.finish_with_message("done".to_string());
    println!("Opened:");
    println!("  output: {}", output.display());
    println!("  bytes:  {}", fmt_bytes(written));
    Ok(())
}

// ── `clipsync push` / `clipsync pull` ─────────────────────────────────────────

async fn cmd_push(config: &ClipsyncConfig, text: Option<String>, password: SecretString) -> Result<()> {
    let text = arg_or_stdin(text)?;
    let client = CompanionClient::new(config, password).context("connecting to companion server")?;

    let ack = client
        .push_clipboard(&text)
        .await
        .with_context(|| format!("pushing clipboard to {}", client.base_url()))?;
    println!("Clipboard sent ({}).", ack.status);
    Ok(())
}

async fn cmd_pull(config: &ClipsyncConfig, password: SecretString) -> Result<()> {
    let client = CompanionClient::new(config, password).context("connecting to companion server")?;

    match client.fetch_clipboard().await {
        Ok(Some(text)) => {
            println!("{text}");
            Ok(())
        }
        Ok(None) => {
            eprintln!("Server clipboard is empty.");
            Ok(())
        }
        Err(e) if e.is_decryption_failure() => anyhow::bail!(DECRYPT_FAILED_MSG),
        Err(e) => Err(e).with_context(|| format!("fetching clipboard from {}", client.base_url())),
    }
}

// ── `clipsync upload` / `clipsync download` ───────────────────────────────────

async fn cmd_upload(
    config: &ClipsyncConfig,
    file: &Path,
    name: Option<&str>,
    password: SecretString,
) -> Result<()> {
    let name = match name {
        Some(n) => n.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("cannot derive a remote name from {}", file.display()))?,
    };
    let client = CompanionClient::new(config, password).context("connecting to companion server")?;

    println!("Uploading {} → {}", file.display(), name);
    let pb = make_progress_bar("upload");
    let report = client
        .upload_file(file, &name, Some(progress_callback(&pb)))
        .await
        .with_context(|| format!("uploading {}", file.display()))?;

    pb.finish_with_message("done".to_string());
    println!("Uploaded:");
    println!("  name:  {}", report.name);
    println!("  bytes: {}", fmt_bytes(report.plaintext_bytes));
    Ok(())
}

async fn cmd_download(
    config: &ClipsyncConfig,
    name: &str,
    output: Option<&Path>,
    password: SecretString,
) -> Result<()> {
    let dest = match output {
        Some(p) => p.to_path_buf(),
        None => {
            // Never let a remote name escape the download directory
            let file_name = Path::new(name)
                .file_name()
                .with_context(|| format!("cannot derive a local file name from {name:?}"))?;
            config.transfer.resolved_download_dir().join(file_name)
        }
    };
    let client = CompanionClient::new(config, password).context("connecting to companion server")?;

    println!("Downloading {} → {}", name, dest.display());
    let pb = make_progress_bar("download");
    let report = match client
        .download_file(name, &dest, Some(progress_callback(&pb)))
        .await
    {
        Ok(report) => report,
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            if e.is_decryption_failure() {
                anyhow::bail!(DECRYPT_FAILED_MSG);
            }
            return Err(e).with_context(|| format!("downloading {name}"));
        }
    };

    pb.finish_with_message("done".to_string());
    println!("Downloaded:");
    println!("  local: {}", dest.display());
    println!("  bytes: {}", fmt_bytes(report.plaintext_bytes));
    Ok(())
}

// ── `clipsync config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &ClipsyncConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
