//! CLI command definitions and dispatch.

mod decode;
mod maa;
mod raw;
mod status;

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Args, Parser, Subcommand};

use cvm_attest_core::{discover_security_context_dir, AttestConfig, UvmInformation};
use cvm_attest_runtime::{is_simulate_mode, Attestor};

/// Root searched for a `security-context-*` directory when
/// `UVM_SECURITY_CONTEXT_DIR` is unset.
const SECURITY_CONTEXT_ROOT: &str = "/";

/// CVM Attest - SEV-SNP evidence collection and token exchange.
#[derive(Parser)]
#[command(name = "cvm-attest", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// Configuration file (.json, .yaml or .yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base64 JSON startup configuration, e.g. {"certcache": {...}}
    #[arg(long = "base64", global = true, conflicts_with = "config")]
    pub base64_config: Option<String>,

    /// Produce simulated reports instead of using the SEV-SNP device
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Fetch a raw SNP report bound to runtime data
    Raw(raw::RawArgs),
    /// Exchange reconciled evidence for an attestation token
    Maa(maa::MaaArgs),
    /// Decode a report file as JSON
    Decode(decode::DecodeArgs),
    /// Show configuration and cached TCB
    Status(status::StatusArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Raw(args) => raw::execute(&cli.global, args).await,
        Command::Maa(args) => maa::execute(&cli.global, args).await,
        Command::Decode(args) => decode::execute(args).await,
        Command::Status(args) => status::execute(&cli.global, args).await,
    }
}

/// Load configuration from `--config`, `--base64` or defaults.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<AttestConfig, Box<dyn std::error::Error>> {
    let config = match (&global.config, &global.base64_config) {
        (Some(path), _) => AttestConfig::load(path)?,
        (None, Some(blob)) => AttestConfig::from_base64_json(blob)?,
        (None, None) => AttestConfig::default(),
    };
    Ok(config)
}

/// Load the UVM security context, discovering the context directory
/// under `root` when the environment does not name one.
pub(crate) fn load_uvm(root: &Path) -> Result<UvmInformation, Box<dyn std::error::Error>> {
    let dir_from_env = std::env::var(cvm_attest_core::uvm::SECURITY_CONTEXT_DIR_ENV)
        .map(|v| !v.is_empty())
        .unwrap_or(false);
    if !dir_from_env {
        if let Some(dir) = discover_security_context_dir(root) {
            tracing::debug!(dir = %dir.display(), "Discovered security context directory");
            return Ok(UvmInformation::from_dir(&dir)?);
        }
    }
    Ok(UvmInformation::load()?)
}

/// Build the attestor for commands that need hardware evidence.
pub(crate) fn build_attestor(global: &GlobalArgs) -> Result<Attestor, Box<dyn std::error::Error>> {
    let config = load_config(global)?;
    let uvm = load_uvm(Path::new(SECURITY_CONTEXT_ROOT))?;
    let simulate = global.simulate || is_simulate_mode();
    Ok(Attestor::from_config(&config, uvm, simulate)?)
}

/// Decode a standard base64 `--runtime-data` argument.
pub(crate) fn decode_runtime_data(encoded: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("decoding runtime data from Base64 format failed: {}", e).into())
}
