use std::io::{self, BufRead, Write};

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use serde_json::json;

use tokengate_api::TokenGate;
use tokengate_infra::TokenGateConfig;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    Token,
    Message,
}

/// Validate envelopes read from stdin, one per line.
#[derive(Parser, Debug)]
#[command(name = "tokengate")]
#[command(about = "Validate one-time tokens and private messages against the shared store")]
struct Args {
    /// What the envelopes on stdin contain.
    #[arg(value_enum, default_value = "token")]
    mode: Mode,

    /// JSON configuration file; `TOKENGATE_*` environment variables are used when absent.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Emit one JSON object per envelope instead of plain text.
    #[arg(long)]
    json: bool,

    /// Human-readable logs instead of JSON.
    #[arg(long)]
    pretty_logs: bool,

    /// Check store connectivity and exit.
    #[arg(long)]
    health: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.pretty_logs {
        tokengate_observability::init_pretty();
    } else {
        tokengate_observability::init();
    }

    let raw = match &args.config {
        Some(path) => TokenGateConfig::from_json_file(path),
        None => TokenGateConfig::from_env(),
    }
    .context("failed to load configuration")?;
    let config = raw.validate().context("invalid configuration")?;

    let gate = TokenGate::connect(config).context("failed to set up the shared store")?;

    if !gate.health_check() {
        bail!("shared store is unreachable");
    }
    if args.health {
        println!("ok");
        return Ok(());
    }

    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let envelope = line.trim();
        if envelope.is_empty() {
            continue;
        }

        let report = match args.mode {
            Mode::Token => match gate.validate_token(envelope) {
                Ok(token) => json!({
                    "valid": true,
                    "client": token.client_name(),
                    "issued_at": token.issued_at(),
                }),
                Err(err) => json!({ "valid": false, "error": err.kind(), "message": err.to_string() }),
            },
            Mode::Message => match gate.validate_message(envelope) {
                Ok(message) => json!({
                    "valid": true,
                    "body": message.body(),
                    "issued_at": message.issued_at(),
                }),
                Err(err) => json!({ "valid": false, "error": err.kind(), "message": err.to_string() }),
            },
        };

        if args.json {
            writeln!(out, "{report}")?;
        } else if report["valid"] == true {
            writeln!(out, "valid")?;
        } else {
            writeln!(out, "{}", report["message"].as_str().unwrap_or("invalid"))?;
        }
    }

    gate.shutdown();
    Ok(())
}
