use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use notar_crypto::{DigestComputer, WalletKeyStore};
use notar_sdk::{
    AnchoringService, CertificateRecord, IssueOptions, NotarConfig, ServiceError,
    VerificationResult, LAMPORTS_PER_TOKEN,
};
use notar_types::Digest;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

const DEFAULT_CONFIG: &str = "notar.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Keygen(args) => cmd_keygen(&config, args, format),
        Command::Address => cmd_address(&config, format),
        Command::Balance => cmd_balance(&config, format),
        Command::Issue(args) => cmd_issue(&config, args, format),
        Command::Verify(args) => cmd_verify(&config, args, format),
        Command::Show(args) => cmd_show(&config, args, format),
        Command::List(args) => cmd_list(&config, args, format),
        Command::Digest(args) => cmd_digest(&config, args, format),
    }
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<NotarConfig> {
    let path = match explicit {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
        None => {
            debug!("no config file; using defaults");
            return Ok(NotarConfig::default());
        }
    };
    let config = NotarConfig::load(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    debug!(path = %path.display(), rpc = %config.rpc.url, "config loaded");
    Ok(config)
}

fn service(config: &NotarConfig) -> anyhow::Result<AnchoringService> {
    AnchoringService::from_config(config).map_err(describe)
}

/// Prefix a service error with its category so operators know where to look.
fn describe(err: ServiceError) -> anyhow::Error {
    let kind = err.kind();
    anyhow::Error::new(err).context(format!("{kind} error"))
}

fn open(path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_keygen(config: &NotarConfig, args: KeygenArgs, format: OutputFormat) -> anyhow::Result<()> {
    let path: PathBuf = args.out.unwrap_or_else(|| config.keypair_path.clone());
    let wallet = WalletKeyStore::generate();
    wallet
        .write_keypair_file(&path)
        .with_context(|| format!("writing keypair {}", path.display()))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "address": wallet.address(),
            "path": path,
        })),
        OutputFormat::Text => {
            println!("{} Wrote keypair to {}", "✓".green().bold(), path.display().to_string().bold());
            println!("  Address: {}", wallet.address().to_string().cyan());
            Ok(())
        }
    }
}

fn cmd_address(config: &NotarConfig, format: OutputFormat) -> anyhow::Result<()> {
    let wallet = WalletKeyStore::load(&config.keypair_path)
        .with_context(|| format!("loading keypair {}", config.keypair_path.display()))?;
    match format {
        OutputFormat::Json => print_json(&json!({ "address": wallet.address() })),
        OutputFormat::Text => {
            println!("{}", wallet.address());
            Ok(())
        }
    }
}

fn cmd_balance(config: &NotarConfig, format: OutputFormat) -> anyhow::Result<()> {
    let service = service(config)?;
    let lamports = service.balance().map_err(describe)?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "address": service.address(),
            "lamports": lamports,
        })),
        OutputFormat::Text => {
            println!(
                "{} lamports ({:.9} tokens)",
                lamports.to_string().bold(),
                lamports as f64 / LAMPORTS_PER_TOKEN as f64
            );
            Ok(())
        }
    }
}

fn cmd_issue(config: &NotarConfig, args: IssueArgs, format: OutputFormat) -> anyhow::Result<()> {
    let service = service(config)?;
    let mut options = IssueOptions::new(args.owner);
    if let Some(remarks) = args.remarks {
        options = options.with_remarks(remarks);
    }
    if let Some(secs) = args.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let record = service
        .issue_with(open(&args.file)?, options)
        .map_err(describe)
        .with_context(|| format!("issuing certificate for {}", args.file.display()))?;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&record)?),
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), record);
            print_record_details(&record);
            Ok(())
        }
    }
}

fn cmd_verify(config: &NotarConfig, args: FileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let service = service(config)?;
    let result = service
        .verify(open(&args.file)?)
        .map_err(describe)
        .with_context(|| format!("verifying {}", args.file.display()))?;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&result)?),
        OutputFormat::Text => {
            match &result {
                VerificationResult::Valid {
                    digest,
                    owner,
                    signature,
                    issued_at,
                } => {
                    println!("{} {}", "✓".green().bold(), result.status().green().bold());
                    println!("  Digest: {}", digest.to_hex().cyan());
                    println!("  Owner: {}", owner.bold());
                    println!("  Issued: {}", issued_at.to_rfc3339());
                    if let Some(sig) = signature {
                        println!("  Transaction: {}", sig.to_string().yellow());
                    }
                }
                VerificationResult::NotFound { digest } => {
                    println!("{} {}", "✗".red().bold(), result.status().red().bold());
                    println!("  Digest: {}", digest.to_hex().cyan());
                }
            }
            Ok(())
        }
    }
}

fn cmd_show(config: &NotarConfig, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let digest = Digest::from_hex(&args.digest)
        .with_context(|| format!("parsing digest {:?}", args.digest))?;
    let service = service(config)?;
    let record = service.lookup(&digest).map_err(describe)?;

    match (format, record) {
        (OutputFormat::Json, record) => print_json(&serde_json::to_value(&record)?),
        (OutputFormat::Text, Some(record)) => {
            println!("{}", record.to_string().bold());
            print_record_details(&record);
            Ok(())
        }
        (OutputFormat::Text, None) => {
            println!("No certificate for {}", digest.to_hex().cyan());
            Ok(())
        }
    }
}

fn cmd_list(config: &NotarConfig, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let service = service(config)?;
    let records = match &args.owner {
        Some(owner) => service.list_by_owner(owner),
        None => service.list(),
    }
    .map_err(describe)?;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No certificates.");
            }
            for record in &records {
                println!(
                    "{}  {}  {}",
                    record.short_digest().yellow(),
                    record.issued_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    record.owner.bold()
                );
            }
            Ok(())
        }
    }
}

fn cmd_digest(config: &NotarConfig, args: FileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let digest = DigestComputer::with_chunk_size(config.digest_chunk_size)
        .digest_file(&args.file)
        .with_context(|| format!("digesting {}", args.file.display()))?;
    match format {
        OutputFormat::Json => print_json(&json!({ "digest": digest, "file": args.file })),
        OutputFormat::Text => {
            println!("{}  {}", digest, args.file.display());
            Ok(())
        }
    }
}

fn print_record_details(record: &CertificateRecord) {
    println!("  Digest: {}", record.digest.to_hex().cyan());
    println!("  Owner: {}", record.owner.bold());
    println!("  Issued: {}", record.issued_at.to_rfc3339());
    match &record.transaction_signature {
        Some(sig) => println!("  Transaction: {}", sig.to_string().yellow()),
        None => println!("  Transaction: {}", "none".dimmed()),
    }
    if let Some(remarks) = &record.remarks {
        println!("  Remarks: {remarks}");
    }
}
