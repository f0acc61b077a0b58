use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "notar",
    about = "Notar: anchor artifact digests on a ledger and verify them later",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML). Defaults to ./notar.toml when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a new wallet keypair file
    Keygen(KeygenArgs),
    /// Show the wallet address
    Address,
    /// Show the wallet balance
    Balance,
    /// Anchor a file's digest and record a certificate
    Issue(IssueArgs),
    /// Check whether a file was anchored
    Verify(FileArgs),
    /// Show the certificate for a digest
    Show(ShowArgs),
    /// List certificates
    List(ListArgs),
    /// Print a file's SHA-256 digest
    Digest(FileArgs),
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Output path. Defaults to the configured keypair path.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct IssueArgs {
    pub file: PathBuf,
    #[arg(long)]
    pub owner: String,
    #[arg(long)]
    pub remarks: Option<String>,
    /// Give up after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args)]
pub struct FileArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ShowArgs {
    /// 64-character hex digest
    pub digest: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub owner: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_issue() {
        let cli = Cli::try_parse_from([
            "notar", "issue", "diploma.pdf", "--owner", "alice", "--remarks", "BSc",
        ])
        .unwrap();
        if let Command::Issue(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("diploma.pdf"));
            assert_eq!(args.owner, "alice");
            assert_eq!(args.remarks.as_deref(), Some("BSc"));
            assert!(args.timeout.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn issue_requires_owner() {
        assert!(Cli::try_parse_from(["notar", "issue", "a.pdf"]).is_err());
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "notar", "verify", "a.pdf", "--format", "json", "-v", "--config", "n.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("n.toml")));
        assert!(matches!(cli.command, Command::Verify(_)));
    }

    #[test]
    fn parse_list_by_owner() {
        let cli = Cli::try_parse_from(["notar", "list", "--owner", "bob"]).unwrap();
        if let Command::List(args) = cli.command {
            assert_eq!(args.owner.as_deref(), Some("bob"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_keygen_default_path() {
        let cli = Cli::try_parse_from(["notar", "keygen"]).unwrap();
        assert!(matches!(cli.command, Command::Keygen(KeygenArgs { out: None })));
    }
}
