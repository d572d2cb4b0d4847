use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "facegate",
    about = "Face-embedding authentication: enrollment, matching and session tokens",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Read configuration from this file instead of the default search paths
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enroll reference embeddings for an identity from feature files
    Enroll(EnrollArgs),
    /// Remove every enrolled embedding of an identity
    Remove(RemoveArgs),
    /// Summarise the enrollment store
    Info,
    /// 1:N recognition of the primary face in a feature file
    Recognize(RecognizeArgs),
    /// 1:1 verification of a claimed identity
    Verify(VerifyArgs),
    /// Show the closest enrolled identities without issuing a token
    Rank(RankArgs),
    /// Check whether a session token is still valid
    Validate(TokenArgs),
    /// Revoke a session token
    Logout(TokenArgs),
    /// List the live tokens of an identity
    Tokens(TokensArgs),
    /// Deactivate every expired token
    Sweep(SweepArgs),
}

#[derive(Debug, Clone, Args)]
pub struct EnrollArgs {
    /// Identity to enroll
    pub identity: String,

    /// Feature JSON file; every detected face becomes a reference embedding
    pub features: PathBuf,

    /// Provenance tag stored with each embedding (defaults to the feature file path)
    #[arg(long)]
    pub source: Option<String>,

    /// Replace the identity's existing embeddings instead of appending
    #[arg(long)]
    pub replace: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    /// Identity whose embeddings should be removed
    pub identity: String,
}

#[derive(Debug, Clone, Args)]
pub struct RecognizeArgs {
    /// Feature JSON file holding the query face
    pub features: PathBuf,

    /// Override the configured recognition threshold (0-100)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Override the configured token lifetime in seconds
    #[arg(long)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Identity the caller claims to be
    pub identity: String,

    /// Feature JSON file holding the query face
    pub features: PathBuf,

    /// Override the configured verification threshold (0-100)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Override the configured token lifetime in seconds
    #[arg(long)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct RankArgs {
    /// Feature JSON file holding the query face
    pub features: PathBuf,

    /// Override the configured number of candidates
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct TokenArgs {
    /// Token identifier
    pub token: String,
}

#[derive(Debug, Clone, Args)]
pub struct TokensArgs {
    /// Identity whose live tokens should be listed
    pub identity: String,
}

#[derive(Debug, Clone, Args)]
pub struct SweepArgs {
    /// Keep running and sweep on the configured interval
    #[arg(long)]
    pub watch: bool,

    /// Override the configured sweep interval in seconds (with --watch)
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
